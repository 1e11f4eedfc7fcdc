//! Headless shell over a diosphere.
//!
//! A simple line-oriented protocol:
//! - Lines starting with `#` are commands
//! - Output lines are tagged (`[STATUS]`, `[ERROR]`, `[SAVED]`, ...)

use diograph_core::{
    props, ClientConfig, ClientError, DioryClient, DocumentStore, EdgeRef, FsDocumentStore, Props,
    Query,
};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Options for the headless shell.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Folder holding the documents.
    pub dir: PathBuf,
    /// Debounce override; falls back to the environment.
    pub debounce: Option<Duration>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            debounce: None,
        }
    }
}

/// What the shell should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Print these lines and keep reading.
    Lines(Vec<String>),
    /// Flush and exit.
    Quit,
}

const HELP: &[&str] = &[
    "  #help                       - Show this help",
    "  #quit, #exit                - Save and exit",
    "  #status                     - Current room, focus and counts",
    "  #rooms                      - List rooms",
    "  #room <id>                  - Enter a room",
    "  #add-room <id> [text...]    - Add a room",
    "  #door <from> <to>           - Add a door",
    "  #undoor <from> <to>         - Remove a door",
    "  #add <id> [text...]         - Add a diory",
    "  #get <id>                   - Show a diory",
    "  #focus <id>                 - Focus a diory",
    "  #text <id> <text...>        - Change a diory's text",
    "  #rm <id>                    - Remove a diory",
    "  #link <from> <to> [path]    - Link two diories",
    "  #unlink <from> <to>         - Remove a link",
    "  #query <field> <pattern>    - Find diories",
    "  #save                       - Write pending changes now",
];

const COMMANDS: &[&str] = &[
    "help", "quit", "exit", "status", "rooms", "room", "add-room", "door", "undoor", "add",
    "get", "focus", "text", "rm", "link", "unlink", "query", "save",
];

/// Run the shell on stdin/stdout until `#quit` or end of input.
pub async fn run_headless(config: HeadlessConfig) -> Result<(), ClientError> {
    let mut client_config = ClientConfig::from_env();
    if let Some(debounce) = config.debounce {
        client_config = client_config.with_save_debounce(debounce);
    }

    let store: Arc<dyn DocumentStore> = Arc::new(FsDocumentStore::new(&config.dir));
    let mut client = DioryClient::initialise(store, client_config).await?;

    println!("=== Diograph Headless Mode ===");
    println!("Folder: {}", config.dir.display());
    println!("Room: {}", client.room().unwrap_or("-"));
    println!();
    println!("Commands:");
    for line in HELP {
        println!("{line}");
    }
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        match execute(&mut client, &line).await {
            Reply::Quit => {
                println!("Goodbye!");
                break;
            }
            Reply::Lines(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
        }
        stdout.flush().ok();
    }

    client.close().await?;
    println!("[SAVED]");
    Ok(())
}

/// Execute one input line against the client.
pub async fn execute(client: &mut DioryClient, line: &str) -> Reply {
    let line = line.trim();
    if line.is_empty() {
        return Reply::Lines(Vec::new());
    }

    let Some(command) = line.strip_prefix('#') else {
        return error("Unknown command. Type #help for help.");
    };
    let parts: Vec<&str> = command.split_whitespace().collect();

    let result: Result<Vec<String>, ClientError> = match parts.as_slice() {
        ["quit"] | ["exit"] => return Reply::Quit,
        ["help"] => Ok(std::iter::once("[HELP]".to_string())
            .chain(HELP.iter().map(|l| l.to_string()))
            .collect()),
        ["status"] => status(client).await,
        ["rooms"] => rooms(client).await,
        ["room", id] => client
            .enter_room(id)
            .await
            .map(|room| vec![format!("[ROOM] {}", room.id())]),
        ["add-room", id, text @ ..] => add_room(client, id, text).await,
        ["door", from, to] => door(client, from, to, true).await,
        ["undoor", from, to] => door(client, from, to, false).await,
        ["add", id, text @ ..] => add_diory(client, id, text).await,
        ["get", id] => get_diory(client, id).await,
        ["focus", id] => client
            .focus_diory(id)
            .await
            .map(|diory| vec![format!("[FOCUS] {}", diory.id())]),
        ["text", id, text @ ..] if !text.is_empty() => set_text(client, id, text).await,
        ["rm", id] => remove_diory(client, id).await,
        ["link", from, to] => link(client, from, EdgeRef::new(*to), true).await,
        ["link", from, to, path] => {
            link(client, from, EdgeRef::new(*to).with_path(*path), true).await
        }
        ["unlink", from, to] => link(client, from, EdgeRef::new(*to), false).await,
        ["query", field, pattern @ ..] if !pattern.is_empty() => {
            query(client, field, &pattern.join(" ")).await
        }
        ["save"] => client.flush().await.map(|()| vec!["[SAVED]".to_string()]),
        [name, ..] if is_known(name) => return error(&format!("Usage: see #help for #{name}")),
        _ => return error("Unknown command. Type #help for help."),
    };

    match result {
        Ok(lines) => Reply::Lines(lines),
        Err(e) => error(&e.to_string()),
    }
}

fn error(message: &str) -> Reply {
    Reply::Lines(vec![format!("[ERROR] {message}")])
}

fn is_known(name: &str) -> bool {
    COMMANDS.contains(&name)
}

fn with_text(id: &str, text: &[&str]) -> Props {
    let mut document = props(json!({ "id": id }));
    if !text.is_empty() {
        document.insert("text".to_string(), Value::String(text.join(" ")));
    }
    document
}

async fn status(client: &DioryClient) -> Result<Vec<String>, ClientError> {
    let rooms = client.diosphere().lock().await.len();
    let diories = client.diograph()?.lock().await.len();
    Ok(vec![
        "[STATUS]".to_string(),
        format!("  Room: {}", client.room().unwrap_or("-")),
        format!("  Focus: {}", client.focused().unwrap_or("-")),
        format!("  Rooms: {rooms}"),
        format!("  Diories: {diories}"),
    ])
}

async fn rooms(client: &DioryClient) -> Result<Vec<String>, ClientError> {
    let diosphere = client.diosphere().lock().await;
    Ok(diosphere
        .entities()
        .map(|(key, room)| match room.text() {
            Some(text) => format!("  {key} - {text}"),
            None => format!("  {key}"),
        })
        .collect())
}

async fn add_room(
    client: &DioryClient,
    id: &str,
    text: &[&str],
) -> Result<Vec<String>, ClientError> {
    let mut diosphere = client.diosphere().lock().await;
    let room = diosphere.add_entity(with_text(id, text), None)?;
    Ok(vec![format!("[ADDED] room {}", room.id())])
}

async fn door(
    client: &DioryClient,
    from: &str,
    to: &str,
    add: bool,
) -> Result<Vec<String>, ClientError> {
    let mut diosphere = client.diosphere().lock().await;
    let room = if add {
        diosphere.add_edge(from, to)?
    } else {
        diosphere.remove_edge(from, to)?
    };
    let doors = room.doors().map(|d| d.len()).unwrap_or(0);
    Ok(vec![format!("[DOORS] {} has {doors}", room.id())])
}

async fn add_diory(
    client: &DioryClient,
    id: &str,
    text: &[&str],
) -> Result<Vec<String>, ClientError> {
    let mut diograph = client.diograph()?.lock().await;
    let diory = diograph.add_entity(with_text(id, text), None)?;
    Ok(vec![format!("[ADDED] diory {}", diory.id())])
}

async fn get_diory(client: &DioryClient, id: &str) -> Result<Vec<String>, ClientError> {
    let diograph = client.diograph()?.lock().await;
    let document = diograph.get_entity(id)?.to_document_without_image();
    let text = serde_json::to_string_pretty(&document)
        .unwrap_or_else(|e| format!("<unprintable: {e}>"));
    Ok(std::iter::once("[DIORY]".to_string())
        .chain(text.lines().map(str::to_string))
        .collect())
}

async fn set_text(
    client: &DioryClient,
    id: &str,
    text: &[&str],
) -> Result<Vec<String>, ClientError> {
    let mut diograph = client.diograph()?.lock().await;
    let diory = diograph.update_entity(id, props(json!({ "text": text.join(" ") })))?;
    Ok(vec![format!("[UPDATED] {}", diory.id())])
}

async fn remove_diory(client: &DioryClient, id: &str) -> Result<Vec<String>, ClientError> {
    client.diograph()?.lock().await.remove_entity(id)?;
    Ok(vec![format!("[REMOVED] {id}")])
}

async fn link(
    client: &DioryClient,
    from: &str,
    to: EdgeRef,
    add: bool,
) -> Result<Vec<String>, ClientError> {
    let mut diograph = client.diograph()?.lock().await;
    let diory = if add {
        diograph.add_edge(from, to)?
    } else {
        diograph.remove_edge(from, &to.id)?
    };
    let links = diory.links().map(|l| l.len()).unwrap_or(0);
    Ok(vec![format!("[LINKS] {} has {links}", diory.id())])
}

async fn query(
    client: &DioryClient,
    field: &str,
    pattern: &str,
) -> Result<Vec<String>, ClientError> {
    let diograph = client.diograph()?.lock().await;
    let found = diograph.query(&Query::new().field(field, pattern));
    Ok(std::iter::once(format!("[FOUND] {}", found.len()))
        .chain(found.entities().map(|(id, _)| format!("  {id}")))
        .collect())
}

/// Parse shell options from command line arguments.
pub fn parse_config_from_args(args: &[String]) -> HeadlessConfig {
    let mut config = HeadlessConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => {
                if let Some(dir) = args.get(i + 1) {
                    config.dir = PathBuf::from(dir);
                    i += 1;
                }
            }
            "--debounce-ms" => {
                if let Some(ms) = args.get(i + 1) {
                    config.debounce = ms.parse().ok().map(Duration::from_millis);
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    config
}
