//! Persistence tests: debounced saving, document stores and the client.
//!
//! Timing tests run on paused tokio time, so the quiet window elapses
//! deterministically.

use diograph_core::client::{room_document_name, ClientConfig, ClientError, DioryClient};
use diograph_core::graph::props;
use diograph_core::kinds::{DioryKind, RoomKind};
use diograph_core::persist::{decode, DocumentStore, FsDocumentStore, PersistError, PersistentGraph};
use diograph_core::testing::{sample_diosphere, RecordingStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

const QUIET: Duration = Duration::from_millis(1000);

async fn open_diograph(store: &Arc<RecordingStore>, name: &str) -> PersistentGraph<DioryKind> {
    PersistentGraph::open(store.clone(), name, QUIET)
        .await
        .expect("Failed to open diograph")
}

// =============================================================================
// Debounced saving
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_mutations_in_window_write_once() {
    let store = Arc::new(RecordingStore::new());
    let graph = open_diograph(&store, "diograph.json").await;

    graph
        .lock()
        .await
        .add_entity(props(json!({"id": "a", "text": "first"})), None)
        .unwrap();
    sleep(Duration::from_millis(300)).await;
    graph
        .lock()
        .await
        .update_entity("a", props(json!({"text": "final"})))
        .unwrap();

    sleep(Duration::from_millis(1500)).await;

    let writes = store.writes_to("diograph.json");
    assert_eq!(writes.len(), 1, "mutations in one window must coalesce");
    let document = writes[0].document().unwrap();
    assert_eq!(document["a"]["text"], json!("final"));
}

#[tokio::test(start_paused = true)]
async fn test_reads_and_queries_do_not_save() {
    let store = Arc::new(RecordingStore::new());
    store
        .save("diograph.json", br#"{"a": {"id": "a", "text": "x"}}"#.to_vec())
        .await
        .unwrap();
    let baseline = store.writes().len();

    let graph = open_diograph(&store, "diograph.json").await;
    {
        let diograph = graph.lock().await;
        diograph.get_entity("a").unwrap();
        diograph.query(&diograph_core::Query::text("x"));
    }

    sleep(Duration::from_millis(3000)).await;
    assert_eq!(store.writes().len(), baseline);
}

#[tokio::test(start_paused = true)]
async fn test_close_covers_final_mutation() {
    let store = Arc::new(RecordingStore::new());
    let graph = open_diograph(&store, "diograph.json").await;

    graph
        .lock()
        .await
        .add_entity(props(json!({"id": "late"})), None)
        .unwrap();
    assert!(graph.close().await.expect("Failed to close"));

    let writes = store.writes_to("diograph.json");
    assert_eq!(writes.len(), 1);
    assert!(writes[0].document().unwrap().contains_key("late"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_debounced_write_is_not_retried() {
    let store = Arc::new(RecordingStore::new());
    let graph = open_diograph(&store, "diograph.json").await;

    store.fail_saves(true);
    graph
        .lock()
        .await
        .add_entity(props(json!({"id": "a"})), None)
        .unwrap();
    sleep(Duration::from_millis(1500)).await;

    store.fail_saves(false);
    sleep(Duration::from_millis(3000)).await;
    assert!(store.writes().is_empty());

    // An explicit flush reports its own failure to the caller.
    store.fail_saves(true);
    graph
        .lock()
        .await
        .add_entity(props(json!({"id": "b"})), None)
        .unwrap();
    let err = graph.flush().await.unwrap_err();
    assert!(matches!(err, PersistError::Io(_)));
}

#[tokio::test(start_paused = true)]
async fn test_save_now_bypasses_window() {
    let store = Arc::new(RecordingStore::new());
    let graph = open_diograph(&store, "diograph.json").await;

    graph
        .lock()
        .await
        .add_entity(props(json!({"id": "a"})), None)
        .unwrap();
    graph.save_now().await.expect("Failed to save");
    assert_eq!(store.writes().len(), 1);
}

// =============================================================================
// Filesystem store
// =============================================================================

#[tokio::test]
async fn test_fs_store_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = FsDocumentStore::new(temp_dir.path());

    assert!(store.load("rooms/a/diograph.json").await.unwrap_err().is_not_found());

    store
        .save("rooms/a/diograph.json", b"{}".to_vec())
        .await
        .expect("Failed to save");
    assert!(temp_dir.path().join("rooms/a/diograph.json").exists());
    assert_eq!(store.load("rooms/a/diograph.json").await.unwrap(), b"{}");

    store.delete("rooms/a/diograph.json").await.expect("Failed to delete");
    assert!(store.delete("rooms/a/diograph.json").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_fs_persistent_graph_reopens() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store: Arc<dyn DocumentStore> = Arc::new(FsDocumentStore::new(temp_dir.path()));

    let graph = PersistentGraph::<RoomKind>::open(store.clone(), "diosphere.json", QUIET)
        .await
        .expect("Failed to open");
    graph.lock().await.merge(sample_diosphere());
    graph
        .lock()
        .await
        .add_entity(props(json!({"id": "play", "text": "Play"})), None)
        .unwrap();
    graph.close().await.expect("Failed to close");

    let reopened = PersistentGraph::<RoomKind>::open(store, "diosphere.json", QUIET)
        .await
        .expect("Failed to reopen");
    let diosphere = reopened.lock().await;
    assert_eq!(diosphere.len(), 3);
    assert_eq!(diosphere.get_entity("play").unwrap().text(), Some("Play"));
    assert!(diosphere.get_entity("/").unwrap().has_edge("work"));
}

// =============================================================================
// Client
// =============================================================================

fn config() -> ClientConfig {
    ClientConfig::new().with_save_debounce(QUIET)
}

#[tokio::test(start_paused = true)]
async fn test_client_initialise_creates_roots() {
    let store = Arc::new(RecordingStore::new());
    let client = DioryClient::initialise(store.clone(), config())
        .await
        .expect("Failed to initialise");

    assert_eq!(client.room(), Some("/"));
    assert_eq!(client.focused(), Some("/"));
    {
        let diograph = client.diograph().unwrap().lock().await;
        assert_eq!(diograph.get_entity("/").unwrap().text(), Some("Root"));
    }

    client.close().await.expect("Failed to close");

    let sphere = decode(&store.load("diosphere.json").await.unwrap()).unwrap();
    assert!(sphere.contains_key("/"));
    let graph = decode(&store.load("diograph.json").await.unwrap()).unwrap();
    assert_eq!(graph["/"]["text"], json!("Root"));
}

#[tokio::test(start_paused = true)]
async fn test_client_rooms_have_separate_diographs() {
    let store = Arc::new(RecordingStore::new());
    store
        .inner()
        .insert(
            "diosphere.json",
            serde_json::to_vec(&sample_diosphere()).unwrap(),
        )
        .await;

    let mut client = DioryClient::initialise(store.clone(), config())
        .await
        .expect("Failed to initialise");

    client
        .diograph()
        .unwrap()
        .lock()
        .await
        .add_entity(props(json!({"id": "home-note", "text": "at home"})), None)
        .unwrap();

    let room = client.enter_room("work").await.expect("Failed to enter room");
    assert_eq!(room.text(), Some("Work"));
    assert_eq!(client.room(), Some("work"));
    assert_eq!(client.focused(), None);

    // Leaving the root room flushed its diograph.
    let home = decode(&store.load("diograph.json").await.unwrap()).unwrap();
    assert!(home.contains_key("home-note"));

    {
        let diograph = client.diograph().unwrap().lock().await;
        assert!(!diograph.contains_key("home-note"));
        assert!(diograph.contains_key("/"));
    }

    let focused = client.focus_diory("/").await.expect("Failed to focus");
    assert_eq!(focused.id(), "/");

    client.close().await.expect("Failed to close");
    let work_document = room_document_name("work", "diograph.json");
    assert!(store.load(&work_document).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_client_unknown_room_and_diory() {
    let store = Arc::new(RecordingStore::new());
    let mut client = DioryClient::initialise(store, config())
        .await
        .expect("Failed to initialise");

    let err = client.enter_room("nowhere").await.unwrap_err();
    assert!(matches!(err, ClientError::Graph(ref e) if e.is_not_found()));
    assert_eq!(client.room(), Some("/"), "failed enter keeps the current room");

    let err = client.focus_diory("nothing").await.unwrap_err();
    assert!(matches!(err, ClientError::Graph(_)));
}

#[tokio::test(start_paused = true)]
async fn test_failed_enter_room_keeps_current_room() {
    let store = Arc::new(RecordingStore::new());
    store
        .inner()
        .insert(
            "diosphere.json",
            serde_json::to_vec(&sample_diosphere()).unwrap(),
        )
        .await;

    let mut client = DioryClient::initialise(store.clone(), config())
        .await
        .expect("Failed to initialise");
    client
        .diograph()
        .unwrap()
        .lock()
        .await
        .add_entity(props(json!({"id": "note", "text": "pending"})), None)
        .unwrap();

    store.fail_saves(true);
    let err = client.enter_room("work").await.unwrap_err();
    assert!(matches!(err, ClientError::Persist(PersistError::Io(_))));

    // Nothing moved: same room, same focus, unsaved note still in memory.
    assert_eq!(client.room(), Some("/"));
    assert_eq!(client.focused(), Some("/"));
    assert!(client
        .diograph()
        .expect("Failed to keep diograph")
        .lock()
        .await
        .contains_key("note"));

    store.fail_saves(false);
    client.enter_room("work").await.expect("Failed to enter room");
    assert_eq!(client.room(), Some("work"));

    let home = decode(&store.load("diograph.json").await.unwrap()).unwrap();
    assert_eq!(home["note"]["text"], json!("pending"));

    client.close().await.expect("Failed to close");
}
