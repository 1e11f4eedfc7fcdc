//! Diograph shell.
//!
//! Opens a folder of diosphere/diograph documents and reads `#` commands
//! from stdin:
//!
//! ```bash
//! cargo run -p diograph-cli -- --dir ./my-diosphere
//! ```

mod headless;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = headless::parse_config_from_args(&args);
    headless::run_headless(config).await.map_err(|e| e.into())
}

fn print_help() {
    println!("diograph - browse and edit a diosphere from the command line");
    println!();
    println!("USAGE:");
    println!("  diograph [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help            Show this help message");
    println!("  --dir <PATH>          Folder holding the documents (default: .)");
    println!("  --debounce-ms <MS>    Quiet window before changes are written");
    println!();
    println!("ENVIRONMENT:");
    println!("  DIOGRAPH_SAVE_DEBOUNCE_MS      Quiet window (default: 1000)");
    println!("  DIOGRAPH_DIOSPHERE_DOCUMENT    Diosphere file (default: diosphere.json)");
    println!("  DIOGRAPH_DIOGRAPH_DOCUMENT     Per-room diograph file (default: diograph.json)");
    println!("  RUST_LOG                       Log filter (default: warn)");
    println!();
    println!("EXAMPLES:");
    println!("  diograph --dir ./diosphere");
    println!("  echo '#rooms' | diograph --dir ./diosphere");
}
