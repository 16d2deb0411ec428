//! cb-bridge: Contacts Bridge demo binary
//!
//! Wires an in-memory contacts store to a contact-change listener and
//! drives both from an interactive prompt.
//!
//! Usage:
//!   cb-bridge                   - Start the interactive session
//!   cb-bridge --config <path>   - Load configuration from a TOML file
//!   cb-bridge --help            - Show help

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use cb_core::{Config, Contact, MemoryContactStore};
use cb_listener::ContactsListener;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Interactive session, optionally with an explicit config file
    Run { config_path: Option<PathBuf> },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1)).map_err(|e| anyhow::anyhow!(e))?;

    let config_path = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("cb-bridge {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Run { config_path } => config_path,
    };

    // Load .env file
    dotenvy::dotenv().ok();

    let config = match config_path {
        Some(path) => Config::from_toml_file(&path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    // Logs go to stderr; stdout carries stream payloads
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting cb-bridge...");
    tracing::info!(
        "Debounce: {}ms, prefer journal: {}, token loss: {:?}",
        config.listener.debounce_ms,
        config.listener.prefer_journal,
        config.listener.token_loss
    );

    let store = MemoryContactStore::new();
    seed(&store);

    let listener = Arc::new(ContactsListener::new(store.platform(), config));
    let result = cli::run_cli(store, Arc::clone(&listener)).await;

    listener.shutdown();
    result
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> Result<RunMode, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => return Err("--config requires a path".to_string()),
            },
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(RunMode::Run { config_path })
}

/// Populate the demo store
fn seed(store: &MemoryContactStore) {
    store.insert(
        Contact::new("", "Ada Lovelace")
            .with_phone("+44 20 7946 0000")
            .with_email("ada@example.com"),
    );
    store.insert(Contact::new("", "Alan Turing").with_email("alan@example.com"));
}

/// Print help message
fn print_help() {
    println!("cb-bridge - Contacts Bridge listener demo");
    println!();
    println!("Usage:");
    println!("  cb-bridge                    Start the interactive session");
    println!("  cb-bridge --config <path>    Load configuration from a TOML file");
    println!("  cb-bridge --help             Show this help message");
    println!("  cb-bridge --version          Show version");
    println!();
    println!("Environment Variables:");
    println!("  CONTACTS_DEBOUNCE_MS             Quiet period in ms (default: 300)");
    println!("  CONTACTS_PREFER_JOURNAL          Use the change journal (default: true)");
    println!("  CONTACTS_TOKEN_LOSS              resync, rebase or fingerprint (default: resync)");
    println!("  CONTACTS_FINGERPRINT_THUMBNAIL   Hash thumbnails (default: true)");
    println!("  CONTACTS_LOG_LEVEL               Default log filter (default: info)");
    println!("  RUST_LOG                         Overrides the log filter");
}
