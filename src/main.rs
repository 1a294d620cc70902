//! yarukoto: a small task list whose views stay in sync through a shared
//! key-value store.
//!
//! ```bash
//! # SQLite in the OS data dir, one view
//! cargo run
//!
//! # Two side-by-side views over an in-memory store
//! cargo run -- --memory --views 2
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use yarukoto::app::App;
use yarukoto::config::{Backend, CliArgs, Config};
use yarukoto::kv::KeyValueStore;
use yarukoto::kv::memory::InMemoryKv;
use yarukoto::kv::sqlite::SqliteKv;
use yarukoto::store::Storage;
use yarukoto::ui;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}");
            Config::default()
        }
    };

    // The terminal belongs to the TUI, so logs go to a file.
    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());
    tracing::info!(backend = ?config.backend, views = config.views, "yarukoto starting");

    let kv: Arc<dyn KeyValueStore> = match &config.backend {
        Backend::Memory => Arc::new(InMemoryKv::default()),
        Backend::Sqlite(Some(path)) => Arc::new(SqliteKv::open(path)?),
        Backend::Sqlite(None) => Arc::new(SqliteKv::open_default()?),
    };
    let storage = Storage::new(kv)?;

    let app = App::new(storage, config.key.as_str(), config.views);
    let result = ui::run(app, config.tick_rate).await;

    tracing::info!("yarukoto exiting");
    result
}

/// Returns the guard that keeps the background log writer alive.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("yarukoto.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
