//! bubble-tracker server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) plus an
//! optional `config.<env>.toml` overlay, opens the SQLite store, and runs one
//! of the administrative tasks or serves the JSON API over HTTP.
//!
//! ```
//! cargo run -p bubble-server -- --task db-create
//! cargo run -p bubble-server -- -e production
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use bubble_cache::CachedStore;
use bubble_core::store::DatapointStore;
use bubble_server::{ServerConfig, open_store, router};
use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Task {
  /// Ensure the schema, then serve the API.
  Server,
  /// Create the datapoint table if it does not exist.
  DbCreate,
  /// Drop the datapoint table and all data.
  DbDrop,
  /// Delete every datapoint but keep the table.
  DbClear,
}

#[derive(Parser)]
#[command(author, version, about = "Bubble tracker API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Environment name; selects the `config.<env>.toml` overlay.
  #[arg(short, long = "env", default_value = "development")]
  environment: String,

  /// Task to run.
  #[arg(short, long, value_enum, default_value_t = Task::Server)]
  task: Task,

  /// Skip the confirmation prompt for destructive tasks.
  #[arg(long)]
  yes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config, &cli.environment)?;
  tracing::info!(environment = %cli.environment, task = ?cli.task, "starting");

  let store = open_store(&server_cfg).await?;

  match cli.task {
    Task::Server => serve(store, &server_cfg).await,
    Task::DbCreate => {
      store
        .ensure_schema()
        .await
        .context("failed to create database")?;
      tracing::info!("database tables created");
      Ok(())
    }
    Task::DbDrop => {
      if !confirm(cli.yes, "Are you sure you want to drop all tables? (yes/no): ")? {
        tracing::info!("operation cancelled");
        return Ok(());
      }
      store.drop_schema().await.context("failed to drop database")?;
      tracing::info!("database tables dropped");
      Ok(())
    }
    Task::DbClear => {
      if !confirm(cli.yes, "Are you sure you want to delete every datapoint? (yes/no): ")? {
        tracing::info!("operation cancelled");
        return Ok(());
      }
      let deleted = store.delete_all().await.context("failed to clear datapoints")?;
      tracing::info!(deleted, "datapoints deleted");
      Ok(())
    }
  }
}

async fn serve(
  store: bubble_store_sqlite::SqliteStore,
  server_cfg: &ServerConfig,
) -> anyhow::Result<()> {
  // A schema mismatch must stop us before the listener is bound.
  store
    .ensure_schema()
    .await
    .context("schema check failed; refusing to serve")?;

  let app = if server_cfg.cache.enabled {
    tracing::info!(
      ttl_secs = server_cfg.cache.ttl_secs,
      max_entries = server_cfg.cache.max_entries,
      "read-through cache enabled"
    );
    router(Arc::new(CachedStore::new(store, server_cfg.cache_config())))
  } else {
    router(Arc::new(store))
  };

  let address = server_cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  tracing::info!("server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}

/// Ask for a literal `yes` on stdin unless `assume_yes` is set.
fn confirm(assume_yes: bool, prompt: &str) -> anyhow::Result<bool> {
  use std::io::{self, BufRead, Write};
  if assume_yes {
    return Ok(true);
  }
  print!("{prompt}");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim() == "yes")
}
