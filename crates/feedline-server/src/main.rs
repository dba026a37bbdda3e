//! feedline-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) plus
//! `FEEDLINE_*` environment variables, opens the SQLite store, and serves the
//! JSON API over HTTP while the fan-out worker runs in the same process.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `FEEDLINE_FANOUT__WORKERS=8`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use feedline_pipeline::MemoryTimelineStore;
use feedline_server::{ServerConfig, TimelineBackend};
use feedline_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Feedline timeline server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
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

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("FEEDLINE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path, server_cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  let address = server_cfg.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  tracing::info!(
    graph_layout = %server_cfg.graph_layout,
    timeline_backend = ?server_cfg.timeline_backend,
    "Listening on http://{address}"
  );

  let stats = match server_cfg.timeline_backend {
    TimelineBackend::Sqlite => {
      feedline_server::serve(&server_cfg, store.clone(), store, listener, shutdown_signal()).await
    }
    TimelineBackend::Memory => {
      tracing::warn!("timelines are kept in memory and will not survive a restart");
      let timelines = Arc::new(MemoryTimelineStore::new());
      feedline_server::serve(&server_cfg, store, timelines, listener, shutdown_signal()).await
    }
  }
  .context("server error")?;

  tracing::info!(?stats, "shut down");
  Ok(())
}

/// Resolves on the first Ctrl-C.
async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutdown requested");
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
