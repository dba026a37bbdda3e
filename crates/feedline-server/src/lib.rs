//! Process wiring for the Feedline server: configuration, the HTTP router and
//! the fan-out worker running beside it.

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use feedline_api::AppState;
use feedline_core::{graph::GraphLayout, store::TimelineStore};
use feedline_pipeline::{FanoutConfig, FanoutStatsSnapshot, FanoutWorker};
use feedline_store_sqlite::{SqliteStore, StoreOptions};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::watch};
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Where follower timelines live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineBackend {
  /// In the SQLite store, next to posts and the graph.
  #[default]
  Sqlite,
  /// In process memory; lost on restart.
  Memory,
}

/// Runtime server configuration, deserialised from `config.toml` and
/// `FEEDLINE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  pub graph_layout:     GraphLayout,
  pub timeline_backend: TimelineBackend,
  /// Deliveries of one event before it is dead-lettered.
  pub max_deliveries:   u32,
  /// How often an idle fan-out consumer polls the event log.
  pub poll_interval_ms: u64,
  /// An unsettled delivery is handed out again after this long.
  pub lease_timeout_ms: u64,
  pub fanout:           FanoutConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let store = StoreOptions::default();
    Self {
      host:             "127.0.0.1".to_string(),
      port:             8080,
      store_path:       PathBuf::from("feedline.db"),
      graph_layout:     store.layout,
      timeline_backend: TimelineBackend::default(),
      max_deliveries:   store.max_deliveries,
      poll_interval_ms: u64::try_from(store.poll_interval.as_millis()).unwrap_or(50),
      lease_timeout_ms: u64::try_from(store.lease_timeout.as_millis()).unwrap_or(30_000),
      fanout:           FanoutConfig::default(),
    }
  }
}

impl ServerConfig {
  pub fn store_options(&self) -> StoreOptions {
    StoreOptions {
      layout:         self.graph_layout,
      max_deliveries: self.max_deliveries,
      poll_interval:  Duration::from_millis(self.poll_interval_ms),
      lease_timeout:  Duration::from_millis(self.lease_timeout_ms),
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// The HTTP application: the JSON API over `store` and `timelines`, with
/// request tracing. The store doubles as the durable event log.
pub fn router<T: TimelineStore + 'static>(store: Arc<SqliteStore>, timelines: Arc<T>) -> Router {
  let state = AppState::new(store.clone(), store, timelines);
  feedline_api::api_router(state).layer(TraceLayer::new_for_http())
}

/// Serve HTTP on `listener` and fan out events until `shutdown` resolves.
///
/// On shutdown the server stops accepting requests first, then the event log
/// is closed and the fan-out worker drains what is already queued. Returns
/// the worker's final counters.
pub async fn serve<T>(
  config: &ServerConfig,
  store: Arc<SqliteStore>,
  timelines: Arc<T>,
  listener: TcpListener,
  shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<FanoutStatsSnapshot>
where
  T: TimelineStore + 'static,
{
  let worker = FanoutWorker::new(
    store.clone(),
    timelines.clone(),
    store.clone(),
    config.fanout.clone(),
  );

  let (stop, stopped) = watch::channel(false);
  let fanout = {
    let worker = worker.clone();
    tokio::spawn(async move { worker.run(stopped).await })
  };

  let served = axum::serve(listener, router(store, timelines))
    .with_graceful_shutdown(shutdown)
    .await;

  // The worker may already be gone, in which case nobody is listening.
  stop.send(true).ok();
  if let Err(e) = fanout.await {
    tracing::error!(error = %e, "fan-out task failed");
  }

  served?;
  Ok(worker.stats().snapshot())
}
