//! [`SqliteStore`]: the SQLite implementation of the Feedline storage traits.
//!
//! One store value backs the post store, the follow graph, the timeline store
//! and the durable event log. The trait impls for the latter three live in
//! sibling modules.

use std::{
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::Utc;
use feedline_core::{
  graph::GraphLayout,
  post::{NewPost, Post, PostId},
  store::PostStore,
};
use rusqlite::OptionalExtension as _;

use crate::{
  Result,
  encode::{RawPost, encode_dt, event_state},
  schema::{MIGRATE_V1_TO_V2, SCHEMA, SCHEMA_VERSION},
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Behaviour switches fixed at open time.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  /// Physical layout used for follow edges.
  pub layout:         GraphLayout,
  /// Deliveries of one event before it is dead-lettered.
  pub max_deliveries: u32,
  /// How long [`receive`](feedline_core::store::EventConsumer::receive)
  /// sleeps between polls of an empty log.
  pub poll_interval:  Duration,
  /// A delivery neither acked nor nacked within this long is handed out
  /// again.
  pub lease_timeout:  Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      layout:         GraphLayout::default(),
      max_deliveries: 5,
      poll_interval:  Duration::from_millis(50),
      lease_timeout:  Duration::from_secs(30),
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Feedline store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All access
/// goes through that one connection, which serializes every call; multi-row
/// writes additionally run inside a transaction.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:    tokio_rusqlite::Connection,
  pub(crate) options: StoreOptions,
  pub(crate) closed:  Arc<AtomicBool>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, options).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory(options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, options).await
  }

  async fn init(conn: tokio_rusqlite::Connection, options: StoreOptions) -> Result<Self> {
    let store = Self { conn, options, closed: Arc::new(AtomicBool::new(false)) };
    store.init_schema().await?;
    store.release_stale_leases().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let previous = self
      .conn
      .call(|conn| {
        let version: i64 =
          conn.query_row("PRAGMA user_version", rusqlite::params![], |r| r.get(0))?;
        if version == 1 {
          conn.execute_batch(MIGRATE_V1_TO_V2)?;
        }
        conn.execute_batch(SCHEMA)?;
        Ok(version)
      })
      .await?;

    if previous != 0 && previous < SCHEMA_VERSION {
      tracing::info!(from = previous, to = SCHEMA_VERSION, "migrated store schema");
    }
    Ok(())
  }

  /// Leases cannot survive a restart: whoever held them is gone, so the
  /// events go back to pending and will be delivered again.
  async fn release_stale_leases(&self) -> Result<()> {
    let released = self
      .conn
      .call(|conn| {
        Ok(conn.execute(
          "UPDATE post_events SET state = ?1, leased_at = NULL WHERE state = ?2",
          rusqlite::params![event_state::PENDING, event_state::LEASED],
        )?)
      })
      .await?;

    if released > 0 {
      tracing::info!(released, "returned stale event leases to pending");
    }
    Ok(())
  }

  /// The follow-edge layout this store was opened with.
  pub fn layout(&self) -> GraphLayout { self.options.layout }

  pub(crate) fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }
}

// ─── PostStore impl ──────────────────────────────────────────────────────────

impl PostStore for SqliteStore {
  type Error = crate::Error;

  async fn insert_post(&self, input: NewPost) -> Result<Post> {
    input.validate()?;

    let created_at = Utc::now();
    let author_id  = input.author_id;
    let media_ref  = input.media_ref.clone();
    let at_str     = encode_dt(created_at);

    let id: PostId = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO posts (author_id, media_ref, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![author_id, media_ref, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Post { id, author_id, media_ref: input.media_ref, created_at })
  }

  async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
    let raw: Option<RawPost> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT post_id, author_id, media_ref, created_at FROM posts WHERE post_id = ?1",
            rusqlite::params![id],
            RawPost::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPost::into_post).transpose()
  }
}
