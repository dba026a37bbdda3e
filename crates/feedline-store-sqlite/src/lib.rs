//! SQLite backend for the Feedline pipeline.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] implements the
//! post store, both follow-graph layouts, the timeline store and a durable
//! post-created event log.

mod encode;
mod events;
mod graph;
mod schema;
mod store;
mod timeline;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreOptions};
