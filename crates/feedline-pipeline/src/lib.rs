//! The Feedline fan-out-on-write pipeline.
//!
//! - [`ingest`] persists posts and emits one post-created event per post.
//! - [`fanout`] consumes those events and writes timeline entries for every
//!   follower of the author.
//! - [`reader`] serves a user's timeline straight from the timeline store.
//!
//! Everything is generic over the `feedline-core` store traits. The
//! in-memory [`MemoryChannel`] and [`MemoryTimelineStore`] back tests and
//! single-process deployments.

pub mod channel;
pub mod error;
pub mod fanout;
pub mod ingest;
pub mod memory;
pub mod reader;

pub use channel::MemoryChannel;
pub use error::{FanoutError, IngestError, MemoryError};
pub use fanout::{
  AckPolicy, FanoutConfig, FanoutReport, FanoutStats, FanoutStatsSnapshot, FanoutWorker,
};
pub use ingest::{CreatedPost, PostIngestor};
pub use memory::MemoryTimelineStore;
pub use reader::TimelineReader;
