//! Error types for `feedline-pipeline`.

use feedline_core::{Classify, ErrorKind, event::DeliveryId, post::UserId};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of the synchronous post-creation path. A failed event emission is
/// not an `IngestError`: the post is already durable, so it is reported on
/// the successful result instead.
#[derive(Debug, Error)]
pub enum IngestError {
  #[error("{0}")]
  Validation(String),

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl Classify for IngestError {
  fn kind(&self) -> ErrorKind {
    match self {
      IngestError::Validation(_) => ErrorKind::Validation,
      IngestError::Store(_) => ErrorKind::Store,
    }
  }
}

/// Why an event could not be fanned out at all.
#[derive(Debug, Error)]
pub enum FanoutError {
  /// The author is unknown to the social graph, so there is nobody to
  /// deliver to.
  #[error("author {0} is unknown to the social graph")]
  AuthorNotFound(UserId),

  /// The follower lookup failed in a way repeating cannot fix.
  #[error("follower lookup for author {author_id} rejected: {reason}")]
  Rejected { author_id: UserId, reason: String },

  /// The follower lookup kept failing or timing out.
  #[error("follower lookup for author {author_id} failed after {attempts} attempts: {reason}")]
  FollowerLookup {
    author_id: UserId,
    attempts:  u32,
    reason:    String,
  },
}

impl FanoutError {
  /// Whether redelivering the event could succeed.
  pub fn is_retryable(&self) -> bool { matches!(self, FanoutError::FollowerLookup { .. }) }
}

impl Classify for FanoutError {
  fn kind(&self) -> ErrorKind {
    match self {
      FanoutError::AuthorNotFound(_) => ErrorKind::NotFound,
      FanoutError::Rejected { .. } => ErrorKind::Validation,
      FanoutError::FollowerLookup { .. } => ErrorKind::Transient,
    }
  }
}

/// Errors raised by the in-memory channel and timeline store.
#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("no in-flight delivery at partition {} offset {}", .0.partition, .0.offset)]
  UnknownDelivery(DeliveryId),

  #[error("channel is closed")]
  Closed,
}

impl Classify for MemoryError {
  fn kind(&self) -> ErrorKind {
    match self {
      MemoryError::UnknownDelivery(_) => ErrorKind::NotFound,
      MemoryError::Closed => ErrorKind::Publish,
    }
  }
}
