//! Error types for `feedline-core`, plus the classification every backend
//! error exposes so callers can decide between retrying, skipping and
//! surfacing a failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(String),

  #[error("malformed timeline entry: {0:?}")]
  EntryDecode(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// The coarse failure classes shared by every component of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Bad caller input. Never retried.
  Validation,
  /// A referenced entity (user, post, edge) does not exist.
  NotFound,
  /// The write conflicts with existing state (e.g. a duplicate follow).
  Conflict,
  /// Persistence or read failure on the relational or keyed store.
  Store,
  /// Event emission failed.
  Publish,
  /// Timeout or connection failure on an inter-component call.
  Transient,
}

impl ErrorKind {
  /// Whether a failed call of this kind may succeed if simply repeated.
  pub fn is_retryable(self) -> bool {
    matches!(self, Self::Store | Self::Transient | Self::Publish)
  }
}

/// Implemented by every backend error so generic code can route failures
/// without knowing the concrete backend.
pub trait Classify: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Validation(_) => ErrorKind::Validation,
      Error::EntryDecode(_) | Error::Serialization(_) => ErrorKind::Store,
    }
  }
}
