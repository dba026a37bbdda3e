//! Error type for `feedline-store-sqlite`.

use feedline_core::{Classify, ErrorKind, event::DeliveryId, post::UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] feedline_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("user not found: {0}")]
  UserNotFound(UserId),

  #[error("user {0} cannot follow themselves")]
  SelfFollow(UserId),

  #[error("user {follower_id} already follows user {followee_id}")]
  AlreadyFollowing {
    follower_id: UserId,
    followee_id: UserId,
  },

  /// Acknowledged an event that is not currently leased.
  #[error("no leased delivery at offset {}", .0.offset)]
  UnknownDelivery(DeliveryId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::Database(_) | Error::Json(_) | Error::DateParse(_) => ErrorKind::Store,
      Error::UserNotFound(_) | Error::UnknownDelivery(_) => ErrorKind::NotFound,
      Error::SelfFollow(_) => ErrorKind::Validation,
      Error::AlreadyFollowing { .. } => ErrorKind::Conflict,
    }
  }
}
