//! Posts and the event announcing their creation.
//!
//! A post is written once by ingestion and never updated. Downstream
//! components only ever hold references to it (`id`, `media_ref`,
//! `created_at`) through [`PostCreatedEvent`] and timeline entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifier of a user. Valid ids are strictly positive.
pub type UserId = i64;

/// Identifier of a post, assigned by the post store.
pub type PostId = i64;

// ─── Post ────────────────────────────────────────────────────────────────────

/// An immutable, persisted post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  pub id:         PostId,
  pub author_id:  UserId,
  /// Opaque reference to the post's media (e.g. an image URL).
  pub media_ref:  String,
  /// Server-assigned timestamp; never changes after creation.
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::PostStore::insert_post`]. The id and timestamp
/// are always assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
  pub author_id: UserId,
  pub media_ref: String,
}

impl NewPost {
  pub fn new(author_id: UserId, media_ref: impl Into<String>) -> Self {
    Self { author_id, media_ref: media_ref.into() }
  }

  /// Reject posts without an author or without media.
  pub fn validate(&self) -> Result<()> {
    if self.author_id <= 0 {
      return Err(Error::Validation(format!(
        "author_id must be a positive id, got {}",
        self.author_id
      )));
    }
    if self.media_ref.trim().is_empty() {
      return Err(Error::Validation("media_ref is required".into()));
    }
    Ok(())
  }
}

// ─── PostCreatedEvent ────────────────────────────────────────────────────────

/// Emitted once per persisted post; consumed at least once by fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreatedEvent {
  pub author_id:  UserId,
  pub post_id:    PostId,
  pub media_ref:  String,
  pub created_at: DateTime<Utc>,
}

impl From<&Post> for PostCreatedEvent {
  fn from(post: &Post) -> Self {
    Self {
      author_id:  post.author_id,
      post_id:    post.id,
      media_ref:  post.media_ref.clone(),
      created_at: post.created_at,
    }
  }
}

impl PostCreatedEvent {
  /// JSON record as carried on the channel.
  pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

  pub fn from_json(s: &str) -> Result<Self> { Ok(serde_json::from_str(s)?) }
}
