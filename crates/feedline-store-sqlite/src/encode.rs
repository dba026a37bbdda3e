//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Timeline entries use their
//! `post_id|media_ref|created_at` text form; events are stored as JSON.

use chrono::{DateTime, Utc};
use feedline_core::{
  post::{Post, PostCreatedEvent},
  timeline::TimelineEntry,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Timeline entries ────────────────────────────────────────────────────────

pub fn encode_entry(entry: &TimelineEntry) -> String { entry.to_string() }

pub fn decode_entry(s: &str) -> Result<TimelineEntry> { Ok(s.parse::<TimelineEntry>()?) }

// ─── Events ──────────────────────────────────────────────────────────────────

pub fn encode_event(event: &PostCreatedEvent) -> Result<String> {
  Ok(serde_json::to_string(event)?)
}

pub fn decode_event(s: &str) -> Result<PostCreatedEvent> { Ok(serde_json::from_str(s)?) }

/// Lifecycle state of a row in `post_events`.
pub mod event_state {
  pub const PENDING: &str = "pending";
  pub const LEASED: &str = "leased";
  pub const DEAD: &str = "dead";
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `posts` row.
pub struct RawPost {
  pub post_id:    i64,
  pub author_id:  i64,
  pub media_ref:  String,
  pub created_at: String,
}

impl RawPost {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      post_id:    row.get(0)?,
      author_id:  row.get(1)?,
      media_ref:  row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_post(self) -> Result<Post> {
    Ok(Post {
      id:         self.post_id,
      author_id:  self.author_id,
      media_ref:  self.media_ref,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
