//! Timeline entries and their persisted text encoding.
//!
//! A timeline is a per-follower list of entries, newest first, never longer
//! than [`TIMELINE_CAPACITY`]. Position records delivery order; entries are
//! never updated and only leave the list by falling off its tail.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error,
  post::{PostCreatedEvent, PostId},
};

/// Hard upper bound on the length of every timeline.
pub const TIMELINE_CAPACITY: usize = 100;

const SEPARATOR: char = '|';

/// A reference to a post inside one follower's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
  pub post_id:    PostId,
  pub media_ref:  String,
  pub created_at: DateTime<Utc>,
}

impl From<&PostCreatedEvent> for TimelineEntry {
  fn from(event: &PostCreatedEvent) -> Self {
    Self {
      post_id:    event.post_id,
      media_ref:  event.media_ref.clone(),
      created_at: event.created_at,
    }
  }
}

/// Encodes as `post_id|media_ref|created_at` with an RFC 3339 timestamp.
impl fmt::Display for TimelineEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}{SEPARATOR}{}{SEPARATOR}{}",
      self.post_id,
      self.media_ref,
      self.created_at.to_rfc3339()
    )
  }
}

/// Decodes the `post_id|media_ref|created_at` form. The media reference may
/// itself contain the separator: the id ends at the first one and the
/// timestamp starts after the last one.
impl FromStr for TimelineEntry {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let malformed = || Error::EntryDecode(s.to_owned());

    let (id, rest) = s.split_once(SEPARATOR).ok_or_else(malformed)?;
    let (media_ref, at) = rest.rsplit_once(SEPARATOR).ok_or_else(malformed)?;

    let post_id = id.parse().map_err(|_| malformed())?;
    let created_at = DateTime::parse_from_rfc3339(at)
      .map_err(|_| malformed())?
      .with_timezone(&Utc);

    Ok(Self { post_id, media_ref: media_ref.to_owned(), created_at })
  }
}
