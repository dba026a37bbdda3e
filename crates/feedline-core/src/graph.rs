//! The follow graph's data model.
//!
//! A follow edge is directed: `follower_id` follows `followee_id`. Two
//! physical layouts satisfy the same query contract; see [`GraphLayout`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::post::UserId;

/// A directed, timestamped follow relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
  pub follower_id: UserId,
  pub followee_id: UserId,
  pub created_at:  DateTime<Utc>,
}

/// Direction label of one row in the symmetric layout.
///
/// A logical edge `A → B` is stored as `(A, FOLLOWS, B)` and
/// `(B, IS_FOLLOWED_BY, A)`, both carrying the same timestamp.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeDirection {
  Follows,
  IsFollowedBy,
}

/// Physical layout used to store follow edges.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GraphLayout {
  /// One row per edge, filtered by direction at query time.
  Naive,
  /// Two rows per edge keyed by `(subject, direction)`, so both directions
  /// are index seeks.
  #[default]
  Symmetric,
}
