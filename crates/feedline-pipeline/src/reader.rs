//! The timeline read path.

use std::sync::Arc;

use feedline_core::{TIMELINE_CAPACITY, post::UserId, store::TimelineStore, timeline::TimelineEntry};

/// Serves a user's precomputed timeline. No graph lookup or post query
/// happens at read time.
pub struct TimelineReader<T> {
  timelines: Arc<T>,
}

impl<T> Clone for TimelineReader<T> {
  fn clone(&self) -> Self { Self { timelines: self.timelines.clone() } }
}

impl<T: TimelineStore> TimelineReader<T> {
  pub fn new(timelines: Arc<T>) -> Self { Self { timelines } }

  /// Up to [`TIMELINE_CAPACITY`] entries, newest first. A user whose
  /// timeline was never written gets an empty list.
  pub async fn get_timeline(&self, user_id: UserId) -> Result<Vec<TimelineEntry>, T::Error> {
    self.timelines.range(user_id, 0, TIMELINE_CAPACITY - 1).await
  }
}
