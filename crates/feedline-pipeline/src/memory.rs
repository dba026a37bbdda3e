//! An in-memory [`TimelineStore`], the process-local counterpart of a keyed
//! list store such as Redis.

use std::{
  collections::{HashMap, VecDeque},
  sync::{Mutex, MutexGuard},
};

use feedline_core::{post::UserId, store::TimelineStore, timeline::TimelineEntry};

use crate::error::MemoryError;

/// Timelines held in a single map behind one lock. Every prepend-and-trim
/// happens entirely under that lock.
#[derive(Default)]
pub struct MemoryTimelineStore {
  timelines: Mutex<HashMap<UserId, VecDeque<TimelineEntry>>>,
}

impl MemoryTimelineStore {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, HashMap<UserId, VecDeque<TimelineEntry>>> {
    self.timelines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Number of timelines holding at least one entry.
  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.lock().is_empty() }
}

impl TimelineStore for MemoryTimelineStore {
  type Error = MemoryError;

  async fn prepend_and_trim(
    &self,
    key: UserId,
    entry: TimelineEntry,
    capacity: usize,
  ) -> Result<(), MemoryError> {
    let mut timelines = self.lock();
    let timeline = timelines.entry(key).or_default();
    timeline.push_front(entry);
    timeline.truncate(capacity);
    if timeline.is_empty() {
      timelines.remove(&key);
    }
    Ok(())
  }

  async fn range(
    &self,
    key: UserId,
    start: usize,
    stop: usize,
  ) -> Result<Vec<TimelineEntry>, MemoryError> {
    if stop < start {
      return Ok(Vec::new());
    }
    let len = stop.saturating_sub(start).saturating_add(1);
    let timelines = self.lock();
    Ok(
      timelines
        .get(&key)
        .map(|t| t.iter().skip(start).take(len).cloned().collect())
        .unwrap_or_default(),
    )
  }
}
