//! Asynchronous fan-out of post-created events into follower timelines.
//!
//! A [`FanoutWorker`] runs a fixed number of consumer loops against an
//! [`EventConsumer`]. For each delivery it looks up the author's followers
//! and prepends a [`TimelineEntry`] to every follower's timeline. Follower
//! writes run concurrently but draw from one semaphore shared by all
//! consumers; when every permit is taken the consumers stop pulling events
//! until writes complete.
//!
//! Failure handling per delivery:
//!
//! - A failed or timed-out follower write is logged and counted; the other
//!   followers are unaffected.
//! - A retryable follower-lookup failure is retried in place with backoff.
//!   When the retries run out the delivery is negatively acknowledged and the
//!   channel redelivers it later.
//! - An author unknown to the graph has nobody to deliver to, so the event is
//!   acknowledged with a warning.
//! - Whether partial success is acknowledged depends on [`AckPolicy`].
//!
//! Redelivery can prepend the same post twice to a follower's timeline. That
//! is accepted; entries are not deduplicated.

use std::{
  collections::HashSet,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use feedline_core::{
  Classify, ErrorKind, TIMELINE_CAPACITY,
  event::{Delivery, NackOutcome},
  post::UserId,
  store::{EventConsumer, SocialGraph, TimelineStore},
  timeline::TimelineEntry,
};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::{Semaphore, watch},
  task::JoinSet,
};

use crate::error::FanoutError;

/// Pause after a failed `receive` before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ─── Configuration ───────────────────────────────────────────────────────────

/// When a delivery is acknowledged after its follower writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
  /// Acknowledge once every write was attempted, even if some failed.
  #[default]
  AfterBestEffort,
  /// Hand the event back for redelivery if any write failed.
  RequireAllWrites,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
  /// Concurrent consumer loops.
  pub workers:                usize,
  /// Follower writes in flight across all consumers.
  pub max_outstanding_writes: usize,
  /// Deadline for a single graph query or timeline write.
  pub call_timeout_ms:        u64,
  /// Follower-lookup attempts per delivery, including the first.
  pub graph_retry_attempts:   u32,
  /// Delay before the first lookup retry; doubles on each further retry.
  pub graph_retry_backoff_ms: u64,
  pub ack_policy:             AckPolicy,
}

impl Default for FanoutConfig {
  fn default() -> Self {
    Self {
      workers:                4,
      max_outstanding_writes: 64,
      call_timeout_ms:        2_000,
      graph_retry_attempts:   3,
      graph_retry_backoff_ms: 100,
      ack_policy:             AckPolicy::default(),
    }
  }
}

impl FanoutConfig {
  pub fn call_timeout(&self) -> Duration { Duration::from_millis(self.call_timeout_ms) }

  pub fn graph_retry_backoff(&self) -> Duration {
    Duration::from_millis(self.graph_retry_backoff_ms)
  }
}

// ─── Reporting ───────────────────────────────────────────────────────────────

/// What happened to one event's follower writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
  /// Followers whose timeline received the entry.
  pub delivered: usize,
  /// Followers whose write failed or timed out, in ascending id order.
  pub failed:    Vec<UserId>,
}

/// Cumulative counters for a worker and all of its clones.
#[derive(Debug, Default)]
pub struct FanoutStats {
  events_processed:     AtomicU64,
  events_acked:         AtomicU64,
  events_nacked:        AtomicU64,
  events_dead_lettered: AtomicU64,
  writes_ok:            AtomicU64,
  writes_failed:        AtomicU64,
}

/// A point-in-time copy of [`FanoutStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutStatsSnapshot {
  pub events_processed:     u64,
  pub events_acked:         u64,
  pub events_nacked:        u64,
  pub events_dead_lettered: u64,
  pub writes_ok:            u64,
  pub writes_failed:        u64,
}

impl FanoutStats {
  pub fn snapshot(&self) -> FanoutStatsSnapshot {
    FanoutStatsSnapshot {
      events_processed:     self.events_processed.load(Ordering::Relaxed),
      events_acked:         self.events_acked.load(Ordering::Relaxed),
      events_nacked:        self.events_nacked.load(Ordering::Relaxed),
      events_dead_lettered: self.events_dead_lettered.load(Ordering::Relaxed),
      writes_ok:            self.writes_ok.load(Ordering::Relaxed),
      writes_failed:        self.writes_failed.load(Ordering::Relaxed),
    }
  }

  fn bump(counter: &AtomicU64, by: u64) { counter.fetch_add(by, Ordering::Relaxed); }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

pub struct FanoutWorker<G, T, C> {
  graph:     Arc<G>,
  timelines: Arc<T>,
  consumer:  Arc<C>,
  config:    Arc<FanoutConfig>,
  permits:   Arc<Semaphore>,
  stats:     Arc<FanoutStats>,
}

impl<G, T, C> Clone for FanoutWorker<G, T, C> {
  fn clone(&self) -> Self {
    Self {
      graph:     self.graph.clone(),
      timelines: self.timelines.clone(),
      consumer:  self.consumer.clone(),
      config:    self.config.clone(),
      permits:   self.permits.clone(),
      stats:     self.stats.clone(),
    }
  }
}

impl<G, T, C> FanoutWorker<G, T, C>
where
  G: SocialGraph + 'static,
  T: TimelineStore + 'static,
  C: EventConsumer + 'static,
{
  pub fn new(graph: Arc<G>, timelines: Arc<T>, consumer: Arc<C>, config: FanoutConfig) -> Self {
    let permits = Arc::new(Semaphore::new(config.max_outstanding_writes.max(1)));
    Self {
      graph,
      timelines,
      consumer,
      config: Arc::new(config),
      permits,
      stats: Arc::new(FanoutStats::default()),
    }
  }

  pub fn config(&self) -> &FanoutConfig { &self.config }

  pub fn stats(&self) -> Arc<FanoutStats> { self.stats.clone() }

  /// Run the consumer loops until the channel is closed and drained.
  ///
  /// Setting `shutdown` to `true` closes the channel: events already
  /// published are still processed, then the loops exit.
  pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
    let workers = self.config.workers.max(1);
    tracing::info!(
      workers,
      max_outstanding_writes = self.config.max_outstanding_writes,
      ack_policy = ?self.config.ack_policy,
      "fan-out worker started"
    );

    let mut consumers = JoinSet::new();
    for consumer_no in 0..workers {
      let worker = self.clone();
      consumers.spawn(async move { worker.consume(consumer_no).await });
    }

    let consumer = self.consumer.clone();
    let closer = tokio::spawn(async move {
      if shutdown.wait_for(|stop| *stop).await.is_ok() {
        tracing::info!("shutdown requested; draining event channel");
        consumer.close();
      }
    });

    while let Some(joined) = consumers.join_next().await {
      if let Err(e) = joined {
        tracing::error!(error = %e, "fan-out consumer task failed");
      }
    }
    closer.abort();

    tracing::info!(stats = ?self.stats.snapshot(), "fan-out worker stopped");
  }

  async fn consume(&self, consumer_no: usize) {
    loop {
      match self.consumer.receive().await {
        Ok(Some(delivery)) => {
          if let Err(e) = self.handle(delivery).await {
            tracing::error!(consumer_no, error = %e, "failed to settle delivery");
          }
        }
        Ok(None) => {
          tracing::debug!(consumer_no, "event channel drained");
          return;
        }
        Err(e) => {
          tracing::error!(consumer_no, error = %e, "failed to receive event");
          tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
        }
      }
    }
  }

  /// Fan out one delivery, then acknowledge or negatively acknowledge it.
  ///
  /// Only a failure to settle the delivery with the channel is returned.
  pub async fn handle(&self, delivery: Delivery) -> Result<(), C::Error> {
    let event = &delivery.event;

    let ack = match self.process(&delivery).await {
      Ok(report) if report.failed.is_empty() => {
        tracing::debug!(
          post_id = event.post_id,
          author_id = event.author_id,
          delivered = report.delivered,
          "fan-out complete"
        );
        true
      }
      Ok(report) => {
        tracing::warn!(
          post_id = event.post_id,
          author_id = event.author_id,
          delivered = report.delivered,
          failed = report.failed.len(),
          ack_policy = ?self.config.ack_policy,
          "fan-out finished with failed writes"
        );
        self.config.ack_policy == AckPolicy::AfterBestEffort
      }
      Err(e @ FanoutError::AuthorNotFound(_)) => {
        tracing::warn!(post_id = event.post_id, error = %e, "nobody to deliver to");
        true
      }
      Err(e) if e.is_retryable() => {
        tracing::warn!(
          post_id = event.post_id,
          attempt = delivery.attempt,
          error = %e,
          "fan-out failed; returning event for redelivery"
        );
        false
      }
      Err(e) => {
        tracing::error!(post_id = event.post_id, error = %e, "fan-out rejected; dropping event");
        true
      }
    };

    if ack {
      self.consumer.ack(delivery.id).await?;
      FanoutStats::bump(&self.stats.events_acked, 1);
    } else {
      let outcome = self.consumer.nack(delivery.id).await?;
      FanoutStats::bump(&self.stats.events_nacked, 1);
      if outcome == NackOutcome::DeadLettered {
        FanoutStats::bump(&self.stats.events_dead_lettered, 1);
      }
    }
    Ok(())
  }

  /// Write one delivery's entry into every follower's timeline.
  ///
  /// Does not settle the delivery with the channel; see [`Self::handle`].
  pub async fn process(&self, delivery: &Delivery) -> Result<FanoutReport, FanoutError> {
    FanoutStats::bump(&self.stats.events_processed, 1);

    let event     = &delivery.event;
    let followers = self.lookup_followers(event.author_id).await?;
    let entry     = TimelineEntry::from(event);
    let timeout   = self.config.call_timeout();

    let mut report  = FanoutReport::default();
    let mut pending = HashSet::with_capacity(followers.len());
    let mut writes  = JoinSet::new();

    for follower_id in followers {
      let Ok(permit) = self.permits.clone().acquire_owned().await else {
        report.failed.push(follower_id);
        continue;
      };
      let timelines = self.timelines.clone();
      let entry     = entry.clone();
      pending.insert(follower_id);

      writes.spawn(async move {
        let _permit = permit;
        let write = timelines.prepend_and_trim(follower_id, entry, TIMELINE_CAPACITY);
        let outcome = match tokio::time::timeout(timeout, write).await {
          Ok(Ok(())) => Ok(()),
          Ok(Err(e)) => Err(e.to_string()),
          Err(_) => Err(format!("timed out after {timeout:?}")),
        };
        (follower_id, outcome)
      });
    }

    while let Some(joined) = writes.join_next().await {
      match joined {
        Ok((follower_id, Ok(()))) => {
          pending.remove(&follower_id);
          report.delivered += 1;
        }
        Ok((follower_id, Err(reason))) => {
          pending.remove(&follower_id);
          tracing::warn!(
            post_id = event.post_id,
            follower_id,
            error = %reason,
            "timeline write failed"
          );
          report.failed.push(follower_id);
        }
        Err(e) => tracing::error!(post_id = event.post_id, error = %e, "timeline write task died"),
      }
    }
    // Whatever is left belongs to tasks that died without reporting.
    report.failed.extend(pending);
    report.failed.sort_unstable();

    FanoutStats::bump(&self.stats.writes_ok, report.delivered as u64);
    FanoutStats::bump(&self.stats.writes_failed, report.failed.len() as u64);
    Ok(report)
  }

  async fn lookup_followers(&self, author_id: UserId) -> Result<Vec<UserId>, FanoutError> {
    let attempts    = self.config.graph_retry_attempts.max(1);
    let timeout     = self.config.call_timeout();
    let mut backoff = self.config.graph_retry_backoff();
    let mut reason  = String::new();

    for attempt in 1..=attempts {
      match tokio::time::timeout(timeout, self.graph.followers(author_id)).await {
        Ok(Ok(ids)) => return Ok(ids),
        Ok(Err(e)) => match e.kind() {
          ErrorKind::NotFound => return Err(FanoutError::AuthorNotFound(author_id)),
          kind if !kind.is_retryable() => {
            return Err(FanoutError::Rejected { author_id, reason: e.to_string() });
          }
          _ => reason = e.to_string(),
        },
        Err(_) => reason = format!("timed out after {timeout:?}"),
      }

      if attempt < attempts {
        tracing::debug!(author_id, attempt, error = %reason, "follower lookup failed; retrying");
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
      }
    }

    Err(FanoutError::FollowerLookup { author_id, attempts, reason })
  }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::{HashMap, VecDeque},
    sync::{
      Mutex,
      atomic::{AtomicU32, AtomicUsize},
    },
  };

  use chrono::Utc;
  use feedline_core::{
    graph::GraphLayout,
    post::{NewPost, PostCreatedEvent},
    store::{EventPublisher, FollowGraph},
  };
  use feedline_store_sqlite::{SqliteStore, StoreOptions};

  use super::*;
  use crate::{
    channel::MemoryChannel, ingest::PostIngestor, memory::MemoryTimelineStore,
    reader::TimelineReader,
  };

  #[derive(Debug, thiserror::Error)]
  #[error("{0:?} failure")]
  struct TestError(ErrorKind);

  impl Classify for TestError {
    fn kind(&self) -> ErrorKind { self.0 }
  }

  /// A fixed follower map that can be told to fail its next lookups.
  #[derive(Default)]
  struct StaticGraph {
    followers: HashMap<UserId, Vec<UserId>>,
    failures:  Mutex<VecDeque<ErrorKind>>,
    calls:     AtomicU32,
  }

  impl StaticGraph {
    fn with(author_id: UserId, followers: impl IntoIterator<Item = UserId>) -> Self {
      let mut graph = Self::default();
      graph.followers.insert(author_id, followers.into_iter().collect());
      graph
    }

    fn failing(self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
      self.failures.lock().unwrap().extend(kinds);
      self
    }
  }

  impl SocialGraph for StaticGraph {
    type Error = TestError;

    async fn followers(&self, user_id: UserId) -> Result<Vec<UserId>, TestError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let failure = self.failures.lock().unwrap().pop_front();
      if let Some(kind) = failure {
        return Err(TestError(kind));
      }
      self.followers.get(&user_id).cloned().ok_or(TestError(ErrorKind::NotFound))
    }

    async fn following(&self, _user_id: UserId) -> Result<Vec<UserId>, TestError> {
      Ok(Vec::new())
    }

    async fn is_following(&self, a: UserId, b: UserId) -> Result<bool, TestError> {
      Ok(self.followers.get(&b).is_some_and(|f| f.contains(&a)))
    }
  }

  /// Timelines that fail or hang for chosen keys and record peak concurrency.
  #[derive(Default)]
  struct ProbedTimelines {
    inner:     MemoryTimelineStore,
    failing:   HashSet<UserId>,
    hanging:   HashSet<UserId>,
    delay:     Duration,
    in_flight: AtomicUsize,
    peak:      AtomicUsize,
  }

  impl TimelineStore for ProbedTimelines {
    type Error = TestError;

    async fn prepend_and_trim(
      &self,
      key: UserId,
      entry: TimelineEntry,
      capacity: usize,
    ) -> Result<(), TestError> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      if self.hanging.contains(&key) {
        std::future::pending::<()>().await;
      }
      tokio::time::sleep(self.delay).await;
      self.in_flight.fetch_sub(1, Ordering::SeqCst);

      if self.failing.contains(&key) {
        return Err(TestError(ErrorKind::Store));
      }
      self
        .inner
        .prepend_and_trim(key, entry, capacity)
        .await
        .map_err(|_| TestError(ErrorKind::Store))
    }

    async fn range(
      &self,
      key: UserId,
      start: usize,
      stop: usize,
    ) -> Result<Vec<TimelineEntry>, TestError> {
      self.inner.range(key, start, stop).await.map_err(|_| TestError(ErrorKind::Store))
    }
  }

  fn event(author_id: UserId, post_id: i64) -> PostCreatedEvent {
    PostCreatedEvent {
      author_id,
      post_id,
      media_ref: format!("img{post_id}"),
      created_at: Utc::now(),
    }
  }

  fn fast_config() -> FanoutConfig {
    FanoutConfig {
      call_timeout_ms: 500,
      graph_retry_backoff_ms: 1,
      ..FanoutConfig::default()
    }
  }

  async fn timeline_of<T: TimelineStore>(store: &T, user_id: UserId) -> Vec<i64> {
    let entries = store.range(user_id, 0, TIMELINE_CAPACITY - 1).await.unwrap();
    entries.into_iter().map(|e| e.post_id).collect()
  }

  struct Harness<G> {
    worker:    FanoutWorker<G, ProbedTimelines, MemoryChannel>,
    timelines: Arc<ProbedTimelines>,
    channel:   Arc<MemoryChannel>,
  }

  fn harness<G: SocialGraph + 'static>(
    graph: G,
    timelines: ProbedTimelines,
    config: FanoutConfig,
  ) -> Harness<G> {
    let timelines = Arc::new(timelines);
    let channel   = Arc::new(MemoryChannel::new(4, 2));
    let worker    = FanoutWorker::new(Arc::new(graph), timelines.clone(), channel.clone(), config);
    Harness { worker, timelines, channel }
  }

  // ─── process ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn failed_write_does_not_block_other_followers() {
    let timelines = ProbedTimelines { failing: HashSet::from([3]), ..Default::default() };
    let h = harness(StaticGraph::with(1, [2, 3, 4]), timelines, fast_config());

    h.channel.publish(event(1, 10)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    let report = h.worker.process(&delivery).await.unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, vec![3]);
    assert_eq!(timeline_of(&*h.timelines, 2).await, vec![10]);
    assert_eq!(timeline_of(&*h.timelines, 4).await, vec![10]);
    assert!(timeline_of(&*h.timelines, 3).await.is_empty());
  }

  #[tokio::test]
  async fn timed_out_write_counts_as_failed() {
    let timelines = ProbedTimelines { hanging: HashSet::from([3]), ..Default::default() };
    let config = FanoutConfig { call_timeout_ms: 20, ..fast_config() };
    let h = harness(StaticGraph::with(1, [2, 3]), timelines, config);

    h.channel.publish(event(1, 10)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    let report = h.worker.process(&delivery).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, vec![3]);
    assert_eq!(h.worker.stats().snapshot().writes_failed, 1);
  }

  #[tokio::test]
  async fn outstanding_writes_are_bounded() {
    let timelines = ProbedTimelines { delay: Duration::from_millis(5), ..Default::default() };
    let config = FanoutConfig { max_outstanding_writes: 3, ..fast_config() };
    let h = harness(StaticGraph::with(1, 2..=41), timelines, config);

    h.channel.publish(event(1, 10)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    let report = h.worker.process(&delivery).await.unwrap();

    assert_eq!(report.delivered, 40);
    assert!(h.timelines.peak.load(Ordering::SeqCst) <= 3);
  }

  #[tokio::test]
  async fn retryable_lookup_failure_is_retried_in_place() {
    let graph = StaticGraph::with(1, [2]).failing([ErrorKind::Store]);
    let h = harness(graph, ProbedTimelines::default(), fast_config());

    h.channel.publish(event(1, 10)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    let report = h.worker.process(&delivery).await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(h.worker.graph.calls.load(Ordering::SeqCst), 2);
  }

  // ─── handle ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn best_effort_acks_despite_failed_writes() {
    let timelines = ProbedTimelines { failing: HashSet::from([3]), ..Default::default() };
    let h = harness(StaticGraph::with(1, [2, 3]), timelines, fast_config());

    h.channel.publish(event(1, 10)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    h.worker.handle(delivery).await.unwrap();

    assert_eq!(h.channel.backlog(), 0);
    let stats = h.worker.stats().snapshot();
    assert_eq!(stats.events_acked, 1);
    assert_eq!(stats.writes_ok, 1);
    assert_eq!(stats.writes_failed, 1);
  }

  #[tokio::test]
  async fn require_all_writes_redelivers_and_duplicates() {
    let timelines = ProbedTimelines { failing: HashSet::from([3]), ..Default::default() };
    let config = FanoutConfig { ack_policy: AckPolicy::RequireAllWrites, ..fast_config() };
    let h = harness(StaticGraph::with(1, [2, 3]), timelines, config);

    h.channel.publish(event(1, 10)).await.unwrap();
    let first = h.channel.receive().await.unwrap().unwrap();
    h.worker.handle(first).await.unwrap();
    assert_eq!(h.channel.backlog(), 1);

    let second = h.channel.receive().await.unwrap().unwrap();
    assert_eq!(second.attempt, 2);
    h.worker.handle(second).await.unwrap();

    // Budget of two deliveries is spent.
    assert_eq!(h.channel.backlog(), 0);
    assert_eq!(h.channel.dead_letters().len(), 1);

    // The follower that succeeded both times holds the post twice.
    let entries = timeline_of(&*h.timelines, 2).await;
    assert_eq!(entries, vec![10, 10]);
    assert!(entries.len() <= TIMELINE_CAPACITY);

    let stats = h.worker.stats().snapshot();
    assert_eq!(stats.events_nacked, 2);
    assert_eq!(stats.events_dead_lettered, 1);
  }

  #[tokio::test]
  async fn unknown_author_is_acknowledged() {
    let h = harness(StaticGraph::default(), ProbedTimelines::default(), fast_config());

    h.channel.publish(event(9, 90)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    assert!(matches!(
      h.worker.process(&delivery).await,
      Err(FanoutError::AuthorNotFound(9))
    ));
    h.worker.handle(delivery).await.unwrap();

    assert_eq!(h.channel.backlog(), 0);
    assert_eq!(h.worker.stats().snapshot().events_acked, 1);
  }

  #[tokio::test]
  async fn exhausted_lookup_retries_redeliver() {
    let graph = StaticGraph::with(1, [2]).failing([ErrorKind::Transient; 2]);
    let config = FanoutConfig { graph_retry_attempts: 2, ..fast_config() };
    let h = harness(graph, ProbedTimelines::default(), config);

    h.channel.publish(event(1, 10)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    h.worker.handle(delivery).await.unwrap();
    assert_eq!(h.worker.stats().snapshot().events_nacked, 1);

    // The graph has recovered by the time the event comes back.
    let again = h.channel.receive().await.unwrap().unwrap();
    assert_eq!(again.event.post_id, 10);
    h.worker.handle(again).await.unwrap();

    assert_eq!(timeline_of(&*h.timelines, 2).await, vec![10]);
    assert_eq!(h.channel.backlog(), 0);
  }

  #[tokio::test]
  async fn non_retryable_lookup_failure_drops_the_event() {
    let graph = StaticGraph::with(1, [2]).failing([ErrorKind::Validation]);
    let h = harness(graph, ProbedTimelines::default(), fast_config());

    h.channel.publish(event(1, 10)).await.unwrap();
    let delivery = h.channel.receive().await.unwrap().unwrap();
    h.worker.handle(delivery).await.unwrap();

    assert_eq!(h.worker.graph.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.channel.backlog(), 0);
    assert!(timeline_of(&*h.timelines, 2).await.is_empty());
  }

  // ─── run ───────────────────────────────────────────────────────────────────

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn run_drains_after_shutdown_within_write_bound() {
    let mut graph = StaticGraph::default();
    for author in 1..=4 {
      graph.followers.insert(author, (author * 100..author * 100 + 10).collect());
    }
    let timelines = ProbedTimelines { delay: Duration::from_millis(2), ..Default::default() };
    let config = FanoutConfig { workers: 4, max_outstanding_writes: 3, ..fast_config() };
    let h = harness(graph, timelines, config);

    for author in 1..=4 {
      h.channel.publish(event(author, author * 10)).await.unwrap();
    }
    let (stop, stopped) = watch::channel(false);
    stop.send(true).unwrap();
    h.worker.run(stopped).await;

    assert!(h.timelines.peak.load(Ordering::SeqCst) <= 3);
    for author in 1..=4 {
      for follower in author * 100..author * 100 + 10 {
        assert_eq!(timeline_of(&*h.timelines, follower).await, vec![author * 10]);
      }
    }
    let stats = h.worker.stats().snapshot();
    assert_eq!(stats.events_acked, 4);
    assert_eq!(stats.writes_ok, 40);
  }

  #[tokio::test]
  async fn posts_reach_followers_only() {
    for layout in [GraphLayout::Naive, GraphLayout::Symmetric] {
      let store = Arc::new(
        SqliteStore::open_in_memory(StoreOptions { layout, ..Default::default() })
          .await
          .unwrap(),
      );
      for user in 1..=4 {
        store.add_user(user).await.unwrap();
      }
      store.follow(2, 1).await.unwrap();
      store.follow(3, 1).await.unwrap();

      let channel   = Arc::new(MemoryChannel::new(4, 3));
      let timelines = Arc::new(MemoryTimelineStore::new());
      let ingestor  = PostIngestor::new(store.clone(), channel.clone());
      let worker = FanoutWorker::new(store.clone(), timelines.clone(), channel.clone(), fast_config());

      let created = ingestor.create_post(NewPost::new(1, "img1")).await.unwrap();
      channel.close();
      let (_stop, stopped) = watch::channel(false);
      worker.run(stopped).await;

      let reader = TimelineReader::new(timelines.clone());
      for follower in [2, 3] {
        let feed = reader.get_timeline(follower).await.unwrap();
        assert_eq!(feed.len(), 1, "{layout}");
        assert_eq!(feed[0].post_id, created.post.id);
        assert_eq!(feed[0].media_ref, "img1");
      }
      assert!(reader.get_timeline(4).await.unwrap().is_empty());
      assert!(reader.get_timeline(1).await.unwrap().is_empty());
    }
  }

  #[test]
  fn config_fills_defaults() {
    let config: FanoutConfig =
      serde_json::from_str(r#"{ "workers": 2, "ack_policy": "require_all_writes" }"#).unwrap();
    assert_eq!(config.workers, 2);
    assert_eq!(config.ack_policy, AckPolicy::RequireAllWrites);
    assert_eq!(config.max_outstanding_writes, 64);
    assert_eq!(config.call_timeout(), Duration::from_secs(2));
  }
}
