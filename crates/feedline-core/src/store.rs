//! Storage and messaging traits the pipeline is written against.
//!
//! Backends (`feedline-store-sqlite`, the in-memory types in
//! `feedline-pipeline`) implement these; ingestion, fan-out and the HTTP layer
//! depend only on the abstractions. Every store handle is constructed
//! explicitly and passed in, never reached through global state.
//!
//! All methods return `Send` futures so implementations can be driven from
//! spawned tasks on a multi-threaded runtime.

use std::future::Future;

use crate::{
  error::Classify,
  event::{Delivery, DeliveryId, NackOutcome},
  graph::FollowEdge,
  post::{NewPost, Post, PostCreatedEvent, PostId, UserId},
  timeline::TimelineEntry,
};

// ─── Posts ───────────────────────────────────────────────────────────────────

/// Durable storage for posts.
pub trait PostStore: Send + Sync {
  type Error: Classify;

  /// Persist a new post; the store assigns its id and `created_at`.
  fn insert_post(
    &self,
    input: NewPost,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  /// Retrieve a post by id. Returns `None` if not found.
  fn get_post(
    &self,
    id: PostId,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;
}

// ─── Social graph ────────────────────────────────────────────────────────────

/// Read side of the follow graph.
///
/// Reads reflect some consistent prior state; they may race with concurrent
/// follows and unfollows. Every method fails with a
/// [`NotFound`](crate::ErrorKind::NotFound) error when a referenced user does
/// not exist, rather than answering with an empty result.
pub trait SocialGraph: Send + Sync {
  type Error: Classify;

  /// Ids of the users following `user_id`. The order carries no meaning.
  fn followers(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Vec<UserId>, Self::Error>> + Send + '_;

  /// Ids of the users `user_id` follows.
  fn following(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Vec<UserId>, Self::Error>> + Send + '_;

  /// Whether `follower_id` follows `followee_id`. Not symmetric.
  fn is_following(
    &self,
    follower_id: UserId,
    followee_id: UserId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

/// Write side of the follow graph.
pub trait FollowGraph: SocialGraph {
  /// Register a user. Registering an existing user is a no-op.
  fn add_user(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Record that `follower_id` follows `followee_id`.
  ///
  /// Both users must exist. The write is all-or-nothing: a layout that
  /// stores several rows per edge never leaves a partial edge behind.
  fn follow(
    &self,
    follower_id: UserId,
    followee_id: UserId,
  ) -> impl Future<Output = Result<FollowEdge, Self::Error>> + Send + '_;

  /// Remove a follow edge. Returns `false` if it did not exist.
  fn unfollow(
    &self,
    follower_id: UserId,
    followee_id: UserId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Timelines ───────────────────────────────────────────────────────────────

/// A keyed collection of bounded, newest-first entry lists.
pub trait TimelineStore: Send + Sync {
  type Error: Classify;

  /// Insert `entry` at the head of `key`'s list, then keep only the first
  /// `capacity` entries.
  ///
  /// Concurrent calls on the same key are serialized by the store: none is
  /// lost and no reader ever observes more than `capacity` entries.
  fn prepend_and_trim(
    &self,
    key: UserId,
    entry: TimelineEntry,
    capacity: usize,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Entries `start..=stop` of `key`'s list, newest first. An unknown key
  /// yields an empty list.
  fn range(
    &self,
    key: UserId,
    start: usize,
    stop: usize,
  ) -> impl Future<Output = Result<Vec<TimelineEntry>, Self::Error>> + Send + '_;
}

// ─── Event channel ───────────────────────────────────────────────────────────

/// Producer side of the post-created stream.
pub trait EventPublisher: Send + Sync {
  type Error: Classify;

  fn publish(
    &self,
    event: PostCreatedEvent,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

/// Consumer-group side of the post-created stream.
///
/// Delivery is at least once: an event stays owned by the channel until it is
/// acknowledged, and events by the same author are handed out in publish
/// order, one at a time.
pub trait EventConsumer: Send + Sync {
  type Error: Classify;

  /// Wait for the next event. Returns `None` once the channel has been closed
  /// and holds nothing that could still be delivered.
  fn receive(
    &self,
  ) -> impl Future<Output = Result<Option<Delivery>, Self::Error>> + Send + '_;

  /// Mark a delivery as fully processed.
  fn ack(
    &self,
    id: DeliveryId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Hand a delivery back for redelivery, subject to the channel's budget.
  fn nack(
    &self,
    id: DeliveryId,
  ) -> impl Future<Output = Result<NackOutcome, Self::Error>> + Send + '_;

  /// Stop waiting for new events: once everything already published has been
  /// acknowledged or dead-lettered, `receive` returns `None`.
  fn close(&self);
}
