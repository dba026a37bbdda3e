//! JSON REST API for Feedline.
//!
//! Exposes an axum [`Router`] over a post store with a follow graph, an event
//! publisher and a timeline store. Fan-out itself runs elsewhere; creating a
//! post here only persists it and emits its event.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = feedline_api::api_router(state).layer(TraceLayer::new_for_http());
//! ```

pub mod error;
pub mod feeds;
pub mod graph;
pub mod posts;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use feedline_core::store::{EventPublisher, FollowGraph, PostStore, TimelineStore};
use feedline_pipeline::{PostIngestor, TimelineReader};
use serde::Serialize;

pub use error::ApiError;

/// The store the API reads posts and the follow graph from.
pub trait ApiStore: PostStore + FollowGraph + 'static {}

impl<S: PostStore + FollowGraph + 'static> ApiStore for S {}

/// `{"data": ...}` response envelope.
#[derive(Debug, Serialize)]
pub struct Data<T> {
  pub data: T,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, E, T> {
  pub store:    Arc<S>,
  pub ingestor: PostIngestor<S, E>,
  pub reader:   TimelineReader<T>,
}

impl<S, E, T> Clone for AppState<S, E, T> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      ingestor: self.ingestor.clone(),
      reader:   self.reader.clone(),
    }
  }
}

impl<S, E, T> AppState<S, E, T>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  pub fn new(store: Arc<S>, events: Arc<E>, timelines: Arc<T>) -> Self {
    Self {
      ingestor: PostIngestor::new(store.clone(), events),
      reader:   TimelineReader::new(timelines),
      store,
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, E, T>(state: AppState<S, E, T>) -> Router<()>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  Router::new()
    // Posts
    .route("/posts", post(posts::create::<S, E, T>))
    .route("/posts/{id}", get(posts::get_one::<S, E, T>))
    // Follow graph
    .route("/users", post(graph::add_user::<S, E, T>))
    .route("/follows", post(graph::follow::<S, E, T>))
    .route("/follows/{follower_id}/{followee_id}", delete(graph::unfollow::<S, E, T>))
    .route("/followers/{user_id}", get(graph::followers::<S, E, T>))
    .route("/following/{user_id}", get(graph::following::<S, E, T>))
    .route(
      "/is-following/{follower_id}/{followee_id}",
      get(graph::is_following::<S, E, T>),
    )
    // Timelines
    .route("/feeds/{user_id}", get(feeds::get_feed::<S, E, T>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
