//! Post ingestion: validate, persist, then announce.

use std::sync::Arc;

use feedline_core::{
  Classify, ErrorKind,
  post::{NewPost, Post, PostCreatedEvent},
  store::{EventPublisher, PostStore},
};

use crate::error::IngestError;

/// The outcome of a successful [`PostIngestor::create_post`].
///
/// The post is durable whenever this is returned. If the post-created event
/// could not be emitted, `publish_error` says why and no follower timeline
/// will receive the post.
#[derive(Debug, Clone)]
pub struct CreatedPost {
  pub post:          Post,
  pub publish_error: Option<String>,
}

/// Accepts new posts on the synchronous request path.
pub struct PostIngestor<P, E> {
  posts:  Arc<P>,
  events: Arc<E>,
}

impl<P, E> Clone for PostIngestor<P, E> {
  fn clone(&self) -> Self { Self { posts: self.posts.clone(), events: self.events.clone() } }
}

impl<P: PostStore, E: EventPublisher> PostIngestor<P, E> {
  pub fn new(posts: Arc<P>, events: Arc<E>) -> Self { Self { posts, events } }

  /// Persist `input` and emit exactly one [`PostCreatedEvent`] for it.
  ///
  /// Nothing is emitted when validation or persistence fails. Fan-out is
  /// never awaited here.
  pub async fn create_post(&self, input: NewPost) -> Result<CreatedPost, IngestError> {
    input
      .validate()
      .map_err(|e| IngestError::Validation(e.to_string()))?;

    let post = self.posts.insert_post(input).await.map_err(|e| match e.kind() {
      ErrorKind::Validation => IngestError::Validation(e.to_string()),
      _ => IngestError::Store(Box::new(e)),
    })?;

    let publish_error = match self.events.publish(PostCreatedEvent::from(&post)).await {
      Ok(()) => {
        tracing::debug!(post_id = post.id, author_id = post.author_id, "post created");
        None
      }
      Err(e) => {
        tracing::error!(
          post_id = post.id,
          author_id = post.author_id,
          error = %e,
          "post persisted but post-created event was not emitted"
        );
        Some(e.to_string())
      }
    };

    Ok(CreatedPost { post, publish_error })
  }

  /// The post store behind this ingestor.
  pub fn posts(&self) -> &Arc<P> { &self.posts }
}

#[cfg(test)]
mod tests {
  use feedline_core::store::EventConsumer;
  use feedline_store_sqlite::{SqliteStore, StoreOptions};

  use super::*;
  use crate::{channel::MemoryChannel, error::MemoryError};

  async fn ingestor() -> (PostIngestor<SqliteStore, MemoryChannel>, Arc<MemoryChannel>) {
    let store = Arc::new(SqliteStore::open_in_memory(StoreOptions::default()).await.unwrap());
    let channel = Arc::new(MemoryChannel::new(4, 3));
    (PostIngestor::new(store, channel.clone()), channel)
  }

  /// Publisher that always fails.
  struct BrokenPublisher;

  impl EventPublisher for BrokenPublisher {
    type Error = MemoryError;

    async fn publish(&self, _event: PostCreatedEvent) -> Result<(), MemoryError> {
      Err(MemoryError::Closed)
    }
  }

  #[tokio::test]
  async fn persists_then_emits_one_event() {
    let (ingestor, channel) = ingestor().await;

    let created = ingestor.create_post(NewPost::new(1, "img1")).await.unwrap();
    assert!(created.publish_error.is_none());
    assert_eq!(created.post.author_id, 1);

    let stored = ingestor.posts().get_post(created.post.id).await.unwrap().unwrap();
    assert_eq!(stored, created.post);

    let delivery = channel.receive().await.unwrap().unwrap();
    assert_eq!(delivery.event, PostCreatedEvent::from(&created.post));
    assert_eq!(channel.backlog(), 1);
  }

  #[tokio::test]
  async fn invalid_input_is_neither_stored_nor_emitted() {
    let (ingestor, channel) = ingestor().await;

    let err = ingestor.create_post(NewPost::new(1, "  ")).await.unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    let err = ingestor.create_post(NewPost::new(0, "img")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(channel.backlog(), 0);
    assert!(ingestor.posts().get_post(1).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn publish_failure_keeps_the_post() {
    let store = Arc::new(SqliteStore::open_in_memory(StoreOptions::default()).await.unwrap());
    let ingestor = PostIngestor::new(store.clone(), Arc::new(BrokenPublisher));

    let created = ingestor.create_post(NewPost::new(2, "img2")).await.unwrap();
    assert!(created.publish_error.is_some());
    assert!(store.get_post(created.post.id).await.unwrap().is_some());
  }
}
