//! Handlers for `/posts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/posts` | Body: `{"author_id":1,"media_ref":"img1"}` |
//! | `GET`  | `/posts/{id}` | 404 if not found |

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
};
use feedline_core::{
  post::{NewPost, Post, PostId},
  store::{EventPublisher, PostStore, TimelineStore},
};
use serde::Serialize;

use crate::{ApiStore, AppState, Data, error::ApiError};

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PostCreated {
  pub data:          Post,
  /// Set when the post was stored but its event could not be emitted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub publish_error: Option<String>,
}

/// `POST /posts`
pub async fn create<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  body: Result<Json<NewPost>, JsonRejection>,
) -> Result<Json<PostCreated>, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let Json(body) = body?;
  let created = state
    .ingestor
    .create_post(body)
    .await
    .map_err(ApiError::classified)?;
  Ok(Json(PostCreated { data: created.post, publish_error: created.publish_error }))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /posts/{id}`
pub async fn get_one<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  Path(id): Path<PostId>,
) -> Result<Json<Data<Post>>, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let post = state
    .store
    .get_post(id)
    .await
    .map_err(ApiError::classified)?
    .ok_or_else(|| ApiError::NotFound(format!("post {id} not found")))?;
  Ok(Json(Data { data: post }))
}
