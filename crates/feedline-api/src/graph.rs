//! Handlers for the follow graph.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/users` | Body: `{"user_id":1}`; registering twice is fine |
//! | `POST`   | `/follows` | Body: `{"follower_id":2,"followee_id":1}` |
//! | `DELETE` | `/follows/{follower_id}/{followee_id}` | 404 if no such edge |
//! | `GET`    | `/followers/{user_id}` | 404 for an unknown user |
//! | `GET`    | `/following/{user_id}` | 404 for an unknown user |
//! | `GET`    | `/is-following/{follower_id}/{followee_id}` | |

use axum::{
  Json,
  extract::{Path, State, rejection::JsonRejection},
  http::StatusCode,
  response::IntoResponse,
};
use feedline_core::{
  graph::FollowEdge,
  post::UserId,
  store::{EventPublisher, FollowGraph, SocialGraph, TimelineStore},
};
use serde::{Deserialize, Serialize};

use crate::{ApiStore, AppState, Data, error::ApiError};

// ─── Users ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct UserBody {
  pub user_id: UserId,
}

/// `POST /users`
pub async fn add_user<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  body: Result<Json<UserBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let Json(body) = body?;
  state
    .store
    .add_user(body.user_id)
    .await
    .map_err(ApiError::classified)?;
  Ok((StatusCode::CREATED, Json(body)))
}

// ─── Follow / unfollow ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FollowBody {
  pub follower_id: UserId,
  pub followee_id: UserId,
}

/// `POST /follows`
pub async fn follow<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  body: Result<Json<FollowBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let Json(body) = body?;
  let edge: FollowEdge = state
    .store
    .follow(body.follower_id, body.followee_id)
    .await
    .map_err(ApiError::classified)?;
  Ok((StatusCode::CREATED, Json(Data { data: edge })))
}

/// `DELETE /follows/{follower_id}/{followee_id}`
pub async fn unfollow<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  Path((follower_id, followee_id)): Path<(UserId, UserId)>,
) -> Result<StatusCode, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let removed = state
    .store
    .unfollow(follower_id, followee_id)
    .await
    .map_err(ApiError::classified)?;
  if !removed {
    return Err(ApiError::NotFound(format!(
      "user {follower_id} does not follow user {followee_id}"
    )));
  }
  Ok(StatusCode::NO_CONTENT)
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Followers {
  pub follower_ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct Following {
  pub following_ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct IsFollowing {
  pub is_following: bool,
}

/// `GET /followers/{user_id}`
pub async fn followers<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  Path(user_id): Path<UserId>,
) -> Result<Json<Followers>, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let follower_ids = state
    .store
    .followers(user_id)
    .await
    .map_err(ApiError::classified)?;
  Ok(Json(Followers { follower_ids }))
}

/// `GET /following/{user_id}`
pub async fn following<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  Path(user_id): Path<UserId>,
) -> Result<Json<Following>, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let following_ids = state
    .store
    .following(user_id)
    .await
    .map_err(ApiError::classified)?;
  Ok(Json(Following { following_ids }))
}

/// `GET /is-following/{follower_id}/{followee_id}`
pub async fn is_following<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  Path((follower_id, followee_id)): Path<(UserId, UserId)>,
) -> Result<Json<IsFollowing>, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let is_following = state
    .store
    .is_following(follower_id, followee_id)
    .await
    .map_err(ApiError::classified)?;
  Ok(Json(IsFollowing { is_following }))
}
