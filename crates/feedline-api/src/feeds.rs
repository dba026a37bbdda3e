//! `GET /feeds/{user_id}`: a user's precomputed timeline, newest first.

use axum::{
  Json,
  extract::{Path, State},
};
use feedline_core::{
  post::UserId,
  store::{EventPublisher, TimelineStore},
  timeline::TimelineEntry,
};

use crate::{ApiStore, AppState, Data, error::ApiError};

/// Never 404s: a user nobody has delivered to yet has an empty feed.
pub async fn get_feed<S, E, T>(
  State(state): State<AppState<S, E, T>>,
  Path(user_id): Path<UserId>,
) -> Result<Json<Data<Vec<TimelineEntry>>>, ApiError>
where
  S: ApiStore,
  E: EventPublisher + 'static,
  T: TimelineStore + 'static,
{
  let entries = state
    .reader
    .get_timeline(user_id)
    .await
    .map_err(ApiError::classified)?;
  Ok(Json(Data { data: entries }))
}
