use std::sync::Arc;

use axum::{
  body::Body,
  http::{Method, Request, StatusCode, header},
};
use feedline_core::store::EventConsumer;
use feedline_pipeline::{FanoutConfig, FanoutWorker, MemoryChannel, MemoryTimelineStore};
use feedline_store_sqlite::{SqliteStore, StoreOptions};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::*;

struct Fixture {
  state:     AppState<SqliteStore, MemoryChannel, MemoryTimelineStore>,
  channel:   Arc<MemoryChannel>,
  timelines: Arc<MemoryTimelineStore>,
}

async fn fixture() -> Fixture {
  let store     = Arc::new(SqliteStore::open_in_memory(StoreOptions::default()).await.unwrap());
  let channel   = Arc::new(MemoryChannel::new(4, 3));
  let timelines = Arc::new(MemoryTimelineStore::new());
  Fixture {
    state: AppState::new(store, channel.clone(), timelines.clone()),
    channel,
    timelines,
  }
}

async fn send(
  state: &AppState<SqliteStore, MemoryChannel, MemoryTimelineStore>,
  method: Method,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp   = api_router(state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes  = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json   = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, json)
}

async fn register(state: &AppState<SqliteStore, MemoryChannel, MemoryTimelineStore>, ids: &[i64]) {
  for id in ids {
    let (status, _) = send(state, Method::POST, "/users", Some(json!({ "user_id": id }))).await;
    assert_eq!(status, StatusCode::CREATED);
  }
}

// ─── Posts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_post_persists_and_emits() {
  let f = fixture().await;
  let (status, body) = send(
    &f.state,
    Method::POST,
    "/posts",
    Some(json!({ "author_id": 1, "media_ref": "img1" })),
  )
  .await;

  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["author_id"], 1);
  assert_eq!(body["data"]["media_ref"], "img1");
  assert!(body.get("publish_error").is_none());
  assert_eq!(f.channel.backlog(), 1);

  let id = body["data"]["id"].as_i64().unwrap();
  let (status, fetched) = send(&f.state, Method::GET, &format!("/posts/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(fetched["data"], body["data"]);
}

#[tokio::test]
async fn invalid_post_is_rejected_without_event() {
  let f = fixture().await;
  let (status, body) = send(
    &f.state,
    Method::POST,
    "/posts",
    Some(json!({ "author_id": 1, "media_ref": "" })),
  )
  .await;

  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("media_ref"));
  assert_eq!(f.channel.backlog(), 0);
}

#[tokio::test]
async fn post_missing_a_field_is_400_json() {
  let f = fixture().await;
  let (status, body) =
    send(&f.state, Method::POST, "/posts", Some(json!({ "author_id": 1 }))).await;

  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("media_ref"));
  assert_eq!(f.channel.backlog(), 0);
}

#[tokio::test]
async fn publish_failure_is_reported_on_success() {
  let f = fixture().await;
  f.channel.close();

  let (status, body) = send(
    &f.state,
    Method::POST,
    "/posts",
    Some(json!({ "author_id": 1, "media_ref": "img1" })),
  )
  .await;

  assert_eq!(status, StatusCode::OK);
  assert!(body["publish_error"].is_string());
  let id = body["data"]["id"].as_i64().unwrap();
  let (status, _) = send(&f.state, Method::GET, &format!("/posts/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_post_is_404() {
  let f = fixture().await;
  let (status, body) = send(&f.state, Method::GET, "/posts/42", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].is_string());
}

// ─── Follow graph ────────────────────────────────────────────────────────────

#[tokio::test]
async fn follow_statuses() {
  let f = fixture().await;
  register(&f.state, &[1, 2]).await;
  // Registering again is harmless.
  register(&f.state, &[1]).await;

  let edge = json!({ "follower_id": 2, "followee_id": 1 });
  let (status, body) = send(&f.state, Method::POST, "/follows", Some(edge.clone())).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["data"]["follower_id"], 2);
  assert_eq!(body["data"]["followee_id"], 1);

  let (status, _) = send(&f.state, Method::POST, "/follows", Some(edge)).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let self_follow = json!({ "follower_id": 1, "followee_id": 1 });
  let (status, _) = send(&f.state, Method::POST, "/follows", Some(self_follow)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let unknown = json!({ "follower_id": 9, "followee_id": 1 });
  let (status, _) = send(&f.state, Method::POST, "/follows", Some(unknown)).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = send(&f.state, Method::POST, "/users", Some(json!({ "user_id": 0 }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_graph_bodies_are_400_json() {
  let f = fixture().await;
  let (status, body) =
    send(&f.state, Method::POST, "/follows", Some(json!({ "follower_id": 2 }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());

  let req = Request::builder()
    .method(Method::POST)
    .uri("/users")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{\"user_id\":"))
    .unwrap();
  let resp = api_router(f.state.clone()).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body: Value = serde_json::from_slice(&bytes).unwrap();
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn graph_reads() {
  let f = fixture().await;
  register(&f.state, &[1, 2, 3, 4]).await;
  for follower in [2, 3] {
    let edge = json!({ "follower_id": follower, "followee_id": 1 });
    send(&f.state, Method::POST, "/follows", Some(edge)).await;
  }

  let (status, body) = send(&f.state, Method::GET, "/followers/1", None).await;
  assert_eq!(status, StatusCode::OK);
  let mut ids: Vec<i64> = serde_json::from_value(body["follower_ids"].clone()).unwrap();
  ids.sort_unstable();
  assert_eq!(ids, vec![2, 3]);

  let (_, body) = send(&f.state, Method::GET, "/following/2", None).await;
  assert_eq!(body["following_ids"], json!([1]));

  let (_, body) = send(&f.state, Method::GET, "/followers/4", None).await;
  assert_eq!(body["follower_ids"], json!([]));

  let (_, body) = send(&f.state, Method::GET, "/is-following/2/1", None).await;
  assert_eq!(body["is_following"], true);
  let (_, body) = send(&f.state, Method::GET, "/is-following/1/2", None).await;
  assert_eq!(body["is_following"], false);

  let (status, _) = send(&f.state, Method::GET, "/followers/99", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = send(&f.state, Method::GET, "/is-following/2/99", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unfollow_then_404() {
  let f = fixture().await;
  register(&f.state, &[1, 2]).await;
  send(&f.state, Method::POST, "/follows", Some(json!({ "follower_id": 2, "followee_id": 1 }))).await;

  let (status, body) = send(&f.state, Method::DELETE, "/follows/2/1", None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  assert_eq!(body, Value::Null);

  let (status, _) = send(&f.state, Method::DELETE, "/follows/2/1", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Feeds ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn feed_of_unknown_user_is_empty() {
  let f = fixture().await;
  let (status, body) = send(&f.state, Method::GET, "/feeds/77", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn posted_media_shows_up_in_follower_feeds() {
  let f = fixture().await;
  register(&f.state, &[1, 2, 3, 4]).await;
  for follower in [2, 3] {
    let edge = json!({ "follower_id": follower, "followee_id": 1 });
    send(&f.state, Method::POST, "/follows", Some(edge)).await;
  }
  let (_, created) = send(
    &f.state,
    Method::POST,
    "/posts",
    Some(json!({ "author_id": 1, "media_ref": "img1" })),
  )
  .await;

  let worker = FanoutWorker::new(
    f.state.store.clone(),
    f.timelines.clone(),
    f.channel.clone(),
    FanoutConfig::default(),
  );
  let delivery = f.channel.receive().await.unwrap().unwrap();
  worker.handle(delivery).await.unwrap();

  for follower in [2, 3] {
    let (_, body) = send(&f.state, Method::GET, &format!("/feeds/{follower}"), None).await;
    assert_eq!(body["data"][0]["post_id"], created["data"]["id"]);
    assert_eq!(body["data"][0]["media_ref"], "img1");
  }
  let (_, body) = send(&f.state, Method::GET, "/feeds/4", None).await;
  assert_eq!(body["data"], json!([]));
}
