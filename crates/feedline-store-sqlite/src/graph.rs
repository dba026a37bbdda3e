//! Follow-graph queries and writes for both physical layouts.
//!
//! The naive layout keeps one `follows` row per edge and filters by column.
//! The symmetric layout keeps two `follow_edges` rows per edge, one per
//! direction, so both `followers` and `following` are primary-key seeks.
//! Either way callers see the same contract.

use chrono::Utc;
use feedline_core::{
  graph::{EdgeDirection, FollowEdge, GraphLayout},
  post::UserId,
  store::{FollowGraph, SocialGraph},
};
use rusqlite::{Connection, OptionalExtension as _, Transaction};

use crate::{Error, Result, SqliteStore, encode::encode_dt};

/// Result of a graph call, decided inside the connection thread.
enum Lookup<T> {
  Found(T),
  MissingUser(UserId),
}

impl<T> Lookup<T> {
  fn into_result(self) -> Result<T> {
    match self {
      Lookup::Found(v) => Ok(v),
      Lookup::MissingUser(id) => Err(Error::UserNotFound(id)),
    }
  }
}

/// Which end of an edge a query starts from.
#[derive(Clone, Copy)]
enum Side {
  /// Users following the subject.
  Followers,
  /// Users the subject follows.
  Following,
}

fn user_exists(conn: &Connection, user_id: UserId) -> rusqlite::Result<bool> {
  Ok(conn
    .query_row(
      "SELECT 1 FROM users WHERE user_id = ?1",
      rusqlite::params![user_id],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false))
}

fn first_missing(conn: &Connection, ids: &[UserId]) -> rusqlite::Result<Option<UserId>> {
  for &id in ids {
    if !user_exists(conn, id)? {
      return Ok(Some(id));
    }
  }
  Ok(None)
}

fn read_id(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserId> { row.get(0) }

fn neighbour_ids(
  conn: &Connection,
  layout: GraphLayout,
  side: Side,
  user_id: UserId,
) -> rusqlite::Result<Vec<UserId>> {
  match layout {
    GraphLayout::Naive => {
      let mut stmt = conn.prepare(match side {
        Side::Followers => {
          "SELECT follower_id FROM follows WHERE followee_id = ?1 ORDER BY follower_id"
        }
        Side::Following => {
          "SELECT followee_id FROM follows WHERE follower_id = ?1 ORDER BY followee_id"
        }
      })?;
      let ids = stmt
        .query_map(rusqlite::params![user_id], read_id)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(ids)
    }
    GraphLayout::Symmetric => {
      let direction = match side {
        Side::Followers => EdgeDirection::IsFollowedBy,
        Side::Following => EdgeDirection::Follows,
      };
      let mut stmt = conn.prepare(
        "SELECT object_id FROM follow_edges
         WHERE subject_id = ?1 AND direction = ?2
         ORDER BY object_id",
      )?;
      let ids = stmt
        .query_map(rusqlite::params![user_id, direction.as_ref()], read_id)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(ids)
    }
  }
}

fn edge_exists(
  conn: &Connection,
  layout: GraphLayout,
  follower_id: UserId,
  followee_id: UserId,
) -> rusqlite::Result<bool> {
  let found = match layout {
    GraphLayout::Naive => conn
      .query_row(
        "SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
        rusqlite::params![follower_id, followee_id],
        |_| Ok(true),
      )
      .optional()?,
    GraphLayout::Symmetric => conn
      .query_row(
        "SELECT 1 FROM follow_edges
         WHERE subject_id = ?1 AND direction = ?2 AND object_id = ?3",
        rusqlite::params![follower_id, EdgeDirection::Follows.as_ref(), followee_id],
        |_| Ok(true),
      )
      .optional()?,
  };
  Ok(found.unwrap_or(false))
}

/// Write both rows of a symmetric edge. Runs inside the caller's transaction,
/// so a failure on either insert leaves neither row behind.
fn create_edge_pair(tx: &Transaction<'_>, edge: &FollowEdge) -> rusqlite::Result<()> {
  let at = encode_dt(edge.created_at);
  let mut insert = tx.prepare(
    "INSERT INTO follow_edges (subject_id, direction, object_id, created_at)
     VALUES (?1, ?2, ?3, ?4)",
  )?;
  insert.execute(rusqlite::params![
    edge.follower_id,
    EdgeDirection::Follows.as_ref(),
    edge.followee_id,
    at
  ])?;
  insert.execute(rusqlite::params![
    edge.followee_id,
    EdgeDirection::IsFollowedBy.as_ref(),
    edge.follower_id,
    at
  ])?;
  Ok(())
}

fn delete_edge_pair(
  tx: &Transaction<'_>,
  follower_id: UserId,
  followee_id: UserId,
) -> rusqlite::Result<usize> {
  let mut delete = tx.prepare(
    "DELETE FROM follow_edges WHERE subject_id = ?1 AND direction = ?2 AND object_id = ?3",
  )?;
  let forward = delete.execute(rusqlite::params![
    follower_id,
    EdgeDirection::Follows.as_ref(),
    followee_id
  ])?;
  let backward = delete.execute(rusqlite::params![
    followee_id,
    EdgeDirection::IsFollowedBy.as_ref(),
    follower_id
  ])?;
  Ok(forward.max(backward))
}

impl SqliteStore {
  async fn neighbours(&self, side: Side, user_id: UserId) -> Result<Vec<UserId>> {
    let layout = self.options.layout;
    self
      .conn
      .call(move |conn| {
        if !user_exists(conn, user_id)? {
          return Ok(Lookup::MissingUser(user_id));
        }
        Ok(Lookup::Found(neighbour_ids(conn, layout, side, user_id)?))
      })
      .await?
      .into_result()
  }

  /// Count symmetric-layout rows whose mirror row is missing or carries a
  /// different timestamp. Always zero unless the table was edited by hand.
  pub async fn dangling_half_edges(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM follow_edges f
           WHERE NOT EXISTS (
             SELECT 1 FROM follow_edges m
             WHERE m.subject_id = f.object_id
               AND m.object_id  = f.subject_id
               AND m.created_at = f.created_at
               AND m.direction  = CASE f.direction
                                    WHEN ?1 THEN ?2
                                    ELSE ?1
                                  END
           )",
          rusqlite::params![
            EdgeDirection::Follows.as_ref(),
            EdgeDirection::IsFollowedBy.as_ref()
          ],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count.max(0) as u64)
  }
}

// ─── SocialGraph impl ────────────────────────────────────────────────────────

impl SocialGraph for SqliteStore {
  type Error = Error;

  async fn followers(&self, user_id: UserId) -> Result<Vec<UserId>> {
    self.neighbours(Side::Followers, user_id).await
  }

  async fn following(&self, user_id: UserId) -> Result<Vec<UserId>> {
    self.neighbours(Side::Following, user_id).await
  }

  async fn is_following(&self, follower_id: UserId, followee_id: UserId) -> Result<bool> {
    let layout = self.options.layout;
    self
      .conn
      .call(move |conn| {
        if let Some(missing) = first_missing(conn, &[follower_id, followee_id])? {
          return Ok(Lookup::MissingUser(missing));
        }
        Ok(Lookup::Found(edge_exists(conn, layout, follower_id, followee_id)?))
      })
      .await?
      .into_result()
  }
}

// ─── FollowGraph impl ────────────────────────────────────────────────────────

/// Outcome of a follow write, decided inside the transaction.
enum FollowOutcome {
  Created(FollowEdge),
  Duplicate,
  MissingUser(UserId),
}

impl FollowGraph for SqliteStore {
  async fn add_user(&self, user_id: UserId) -> Result<()> {
    if user_id <= 0 {
      return Err(
        feedline_core::Error::Validation(format!("user id must be positive, got {user_id}"))
          .into(),
      );
    }
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?1, ?2)",
          rusqlite::params![user_id, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn follow(&self, follower_id: UserId, followee_id: UserId) -> Result<FollowEdge> {
    if follower_id == followee_id {
      return Err(Error::SelfFollow(follower_id));
    }

    let layout = self.options.layout;
    let edge = FollowEdge { follower_id, followee_id, created_at: Utc::now() };

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(missing) = first_missing(&tx, &[follower_id, followee_id])? {
          return Ok(FollowOutcome::MissingUser(missing));
        }
        if edge_exists(&tx, layout, follower_id, followee_id)? {
          return Ok(FollowOutcome::Duplicate);
        }

        match layout {
          GraphLayout::Naive => {
            tx.execute(
              "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
              rusqlite::params![follower_id, followee_id, encode_dt(edge.created_at)],
            )?;
          }
          GraphLayout::Symmetric => create_edge_pair(&tx, &edge)?,
        }

        tx.commit()?;
        Ok(FollowOutcome::Created(edge))
      })
      .await?;

    match outcome {
      FollowOutcome::Created(edge) => {
        tracing::debug!(follower_id, followee_id, %layout, "recorded follow edge");
        Ok(edge)
      }
      FollowOutcome::Duplicate => Err(Error::AlreadyFollowing { follower_id, followee_id }),
      FollowOutcome::MissingUser(id) => Err(Error::UserNotFound(id)),
    }
  }

  async fn unfollow(&self, follower_id: UserId, followee_id: UserId) -> Result<bool> {
    let layout = self.options.layout;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(missing) = first_missing(&tx, &[follower_id, followee_id])? {
          return Ok(Lookup::MissingUser(missing));
        }

        let removed = match layout {
          GraphLayout::Naive => tx.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
            rusqlite::params![follower_id, followee_id],
          )?,
          GraphLayout::Symmetric => delete_edge_pair(&tx, follower_id, followee_id)?,
        };

        tx.commit()?;
        Ok(Lookup::Found(removed > 0))
      })
      .await?
      .into_result()
  }
}
