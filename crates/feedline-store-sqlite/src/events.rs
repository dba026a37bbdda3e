//! Durable post-created event log.
//!
//! Events are rows in `post_events`. A consumer leases the oldest pending
//! event whose author has nothing leased and nothing older pending, which
//! keeps per-author publish order while letting different authors proceed in
//! parallel. Acknowledged rows are deleted; rows that exhaust the delivery
//! budget, or whose payload cannot be decoded, stay behind in the `dead`
//! state for inspection. A lease older than the lease timeout is treated as
//! abandoned and the event becomes deliverable again.

use std::sync::atomic::Ordering;

use chrono::Utc;
use feedline_core::{
  event::{Delivery, DeliveryId, NackOutcome},
  post::PostCreatedEvent,
  store::{EventConsumer, EventPublisher},
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result, SqliteStore,
  encode::{decode_event, encode_event, event_state},
};

/// What a lease attempt found, decided inside the connection thread.
enum Lease {
  Leased { offset: i64, event: PostCreatedEvent, attempt: u32 },
  /// Nothing deliverable right now; `live` counts pending and leased rows.
  Idle { live: i64 },
}

/// A lease attempt plus the housekeeping done in the same transaction.
struct LeaseScan {
  lease:    Lease,
  /// Leases that outlived the lease timeout and went back to pending.
  expired:  usize,
  /// Rows whose payload could not be decoded; now dead.
  poisoned: Vec<(i64, String)>,
}

fn delivery_id(offset: i64) -> DeliveryId {
  DeliveryId { partition: 0, offset: offset.max(0) as u64 }
}

impl SqliteStore {
  async fn lease_next(&self) -> Result<Lease> {
    let now_ms     = Utc::now().timestamp_millis();
    let timeout_ms = i64::try_from(self.options.lease_timeout.as_millis()).unwrap_or(i64::MAX);
    let expiry_ms  = now_ms.saturating_sub(timeout_ms);

    let scan = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let expired = tx.execute(
          "UPDATE post_events SET state = ?1, leased_at = NULL
           WHERE state = ?2 AND leased_at <= ?3",
          rusqlite::params![event_state::PENDING, event_state::LEASED, expiry_ms],
        )?;

        let mut poisoned = Vec::new();
        let lease = loop {
          let next: Option<(i64, String, u32)> = tx
            .query_row(
              "SELECT e.event_offset, e.payload, e.attempts
               FROM post_events e
               WHERE e.state = ?1
                 AND NOT EXISTS (
                   SELECT 1 FROM post_events o
                   WHERE o.author_id = e.author_id AND o.state = ?2
                 )
                 AND NOT EXISTS (
                   SELECT 1 FROM post_events o
                   WHERE o.author_id = e.author_id
                     AND o.state = ?1
                     AND o.event_offset < e.event_offset
                 )
               ORDER BY e.event_offset
               LIMIT 1",
              rusqlite::params![event_state::PENDING, event_state::LEASED],
              |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

          let Some((offset, payload, attempts)) = next else {
            let live: i64 = tx.query_row(
              "SELECT COUNT(*) FROM post_events WHERE state IN (?1, ?2)",
              rusqlite::params![event_state::PENDING, event_state::LEASED],
              |r| r.get(0),
            )?;
            break Lease::Idle { live };
          };

          // A payload that cannot be decoded never will be; park it instead
          // of leasing it, so the author's later events keep flowing.
          match decode_event(&payload) {
            Ok(event) => {
              tx.execute(
                "UPDATE post_events SET state = ?1, attempts = attempts + 1, leased_at = ?2
                 WHERE event_offset = ?3",
                rusqlite::params![event_state::LEASED, now_ms, offset],
              )?;
              break Lease::Leased { offset, event, attempt: attempts + 1 };
            }
            Err(e) => {
              tx.execute(
                "UPDATE post_events SET state = ?1 WHERE event_offset = ?2",
                rusqlite::params![event_state::DEAD, offset],
              )?;
              poisoned.push((offset, e.to_string()));
            }
          }
        };

        tx.commit()?;
        Ok(LeaseScan { lease, expired, poisoned })
      })
      .await?;

    if scan.expired > 0 {
      tracing::warn!(expired = scan.expired, "event leases expired; redelivering");
    }
    for (offset, error) in &scan.poisoned {
      tracing::error!(offset, %error, "undecodable event payload; dead-lettered");
    }
    Ok(scan.lease)
  }

  /// Events that exhausted their delivery budget, oldest first. Rows whose
  /// payload cannot be decoded are skipped.
  pub async fn dead_lettered_events(&self) -> Result<Vec<PostCreatedEvent>> {
    let payloads: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT payload FROM post_events WHERE state = ?1 ORDER BY event_offset",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![event_state::DEAD], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      payloads
        .iter()
        .filter_map(|p| match decode_event(p) {
          Ok(event) => Some(event),
          Err(e) => {
            tracing::warn!(error = %e, "skipping undecodable dead-lettered payload");
            None
          }
        })
        .collect(),
    )
  }
}

// ─── EventPublisher impl ─────────────────────────────────────────────────────

impl EventPublisher for SqliteStore {
  type Error = Error;

  async fn publish(&self, event: PostCreatedEvent) -> Result<()> {
    let payload   = encode_event(&event)?;
    let author_id = event.author_id;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO post_events (author_id, payload) VALUES (?1, ?2)",
          rusqlite::params![author_id, payload],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── EventConsumer impl ──────────────────────────────────────────────────────

impl EventConsumer for SqliteStore {
  type Error = Error;

  async fn receive(&self) -> Result<Option<Delivery>> {
    loop {
      match self.lease_next().await? {
        Lease::Leased { offset, event, attempt } => {
          return Ok(Some(Delivery { id: delivery_id(offset), attempt, event }));
        }
        Lease::Idle { live } if live == 0 && self.is_closed() => return Ok(None),
        Lease::Idle { .. } => tokio::time::sleep(self.options.poll_interval).await,
      }
    }
  }

  async fn ack(&self, id: DeliveryId) -> Result<()> {
    let offset = i64::try_from(id.offset).unwrap_or(i64::MAX);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM post_events WHERE event_offset = ?1 AND state = ?2",
          rusqlite::params![offset, event_state::LEASED],
        )?)
      })
      .await?;

    if deleted == 0 {
      return Err(Error::UnknownDelivery(id));
    }
    Ok(())
  }

  async fn nack(&self, id: DeliveryId) -> Result<NackOutcome> {
    let offset         = i64::try_from(id.offset).unwrap_or(i64::MAX);
    let max_deliveries = self.options.max_deliveries;

    let outcome: Option<NackOutcome> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let attempts: Option<u32> = tx
          .query_row(
            "SELECT attempts FROM post_events WHERE event_offset = ?1 AND state = ?2",
            rusqlite::params![offset, event_state::LEASED],
            |r| r.get(0),
          )
          .optional()?;

        let Some(attempts) = attempts else {
          return Ok(None);
        };

        let (state, outcome) = if attempts >= max_deliveries {
          (event_state::DEAD, NackOutcome::DeadLettered)
        } else {
          (event_state::PENDING, NackOutcome::Redeliver)
        };
        tx.execute(
          "UPDATE post_events SET state = ?1 WHERE event_offset = ?2",
          rusqlite::params![state, offset],
        )?;

        tx.commit()?;
        Ok(Some(outcome))
      })
      .await?;

    let outcome = outcome.ok_or(Error::UnknownDelivery(id))?;
    if outcome == NackOutcome::DeadLettered {
      tracing::warn!(offset, max_deliveries, "event exhausted its deliveries; dead-lettered");
    }
    Ok(outcome)
  }

  fn close(&self) { self.closed.store(true, Ordering::SeqCst); }
}
