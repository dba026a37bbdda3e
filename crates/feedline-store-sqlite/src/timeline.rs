//! Bounded per-user timelines stored as rows ordered by a per-user sequence.

use feedline_core::{post::UserId, store::TimelineStore, timeline::TimelineEntry};

use crate::{
  Error, Result, SqliteStore,
  encode::{decode_entry, encode_entry},
};

impl TimelineStore for SqliteStore {
  type Error = Error;

  /// Insert at `max(seq) + 1`, then delete every row that is not among the
  /// newest `capacity`. Both statements share one transaction, and the
  /// connection runs one call at a time, so concurrent prepends to the same
  /// key are serialized.
  async fn prepend_and_trim(
    &self,
    key: UserId,
    entry: TimelineEntry,
    capacity: usize,
  ) -> Result<()> {
    let encoded  = encode_entry(&entry);
    let capacity = i64::try_from(capacity).unwrap_or(i64::MAX);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO timeline_entries (user_id, seq, entry)
           VALUES (
             ?1,
             (SELECT COALESCE(MAX(seq), 0) + 1 FROM timeline_entries WHERE user_id = ?1),
             ?2
           )",
          rusqlite::params![key, encoded],
        )?;
        tx.execute(
          "DELETE FROM timeline_entries
           WHERE user_id = ?1
             AND seq NOT IN (
               SELECT seq FROM timeline_entries
               WHERE user_id = ?1
               ORDER BY seq DESC
               LIMIT ?2
             )",
          rusqlite::params![key, capacity],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn range(&self, key: UserId, start: usize, stop: usize) -> Result<Vec<TimelineEntry>> {
    if stop < start {
      return Ok(Vec::new());
    }
    let limit  = i64::try_from(stop - start).map_or(i64::MAX, |n| n.saturating_add(1));
    let offset = i64::try_from(start).unwrap_or(i64::MAX);

    let raws: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entry FROM timeline_entries
           WHERE user_id = ?1
           ORDER BY seq DESC
           LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![key, limit, offset], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.iter().map(|s| decode_entry(s)).collect()
  }
}
