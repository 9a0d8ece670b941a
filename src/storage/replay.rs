//! Replay/ID log: a persistent set of recently-seen packet IDs enforcing
//! single-use processing (ground: spec §4.2, `newmix/keys.py`'s IDLog table
//! pattern folded into the shared store).

use super::{Store, StoreResult};
use chrono::{DateTime, Utc};

impl Store {
    /// Returns `true` if `packet_id` was already present (caller must drop
    /// the packet); otherwise inserts it with `expires_at` and returns
    /// `false`.
    pub fn seen_or_mark(&self, packet_id: &[u8], expires_at: DateTime<Utc>) -> StoreResult<bool> {
        let already_seen: bool = self.conn.query_row(
            "SELECT 1 FROM seen_packet_ids WHERE packet_id = ?1",
            [packet_id],
            |_| Ok(true),
        ).or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(false),
            other => Err(other),
        })?;

        if already_seen {
            return Ok(true);
        }

        self.conn.execute(
            "INSERT INTO seen_packet_ids (packet_id, expires_at) VALUES (?1, ?2)",
            rusqlite::params![packet_id, expires_at.to_rfc3339()],
        )?;
        Ok(false)
    }

    /// Deletes every entry whose `expires_at` has passed, returning the
    /// number removed.
    pub fn prune_replay(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM seen_packet_ids WHERE expires_at < ?1",
            [now.to_rfc3339()],
        )?;
        Ok(removed)
    }

    /// Current cardinality of the replay set, logged for operator
    /// visibility after each prune.
    pub fn replay_count(&self) -> StoreResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM seen_packet_ids", [], |row| row.get(0))?;
        Ok(count)
    }
}
