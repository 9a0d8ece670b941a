//! Chunk reassembler: accumulates multipart exit messages and reassembles
//! them once every part has arrived (ground: spec §4.3). Kept in the shared
//! store so `assemble` can delete-while-reading inside one transaction,
//! giving the atomicity the spec requires with respect to the daily expiry
//! sweep.

use super::{Store, StoreResult};
use chrono::{DateTime, Utc};

impl Store {
    /// Inserts or replaces the chunk for `(message_id, chunk_num)`. Last
    /// write wins — a duplicate is most likely a retransmit the replay log
    /// failed to catch because its packet_id differed.
    pub fn chunk_insert(
        &self,
        message_id: &[u8],
        chunk_num: i64,
        num_chunks: i64,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO chunks (message_id, chunk_num, num_chunks, payload, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(message_id, chunk_num)
             DO UPDATE SET num_chunks = excluded.num_chunks,
                           payload = excluded.payload,
                           received_at = excluded.received_at",
            rusqlite::params![
                message_id,
                chunk_num,
                num_chunks,
                payload,
                received_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// True iff every `chunk_num` in `[1..num_chunks]` has a record, all
    /// agreeing on `num_chunks`.
    pub fn chunk_complete(&self, message_id: &[u8]) -> StoreResult<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_num, num_chunks FROM chunks WHERE message_id = ?1 ORDER BY chunk_num",
        )?;
        let rows: Vec<(i64, i64)> = stmt
            .query_map([message_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        if rows.is_empty() {
            return Ok(false);
        }
        let num_chunks = rows[0].1;
        if rows.iter().any(|(_, n)| *n != num_chunks) {
            return Ok(false);
        }
        if rows.len() as i64 != num_chunks {
            return Ok(false);
        }
        for (expected, (chunk_num, _)) in (1..=num_chunks).zip(rows.iter()) {
            if expected != *chunk_num {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Concatenates payloads in ascending `chunk_num` order and removes all
    /// records for `message_id`. Caller must have confirmed `chunk_complete`
    /// first; this does not re-check.
    pub fn chunk_assemble(&self, message_id: &[u8]) -> StoreResult<Vec<u8>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM chunks WHERE message_id = ?1 ORDER BY chunk_num",
        )?;
        let payloads: Vec<Vec<u8>> = stmt
            .query_map([message_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        self.conn
            .execute("DELETE FROM chunks WHERE message_id = ?1", [message_id])?;

        Ok(payloads.concat())
    }

    /// Removes chunk records received before `cutoff`, returning how many
    /// were dropped. `cutoff = now - retention`.
    pub fn chunk_expire(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM chunks WHERE received_at < ?1", [cutoff.to_rfc3339()])?;
        Ok(removed)
    }
}
