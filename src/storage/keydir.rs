//! Raw persistence for the peer directory (`PeerRecord`, spec §3). This is
//! the storage layer only: validation, key generation, and descriptor
//! fetch/parse live in the domain-level `crate::keydir` module. Ground:
//! `newmix/keys.py::Keystore`'s `keyring` table, folded into the shared
//! store (ground for the CRUD shape: `services/receiver/src/db.rs`).

use super::{Store, StoreResult};
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub keyid: String,
    pub name: String,
    pub address: String,
    pub pubkey_pem: String,
    pub seckey_pem: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub advertised: bool,
    pub smtp_capable: bool,
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<PeerRecord> {
    let valid_from: String = row.get("valid_from")?;
    let valid_to: String = row.get("valid_to")?;
    Ok(PeerRecord {
        keyid: row.get("keyid")?,
        name: row.get("name")?,
        address: row.get("address")?,
        pubkey_pem: row.get("pubkey_pem")?,
        seckey_pem: row.get("seckey_pem")?,
        valid_from: NaiveDate::parse_from_str(&valid_from, "%Y-%m-%d")
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        valid_to: NaiveDate::parse_from_str(&valid_to, "%Y-%m-%d")
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        advertised: row.get::<_, i64>("advertised")? != 0,
        smtp_capable: row.get::<_, i64>("smtp_capable")? != 0,
    })
}

impl Store {
    pub fn insert_peer(&self, peer: &PeerRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO peers (keyid, name, address, pubkey_pem, seckey_pem, valid_from, valid_to, advertised, smtp_capable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(keyid) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                pubkey_pem = excluded.pubkey_pem,
                seckey_pem = excluded.seckey_pem,
                valid_from = excluded.valid_from,
                valid_to = excluded.valid_to,
                advertised = excluded.advertised,
                smtp_capable = excluded.smtp_capable",
            rusqlite::params![
                peer.keyid,
                peer.name,
                peer.address,
                peer.pubkey_pem,
                peer.seckey_pem,
                peer.valid_from.format("%Y-%m-%d").to_string(),
                peer.valid_to.format("%Y-%m-%d").to_string(),
                peer.advertised as i64,
                peer.smtp_capable as i64,
            ],
        )?;
        Ok(())
    }

    /// The currently-advertised peer record for `address`, if any.
    pub fn peer_by_address(&self, address: &str) -> StoreResult<Option<PeerRecord>> {
        let result = self.conn.query_row(
            "SELECT * FROM peers WHERE address = ?1 AND advertised = 1",
            [address],
            row_to_peer,
        );
        match result {
            Ok(peer) => Ok(Some(peer)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn peer_by_keyid(&self, keyid: &str) -> StoreResult<Option<PeerRecord>> {
        let result = self
            .conn
            .query_row("SELECT * FROM peers WHERE keyid = ?1", [keyid], row_to_peer);
        match result {
            Ok(peer) => Ok(Some(peer)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Any locally-owned (`seckey_pem IS NOT NULL`) record that is both
    /// within its validity window and marked advertised.
    pub fn local_advertisable_key(&self, now: NaiveDate) -> StoreResult<Option<PeerRecord>> {
        let result = self.conn.query_row(
            "SELECT * FROM peers
             WHERE seckey_pem IS NOT NULL AND advertised = 1
               AND valid_from <= ?1 AND valid_to >= ?1
             LIMIT 1",
            [now.format("%Y-%m-%d").to_string()],
            row_to_peer,
        );
        match result {
            Ok(peer) => Ok(Some(peer)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the secret key PEM for `keyid`, or `None` if there is no row
    /// or the row's `seckey_pem` is null — both cases are equivalent per
    /// spec §9(c).
    pub fn secret_for_keyid_raw(&self, keyid: &str) -> StoreResult<Option<String>> {
        let result: Result<Option<String>, rusqlite::Error> = self.conn.query_row(
            "SELECT seckey_pem FROM peers WHERE keyid = ?1",
            [keyid],
            |row| row.get(0),
        );
        match result {
            Ok(secret) => Ok(secret),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Step (a) of `daily_events`: un-advertise records within `horizon_days`
    /// of expiry.
    pub fn mark_near_expiry_unadvertised(
        &self,
        now: DateTime<Utc>,
        horizon_days: u64,
    ) -> StoreResult<usize> {
        let cutoff = crate::clock::date_plus_days(now.date_naive(), horizon_days);
        let updated = self.conn.execute(
            "UPDATE peers SET advertised = 0 WHERE valid_to < ?1 AND advertised = 1",
            [cutoff.format("%Y-%m-%d").to_string()],
        )?;
        Ok(updated)
    }

    /// Step (b): delete every record whose validity has fully lapsed.
    pub fn delete_expired_peers(&self, now: NaiveDate) -> StoreResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM peers WHERE valid_to < ?1",
            [now.format("%Y-%m-%d").to_string()],
        )?;
        Ok(removed)
    }

    /// `known_addresses`: every peer currently marked advertised.
    pub fn advertised_addresses(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT address FROM peers WHERE advertised = 1")?;
        let addrs = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(addrs)
    }

    pub fn daily_events_last_run(&self) -> StoreResult<Option<i64>> {
        let result: Result<Option<i64>, rusqlite::Error> = self.conn.query_row(
            "SELECT last_run_epoch_day FROM daily_events_state WHERE id = 0",
            [],
            |row| row.get(0),
        );
        match result {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_daily_events_last_run(&self, epoch_day: i64) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO daily_events_state (id, last_run_epoch_day) VALUES (0, ?1)
             ON CONFLICT(id) DO UPDATE SET last_run_epoch_day = excluded.last_run_epoch_day",
            [epoch_day],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_peer(keyid: &str, advertised: bool) -> PeerRecord {
        PeerRecord {
            keyid: keyid.to_owned(),
            name: "test".to_owned(),
            address: "peer.example.com".to_owned(),
            pubkey_pem: "-----BEGIN PUBLIC KEY-----\n...\n-----END PUBLIC KEY-----".to_owned(),
            seckey_pem: None,
            valid_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            valid_to: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            advertised,
            smtp_capable: false,
        }
    }

    #[test]
    fn insert_and_fetch_by_address_only_returns_advertised() {
        let store = Store::open_in_memory().unwrap();
        store.insert_peer(&sample_peer("abc", false)).unwrap();
        assert!(store.peer_by_address("peer.example.com").unwrap().is_none());

        store.insert_peer(&sample_peer("abc", true)).unwrap();
        let peer = store.peer_by_address("peer.example.com").unwrap().unwrap();
        assert_eq!(peer.keyid, "abc");
    }

    #[test]
    fn near_expiry_records_are_unadvertised() {
        let store = Store::open_in_memory().unwrap();
        let mut peer = sample_peer("soon", true);
        peer.valid_to = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        store.insert_peer(&peer).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let updated = store.mark_near_expiry_unadvertised(now, 28).unwrap();
        assert_eq!(updated, 1);
        assert!(store.peer_by_address("peer.example.com").unwrap().is_none());
    }

    #[test]
    fn expired_records_are_deleted() {
        let store = Store::open_in_memory().unwrap();
        let mut peer = sample_peer("dead", true);
        peer.valid_to = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        store.insert_peer(&peer).unwrap();

        let removed = store
            .delete_expired_peers(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.peer_by_keyid("dead").unwrap().is_none());
    }

    #[test]
    fn secret_lookup_is_none_for_missing_row_and_null_secret() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.secret_for_keyid_raw("nope").unwrap(), None);

        store.insert_peer(&sample_peer("noseckey", true)).unwrap();
        assert_eq!(store.secret_for_keyid_raw("noseckey").unwrap(), None);
    }
}
