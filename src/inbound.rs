//! Inbound processor: the per-file state machine that decodes, classifies,
//! and routes each queued inbound message (spec §4.5).

use crate::codec::PacketCodec;
use crate::envelope::Envelope;
use crate::http_client::DescriptorFetcher;
use crate::keydir::KeyDirectory;
use crate::pool::{Pool, PoolResult};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use tracing::{debug, warn};

/// The degenerate payload the original wraps in a fresh envelope for dummy
/// traffic (ground: `mimix/server.py::inject_dummy`).
pub const DUMMY_PAYLOAD: &[u8] = b"From: dummy@dummy\nTo: dummy@dummy\n\npayload";

/// Expiry window given to random-hop and dummy envelopes this node
/// originates, since neither carries a caller-supplied expiry.
const GENERATED_ENVELOPE_EXPIRY_DAYS: u64 = 7;

/// Fallback replay-log retention when a decoded packet carries no `expire`
/// of its own (e.g. a dummy).
const DEFAULT_REPLAY_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Default, Clone, Copy)]
pub struct InboundCycleStats {
    pub processed: usize,
    pub dropped_malformed: usize,
    pub dropped_replay: usize,
    pub dummies: usize,
    pub forwarded: usize,
    pub smtp_exits: usize,
    pub randhops: usize,
    pub dropped_unsupported: usize,
    pub dummy_injected: bool,
}

pub struct InboundProcessor<'a> {
    pub codec: &'a dyn PacketCodec,
    pub keydir: &'a KeyDirectory,
    pub fetcher: &'a dyn DescriptorFetcher,
    pub inbound_pool: &'a Pool,
    pub outbound_pool: &'a Pool,
    pub smtp_enabled: bool,
    pub hopspy_enabled: bool,
}

impl<'a> InboundProcessor<'a> {
    /// Runs one sweep of the inbound pool, per spec §4.5's numbered steps.
    pub async fn process_inbound(
        &self,
        now: DateTime<Utc>,
        indummy_odds: u8,
        outdummy_odds: u8,
    ) -> PoolResult<InboundCycleStats> {
        let mut stats = InboundCycleStats::default();

        let known = self.keydir.known_addresses().unwrap_or_default();
        stats.dummy_injected =
            inject_dummy(indummy_odds, &known, self.codec, self.outbound_pool, now)?;

        let mut files = self.inbound_pool.select_all()?;
        {
            use rand::seq::SliceRandom;
            files.shuffle(&mut rand::thread_rng());
        }

        for filename in files {
            self.process_one_file(&filename, now, &mut stats).await?;
        }

        if inject_dummy(outdummy_odds, &known, self.codec, self.outbound_pool, now)? {
            stats.dummy_injected = true;
        }

        Ok(stats)
    }

    async fn process_one_file(
        &self,
        filename: &str,
        now: DateTime<Utc>,
        stats: &mut InboundCycleStats,
    ) -> PoolResult<()> {
        let raw = match std::fs::read(self.inbound_pool.dir().join(filename)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%filename, error = %e, "could not read inbound file");
                return Ok(());
            }
        };

        let decoded = match self.codec.decode(&raw) {
            Ok(d) => d,
            Err(e) => {
                debug!(%filename, error = %e, "dropping malformed packet");
                stats.dropped_malformed += 1;
                self.inbound_pool.delete(filename)?;
                return Ok(());
            }
        };

        let replay_expiry = decoded
            .expire
            .map(|d| end_of_day(d))
            .unwrap_or_else(|| now + chrono::Duration::days(DEFAULT_REPLAY_RETENTION_DAYS));
        let already_seen = self
            .keydir
            .store()
            .seen_or_mark(&decoded.packet_id, replay_expiry)
            .unwrap_or(false);
        if already_seen {
            stats.dropped_replay += 1;
            self.inbound_pool.delete(filename)?;
            return Ok(());
        }

        if decoded.is_exit && decoded.exit_type == 1 {
            stats.dummies += 1;
            self.inbound_pool.delete(filename)?;
            return Ok(());
        }

        if decoded.is_exit && !self.smtp_enabled {
            if decoded.num_chunks == 1 {
                self.randhop(&decoded.payload, now, stats)?;
            } else {
                warn!("Oh dear, we currently can't randhop multipart messages.");
                stats.dropped_unsupported += 1;
            }
            self.inbound_pool.delete(filename)?;
            return Ok(());
        }

        if decoded.is_exit && self.smtp_enabled && decoded.num_chunks == 1 {
            self.outbound_pool.deposit(&decoded.payload)?;
            stats.smtp_exits += 1;
            self.inbound_pool.delete(filename)?;
            return Ok(());
        }

        if decoded.is_exit && self.smtp_enabled && decoded.num_chunks > 1 {
            let _ = self.keydir.store().chunk_insert(
                &decoded.message_id,
                i64::from(decoded.chunk_num),
                i64::from(decoded.num_chunks),
                &decoded.payload,
                now,
            );
            if self.keydir.store().chunk_complete(&decoded.message_id).unwrap_or(false) {
                if let Ok(assembled) = self.keydir.store().chunk_assemble(&decoded.message_id) {
                    self.outbound_pool.deposit(&assembled)?;
                    stats.smtp_exits += 1;
                }
            }
            self.inbound_pool.delete(filename)?;
            return Ok(());
        }

        // Intermediate hop: forward to next_hop.
        if let Some(next_hop) = &decoded.next_hop {
            if self.hopspy_enabled
                && !self.keydir.known_addresses().unwrap_or_default().contains(next_hop)
                && self.keydir.should_attempt_fetch(next_hop)
            {
                if let Ok(text) = self.fetcher.fetch_descriptor(next_hop).await {
                    let _ = self.keydir.import_peer_descriptor(next_hop, &text, now);
                }
            }

            let expire = decoded
                .expire
                .unwrap_or_else(|| crate::clock::date_plus_days(now.date_naive(), GENERATED_ENVELOPE_EXPIRY_DAYS));
            if let Ok(encoded) = self.codec.encode(&decoded.payload, &[next_hop.clone()], false) {
                let envelope = Envelope::next_hop(next_hop.clone(), expire, encoded);
                self.outbound_pool.deposit(envelope.render().as_bytes())?;
                stats.forwarded += 1;
            }
        }
        self.inbound_pool.delete(filename)?;
        Ok(())
    }

    /// Bounces a non-SMTP exit payload through one randomly chosen known
    /// peer (spec §4.5 "Random-hop").
    fn randhop(&self, payload: &[u8], now: DateTime<Utc>, stats: &mut InboundCycleStats) {
        let known = self.keydir.known_addresses().unwrap_or_default();
        if known.is_empty() {
            warn!("randhop requested but no known addresses are available");
            return;
        }
        let chosen = &known[rand::thread_rng().gen_range(0..known.len())];
        let expire = crate::clock::date_plus_days(now.date_naive(), GENERATED_ENVELOPE_EXPIRY_DAYS);
        if let Ok(encoded) = self.codec.encode(payload, &[chosen.clone()], false) {
            let envelope = Envelope::next_hop(chosen.clone(), expire, encoded);
            if self.outbound_pool.deposit(envelope.render().as_bytes()).is_ok() {
                stats.randhops += 1;
            }
        }
    }
}

fn end_of_day(d: NaiveDate) -> DateTime<Utc> {
    d.and_hms_opt(23, 59, 59).unwrap().and_utc()
}

/// With probability `odds`%, builds a fresh dummy envelope chained through a
/// random known address and deposits it directly into the outbound pool —
/// it never passes through the inbound decode path (ground:
/// `mimix/server.py::inject_dummy`).
pub fn inject_dummy(
    odds: u8,
    known_addresses: &[String],
    codec: &dyn PacketCodec,
    outbound_pool: &Pool,
    now: DateTime<Utc>,
) -> PoolResult<bool> {
    if odds == 0 || known_addresses.is_empty() {
        return Ok(false);
    }
    let roll = rand::thread_rng().gen_range(1..=100u8);
    if roll > odds {
        return Ok(false);
    }
    let chosen = &known_addresses[rand::thread_rng().gen_range(0..known_addresses.len())];
    let Ok(encoded) = codec.encode(DUMMY_PAYLOAD, &[chosen.clone()], false) else {
        return Ok(false);
    };
    let expire = crate::clock::date_plus_days(now.date_naive(), GENERATED_ENVELOPE_EXPIRY_DAYS);
    let envelope = Envelope::next_hop(chosen.clone(), expire, encoded);
    outbound_pool.deposit(envelope.render().as_bytes())?;
    Ok(true)
}
