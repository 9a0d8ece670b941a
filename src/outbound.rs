//! Outbound processor: parses each released pool file as an envelope and
//! either submits it via SMTP or POSTs it to its next hop (spec §4.6).

use crate::envelope::{Destination, Envelope};
use crate::http_client::EnvelopePoster;
use crate::keydir::KeyDirectory;
use crate::pool::{CottrellPool, PoolResult};
use crate::smtp::SmtpSender;
use chrono::{DateTime, Utc};
use tracing::{error, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct OutboundCycleStats {
    pub released: usize,
    pub email_sent: usize,
    pub email_failed: usize,
    pub forwarded: usize,
    pub forward_failed: usize,
    pub dropped_protocol_error: usize,
    pub dropped_expired: usize,
}

pub struct OutboundProcessor<'a> {
    pub pool: &'a CottrellPool,
    pub smtp: &'a dyn SmtpSender,
    pub poster: &'a dyn EnvelopePoster,
    pub keydir: &'a KeyDirectory,
    pub rate: u8,
}

impl<'a> OutboundProcessor<'a> {
    pub async fn process_outbound(&self, now: DateTime<Utc>) -> PoolResult<OutboundCycleStats> {
        let mut stats = OutboundCycleStats::default();
        let filenames = self.pool.release_subset(self.rate, now)?;
        stats.released = filenames.len();

        for filename in filenames {
            self.process_one_file(&filename, now, &mut stats).await?;
        }
        Ok(stats)
    }

    async fn process_one_file(
        &self,
        filename: &str,
        now: DateTime<Utc>,
        stats: &mut OutboundCycleStats,
    ) -> PoolResult<()> {
        let pool = self.pool.pool();
        let text = match std::fs::read_to_string(pool.dir().join(filename)) {
            Ok(t) => t,
            Err(e) => {
                warn!(%filename, error = %e, "could not read outbound file");
                return Ok(());
            }
        };

        let envelope = match Envelope::parse(&text) {
            Ok(e) => e,
            Err(e) => {
                error!(%filename, error = %e, "protocol error in outbound envelope");
                stats.dropped_protocol_error += 1;
                pool.delete(filename)?;
                return Ok(());
            }
        };

        match envelope.destination {
            Destination::SmtpExit { to } => match self.smtp.send(&to, &envelope.body).await {
                Ok(()) => {
                    stats.email_sent += 1;
                    pool.delete(filename)?;
                }
                Err(e) => {
                    warn!(%filename, %to, error = %e, "transient SMTP failure, retrying next cycle");
                    stats.email_failed += 1;
                }
            },
            Destination::NextHop { next_hop, expire } => {
                if expire < now.date_naive() {
                    warn!(%filename, %next_hop, "outbound envelope expired, dropping");
                    stats.dropped_expired += 1;
                    self.keydir.down_mark(&next_hop);
                    pool.delete(filename)?;
                    return Ok(());
                }

                // `envelope.body` is already the base64 text this node
                // received; forwarded verbatim, never re-encoded.
                let base64_body = String::from_utf8_lossy(&envelope.body);
                match self.poster.post_envelope(&next_hop, &base64_body).await {
                    Ok(()) => {
                        stats.forwarded += 1;
                        pool.delete(filename)?;
                    }
                    Err(e) => {
                        warn!(%filename, %next_hop, error = %e, "transient forwarding failure, retrying next cycle");
                        stats.forward_failed += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::test_support::{HttpErrorKind, StubHttpClient};
    use crate::pool::Pool;
    use crate::smtp::test_support::RecordingSender;
    use crate::storage::Store;
    use chrono::{NaiveDate, TimeZone};

    fn setup_pool(dir: &std::path::Path) -> CottrellPool {
        let inner = Pool::open(dir).unwrap();
        CottrellPool::new(inner, 0, chrono::Duration::hours(1))
    }

    #[tokio::test]
    async fn s2_smtp_destination_is_sent_and_deleted_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let cottrell = setup_pool(dir.path());
        let env = Envelope::smtp_exit("a@example.com", b"payload".to_vec());
        cottrell.pool().deposit(env.render().as_bytes()).unwrap();

        let store = Store::open_in_memory().unwrap();
        let keydir = KeyDirectory::new(store);
        let smtp = RecordingSender::default();
        let poster = StubHttpClient::default();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let proc = OutboundProcessor {
            pool: &cottrell,
            smtp: &smtp,
            poster: &poster,
            keydir: &keydir,
            rate: 100,
        };
        let stats = proc.process_outbound(now).await.unwrap();

        assert_eq!(stats.email_sent, 1);
        assert!(cottrell.pool().select_all().unwrap().is_empty());
        assert_eq!(smtp.sent.borrow()[0], ("a@example.com".to_owned(), b"payload".to_vec()));
    }

    #[tokio::test]
    async fn s5_expired_next_hop_is_dropped_without_posting() {
        let dir = tempfile::tempdir().unwrap();
        let cottrell = setup_pool(dir.path());
        let expire = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let env = Envelope::next_hop("peerc.example.com", expire, b"payload".to_vec());
        cottrell.pool().deposit(env.render().as_bytes()).unwrap();

        let store = Store::open_in_memory().unwrap();
        let keydir = KeyDirectory::new(store);
        let smtp = RecordingSender::default();
        let poster = StubHttpClient::default();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let proc = OutboundProcessor {
            pool: &cottrell,
            smtp: &smtp,
            poster: &poster,
            keydir: &keydir,
            rate: 100,
        };
        let stats = proc.process_outbound(now).await.unwrap();

        assert_eq!(stats.dropped_expired, 1);
        assert!(poster.posted.borrow().is_empty());
        assert!(cottrell.pool().select_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_forward_failure_leaves_file_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let cottrell = setup_pool(dir.path());
        let expire = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let env = Envelope::next_hop("peerc.example.com", expire, b"payload".to_vec());
        cottrell.pool().deposit(env.render().as_bytes()).unwrap();

        let store = Store::open_in_memory().unwrap();
        let keydir = KeyDirectory::new(store);
        let smtp = RecordingSender::default();
        let poster = StubHttpClient::default();
        poster
            .post_results
            .borrow_mut()
            .insert("peerc.example.com".to_owned(), Err(HttpErrorKind::Connect));
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let proc = OutboundProcessor {
            pool: &cottrell,
            smtp: &smtp,
            poster: &poster,
            keydir: &keydir,
            rate: 100,
        };
        let stats = proc.process_outbound(now).await.unwrap();

        assert_eq!(stats.forward_failed, 1);
        assert_eq!(cottrell.pool().select_all().unwrap().len(), 1);
    }
}
