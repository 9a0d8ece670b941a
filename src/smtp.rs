//! SMTP submission boundary. The concrete submission backend is out of
//! scope (spec §1); the core depends only on this trait.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("transient submission failure: {0}")]
    Transient(String),
    #[error("permanent submission failure: {0}")]
    Permanent(String),
}

#[async_trait::async_trait]
pub trait SmtpSender {
    /// Submits `body` to `to`. A `Transient` error leaves the outbound file
    /// in place for retry next cycle; `Permanent` is treated the same way
    /// by the outbound processor today (spec §4.6 only distinguishes
    /// success from not-success), but the distinction is kept for callers
    /// that want to log differently.
    async fn send(&self, to: &str, body: &[u8]) -> Result<(), SmtpError>;
}
