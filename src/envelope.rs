//! Outbound pool file envelope: RFC-5322-style headers, a blank line, and a
//! body whose encoding depends on the destination (spec §6). Enforces
//! invariant 3 — exactly one of `To:` or (`Next-Hop:` + `Expire:`), never
//! both, never neither.
//!
//! `body` holds exactly the bytes this node writes to (and reads from) the
//! blank-line-separated body section, with no further transformation:
//! a `SmtpExit` body is the raw RFC-5322 message this node hands to SMTP
//! untouched; a `NextHop` body is the already-base64-encoded ciphertext
//! blob this node forwards to the next hop untouched. This node never
//! decrypts or decodes a `NextHop` body — only the eventual recipient can
//! (ground: `mimix/server.py::process_outbound`, which posts
//! `msg.get_payload()` — the literal base64 form field — without decoding).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    SmtpExit { to: String },
    NextHop { next_hop: String, expire: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub destination: Destination,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope has neither To: nor Next-Hop: header")]
    NoDestination,
    #[error("envelope carries both To: and Next-Hop: headers")]
    AmbiguousDestination,
    #[error("Next-Hop: present without required Expire: header")]
    MissingExpire,
    #[error("Expire: header is not a valid date: {0}")]
    InvalidExpireDate(String),
    #[error("envelope has no blank line separating headers from body")]
    MissingBodySeparator,
}

impl Envelope {
    /// `payload` is the raw RFC-5322 message bytes, written to the pool
    /// file as-is.
    pub fn smtp_exit(to: impl Into<String>, payload: Vec<u8>) -> Self {
        Envelope {
            destination: Destination::SmtpExit { to: to.into() },
            body: payload,
        }
    }

    /// `ciphertext` is the raw bytes produced by the packet codec for the
    /// next hop; base64-encoded once here so `render`/`parse` never need to
    /// touch the encoding again.
    pub fn next_hop(next_hop: impl Into<String>, expire: NaiveDate, ciphertext: Vec<u8>) -> Self {
        Envelope {
            destination: Destination::NextHop {
                next_hop: next_hop.into(),
                expire,
            },
            body: BASE64.encode(ciphertext).into_bytes(),
        }
    }

    /// Renders the RFC-5322-style text form written to the outbound pool.
    /// `body` is already in its on-wire form, so this just places it after
    /// the header block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.destination {
            Destination::SmtpExit { to } => {
                out.push_str(&format!("To: {to}\n\n"));
                out.push_str(&String::from_utf8_lossy(&self.body));
            }
            Destination::NextHop { next_hop, expire } => {
                out.push_str(&format!("Next-Hop: {next_hop}\n"));
                out.push_str(&format!("Expire: {}\n\n", expire.format("%Y-%m-%d")));
                out.push_str(&String::from_utf8_lossy(&self.body));
                out.push('\n');
            }
        }
        out
    }

    /// Parses a pool file's text back into an envelope, validating the
    /// exclusivity invariant along the way. Never decodes the body — it is
    /// stored exactly as found, since only the `SmtpExit` branch is this
    /// node's own business and the `NextHop` branch is forwarded opaque.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let (header_block, body_block) = text
            .split_once("\n\n")
            .ok_or(EnvelopeError::MissingBodySeparator)?;

        let mut to = None;
        let mut next_hop = None;
        let mut expire = None;

        for line in header_block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_lowercase().as_str() {
                "to" => to = Some(value.to_owned()),
                "next-hop" => next_hop = Some(value.to_owned()),
                "expire" => expire = Some(value.to_owned()),
                _ => {}
            }
        }

        let destination = match (to, next_hop) {
            (Some(_), Some(_)) => return Err(EnvelopeError::AmbiguousDestination),
            (None, None) => return Err(EnvelopeError::NoDestination),
            (Some(to), None) => Destination::SmtpExit { to },
            (None, Some(next_hop)) => {
                let expire_str = expire.ok_or(EnvelopeError::MissingExpire)?;
                let expire = NaiveDate::parse_from_str(&expire_str, "%Y-%m-%d")
                    .map_err(|_| EnvelopeError::InvalidExpireDate(expire_str))?;
                Destination::NextHop { next_hop, expire }
            }
        };

        let body = match &destination {
            Destination::SmtpExit { .. } => body_block.as_bytes().to_vec(),
            Destination::NextHop { .. } => body_block.trim().as_bytes().to_vec(),
        };
        Ok(Envelope { destination, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_envelope_round_trips() {
        let env = Envelope::smtp_exit("recipient@example.com", b"payload".to_vec());
        let rendered = env.render();
        let parsed = Envelope::parse(&rendered).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn next_hop_envelope_round_trips() {
        let expire = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let env = Envelope::next_hop("peerb.example.com", expire, b"payload".to_vec());
        let parsed = Envelope::parse(&env.render()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn next_hop_without_expire_is_rejected() {
        let text = "Next-Hop: peerb.example.com\n\ncGF5bG9hZA==\n";
        let err = Envelope::parse(text).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingExpire));
    }

    #[test]
    fn both_headers_present_is_rejected() {
        let text = "To: a@example.com\nNext-Hop: peerb.example.com\nExpire: 2026-01-01\n\ncGF5bG9hZA==\n";
        let err = Envelope::parse(text).unwrap_err();
        assert!(matches!(err, EnvelopeError::AmbiguousDestination));
    }

    #[test]
    fn neither_header_present_is_rejected() {
        let text = "Subject: nothing\n\ncGF5bG9hZA==\n";
        let err = Envelope::parse(text).unwrap_err();
        assert!(matches!(err, EnvelopeError::NoDestination));
    }
}
