//! Peer descriptor wire format: the `/remailer-conf.txt` document (spec
//! §6). Parsing is grounded on `newmix/keys.py::conf_fetch`'s key/value +
//! PEM block scan; emission mirrors `newmix/keys.py::advertise`'s layout.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDescriptor {
    pub name: String,
    pub address: String,
    pub keyid: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub smtp: bool,
    pub pubkey_pem: String,
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("malformed PEM block")]
    MalformedPem,
    #[error("invalid date in field '{field}': {value}")]
    InvalidDate { field: &'static str, value: String },
}

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Parses the key/value header block and PEM public key out of a
/// descriptor document. Does not validate KeyID binding or the validity
/// window — that is the caller's job (`crate::keydir`), since it needs a
/// `now` to check against.
pub fn parse_descriptor(text: &str) -> Result<ParsedDescriptor, DescriptorError> {
    let pem_start = text.find(PEM_BEGIN).ok_or(DescriptorError::MalformedPem)?;
    let pem_end_marker = text.rfind(PEM_END).ok_or(DescriptorError::MalformedPem)?;
    if pem_end_marker < pem_start {
        return Err(DescriptorError::MalformedPem);
    }
    let pem_end = pem_end_marker + PEM_END.len();
    let pubkey_pem = text[pem_start..pem_end].trim().to_owned();

    let header = &text[..pem_start];
    let mut name = None;
    let mut address = None;
    let mut keyid = None;
    let mut valid_from = None;
    let mut valid_to = None;
    let mut smtp = false;

    for line in header.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        match key.as_str() {
            "name" => name = Some(value.to_owned()),
            "address" => address = Some(value.to_owned()),
            "keyid" => keyid = Some(value.to_owned()),
            "valid from" => {
                valid_from = Some(NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
                    DescriptorError::InvalidDate {
                        field: "Valid From",
                        value: value.to_owned(),
                    }
                })?);
            }
            "valid to" => {
                valid_to = Some(NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
                    DescriptorError::InvalidDate {
                        field: "Valid To",
                        value: value.to_owned(),
                    }
                })?);
            }
            "smtp" => smtp = value == "1",
            _ => {}
        }
    }

    Ok(ParsedDescriptor {
        name: name.ok_or(DescriptorError::MissingField("Name"))?,
        address: address.ok_or(DescriptorError::MissingField("Address"))?,
        keyid: keyid.ok_or(DescriptorError::MissingField("KeyID"))?,
        valid_from: valid_from.ok_or(DescriptorError::MissingField("Valid From"))?,
        valid_to: valid_to.ok_or(DescriptorError::MissingField("Valid To"))?,
        smtp,
        pubkey_pem,
    })
}

/// Renders the descriptor document this node advertises about itself,
/// including the `Known remailers:-` trailer of every other advertised
/// peer address.
pub fn render_descriptor(
    name: &str,
    address: &str,
    keyid: &str,
    valid_from: NaiveDate,
    valid_to: NaiveDate,
    smtp: bool,
    pubkey_pem: &str,
    known_remailers: &[String],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Name: {name}\n"));
    out.push_str(&format!("Address: {address}\n"));
    out.push_str(&format!("KeyID: {keyid}\n"));
    out.push_str(&format!("Valid From: {}\n", valid_from.format("%Y-%m-%d")));
    out.push_str(&format!("Valid To:   {}\n", valid_to.format("%Y-%m-%d")));
    out.push_str(&format!("SMTP: {}\n", if smtp { 1 } else { 0 }));
    out.push('\n');
    out.push_str(pubkey_pem.trim());
    out.push_str("\n\n");
    out.push_str("Known remailers:-\n");
    for addr in known_remailers {
        out.push_str(addr);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Name: test-remailer\n\
Address: mix.example.com\n\
KeyID: abcdef0123456789abcdef0123456789\n\
Valid From: 2026-01-01\n\
Valid To:   2026-12-31\n\
SMTP: 1\n\
\n\
-----BEGIN PUBLIC KEY-----\n\
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA\n\
-----END PUBLIC KEY-----\n\
\n\
Known remailers:-\n\
peerb.example.com\n";

    #[test]
    fn parses_full_descriptor() {
        let parsed = parse_descriptor(SAMPLE).unwrap();
        assert_eq!(parsed.name, "test-remailer");
        assert_eq!(parsed.address, "mix.example.com");
        assert_eq!(parsed.keyid, "abcdef0123456789abcdef0123456789");
        assert!(parsed.smtp);
        assert!(parsed.pubkey_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(parsed.pubkey_pem.ends_with("-----END PUBLIC KEY-----"));
    }

    #[test]
    fn missing_pem_block_is_rejected() {
        let err = parse_descriptor("Name: x\nAddress: y\n").unwrap_err();
        assert!(matches!(err, DescriptorError::MalformedPem));
    }

    #[test]
    fn render_then_parse_round_trips_fields() {
        let valid_from = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let valid_to = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let rendered = render_descriptor(
            "my-node",
            "mix.example.com",
            "deadbeef",
            valid_from,
            valid_to,
            true,
            "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----",
            &["peer-a.example.com".to_owned(), "peer-b.example.com".to_owned()],
        );
        let parsed = parse_descriptor(&rendered).unwrap();
        assert_eq!(parsed.name, "my-node");
        assert_eq!(parsed.keyid, "deadbeef");
        assert_eq!(parsed.valid_from, valid_from);
        assert_eq!(parsed.valid_to, valid_to);
        assert!(rendered.contains("Known remailers:-\npeer-a.example.com\npeer-b.example.com\n"));
    }
}
