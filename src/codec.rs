//! The packet codec boundary. The concrete on-wire cryptographic format is
//! an external collaborator (spec §1, Design Note "Codec pluggability");
//! the core depends only on this trait and the `DecodedPacket` record it
//! produces.

use chrono::NaiveDate;
use thiserror::Error;

/// Output of a successful decode (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub packet_id: Vec<u8>,
    pub is_exit: bool,
    /// `1` denotes a dummy packet.
    pub exit_type: u8,
    pub message_id: Vec<u8>,
    pub chunk_num: u32,
    pub num_chunks: u32,
    pub payload: Vec<u8>,
    pub next_hop: Option<String>,
    pub expire: Option<NaiveDate>,
}

#[derive(Debug, Error)]
#[error("packet malformed: {0}")]
pub struct PacketError(pub String);

/// Decodes an on-disk packet file into a `DecodedPacket`, and re-encodes a
/// payload for onward transmission. Two formats coexist in the source this
/// spec was distilled from; the choice of codec is a matter of
/// configuration, not core source structure, hence the trait boundary.
pub trait PacketCodec {
    fn decode(&self, raw: &[u8]) -> Result<DecodedPacket, PacketError>;

    /// Builds the bytes of a re-encrypted packet destined for `chain`, the
    /// ordered list of next-hop addresses (length 1 for a direct forward or
    /// random-hop, more for genuine multi-hop construction).
    fn encode(&self, payload: &[u8], chain: &[String], is_exit: bool) -> Result<Vec<u8>, PacketError>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// A scriptable codec for exercising the inbound/outbound processors
    /// without a real cryptographic implementation. Each `decode` call pops
    /// the next queued result in order.
    pub struct ScriptedCodec {
        decode_results: RefCell<VecDeque<Result<DecodedPacket, PacketError>>>,
    }

    impl ScriptedCodec {
        pub fn new(results: Vec<Result<DecodedPacket, PacketError>>) -> Self {
            ScriptedCodec {
                decode_results: RefCell::new(results.into_iter().collect()),
            }
        }
    }

    impl PacketCodec for ScriptedCodec {
        fn decode(&self, _raw: &[u8]) -> Result<DecodedPacket, PacketError> {
            self.decode_results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(PacketError("no scripted result left".to_owned())))
        }

        fn encode(&self, payload: &[u8], chain: &[String], is_exit: bool) -> Result<Vec<u8>, PacketError> {
            let mut out = Vec::new();
            out.extend_from_slice(b"chain=");
            out.extend_from_slice(chain.join(",").as_bytes());
            out.extend_from_slice(if is_exit { b";exit;" } else { b";" });
            out.extend_from_slice(payload);
            Ok(out)
        }
    }

    pub fn exit_packet(packet_id: &[u8], payload: &[u8]) -> DecodedPacket {
        DecodedPacket {
            packet_id: packet_id.to_vec(),
            is_exit: true,
            exit_type: 0,
            message_id: b"msg".to_vec(),
            chunk_num: 1,
            num_chunks: 1,
            payload: payload.to_vec(),
            next_hop: None,
            expire: None,
        }
    }

    pub fn forward_packet(packet_id: &[u8], next_hop: &str, expire: NaiveDate) -> DecodedPacket {
        DecodedPacket {
            packet_id: packet_id.to_vec(),
            is_exit: false,
            exit_type: 0,
            message_id: b"msg".to_vec(),
            chunk_num: 1,
            num_chunks: 1,
            payload: b"re-encrypted-payload".to_vec(),
            next_hop: Some(next_hop.to_owned()),
            expire: Some(expire),
        }
    }
}
