//! Framing: fixed 289-byte PDU, little-endian integers, NUL-padded text fields.
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 1    | message_type     |
//! | 1      | 4    | message_length   |
//! | 5      | 8    | timestamp (secs) |
//! | 13     | 16   | sender_id        |
//! | 29     | 256  | payload          |
//! | 285    | 4    | checksum         |

use crate::identity::SenderId;
use crate::integrity;
use crate::protocol::MSG_TYPE_CHAT;

/// Size of every PDU on the wire.
pub const PDU_SIZE: usize = 289;
pub const SENDER_ID_LEN: usize = 16;
pub const PAYLOAD_LEN: usize = 256;

const OFFSET_LENGTH: usize = 1;
const OFFSET_TIMESTAMP: usize = 5;
const OFFSET_SENDER: usize = 13;
pub(crate) const OFFSET_PAYLOAD: usize = 29;
pub(crate) const OFFSET_CHECKSUM: usize = 285;

/// Bytes of a PDU that are not payload: 29 before it, 4 after it.
const NON_PAYLOAD_LEN: u32 = 33;

/// One protocol data unit. `message_length` is always [`PDU_SIZE`] for frames we build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub message_type: u8,
    pub message_length: u32,
    pub timestamp: u64,
    pub sender_id: [u8; SENDER_ID_LEN],
    pub payload: [u8; PAYLOAD_LEN],
    pub checksum: u32,
}

impl Pdu {
    /// Build a chat PDU with the checksum populated. Text longer than 256 bytes is rejected.
    pub fn chat(sender: &SenderId, text: &str, timestamp: u64) -> Result<Self, PduEncodeError> {
        let mut pdu = Pdu {
            message_type: MSG_TYPE_CHAT,
            message_length: PDU_SIZE as u32,
            timestamp,
            sender_id: *sender.as_bytes(),
            payload: pad_field("payload", text)?,
            checksum: 0,
        };
        pdu.checksum = integrity::checksum(&pdu);
        Ok(pdu)
    }

    pub fn is_chat(&self) -> bool {
        self.message_type == MSG_TYPE_CHAT
    }

    /// Sender name up to the first NUL.
    pub fn sender_name(&self) -> String {
        unpad_field(&self.sender_id)
    }

    /// Payload text up to the first NUL.
    pub fn text(&self) -> String {
        unpad_field(&self.payload)
    }

    /// Payload bytes the length field accounts for. Always 256 for well-formed frames.
    pub fn payload_capacity(&self) -> usize {
        self.message_length.saturating_sub(NON_PAYLOAD_LEN) as usize
    }
}

/// Copy `text` into a NUL-padded fixed field. Text that exactly fills the field has no terminator.
pub fn pad_field<const N: usize>(field: &'static str, text: &str) -> Result<[u8; N], PduEncodeError> {
    let bytes = text.as_bytes();
    if bytes.len() > N {
        return Err(PduEncodeError::FieldTooLong {
            field,
            len: bytes.len(),
            max: N,
        });
    }
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn unpad_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Error building a PDU (text does not fit its fixed field).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PduEncodeError {
    #[error("{field} is {len} bytes, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Serialize a PDU into exactly [`PDU_SIZE`] bytes.
pub fn encode(pdu: &Pdu) -> [u8; PDU_SIZE] {
    let mut out = [0u8; PDU_SIZE];
    out[0] = pdu.message_type;
    out[OFFSET_LENGTH..OFFSET_TIMESTAMP].copy_from_slice(&pdu.message_length.to_le_bytes());
    out[OFFSET_TIMESTAMP..OFFSET_SENDER].copy_from_slice(&pdu.timestamp.to_le_bytes());
    out[OFFSET_SENDER..OFFSET_PAYLOAD].copy_from_slice(&pdu.sender_id);
    out[OFFSET_PAYLOAD..OFFSET_CHECKSUM].copy_from_slice(&pdu.payload);
    out[OFFSET_CHECKSUM..].copy_from_slice(&pdu.checksum.to_le_bytes());
    out
}

/// Decode one frame and verify its checksum.
pub fn decode(bytes: &[u8]) -> Result<Pdu, PduDecodeError> {
    let pdu = decode_unverified(bytes)?;
    let computed = integrity::checksum_bytes(&bytes[..OFFSET_CHECKSUM]);
    if computed != pdu.checksum {
        return Err(PduDecodeError::ChecksumMismatch {
            received: pdu.checksum,
            computed,
        });
    }
    Ok(pdu)
}

/// Decode one frame without checking the checksum field.
pub fn decode_unverified(bytes: &[u8]) -> Result<Pdu, PduDecodeError> {
    if bytes.len() != PDU_SIZE {
        return Err(PduDecodeError::MalformedFrame { len: bytes.len() });
    }
    let message_length = read_u32(bytes, OFFSET_LENGTH);
    if message_length as usize != PDU_SIZE {
        return Err(PduDecodeError::BadLength {
            declared: message_length,
        });
    }
    let mut sender_id = [0u8; SENDER_ID_LEN];
    sender_id.copy_from_slice(&bytes[OFFSET_SENDER..OFFSET_PAYLOAD]);
    let mut payload = [0u8; PAYLOAD_LEN];
    let payload_end = OFFSET_PAYLOAD + (message_length - NON_PAYLOAD_LEN) as usize;
    payload.copy_from_slice(&bytes[OFFSET_PAYLOAD..payload_end]);
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&bytes[OFFSET_TIMESTAMP..OFFSET_SENDER]);
    Ok(Pdu {
        message_type: bytes[0],
        message_length,
        timestamp: u64::from_le_bytes(timestamp),
        sender_id,
        payload,
        checksum: read_u32(bytes, OFFSET_CHECKSUM),
    })
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Error decoding a frame (wrong size, bad length field, or checksum mismatch).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PduDecodeError {
    #[error("malformed frame: {len} bytes, expected {}", PDU_SIZE)]
    MalformedFrame { len: usize },
    #[error("declared message length {declared}, expected {}", PDU_SIZE)]
    BadLength { declared: u32 },
    #[error("checksum mismatch: received {received:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { received: u32, computed: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_hello() -> Pdu {
        let sender = SenderId::new("alice").unwrap();
        Pdu::chat(&sender, "hello", 1_700_000_000).unwrap()
    }

    #[test]
    fn roundtrip_chat() {
        let pdu = alice_hello();
        let frame = encode(&pdu);
        assert_eq!(frame.len(), PDU_SIZE);
        assert_eq!(decode(&frame).unwrap(), pdu);
    }

    #[test]
    fn roundtrip_full_fields() {
        let name = "sixteen-chars-id";
        let text = "x".repeat(PAYLOAD_LEN);
        let pdu = Pdu::chat(&SenderId::new(name).unwrap(), &text, u64::MAX).unwrap();
        let decoded = decode(&encode(&pdu)).unwrap();
        assert_eq!(decoded.sender_name(), name);
        assert_eq!(decoded.text(), text);
        assert_eq!(decoded.timestamp, u64::MAX);
    }

    #[test]
    fn field_offsets_are_fixed() {
        let pdu = alice_hello();
        let frame = encode(&pdu);
        assert_eq!(frame[0], MSG_TYPE_CHAT);
        assert_eq!(&frame[1..5], &289u32.to_le_bytes());
        assert_eq!(&frame[5..13], &1_700_000_000u64.to_le_bytes());
        assert_eq!(&frame[13..18], b"alice");
        assert!(frame[18..29].iter().all(|&b| b == 0));
        assert_eq!(&frame[29..34], b"hello");
        assert!(frame[34..285].iter().all(|&b| b == 0));
        assert_eq!(&frame[285..], &pdu.checksum.to_le_bytes());
    }

    #[test]
    fn payload_capacity_is_fixed() {
        assert_eq!(alice_hello().payload_capacity(), PAYLOAD_LEN);
    }

    #[test]
    fn rejects_wrong_sizes() {
        let frame = encode(&alice_hello());
        for len in [0, 1, PDU_SIZE - 1] {
            assert_eq!(
                decode(&frame[..len]),
                Err(PduDecodeError::MalformedFrame { len })
            );
        }
        let mut long = frame.to_vec();
        long.push(0);
        assert_eq!(
            decode(&long),
            Err(PduDecodeError::MalformedFrame { len: PDU_SIZE + 1 })
        );
    }

    #[test]
    fn rejects_declared_length_mismatch() {
        let mut frame = encode(&alice_hello());
        frame[1..5].copy_from_slice(&300u32.to_le_bytes());
        assert_eq!(
            decode_unverified(&frame),
            Err(PduDecodeError::BadLength { declared: 300 })
        );
    }

    #[test]
    fn rejects_corrupted_payload() {
        let mut frame = encode(&alice_hello());
        frame[OFFSET_PAYLOAD] ^= 0x01;
        assert!(matches!(
            decode(&frame),
            Err(PduDecodeError::ChecksumMismatch { .. })
        ));
        let lenient = decode_unverified(&frame).unwrap();
        assert_eq!(lenient.text(), "iello");
    }

    #[test]
    fn rejects_oversized_text() {
        let sender = SenderId::new("bob").unwrap();
        let text = "y".repeat(PAYLOAD_LEN + 1);
        assert_eq!(
            Pdu::chat(&sender, &text, 0),
            Err(PduEncodeError::FieldTooLong {
                field: "payload",
                len: PAYLOAD_LEN + 1,
                max: PAYLOAD_LEN,
            })
        );
    }

    #[test]
    fn text_stops_at_first_nul() {
        let mut pdu = alice_hello();
        pdu.payload[2] = 0;
        assert_eq!(pdu.text(), "he");
    }
}
