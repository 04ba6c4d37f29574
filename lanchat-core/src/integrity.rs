//! Integrity: additive PDU checksum, verify on receive.
//!
//! The checksum is a wrapping `u32` sum of every byte before the checksum
//! field. It catches any single-byte change but not reordered bytes or
//! changes that cancel each other out.

use crate::wire::{self, Pdu, OFFSET_CHECKSUM};

/// Wrapping byte sum.
pub fn checksum_bytes(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

/// Checksum over the first `message_length - 4` (285) encoded bytes of a PDU.
pub fn checksum(pdu: &Pdu) -> u32 {
    checksum_bytes(&wire::encode(pdu)[..OFFSET_CHECKSUM])
}

/// Verify the checksum field against the PDU contents.
pub fn verify(pdu: &Pdu) -> bool {
    checksum(pdu) == pdu.checksum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SenderId;
    use crate::wire::{encode, PDU_SIZE};

    fn sample() -> Pdu {
        Pdu::chat(&SenderId::new("alice").unwrap(), "hello", 42).unwrap()
    }

    #[test]
    fn checksum_is_sum_of_covered_bytes() {
        let pdu = sample();
        let frame = encode(&pdu);
        let expected: u32 = frame[..PDU_SIZE - 4].iter().map(|&b| b as u32).sum();
        assert_eq!(pdu.checksum, expected);
        assert!(verify(&pdu));
    }

    #[test]
    fn checksum_ignores_its_own_field() {
        let mut pdu = sample();
        let before = checksum(&pdu);
        pdu.checksum = 0xdead_beef;
        assert_eq!(checksum(&pdu), before);
        assert!(!verify(&pdu));
    }

    #[test]
    fn any_single_byte_change_is_detected() {
        let frame = encode(&sample());
        let original = checksum_bytes(&frame[..OFFSET_CHECKSUM]);
        for i in 0..OFFSET_CHECKSUM {
            let mut mutated = frame;
            mutated[i] = mutated[i].wrapping_add(1);
            assert_ne!(checksum_bytes(&mutated[..OFFSET_CHECKSUM]), original, "byte {i}");
        }
    }

    #[test]
    fn reordering_is_not_detected() {
        let mut pdu = sample();
        pdu.payload.swap(0, 1);
        assert_eq!(checksum(&pdu), sample().checksum);
    }

    #[test]
    fn sum_wraps() {
        let bytes = vec![0xffu8; 1 << 25];
        assert_eq!(
            checksum_bytes(&bytes),
            (0xffu64 * (1u64 << 25) % (1u64 << 32)) as u32
        );
    }
}
