//! Bit layout arithmetic shared by the catalog validator and the extractor
//!
//! DBC bit numbering: bit `n` lives in byte `n / 8` at position `n % 8`,
//! position 0 being the least-significant bit of the byte.
//!
//! Motorola (big-endian) signals name their MSB in `start_bit` and continue
//! toward lower bit numbers, wrapping to bit 7 of the next byte after bit 0.
//! Numbering the bits in that "sawtooth" order makes every Motorola signal a
//! contiguous range, which is what [`motorola_msb_index`] computes.
//!
//! Intel (little-endian) signals name their LSB and grow upward.

use crate::signals::database::{ByteOrder, SignalDefinition};

/// Sawtooth index of a Motorola start bit (bit 7 of byte 0 is index 0)
#[inline]
pub fn motorola_msb_index(start_bit: usize) -> usize {
    (start_bit / 8) * 8 + (7 - start_bit % 8)
}

/// Convert a sawtooth index back to a DBC bit number
#[inline]
pub fn sawtooth_to_bit(index: usize) -> usize {
    (index / 8) * 8 + (7 - index % 8)
}

/// Index of the last byte touched by a signal
pub fn last_byte(start_bit: usize, length: usize, byte_order: ByteOrder) -> usize {
    match byte_order {
        ByteOrder::BigEndian => (motorola_msb_index(start_bit) + length - 1) / 8,
        ByteOrder::LittleEndian => (start_bit + length - 1) / 8,
    }
}

/// Number of payload bytes a signal needs
#[inline]
pub fn required_bytes(signal: &SignalDefinition) -> usize {
    last_byte(
        signal.start_bit as usize,
        signal.length as usize,
        signal.byte_order,
    ) + 1
}

/// True if the signal lies entirely inside a frame of `frame_len` bytes
pub fn fits_in_frame(signal: &SignalDefinition, frame_len: usize) -> bool {
    signal.length > 0
        && (signal.start_bit as usize) < frame_len * 8
        && required_bytes(signal) <= frame_len
}

/// Occupancy bitmap of a signal over a frame of `frame_len` bytes.
///
/// Bit `n` of the bitmap is set when DBC bit `n` belongs to the signal.
/// Callers must have checked [`fits_in_frame`] first.
pub fn occupancy(signal: &SignalDefinition, frame_len: usize) -> Vec<u64> {
    let mut mask = vec![0u64; (frame_len * 8).div_ceil(64).max(1)];
    let start = signal.start_bit as usize;
    let length = signal.length as usize;

    let mut set = |bit: usize| mask[bit / 64] |= 1u64 << (bit % 64);
    match signal.byte_order {
        ByteOrder::BigEndian => {
            let msb = motorola_msb_index(start);
            for index in msb..msb + length {
                set(sawtooth_to_bit(index));
            }
        }
        ByteOrder::LittleEndian => {
            for bit in start..start + length {
                set(bit);
            }
        }
    }
    mask
}

/// True if two occupancy bitmaps share a bit
pub fn overlaps(a: &[u64], b: &[u64]) -> bool {
    a.iter().zip(b).any(|(x, y)| x & y != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::{SignalKind, ValueType};

    fn signal(start_bit: u16, length: u16, byte_order: ByteOrder) -> SignalDefinition {
        SignalDefinition::new(
            "Test",
            start_bit,
            length,
            byte_order,
            ValueType::Unsigned,
            SignalKind::physical(1.0, 0.0, 0.0, 0.0),
        )
    }

    #[test]
    fn test_motorola_sawtooth_index() {
        assert_eq!(motorola_msb_index(7), 0);
        assert_eq!(motorola_msb_index(0), 7);
        assert_eq!(motorola_msb_index(15), 8);
        assert_eq!(sawtooth_to_bit(8), 15);
    }

    #[test]
    fn test_motorola_span_crosses_bytes() {
        // 16 bits starting at the MSB of byte 0 covers bytes 0 and 1
        assert_eq!(last_byte(7, 16, ByteOrder::BigEndian), 1);
        // 12 bits starting at bit 3 of byte 0: 4 bits in byte 0, 8 in byte 1
        assert_eq!(last_byte(3, 12, ByteOrder::BigEndian), 1);
        assert_eq!(last_byte(0, 16, ByteOrder::LittleEndian), 1);
    }

    #[test]
    fn test_fits_in_frame() {
        assert!(fits_in_frame(&signal(7, 64, ByteOrder::BigEndian), 8));
        assert!(!fits_in_frame(&signal(63, 16, ByteOrder::BigEndian), 8));
        assert!(!fits_in_frame(&signal(56, 16, ByteOrder::LittleEndian), 8));
        assert!(!fits_in_frame(&signal(64, 1, ByteOrder::LittleEndian), 8));
    }

    #[test]
    fn test_occupancy_and_overlap() {
        let a = occupancy(&signal(7, 8, ByteOrder::BigEndian), 8);
        let b = occupancy(&signal(15, 8, ByteOrder::BigEndian), 8);
        let c = occupancy(&signal(3, 8, ByteOrder::BigEndian), 8);
        assert_eq!(a[0], 0xFF);
        assert_eq!(b[0], 0xFF00);
        assert!(!overlaps(&a, &b));
        assert!(overlaps(&a, &c));
        assert!(overlaps(&b, &c));
    }
}
