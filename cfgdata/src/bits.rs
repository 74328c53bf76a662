// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sub-byte field access inside array items.
//!
//! A field is read as the little-endian word starting at the byte that holds
//! its first bit, so `bit_offset % 8 + bit_width` must not exceed 32. Wider
//! fields are not representable in the blob format.

/// Reads `bit_width` bits starting at `bit_offset`. Bytes past the end of
/// `bytes` read as zero.
pub fn read_bits(bytes: &[u8], bit_offset: usize, bit_width: usize) -> u32 {
    debug_assert!(bit_offset % 8 + bit_width <= 32);

    let mut word = [0u8; 4];
    if let Some(src) = bytes.get(bit_offset / 8..) {
        let n = src.len().min(word.len());
        word[..n].copy_from_slice(&src[..n]);
    }
    let value = u32::from_le_bytes(word) >> (bit_offset % 8);
    if bit_width >= 32 {
        value
    } else {
        value & ((1u32 << bit_width) - 1)
    }
}

/// Reads the id of an array item.
pub fn extract_item_id(bit_offset: u8, bit_width: u8, item: &[u8]) -> u32 {
    read_bits(item, usize::from(bit_offset), usize::from(bit_width))
}

pub fn bit_is_set(bytes: &[u8], bit: usize) -> bool {
    bytes
        .get(bit / 8)
        .map_or(false, |byte| byte & (1 << (bit % 8)) != 0)
}

/// Sets or clears a single bit. Returns false if `bit` lies outside `bytes`.
pub fn write_bit(bytes: &mut [u8], bit: usize, value: bool) -> bool {
    match bytes.get_mut(bit / 8) {
        Some(byte) => {
            if value {
                *byte |= 1 << (bit % 8);
            } else {
                *byte &= !(1 << (bit % 8));
            }
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_aligned_fields() {
        let item = [0x0A, 0x55, 0xAA, 0xFF];
        assert_eq!(read_bits(&item, 0, 8), 0x0A);
        assert_eq!(read_bits(&item, 8, 8), 0x55);
        assert_eq!(read_bits(&item, 0, 16), 0x550A);
        assert_eq!(read_bits(&item, 0, 32), 0xFFAA_550A);
    }

    #[test]
    fn fields_straddling_bytes() {
        // 0b1011_0110_1100_0011
        let item = [0xC3, 0xB6];
        assert_eq!(read_bits(&item, 4, 8), 0x6C);
        assert_eq!(read_bits(&item, 6, 3), 0b011);
        assert_eq!(read_bits(&item, 13, 3), 0b101);
        assert_eq!(read_bits(&item, 15, 1), 1);
    }

    #[test]
    fn reading_past_the_end_yields_zeros() {
        let item = [0xFF, 0x01];
        assert_eq!(read_bits(&item, 8, 16), 0x01);
        assert_eq!(read_bits(&item, 16, 8), 0);
        assert_eq!(read_bits(&[], 0, 8), 0);
    }

    #[test]
    fn item_id_uses_offset_and_width() {
        let item = [0x00, 0x50, 0x01, 0x00];
        assert_eq!(extract_item_id(12, 8, &item), 0x15);
    }

    #[test]
    fn write_then_read_every_bit() {
        for bit in 0..32 {
            let mut bytes = [0u8; 4];
            assert!(write_bit(&mut bytes, bit, true));
            assert_eq!(u32::from_le_bytes(bytes), 1 << bit);
            assert!(bit_is_set(&bytes, bit));
            assert_eq!(read_bits(&bytes, bit, 1), 1);

            let mut bytes = [0xFFu8; 4];
            assert!(write_bit(&mut bytes, bit, false));
            assert_eq!(u32::from_le_bytes(bytes), !(1 << bit));
            assert!(!bit_is_set(&bytes, bit));
        }
    }

    #[test]
    fn write_bit_outside_is_refused() {
        let mut bytes = [0u8; 2];
        assert!(!write_bit(&mut bytes, 16, true));
        assert_eq!(bytes, [0, 0]);
        assert!(!bit_is_set(&bytes, 16));
    }
}
