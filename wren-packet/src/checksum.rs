//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use internet_checksum::Checksum;

/// Computes the RFC 791 one's-complement checksum over the concatenation of
/// `parts`.
///
/// A result of zero is rewritten to all-ones, so a stored checksum of zero
/// never verifies by accident. The checksum field itself must be excluded
/// from (or zeroed in) the input.
pub fn checksum(parts: &[&[u8]]) -> u16 {
    let mut cksum = Checksum::new();
    for part in parts {
        cksum.add_bytes(part);
    }
    let cksum = u16::from_be_bytes(cksum.checksum());
    if cksum == 0 { 0xffff } else { cksum }
}

/// Verifies a stored checksum against the one computed over `parts` (with
/// the stored field excluded or zeroed).
pub fn verify(stored: u16, parts: &[&[u8]]) -> bool {
    stored == checksum(parts)
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1071_example() {
        // Example words from RFC 1071 section 3.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&[&data]), !0xddf2);
    }

    #[test]
    fn scattered_parts_equal_contiguous() {
        let data = [0x45, 0x00, 0x00, 0x1c, 0xab, 0xcd, 0x40, 0x00];
        let contiguous = checksum(&[&data]);
        let scattered = checksum(&[&data[..3], &data[3..6], &data[6..]]);
        assert_eq!(contiguous, scattered);
    }

    #[test]
    fn odd_length_trailing_byte() {
        let even = checksum(&[&[0xab, 0x00]]);
        let odd = checksum(&[&[0xab]]);
        assert_eq!(even, odd);
    }

    #[test]
    fn zero_result_becomes_all_ones() {
        // The sum of 0xffff 0xffff one's-complements to zero.
        assert_eq!(checksum(&[&[0xff, 0xff, 0xff, 0xff]]), 0xffff);
    }
}
