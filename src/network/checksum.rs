//! Internet checksum (RFC 1071).
//!
//! The sum is split in two steps so that headers living in different places
//! (the TCP pseudo-header, the segment itself) can be accumulated into one
//! running total before the final fold:
//!
//! ```rust
//! use ethmqtt::network::checksum::{fold_checksum, sum_words};
//!
//! let mut acc = 0;
//! sum_words(&[0x45, 0x00, 0x00, 0x1c], &mut acc);
//! sum_words(&[0x00, 0x01], &mut acc);
//! let check = fold_checksum(acc);
//!
//! // Summing again with the checksum included folds to zero.
//! sum_words(&check.to_be_bytes(), &mut acc);
//! assert_eq!(fold_checksum(acc), 0);
//! ```

/// Add the big-endian 16-bit words of `data` into `acc`.
///
/// An odd trailing byte is treated as the high byte of a final word padded
/// with zero. Callers that accumulate several pieces must keep every piece
/// but the last an even length.
pub fn sum_words(data: &[u8], acc: &mut u32) {
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        *acc = acc.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = words.remainder() {
        *acc = acc.wrapping_add((*last as u32) << 8);
    }
}

/// Fold the carries of `acc` back into the low 16 bits and complement.
pub fn fold_checksum(mut acc: u32) -> u16 {
    while (acc >> 16) != 0 {
        acc = (acc & 0xFFFF) + (acc >> 16);
    }
    !(acc as u16)
}

/// Checksum of a single contiguous byte range.
pub fn checksum(data: &[u8]) -> u16 {
    let mut acc = 0;
    sum_words(data, &mut acc);
    fold_checksum(acc)
}
