//! # Byte Stuffing
//!
//! Escapes boundary and escape values inside a frame so the receiver can find
//! frame edges by scanning for `0x7E`.
//!
//! The first and last byte (the boundary markers) pass through untouched.
//! Every interior `0x7E` or `0x7D` becomes `0x7D` followed by the byte with
//! bit 5 flipped.

use super::wire::{ESCAPE_BIT_SWAP, FRAME_BOUNDARY, FRAME_ESCAPE};

#[inline]
fn needs_escape(byte: u8) -> bool {
    byte == FRAME_BOUNDARY || byte == FRAME_ESCAPE
}

/// Stuff a raw frame for transmission
///
/// # Examples
///
/// ```
/// use hev_controller::protocol::stuffing::encode;
///
/// let stuffed = encode(&[0x7E, 0x40, 0x7E, 0x7E]);
/// assert_eq!(stuffed, vec![0x7E, 0x40, 0x7D, 0x5E, 0x7E]);
/// ```
pub fn encode(data: &[u8]) -> Vec<u8> {
    let Some((&first, rest)) = data.split_first() else {
        return Vec::new();
    };
    let Some((&last, interior)) = rest.split_last() else {
        return vec![first];
    };

    let mut out = Vec::with_capacity(data.len() + 4);
    out.push(first);
    for &byte in interior {
        if needs_escape(byte) {
            out.push(FRAME_ESCAPE);
            out.push(byte ^ (1 << ESCAPE_BIT_SWAP));
        } else {
            out.push(byte);
        }
    }
    out.push(last);
    out
}

/// Undo [`encode`] on a received span, boundaries included
///
/// A dangling escape at the end of the interior is dropped.
pub fn decode(data: &[u8]) -> Vec<u8> {
    let Some((&first, rest)) = data.split_first() else {
        return Vec::new();
    };
    let Some((&last, interior)) = rest.split_last() else {
        return vec![first];
    };

    let mut out = Vec::with_capacity(data.len());
    out.push(first);
    let mut escaped = false;
    for &byte in interior {
        if escaped {
            out.push(byte ^ (1 << ESCAPE_BIT_SWAP));
            escaped = false;
        } else if byte == FRAME_ESCAPE {
            escaped = true;
        } else {
            out.push(byte);
        }
    }
    out.push(last);
    out
}
