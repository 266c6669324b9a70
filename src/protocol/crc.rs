//! # CRC-16/X-25
//!
//! Frame check sequence for the serial link.
//!
//! **Parameters**: CRC-16/IBM-SDLC (X-25), reflected polynomial 0x1021,
//! initial value 0xFFFF, final XOR 0xFFFF. The checksum covers
//! address + control + information and is stored little-endian.

use crc::{Crc, CRC_16_IBM_SDLC};

/// CRC-16/X-25 calculator with lookup table
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Calculate the frame check sequence over `data`
///
/// # Examples
///
/// ```
/// use hev_controller::protocol::crc::crc16_x25;
///
/// assert_eq!(crc16_x25(b"123456789"), 0x906E);
/// ```
#[inline]
#[must_use]
pub fn crc16_x25(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Calculate the checksum over several non-contiguous slices
#[must_use]
pub fn crc16_x25_parts(parts: &[&[u8]]) -> u16 {
    let mut digest = CRC16.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}

/// Bit-by-bit reference implementation used to check the table-driven one
#[cfg(test)]
fn crc16_x25_slow(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0x8408;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}
