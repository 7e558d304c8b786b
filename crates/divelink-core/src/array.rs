//! Byte buffer helpers shared by the protocol implementations.
//!
//! Fixed-endian integer decoding, the additive checksum used by the
//! serial loggers, and hex formatting for packet dumps.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt::Write;

/// Decode a little-endian `u16` from the first two bytes of `data`.
///
/// Panics if `data` is shorter than two bytes; callers slice from
/// fixed-size packets whose length has already been checked.
pub fn uint16_le(data: &[u8]) -> u16 {
    LittleEndian::read_u16(data)
}

/// Decode a little-endian `u32` from the first four bytes of `data`.
pub fn uint32_le(data: &[u8]) -> u32 {
    LittleEndian::read_u32(data)
}

/// Additive 16-bit checksum: `init` plus the sum of all bytes, modulo 2^16.
pub fn checksum_add_u16(data: &[u8], init: u16) -> u16 {
    data.iter()
        .fold(init, |crc, &byte| crc.wrapping_add(u16::from(byte)))
}

/// Format bytes as contiguous upper-case hex, e.g. `4F4B03`.
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing into a String cannot fail.
        let _ = write!(out, "{:02X}", byte);
    }
    out
}
