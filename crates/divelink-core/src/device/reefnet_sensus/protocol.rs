//! Reefnet Sensus wire format.
//!
//! 19200 8N1. The host wakes the logger with a one-byte command, the
//! logger answers with `OK` and a 10-byte handshake record, then either
//! streams its whole memory or is sent back to sleep.

use crate::array::{checksum_add_u16, uint16_le, uint32_le};
use crate::error::DeviceError;

/// Logger memory size.
pub const SZ_MEMORY: usize = 32768;
/// Handshake record size, excluding the `OK` header.
pub const SZ_HANDSHAKE: usize = 10;
/// Maximum bytes requested per transport read during a dump.
pub const SZ_PACKET: usize = 128;

pub const BAUDRATE: u32 = 19200;
pub const TIMEOUT_MS: u64 = 3000;
/// Line settling time after the handshake.
pub const HANDSHAKE_DELAY_MS: u64 = 10;

pub const CMD_CANCEL: u8 = 0x00;
pub const CMD_HANDSHAKE: u8 = 0x0A;
pub const CMD_DUMP: u8 = 0x40;

pub const HANDSHAKE_HEADER: &[u8; 2] = b"OK";
pub const DUMP_HEADER: &[u8; 4] = b"DATA";
pub const DUMP_TRAILER: &[u8; 3] = b"END";

/// `DATA` + memory + checksum + `END`.
pub const SZ_DUMP_ANSWER: usize = DUMP_HEADER.len() + SZ_MEMORY + 2 + DUMP_TRAILER.len();

/// Decoded handshake answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub model: u32,
    pub firmware: u32,
    pub serial: u16,
    /// Device clock, in seconds.
    pub devtime: u32,
    /// The record as sent, without the `OK` header.
    pub data: [u8; SZ_HANDSHAKE],
}

impl Handshake {
    /// Answer size on the wire.
    pub const SIZE: usize = HANDSHAKE_HEADER.len() + SZ_HANDSHAKE;

    pub fn from_bytes(answer: &[u8]) -> Result<Self, DeviceError> {
        if answer.len() < Self::SIZE {
            return Err(DeviceError::InvalidArgs(format!(
                "handshake too short: expected {}, got {}",
                Self::SIZE,
                answer.len()
            )));
        }
        if &answer[..2] != HANDSHAKE_HEADER {
            return Err(DeviceError::Protocol("Unexpected answer header.".into()));
        }

        let mut data = [0u8; SZ_HANDSHAKE];
        data.copy_from_slice(&answer[2..Self::SIZE]);

        // Model and firmware are sent as ASCII digits.
        Ok(Self {
            model: u32::from(answer[2]).wrapping_sub(u32::from(b'0')),
            firmware: u32::from(answer[3]).wrapping_sub(u32::from(b'0')),
            serial: uint16_le(&answer[6..8]),
            devtime: uint32_le(&answer[8..12]),
            data,
        })
    }
}

/// Validate a complete dump answer and return the memory payload.
pub fn verify_dump(answer: &[u8]) -> Result<&[u8], DeviceError> {
    if answer.len() != SZ_DUMP_ANSWER {
        return Err(DeviceError::InvalidArgs(format!(
            "dump answer size: expected {}, got {}",
            SZ_DUMP_ANSWER,
            answer.len()
        )));
    }

    let trailer_start = answer.len() - DUMP_TRAILER.len();
    if &answer[..DUMP_HEADER.len()] != DUMP_HEADER || &answer[trailer_start..] != DUMP_TRAILER {
        return Err(DeviceError::Protocol(
            "Unexpected answer start or end byte(s).".into(),
        ));
    }

    let payload = &answer[DUMP_HEADER.len()..DUMP_HEADER.len() + SZ_MEMORY];
    let crc = uint16_le(&answer[DUMP_HEADER.len() + SZ_MEMORY..trailer_start]);
    let ccrc = checksum_add_u16(payload, 0x0000);
    if crc != ccrc {
        return Err(DeviceError::Protocol(format!(
            "Unexpected answer checksum: 0x{crc:04X} != 0x{ccrc:04X}."
        )));
    }

    Ok(payload)
}
