//! Dive extraction from a Sensus memory dump.
//!
//! The logger appends dives to memory without an index. Each dive
//! starts with a 7-byte header framed by `0xFF` at offset 0 and `0xFE`
//! at offset 6, with the dive timestamp at offset 2. Samples follow: one
//! depth byte each, plus a temperature byte on every sixth sample. There
//! is no end marker; a dive ends after 17 consecutive shallow samples.
//!
//! The dump is scanned backwards so the newest dive is reported first
//! and the fingerprint can end the scan early.

use tracing::debug;

use crate::array::uint32_le;
use crate::device::{Dive, DiveCallback};
use crate::error::DeviceError;

pub const DIVE_START: u8 = 0xFF;
pub const DIVE_MARKER: u8 = 0xFE;
pub const SZ_DIVE_HEADER: usize = 7;
pub const TIMESTAMP_OFFSET: usize = 2;
pub const SZ_FINGERPRINT: usize = 4;

/// Depth samples below this value count as "at the surface" (adjusted feet).
pub const SURFACE_DEPTH: u8 = 13 + 3;
/// Consecutive surface samples that terminate a dive.
pub const SURFACE_SAMPLES: u32 = 17;
/// A temperature byte accompanies every n-th sample, starting with the first.
pub const TEMPERATURE_INTERVAL: u32 = 6;

/// Find the end of the dive whose header starts at `start`.
///
/// The search never crosses `limit`, the start of the next newer dive.
fn find_dive_end(data: &[u8], start: usize, limit: usize) -> Option<usize> {
    let mut nsamples = 0u32;
    let mut count = 0u32;
    let mut offset = start + SZ_DIVE_HEADER;

    while offset < limit {
        let depth = data[offset];
        offset += 1;

        if nsamples % TEMPERATURE_INTERVAL == 0 {
            if offset >= limit {
                break;
            }
            offset += 1;
        }

        nsamples += 1;

        if depth < SURFACE_DEPTH {
            count += 1;
            if count == SURFACE_SAMPLES {
                return Some(offset);
            }
        } else {
            count = 0;
        }
    }

    None
}

/// Report the dives in `data`, newest first.
///
/// Scanning stops without error at the first dive whose timestamp is at
/// or below `cutoff`, or when `callback` returns `false`. A dive start
/// without a detectable end fails the whole scan; dives already passed to
/// `callback` remain valid.
pub fn extract_dives(
    data: &[u8],
    cutoff: Option<u32>,
    callback: &mut DiveCallback<'_>,
) -> Result<(), DeviceError> {
    let mut previous = data.len();
    let mut current = data.len().saturating_sub(SZ_DIVE_HEADER);

    while current > 0 {
        current -= 1;
        if data[current] != DIVE_START || data[current + SZ_DIVE_HEADER - 1] != DIVE_MARKER {
            continue;
        }

        let Some(end) = find_dive_end(data, current, previous) else {
            debug!(offset = current, "No end of dive found");
            return Err(DeviceError::DataFormat(format!(
                "No end of dive found for dive at offset {current}."
            )));
        };

        let stamp = current + TIMESTAMP_OFFSET;
        let fingerprint = &data[stamp..stamp + SZ_FINGERPRINT];
        let timestamp = uint32_le(fingerprint);
        if cutoff.is_some_and(|cutoff| timestamp <= cutoff) {
            debug!(timestamp, "Reached fingerprint, stopping");
            return Ok(());
        }

        let dive = Dive {
            data: &data[current..end],
            fingerprint,
            timestamp,
        };
        if !callback(&dive) {
            return Ok(());
        }

        previous = current;
        current = current.saturating_sub(SZ_DIVE_HEADER);
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build one dive: header with `timestamp`, then a few deep samples and
    /// a run of 17 surface samples. Temperature bytes are inserted where the
    /// logger would put them.
    pub(crate) fn synthetic_dive(timestamp: u32, deep: &[u8]) -> Vec<u8> {
        let mut dive = vec![DIVE_START, 0x00];
        dive.extend_from_slice(&timestamp.to_le_bytes());
        dive.push(DIVE_MARKER);

        let surface = [5u8; SURFACE_SAMPLES as usize];
        for (i, depth) in deep.iter().chain(surface.iter()).enumerate() {
            dive.push(*depth);
            if i as u32 % TEMPERATURE_INTERVAL == 0 {
                dive.push(0x4A);
            }
        }
        dive
    }

    type Extracted = Vec<(Vec<u8>, Vec<u8>)>;

    fn collect(data: &[u8], cutoff: Option<u32>) -> Result<Extracted, DeviceError> {
        let mut dives = Vec::new();
        extract_dives(data, cutoff, &mut |dive| {
            assert_eq!(dive.timestamp, uint32_le(dive.fingerprint));
            dives.push((dive.data.to_vec(), dive.fingerprint.to_vec()));
            true
        })?;
        Ok(dives)
    }

    fn two_dive_memory() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let older = synthetic_dive(1000, &[30, 45, 60, 60, 40, 20]);
        let newer = synthetic_dive(2000, &[25, 50, 70, 35]);
        let mut memory = older.clone();
        memory.extend_from_slice(&newer);
        memory.extend_from_slice(&[0u8; 16]);
        (memory, older, newer)
    }

    #[test]
    fn test_synthetic_dive_layout() {
        // 6 deep + 17 surface samples, temperature at samples 0, 6, 12, 18.
        let dive = synthetic_dive(1, &[30, 30, 30, 30, 30, 30]);
        assert_eq!(dive.len(), SZ_DIVE_HEADER + 23 + 4);
        assert_eq!(find_dive_end(&dive, 0, dive.len()), Some(dive.len()));
    }

    #[test]
    fn test_two_dives_newest_first() {
        let (memory, older, newer) = two_dive_memory();
        let dives = collect(&memory, Some(0)).unwrap();

        assert_eq!(dives.len(), 2);
        assert_eq!(dives[0].0, newer);
        assert_eq!(dives[0].1, 2000u32.to_le_bytes());
        assert_eq!(dives[1].0, older);
        assert_eq!(dives[1].1, 1000u32.to_le_bytes());
    }

    #[test]
    fn test_extraction_is_repeatable() {
        let (memory, _, _) = two_dive_memory();
        let first = collect(&memory, Some(0)).unwrap();
        assert_eq!(first, collect(&memory, Some(0)).unwrap());
    }

    #[test]
    fn test_fingerprint_cutoff() {
        let (memory, _, newer) = two_dive_memory();

        let dives = collect(&memory, Some(1000)).unwrap();
        assert_eq!(dives.len(), 1);
        assert_eq!(dives[0].0, newer);

        assert!(collect(&memory, Some(2000)).unwrap().is_empty());
        assert!(collect(&memory, Some(u32::MAX)).unwrap().is_empty());
        assert_eq!(collect(&memory, Some(999)).unwrap().len(), 2);
    }

    #[test]
    fn test_no_cutoff_reports_zero_timestamp() {
        let dive = synthetic_dive(0, &[40]);
        assert_eq!(collect(&dive, None).unwrap().len(), 1);
        assert!(collect(&dive, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn test_callback_stop() {
        let (memory, _, _) = two_dive_memory();
        let mut calls = 0;
        extract_dives(&memory, Some(0), &mut |_| {
            calls += 1;
            false
        })
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_missing_dive_end() {
        // Older dive never surfaces before the newer dive begins.
        let mut memory = vec![DIVE_START, 0x00];
        memory.extend_from_slice(&500u32.to_le_bytes());
        memory.push(DIVE_MARKER);
        memory.extend_from_slice(&[60u8; 40]);
        let newer = synthetic_dive(2000, &[25, 50]);
        memory.extend_from_slice(&newer);

        let mut seen = Vec::new();
        let result = extract_dives(&memory, Some(0), &mut |dive| {
            seen.push(dive.data.to_vec());
            true
        });

        assert!(matches!(result, Err(DeviceError::DataFormat(_))));
        assert_eq!(seen, vec![newer]);
    }

    #[test]
    fn test_surface_run_resets() {
        // 16 shallow samples, one deep, then 16 shallow: no end.
        let mut memory = vec![DIVE_START, 0x00, 1, 0, 0, 0, DIVE_MARKER];
        for i in 0..33u32 {
            memory.push(if i == 16 { 20 } else { 0 });
            if i % TEMPERATURE_INTERVAL == 0 {
                memory.push(0x4A);
            }
        }
        assert!(matches!(
            collect(&memory, None),
            Err(DeviceError::DataFormat(_))
        ));
    }

    #[test]
    fn test_single_dive_at_start() {
        let dive = synthetic_dive(42, &[30, 30]);
        let dives = collect(&dive, None).unwrap();
        assert_eq!(dives, vec![(dive.clone(), 42u32.to_le_bytes().to_vec())]);
    }

    #[test]
    fn test_cutoff_between_three_dives() {
        let mut memory = Vec::new();
        for timestamp in [10, 20, 30] {
            memory.extend_from_slice(&synthetic_dive(timestamp, &[40]));
        }

        let mut seen = Vec::new();
        extract_dives(&memory, Some(20), &mut |dive| {
            seen.push(dive.timestamp);
            true
        })
        .unwrap();
        assert_eq!(seen, vec![30]);
    }

    #[test]
    fn test_noisy_buffers_never_panic() {
        // Simple LCG so the buffers are reproducible.
        let mut state = 0x2545_F491u32;
        let mut next = move || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        };

        for round in 0..2000 {
            let len = usize::from(next()) + round % 64;
            let data: Vec<u8> = (0..len)
                .map(|_| match next() % 4 {
                    0 => DIVE_START,
                    1 => DIVE_MARKER,
                    _ => next(),
                })
                .collect();
            let _ = collect(&data, None);
        }
    }

    #[test]
    fn test_short_and_empty_buffers() {
        assert!(collect(&[], None).unwrap().is_empty());
        let header = [DIVE_START, 0, 0, 0, 0, 0, DIVE_MARKER];
        assert!(collect(&header, None).unwrap().is_empty());
        assert!(collect(&[0u8; 64], None).unwrap().is_empty());
    }
}
