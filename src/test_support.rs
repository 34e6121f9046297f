//! Shared fixtures for unit and integration tests.
//!
//! Not part of the public API; gated behind `#[cfg(test)]` in `lib.rs`.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::metadata::{FrameRecord, MetadataProvider};

/// A fixed list of [`FrameRecord`]s, for tests that exercise the decoder or
/// data handle without a real `analysis.tdf` on disk.
pub struct StaticMetadataProvider(pub Vec<FrameRecord>);

impl MetadataProvider for StaticMetadataProvider {
    fn frame_records(&self) -> Result<Vec<FrameRecord>, Error> {
        Ok(self.0.clone())
    }
}

/// Build one frame's on-disk bytes (8-byte header + zstd-compressed
/// transposed byte planes) from `peak_groups`, one entry per scan index in
/// emission order: `peak_groups[s]` is the list of `(delta_tof, intensity)`
/// pairs the decoder emits while its loop variable equals `s` — the last
/// entry is the terminal scan's peaks, consumed by the "remainder" phase
/// rather than governed by an explicit doubled-count word.
pub fn build_frame_blob(num_scans: u32, peak_groups: &[Vec<(u32, u32)>]) -> Vec<u8> {
    assert_eq!(peak_groups.len(), num_scans as usize);
    let num_peaks: usize = peak_groups.iter().map(Vec::len).sum();
    let plane_len = num_scans as usize + 2 * num_peaks;

    let mut words = vec![0u32; plane_len];
    // words[0] is unused; words[s] for s in 1..num_scans holds the doubled
    // peak count consumed by the loop's (s-1)th iteration.
    for (s, group) in peak_groups.iter().enumerate().take(num_scans as usize - 1) {
        words[s + 1] = 2 * group.len() as u32;
    }
    let mut offset = num_scans as usize;
    for group in peak_groups {
        for &(delta, intensity) in group {
            words[offset] = delta;
            words[offset + 1] = intensity;
            offset += 2;
        }
    }

    let mut planes = vec![0u8; plane_len * 4];
    for (i, word) in words.iter().enumerate() {
        let bytes = word.to_le_bytes();
        planes[i] = bytes[0];
        planes[plane_len + i] = bytes[1];
        planes[2 * plane_len + i] = bytes[2];
        planes[3 * plane_len + i] = bytes[3];
    }

    let compressed = zstd::bulk::compress(&planes, 0).expect("zstd compression never fails here");
    let mut blob = vec![0u8; 8 + compressed.len()];
    LittleEndian::write_u32(&mut blob[0..4], (8 + compressed.len()) as u32);
    LittleEndian::write_u32(&mut blob[4..8], num_scans);
    blob[8..].copy_from_slice(&compressed);
    blob
}
