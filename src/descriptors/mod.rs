//! The frame descriptor table: immutable per-frame metadata keyed by id.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::metadata::FrameRecord;

/// Immutable per-frame record derived from a [`FrameRecord`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameDescriptor {
    pub id: u32,
    pub num_scans: u32,
    pub num_peaks: u32,
    pub msms_type: u32,
    pub intensity_correction: f64,
    pub time: f64,
    pub byte_offset: u64,
}

impl FrameDescriptor {
    /// Decompressed payload length in bytes: `4 * (num_scans + 2*num_peaks)`.
    pub fn decompressed_len(&self) -> usize {
        4 * (self.num_scans as usize + 2 * self.num_peaks as usize)
    }
}

impl From<&FrameRecord> for FrameDescriptor {
    fn from(record: &FrameRecord) -> Self {
        Self {
            id: record.id,
            num_scans: record.num_scans,
            num_peaks: record.num_peaks,
            msms_type: record.msms_type,
            intensity_correction: 100.0 / record.accumulation_time_ms,
            time: record.time,
            byte_offset: record.byte_offset,
        }
    }
}

/// Maps `frame_id -> FrameDescriptor`. A `BTreeMap` keeps enumeration and
/// the `per_frame_total_intensity_by_id` contract in ascending-id order for
/// free, without assuming a dense or 1-based id space.
#[derive(Debug, Default)]
pub struct DescriptorTable {
    by_id: BTreeMap<u32, FrameDescriptor>,
}

impl DescriptorTable {
    pub fn from_records(records: &[FrameRecord]) -> Self {
        let by_id = records.iter().map(|r| (r.id, FrameDescriptor::from(r))).collect();
        Self { by_id }
    }

    pub fn get(&self, id: u32) -> Result<&FrameDescriptor, Error> {
        self.by_id.get(&id).ok_or(Error::UnknownFrame { id })
    }

    pub fn has_frame(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn min_frame_id(&self) -> Option<u32> {
        self.by_id.keys().next().copied()
    }

    pub fn max_frame_id(&self) -> Option<u32> {
        self.by_id.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &FrameDescriptor)> {
        self.by_id.iter()
    }

    pub fn max_decompressed_payload(&self) -> usize {
        self.by_id.values().map(FrameDescriptor::decompressed_len).max().unwrap_or(0)
    }

    pub fn max_peaks_in_frame(&self) -> u32 {
        self.by_id.values().map(|d| d.num_peaks).max().unwrap_or(0)
    }

    pub fn peaks_total(&self) -> u64 {
        self.by_id.values().map(|d| d.num_peaks as u64).sum()
    }

    /// Sum of `num_peaks` over `ids`; fails on the first id not present.
    pub fn peaks_in(&self, ids: &[u32]) -> Result<u64, Error> {
        ids.iter().map(|&id| self.get(id).map(|d| d.num_peaks as u64)).sum()
    }

    /// Sum of `num_peaks` over `start, start+step, .. < end`, skipping ids
    /// that are absent from the table.
    pub fn peaks_in_slice(&self, start: u32, end: u32, step: u32) -> Result<u64, Error> {
        if step == 0 {
            return Err(Error::InvalidArgument("step must be non-zero"));
        }
        let mut total = 0u64;
        let mut id = start;
        while id < end {
            if let Some(desc) = self.by_id.get(&id) {
                total += desc.num_peaks as u64;
            }
            id = match id.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(total)
    }
}
