//! The frame decoder: decompression plus transposed-byte-plane decoding.
//!
//! This is the core of the engine. Given the raw bytes of one frame
//! (sliced out of the memory-mapped `analysis.tdf_bin`) and a descriptor,
//! it reconstructs the three primitive peak columns — `scan_id`, `tof`,
//! `intensity` — by undoing Bruker's byte-plane transpose and the
//! integer-delta packing of time-of-flight values.

use byteorder::{ByteOrder, LittleEndian};

use crate::decompression::DecompressionPool;
use crate::descriptors::FrameDescriptor;
use crate::error::Error;

const FRAME_HEADER_LEN: usize = 8;

/// Where the decoder should write the three primitive columns for one
/// frame. Any of the three may be absent; the decoder still walks the
/// whole stream to keep offsets correct for whichever columns are present.
pub struct DecodeOutputs<'a> {
    pub scan_ids: Option<&'a mut [u32]>,
    pub tofs: Option<&'a mut [u32]>,
    pub intensities: Option<&'a mut [u32]>,
}

fn word_at(plane_len: usize, scratch: &[u8], index: usize) -> u32 {
    LittleEndian::read_u32(&[
        scratch[index],
        scratch[plane_len + index],
        scratch[2 * plane_len + index],
        scratch[3 * plane_len + index],
    ])
}

/// Decode `descriptor`'s payload out of `frame_bytes` (the mmap slice
/// starting exactly at `descriptor.byte_offset`) into `outputs`.
pub fn decode_frame(
    descriptor: &FrameDescriptor,
    frame_bytes: &[u8],
    pool: &mut DecompressionPool,
    outputs: DecodeOutputs<'_>,
) -> Result<(), Error> {
    if descriptor.num_scans < 1 {
        return Err(Error::CorruptFrame { id: descriptor.id, reason: "scan count mismatch" });
    }
    if frame_bytes.len() < FRAME_HEADER_LEN {
        return Err(Error::CorruptFrame { id: descriptor.id, reason: "short payload" });
    }

    let tims_packet_size = LittleEndian::read_u32(&frame_bytes[0..4]) as usize;
    let stored_num_scans = LittleEndian::read_u32(&frame_bytes[4..8]);
    if stored_num_scans != descriptor.num_scans {
        return Err(Error::CorruptFrame { id: descriptor.id, reason: "scan count mismatch" });
    }

    if descriptor.num_peaks == 0 {
        return Ok(());
    }

    let compressed = frame_bytes
        .get(FRAME_HEADER_LEN..tims_packet_size)
        .ok_or(Error::CorruptFrame { id: descriptor.id, reason: "short payload" })?;
    let decompressed = pool.decompress(descriptor.id, compressed)?;

    let expected_len = descriptor.decompressed_len();
    if decompressed.len() < expected_len {
        return Err(Error::CorruptFrame { id: descriptor.id, reason: "short payload" });
    }

    let num_scans = descriptor.num_scans as usize;
    let num_peaks = descriptor.num_peaks as usize;
    let plane_len = num_scans + 2 * num_peaks;

    let DecodeOutputs { mut scan_ids, mut tofs, mut intensities } = outputs;

    let mut peaks_written = 0usize;
    let mut read_offset = num_scans;

    for scan in 0..num_scans.saturating_sub(1) {
        let peak_count = (word_at(plane_len, decompressed, scan + 1) / 2) as usize;
        let mut accum_tof: u32 = u32::MAX;
        for _ in 0..peak_count {
            accum_tof = accum_tof.wrapping_add(word_at(plane_len, decompressed, read_offset));
            if let Some(out) = tofs.as_deref_mut() {
                out[peaks_written] = accum_tof;
            }
            read_offset += 1;
            let intensity = word_at(plane_len, decompressed, read_offset);
            if let Some(out) = intensities.as_deref_mut() {
                out[peaks_written] = intensity;
            }
            read_offset += 1;
            if let Some(out) = scan_ids.as_deref_mut() {
                out[peaks_written] = scan as u32;
            }
            peaks_written += 1;
        }
    }

    let terminal_scan = (num_scans - 1) as u32;
    let mut accum_tof: u32 = u32::MAX;
    while peaks_written < num_peaks {
        accum_tof = accum_tof.wrapping_add(word_at(plane_len, decompressed, read_offset));
        if let Some(out) = tofs.as_deref_mut() {
            out[peaks_written] = accum_tof;
        }
        read_offset += 1;
        let intensity = word_at(plane_len, decompressed, read_offset);
        if let Some(out) = intensities.as_deref_mut() {
            out[peaks_written] = intensity;
        }
        read_offset += 1;
        if let Some(out) = scan_ids.as_deref_mut() {
            out[peaks_written] = terminal_scan;
        }
        peaks_written += 1;
    }

    if peaks_written != num_peaks {
        return Err(Error::CorruptFrame { id: descriptor.id, reason: "peak count mismatch" });
    }

    if let Some(out) = intensities {
        for value in out.iter_mut().take(num_peaks) {
            let corrected = (*value as f64) * descriptor.intensity_correction + 0.5;
            *value = corrected.floor().clamp(0.0, u32::MAX as f64) as u32;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_frame_blob;

    fn descriptor(id: u32, num_scans: u32, num_peaks: u32, correction: f64) -> FrameDescriptor {
        FrameDescriptor {
            id,
            num_scans,
            num_peaks,
            msms_type: 0,
            intensity_correction: correction,
            time: 12.5,
            byte_offset: 0,
        }
    }

    /// S1: a single peak in a two-scan frame.
    #[test]
    fn single_peak_reconstructs_tof_via_wraparound() {
        let desc = descriptor(1, 2, 1, 1.0);
        let blob = build_frame_blob(2, &[vec![(5u32, 42u32)], vec![]]);
        let mut pool = DecompressionPool::new(desc.decompressed_len()).unwrap();
        let mut scan_ids = [0u32; 1];
        let mut tofs = [0u32; 1];
        let mut intensities = [0u32; 1];
        decode_frame(
            &desc,
            &blob,
            &mut pool,
            DecodeOutputs {
                scan_ids: Some(&mut scan_ids),
                tofs: Some(&mut tofs),
                intensities: Some(&mut intensities),
            },
        )
        .unwrap();
        assert_eq!(scan_ids, [0]);
        assert_eq!(tofs, [4]);
        assert_eq!(intensities, [42]);
    }

    /// S2: three scans; the first loop iteration's peak reconstructs via
    /// unsigned wraparound, the second resets the accumulator.
    #[test]
    fn multi_scan_frame_resets_accumulator_per_scan() {
        let desc = descriptor(1, 3, 3, 1.0);
        let blob =
            build_frame_blob(3, &[vec![(10, 7)], vec![(3, 9), (50, 100)], vec![]]);
        let mut pool = DecompressionPool::new(desc.decompressed_len()).unwrap();
        let mut scan_ids = [0u32; 3];
        let mut tofs = [0u32; 3];
        let mut intensities = [0u32; 3];
        decode_frame(
            &desc,
            &blob,
            &mut pool,
            DecodeOutputs {
                scan_ids: Some(&mut scan_ids),
                tofs: Some(&mut tofs),
                intensities: Some(&mut intensities),
            },
        )
        .unwrap();
        assert_eq!(scan_ids, [0, 1, 1]);
        assert_eq!(tofs, [9, 2, 52]);
        assert_eq!(intensities, [7, 9, 100]);
    }

    /// S3: an empty frame writes nothing and does not error.
    #[test]
    fn empty_frame_writes_nothing() {
        let desc = descriptor(1, 2, 0, 1.0);
        let blob = build_frame_blob(2, &[vec![], vec![]]);
        let mut pool = DecompressionPool::new(desc.decompressed_len().max(1)).unwrap();
        decode_frame(
            &desc,
            &blob,
            &mut pool,
            DecodeOutputs { scan_ids: None, tofs: None, intensities: None },
        )
        .unwrap();
    }

    /// S5: intensity correction scales raw intensities.
    #[test]
    fn intensity_correction_scales_raw_values() {
        let desc = descriptor(1, 2, 3, 2.0);
        let blob = build_frame_blob(2, &[vec![], vec![(1, 10), (1, 20), (1, 30)]]);
        let mut pool = DecompressionPool::new(desc.decompressed_len()).unwrap();
        let mut intensities = [0u32; 3];
        decode_frame(
            &desc,
            &blob,
            &mut pool,
            DecodeOutputs { scan_ids: None, tofs: None, intensities: Some(&mut intensities) },
        )
        .unwrap();
        assert_eq!(intensities, [20, 40, 60]);
    }

    #[test]
    fn scan_count_mismatch_is_corrupt_frame() {
        let desc = descriptor(1, 2, 0, 1.0);
        let mut blob = build_frame_blob(2, &[vec![], vec![]]);
        byteorder::LittleEndian::write_u32(&mut blob[4..8], 99);
        let mut pool = DecompressionPool::new(16).unwrap();
        let err = decode_frame(
            &desc,
            &blob,
            &mut pool,
            DecodeOutputs { scan_ids: None, tofs: None, intensities: None },
        )
        .unwrap_err();
        assert!(matches!(err, Error::CorruptFrame { reason: "scan count mismatch", .. }));
    }

    #[test]
    fn mobility_request_without_scan_ids_still_produces_tofs() {
        let desc = descriptor(1, 2, 1, 1.0);
        let blob = build_frame_blob(2, &[vec![(5, 42)], vec![]]);
        let mut pool = DecompressionPool::new(desc.decompressed_len()).unwrap();
        let mut tofs = [0u32; 1];
        decode_frame(
            &desc,
            &blob,
            &mut pool,
            DecodeOutputs { scan_ids: None, tofs: Some(&mut tofs), intensities: None },
        )
        .unwrap();
        assert_eq!(tofs, [4]);
    }
}
