//! Column emitter: fills caller-supplied output buffers frame by frame.
//!
//! Shared by `DataHandle::extract_by_ids` and `extract_by_slice` so the
//! write-cursor sequencing (§5 ordering) lives in exactly one place.

use crate::calibration::Calibrator;
use crate::decode::{decode_frame, DecodeOutputs};
use crate::decompression::DecompressionPool;
use crate::descriptors::FrameDescriptor;
use crate::error::Error;

/// Seven independent output columns, each optional. All present slices
/// must have at least as much remaining room as the peaks about to be
/// written; the emitter advances past whatever is written via cursors
/// owned by [`ColumnWriter`].
pub struct ColumnRequest<'a> {
    pub frame_id: Option<&'a mut [u32]>,
    pub scan_id: Option<&'a mut [u32]>,
    pub tof: Option<&'a mut [u32]>,
    pub intensity: Option<&'a mut [u32]>,
    pub mz: Option<&'a mut [f64]>,
    pub inv_ion_mobility: Option<&'a mut [f64]>,
    pub retention_time: Option<&'a mut [f64]>,
}

impl<'a> ColumnRequest<'a> {
    pub fn none() -> Self {
        Self {
            frame_id: None,
            scan_id: None,
            tof: None,
            intensity: None,
            mz: None,
            inv_ion_mobility: None,
            retention_time: None,
        }
    }
}

/// Owns the write cursor into a [`ColumnRequest`] across a whole
/// extraction call, plus the scratch buffers needed for columns the
/// decoder doesn't fill directly (`scan_ids` when only mobility was
/// requested, and the `f64` staging buffers the calibrators write into).
pub struct ColumnWriter<'a> {
    columns: ColumnRequest<'a>,
    cursor: usize,
    scan_id_scratch: Vec<u32>,
    tof_scratch: Vec<u32>,
}

impl<'a> ColumnWriter<'a> {
    pub fn new(columns: ColumnRequest<'a>) -> Self {
        Self { columns, cursor: 0, scan_id_scratch: Vec::new(), tof_scratch: Vec::new() }
    }

    pub fn written(&self) -> usize {
        self.cursor
    }

    /// Decode `descriptor`'s payload and write its peaks at the current
    /// cursor, invoking calibrators as needed, then advance the cursor.
    pub fn emit_frame(
        &mut self,
        descriptor: &FrameDescriptor,
        frame_bytes: &[u8],
        pool: &mut DecompressionPool,
        tof_to_mz: &Calibrator,
        scan_to_mobility: &Calibrator,
    ) -> Result<(), Error> {
        let num_peaks = descriptor.num_peaks as usize;
        if num_peaks == 0 {
            return Ok(());
        }
        let range = self.cursor..self.cursor + num_peaks;

        let needs_scan_ids = self.columns.scan_id.is_some() || self.columns.inv_ion_mobility.is_some();
        let needs_tofs = self.columns.tof.is_some() || self.columns.mz.is_some();

        let scan_ids_out: Option<&mut [u32]> = if needs_scan_ids {
            if let Some(col) = self.columns.scan_id.as_deref_mut() {
                Some(&mut col[range.clone()])
            } else {
                self.scan_id_scratch.resize(num_peaks, 0);
                Some(&mut self.scan_id_scratch[..])
            }
        } else {
            None
        };

        let tofs_out: Option<&mut [u32]> = if needs_tofs {
            if let Some(col) = self.columns.tof.as_deref_mut() {
                Some(&mut col[range.clone()])
            } else {
                self.tof_scratch.resize(num_peaks, 0);
                Some(&mut self.tof_scratch[..])
            }
        } else {
            None
        };

        let intensities_out = self.columns.intensity.as_deref_mut().map(|col| &mut col[range.clone()]);

        decode_frame(
            descriptor,
            frame_bytes,
            pool,
            DecodeOutputs { scan_ids: scan_ids_out, tofs: tofs_out, intensities: intensities_out },
        )?;

        if let Some(col) = self.columns.frame_id.as_deref_mut() {
            col[range.clone()].fill(descriptor.id);
        }
        if let Some(col) = self.columns.retention_time.as_deref_mut() {
            col[range.clone()].fill(descriptor.time);
        }

        if let Some(out) = self.columns.mz.as_deref_mut() {
            let tofs: &[u32] =
                self.columns.tof.as_deref().map(|c| &c[range.clone()]).unwrap_or(&self.tof_scratch[..num_peaks]);
            tof_to_mz.convert(descriptor.id, tofs, &mut out[range.clone()])?;
        }

        if let Some(out) = self.columns.inv_ion_mobility.as_deref_mut() {
            let scan_ids: &[u32] = self
                .columns
                .scan_id
                .as_deref()
                .map(|c| &c[range.clone()])
                .unwrap_or(&self.scan_id_scratch[..num_peaks]);
            scan_to_mobility.convert(descriptor.id, scan_ids, &mut out[range.clone()])?;
        }

        self.cursor += num_peaks;
        Ok(())
    }
}
