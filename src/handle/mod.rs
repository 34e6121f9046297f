//! The data handle: the public entry point over one acquisition directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use rayon::prelude::*;

use crate::calibration::{self, Calibrator};
use crate::columns::{ColumnRequest, ColumnWriter};
use crate::decode::{decode_frame, DecodeOutputs};
use crate::decompression::DecompressionPool;
use crate::descriptors::DescriptorTable;
use crate::error::Error;
use crate::metadata::{MetadataProvider, SqliteMetadataProvider};
use crate::threading::{self, Mode};

/// One frame's primitive columns, owned rather than written into a
/// caller-supplied buffer — the shape [`DataHandle::extract_frames_parallel`]
/// returns, since rayon workers can't share one column cursor.
pub struct DecodedFrame {
    pub frame_id: u32,
    pub scan_ids: Vec<u32>,
    pub tofs: Vec<u32>,
    pub intensities: Vec<u32>,
}

/// Construction-time configuration for a [`DataHandle`].
///
/// `DataHandle::open` uses `DataHandleConfig::default()`: error-stub
/// calibrators and engine-parallel threading. Pass vendor library paths
/// to have the handle open vendor-backed calibrators directly, bypassing
/// the process-wide default factories.
#[derive(Clone, Debug, Default)]
pub struct DataHandleConfig {
    pub vendor_library_for_mz: Option<String>,
    pub vendor_library_for_mobility: Option<String>,
    pub threading_mode: Option<Mode>,
}

/// An open TimsTOF acquisition: memory-mapped binary payload, frame
/// descriptor table, decompression scratch, and installed calibrators.
pub struct DataHandle {
    acquisition_dir: PathBuf,
    mmap: Mmap,
    descriptors: DescriptorTable,
    pool: DecompressionPool,
    tof_to_mz: Calibrator,
    scan_to_mobility: Calibrator,
}

impl DataHandle {
    /// Open `acquisition_dir` (must contain `analysis.tdf` and
    /// `analysis.tdf_bin`) with default configuration.
    pub fn open(acquisition_dir: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with_config(acquisition_dir, DataHandleConfig::default())
    }

    /// Open with explicit paths to the metadata database and binary
    /// payload file, rather than assuming the conventional filenames.
    pub fn open_with_paths(
        tdf_path: impl AsRef<Path>,
        tdf_bin_path: impl AsRef<Path>,
        config: DataHandleConfig,
    ) -> Result<Self, Error> {
        let provider = SqliteMetadataProvider::open(&tdf_path)?;
        let acquisition_dir = tdf_path.as_ref().parent().map(Path::to_path_buf).unwrap_or_default();
        Self::build(acquisition_dir, tdf_bin_path.as_ref(), &provider, config)
    }

    /// Open with explicit configuration (threading mode, vendor library
    /// paths for calibration) using the conventional filenames.
    pub fn open_with_config(
        acquisition_dir: impl AsRef<Path>,
        config: DataHandleConfig,
    ) -> Result<Self, Error> {
        let acquisition_dir = acquisition_dir.as_ref().to_path_buf();
        let tdf_path = acquisition_dir.join("analysis.tdf");
        let tdf_bin_path = acquisition_dir.join("analysis.tdf_bin");
        let provider = SqliteMetadataProvider::open(&tdf_path)?;
        Self::build(acquisition_dir, &tdf_bin_path, &provider, config)
    }

    /// Open using a caller-supplied [`MetadataProvider`] instead of the
    /// canonical `rusqlite`-backed one, e.g. for a provider reading from a
    /// different store.
    pub fn open_with_provider(
        acquisition_dir: impl AsRef<Path>,
        tdf_bin_path: impl AsRef<Path>,
        provider: &dyn MetadataProvider,
        config: DataHandleConfig,
    ) -> Result<Self, Error> {
        Self::build(acquisition_dir.as_ref().to_path_buf(), tdf_bin_path.as_ref(), provider, config)
    }

    fn build(
        acquisition_dir: PathBuf,
        tdf_bin_path: &Path,
        provider: &dyn MetadataProvider,
        config: DataHandleConfig,
    ) -> Result<Self, Error> {
        let file = std::fs::File::open(tdf_bin_path).map_err(|e| Error::Mapping {
            path: tdf_bin_path.display().to_string(),
            source: e,
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::Mapping {
            path: tdf_bin_path.display().to_string(),
            source: e,
        })?;

        let records = provider.frame_records()?;
        let descriptors = DescriptorTable::from_records(&records);
        let max_payload = descriptors.max_decompressed_payload();
        log::debug!(
            "opened acquisition at {}: {} frames, max decompressed payload {} bytes",
            acquisition_dir.display(),
            descriptors.len(),
            max_payload
        );
        let pool = DecompressionPool::new(max_payload.max(1))?;

        let acquisition_dir_str = acquisition_dir.to_string_lossy().into_owned();
        let tof_to_mz = match &config.vendor_library_for_mz {
            Some(library_path) => calibration::VendorCalibrator::new(
                library_path,
                &acquisition_dir_str,
                calibration::ConversionKind::TofToMz,
            )
            .map(Calibrator::VendorBacked)?,
            None => calibration::produce_default_tof_to_mz(&acquisition_dir_str),
        };
        let scan_to_mobility = match &config.vendor_library_for_mobility {
            Some(library_path) => calibration::VendorCalibrator::new(
                library_path,
                &acquisition_dir_str,
                calibration::ConversionKind::ScanToMobility,
            )
            .map(Calibrator::VendorBacked)?,
            None => calibration::produce_default_scan_to_mobility(&acquisition_dir_str),
        };

        if let Some(mode) = config.threading_mode {
            match mode {
                Mode::EngineParallel => threading::use_engine_threading(),
                Mode::VendorParallel => threading::use_vendor_threading(),
            }
        }

        Ok(Self { acquisition_dir, mmap, descriptors, pool, tof_to_mz, scan_to_mobility })
    }

    pub fn acquisition_dir(&self) -> &Path {
        &self.acquisition_dir
    }

    /// Slice out one frame's bytes from `mmap` alone, so callers can hold
    /// this borrow alongside a `&mut self.pool` borrow of a different field.
    fn frame_bytes(mmap: &Mmap, byte_offset: u64) -> &[u8] {
        &mmap[byte_offset as usize..]
    }

    /// Replace the tof→mz calibrator; `None` reverts to the currently
    /// configured default factory's output.
    pub fn set_tof_to_mz(&mut self, strategy: Option<Calibrator>) {
        self.tof_to_mz = match strategy {
            Some(s) => s,
            None => calibration::produce_default_tof_to_mz(&self.acquisition_dir.to_string_lossy()),
        };
    }

    /// Replace the scan→mobility calibrator; `None` reverts to the
    /// currently configured default factory's output.
    pub fn set_scan_to_mobility(&mut self, strategy: Option<Calibrator>) {
        self.scan_to_mobility = match strategy {
            Some(s) => s,
            None => {
                calibration::produce_default_scan_to_mobility(&self.acquisition_dir.to_string_lossy())
            }
        };
    }

    /// Decode `ids`, in input order, into `columns`. Fails fast on the
    /// first id absent from the descriptor table.
    pub fn extract_by_ids(&mut self, ids: &[u32], columns: ColumnRequest<'_>) -> Result<usize, Error> {
        let mut writer = ColumnWriter::new(columns);
        for &id in ids {
            let descriptor = *self.descriptors.get(id)?;
            let frame_bytes = Self::frame_bytes(&self.mmap, descriptor.byte_offset);
            if let Err(err) =
                writer.emit_frame(&descriptor, frame_bytes, &mut self.pool, &self.tof_to_mz, &self.scan_to_mobility)
            {
                log::warn!("extraction of frame {id} failed: {err}");
                return Err(err);
            }
        }
        Ok(writer.written())
    }

    /// Decode `id = start, start+step, .. < end_exclusive`, skipping ids
    /// absent from the descriptor table. `end_exclusive` is clamped to
    /// `max_frame_id + 1`; `step == 0` is rejected.
    pub fn extract_by_slice(
        &mut self,
        start: u32,
        end_exclusive: u32,
        step: u32,
        columns: ColumnRequest<'_>,
    ) -> Result<usize, Error> {
        if step == 0 {
            return Err(Error::InvalidArgument("step must be non-zero"));
        }
        let end_exclusive = match self.descriptors.max_frame_id() {
            Some(max_id) => end_exclusive.min(max_id.saturating_add(1)),
            None => end_exclusive,
        };

        let mut writer = ColumnWriter::new(columns);
        let mut id = start;
        while id < end_exclusive {
            if self.descriptors.has_frame(id) {
                let descriptor = *self.descriptors.get(id)?;
                let frame_bytes = Self::frame_bytes(&self.mmap, descriptor.byte_offset);
                if let Err(err) = writer.emit_frame(
                    &descriptor,
                    frame_bytes,
                    &mut self.pool,
                    &self.tof_to_mz,
                    &self.scan_to_mobility,
                ) {
                    log::warn!("extraction of frame {id} failed: {err}");
                    return Err(err);
                }
            }
            id = match id.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(writer.written())
    }

    /// Decode each of `ids` independently across a `rayon` thread pool,
    /// each worker allocating its own decompression scratch. Only the
    /// primitive columns are produced: calibrated columns go through the
    /// sequential `extract_by_ids`/`extract_by_slice` path, since the
    /// vendor library is not assumed safe to call from multiple threads
    /// at once (see [`crate::threading`]). Intended for
    /// `Mode::EngineParallel`.
    pub fn extract_frames_parallel(&self, ids: &[u32]) -> Result<Vec<DecodedFrame>, Error> {
        let mmap = &self.mmap;
        let descriptors = &self.descriptors;
        ids.par_iter().map(|&id| Self::decode_one(descriptors, mmap, id)).collect()
    }

    fn decode_one(descriptors: &DescriptorTable, mmap: &Mmap, id: u32) -> Result<DecodedFrame, Error> {
        let descriptor = *descriptors.get(id)?;
        let frame_bytes = &mmap[descriptor.byte_offset as usize..];
        let mut pool = DecompressionPool::new(descriptor.decompressed_len().max(1))?;
        let num_peaks = descriptor.num_peaks as usize;
        let mut scan_ids = vec![0u32; num_peaks];
        let mut tofs = vec![0u32; num_peaks];
        let mut intensities = vec![0u32; num_peaks];
        decode_frame(
            &descriptor,
            frame_bytes,
            &mut pool,
            DecodeOutputs {
                scan_ids: Some(&mut scan_ids),
                tofs: Some(&mut tofs),
                intensities: Some(&mut intensities),
            },
        )?;
        Ok(DecodedFrame { frame_id: id, scan_ids, tofs, intensities })
    }

    pub fn peaks_total(&self) -> u64 {
        self.descriptors.peaks_total()
    }

    pub fn peaks_in(&self, ids: &[u32]) -> Result<u64, Error> {
        self.descriptors.peaks_in(ids)
    }

    pub fn peaks_in_slice(&self, start: u32, end: u32, step: u32) -> Result<u64, Error> {
        self.descriptors.peaks_in_slice(start, end, step)
    }

    pub fn max_peaks_in_frame(&self) -> u32 {
        self.descriptors.max_peaks_in_frame()
    }

    pub fn has_frame(&self, id: u32) -> bool {
        self.descriptors.has_frame(id)
    }

    pub fn min_frame_id(&self) -> Option<u32> {
        self.descriptors.min_frame_id()
    }

    pub fn max_frame_id(&self) -> Option<u32> {
        self.descriptors.max_frame_id()
    }

    /// One entry per descriptor key, summing each frame's corrected
    /// intensity. Keyed directly by frame id, not by a zero-based index.
    pub fn per_frame_total_intensity_by_id(&mut self) -> Result<BTreeMap<u32, u64>, Error> {
        let mut totals = BTreeMap::new();
        let ids: Vec<u32> = self.descriptors.iter().map(|(&id, _)| id).collect();
        for id in ids {
            let descriptor = *self.descriptors.get(id)?;
            let num_peaks = descriptor.num_peaks as usize;
            if num_peaks == 0 {
                totals.insert(id, 0);
                continue;
            }
            let frame_bytes = Self::frame_bytes(&self.mmap, descriptor.byte_offset);
            let mut intensities = vec![0u32; num_peaks];
            let columns = ColumnRequest { intensity: Some(&mut intensities), ..ColumnRequest::none() };
            let mut writer = ColumnWriter::new(columns);
            writer.emit_frame(&descriptor, frame_bytes, &mut self.pool, &self.tof_to_mz, &self.scan_to_mobility)?;
            totals.insert(id, intensities.iter().map(|&v| v as u64).sum());
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::reset_defaults_to_error_stub;
    use crate::metadata::FrameRecord;
    use crate::test_support::{build_frame_blob, StaticMetadataProvider};
    use std::io::Write;

    fn write_bin(dir: &tempfile::TempDir, blobs: &[Vec<u8>]) -> (Vec<FrameRecord>, PathBuf) {
        let bin_path = dir.path().join("analysis.tdf_bin");
        let mut file = std::fs::File::create(&bin_path).unwrap();
        let mut records = Vec::new();
        let mut offset = 0u64;
        for (i, blob) in blobs.iter().enumerate() {
            file.write_all(blob).unwrap();
            records.push(FrameRecord {
                id: (i + 1) as u32,
                num_scans: 2,
                num_peaks: 1,
                msms_type: 0,
                accumulation_time_ms: 100.0,
                time: i as f64,
                byte_offset: offset,
            });
            offset += blob.len() as u64;
        }
        (records, bin_path)
    }

    fn open_handle(dir: &tempfile::TempDir, records: Vec<FrameRecord>, bin_path: PathBuf) -> DataHandle {
        reset_defaults_to_error_stub();
        let provider = StaticMetadataProvider(records);
        DataHandle::open_with_provider(dir.path(), &bin_path, &provider, DataHandleConfig::default()).unwrap()
    }

    #[test]
    fn extract_by_ids_and_by_slice_agree_on_present_ids() {
        let dir = tempfile::tempdir().unwrap();
        let blobs =
            vec![build_frame_blob(2, &[vec![(5, 42)], vec![]]), build_frame_blob(2, &[vec![(1, 10)], vec![]])];
        let (records, bin_path) = write_bin(&dir, &blobs);
        let mut handle = open_handle(&dir, records, bin_path);

        let mut tof_ids = [0u32; 2];
        let n = handle.extract_by_ids(&[1, 2], ColumnRequest { tof: Some(&mut tof_ids), ..ColumnRequest::none() }).unwrap();
        assert_eq!(n, 2);

        let mut tof_slice = [0u32; 2];
        let n2 = handle
            .extract_by_slice(1, 3, 1, ColumnRequest { tof: Some(&mut tof_slice), ..ColumnRequest::none() })
            .unwrap();
        assert_eq!(n2, 2);
        assert_eq!(tof_ids, tof_slice);
    }

    #[test]
    fn extract_by_ids_fails_fast_on_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = vec![build_frame_blob(2, &[vec![(5, 42)], vec![]])];
        let (records, bin_path) = write_bin(&dir, &blobs);
        let mut handle = open_handle(&dir, records, bin_path);
        let err = handle.extract_by_ids(&[1, 99], ColumnRequest::none()).unwrap_err();
        assert!(matches!(err, Error::UnknownFrame { id: 99 }));
    }

    #[test]
    fn extract_by_slice_skips_absent_ids() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = vec![build_frame_blob(2, &[vec![(5, 42)], vec![]])];
        let (mut records, bin_path) = write_bin(&dir, &blobs);
        records[0].id = 5;
        let mut handle = open_handle(&dir, records, bin_path);
        let n = handle.extract_by_slice(1, 10, 1, ColumnRequest::none()).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn extract_by_slice_rejects_zero_step() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = vec![build_frame_blob(2, &[vec![(5, 42)], vec![]])];
        let (records, bin_path) = write_bin(&dir, &blobs);
        let mut handle = open_handle(&dir, records, bin_path);
        let err = handle.extract_by_slice(1, 10, 0, ColumnRequest::none()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn mz_request_against_error_stub_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = vec![build_frame_blob(2, &[vec![(5, 42)], vec![]])];
        let (records, bin_path) = write_bin(&dir, &blobs);
        let mut handle = open_handle(&dir, records, bin_path);
        let mut mz = [0f64; 1];
        let err = handle
            .extract_by_ids(&[1], ColumnRequest { mz: Some(&mut mz), ..ColumnRequest::none() })
            .unwrap_err();
        assert!(matches!(err, Error::CalibrationNotConfigured));
    }

    #[test]
    fn extract_frames_parallel_matches_sequential_decode() {
        let dir = tempfile::tempdir().unwrap();
        let blobs =
            vec![build_frame_blob(2, &[vec![(5, 42)], vec![]]), build_frame_blob(2, &[vec![(1, 10)], vec![]])];
        let (records, bin_path) = write_bin(&dir, &blobs);
        let mut handle = open_handle(&dir, records, bin_path);

        let decoded = handle.extract_frames_parallel(&[1, 2]).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].frame_id, 1);
        assert_eq!(decoded[0].tofs, vec![4]);
        assert_eq!(decoded[1].frame_id, 2);
        assert_eq!(decoded[1].tofs, vec![0]);

        let mut sequential_tof = [0u32; 2];
        handle
            .extract_by_ids(&[1, 2], ColumnRequest { tof: Some(&mut sequential_tof), ..ColumnRequest::none() })
            .unwrap();
        assert_eq!(decoded[0].tofs[0], sequential_tof[0]);
        assert_eq!(decoded[1].tofs[0], sequential_tof[1]);
    }

    #[test]
    fn per_frame_total_intensity_keys_by_frame_id() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = vec![build_frame_blob(2, &[vec![(5, 42)], vec![]])];
        let (mut records, bin_path) = write_bin(&dir, &blobs);
        records[0].id = 9;
        let mut handle = open_handle(&dir, records, bin_path);
        let totals = handle.per_frame_total_intensity_by_id().unwrap();
        assert_eq!(totals.get(&9), Some(&42));
    }
}
