//! Pluggable calibration strategies: time-of-flight → m/z and
//! scan → inverse reduced ion mobility (1/K₀).
//!
//! Two independent calibrators are installed on every [`crate::handle::DataHandle`]:
//! one per physical quantity. Each is either the error stub (the default,
//! so a caller who never asks for calibrated columns pays nothing) or a
//! vendor-backed calibrator that opens the acquisition a second time
//! through the Bruker shared object and delegates to its math.
//!
//! The variant set is closed, so this is a tagged enum rather than a trait
//! object — matching the reference implementation's two concrete
//! converters per quantity.

use std::ffi::CString;
use std::sync::{Mutex, OnceLock};

use crate::error::Error;
use crate::platform::LoadedLibrary;
use crate::vendor::VendorFunctions;

/// Which vendor entry point a [`VendorCalibrator`] dispatches `convert` to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionKind {
    TofToMz,
    ScanToMobility,
}

/// A calibrator backed by a loaded Bruker shared object.
///
/// Owns the library (keeping the function pointers in [`VendorFunctions`]
/// valid) and the vendor's opaque per-acquisition handle, released on drop.
pub struct VendorCalibrator {
    library: LoadedLibrary,
    functions: VendorFunctions,
    vendor_handle: u64,
    kind: ConversionKind,
}

impl VendorCalibrator {
    /// Open `acquisition_dir` through the vendor library at `library_path`
    /// and prepare to dispatch `kind` conversions against it.
    pub fn new(library_path: &str, acquisition_dir: &str, kind: ConversionKind) -> Result<Self, Error> {
        let library = LoadedLibrary::load(library_path)?;
        let functions = VendorFunctions::resolve(&library)?;
        let path = CString::new(acquisition_dir).map_err(|_| Error::Vendor {
            operation: "tims_open",
            message: "acquisition path contains an interior NUL byte".to_string(),
        })?;
        let vendor_handle = unsafe { (functions.open)(path.as_ptr(), 0) };
        if vendor_handle == 0 {
            let message = functions.last_error_string();
            return Err(Error::Vendor { operation: "tims_open", message });
        }
        Ok(Self { library, functions, vendor_handle, kind })
    }

    pub fn description(&self) -> String {
        format!("VendorCalibrator({:?}) via {}", self.kind, self.library.path())
    }

    fn convert_fn(&self) -> crate::vendor::TimsConvertFn {
        match self.kind {
            ConversionKind::TofToMz => self.functions.index_to_mz,
            ConversionKind::ScanToMobility => self.functions.scannum_to_oneoverk0,
        }
    }

    /// Widen `input` to `f64` and invoke the vendor conversion function,
    /// writing `output`.
    pub fn convert(&self, frame_id: u32, input: &[u32], output: &mut [f64]) -> Result<(), Error> {
        debug_assert_eq!(input.len(), output.len());
        let doubled: Vec<f64> = input.iter().map(|&v| v as f64).collect();
        let convert = self.convert_fn();
        unsafe {
            convert(
                self.vendor_handle,
                frame_id as i64,
                doubled.as_ptr(),
                output.as_mut_ptr(),
                input.len() as u32,
            );
        }
        Ok(())
    }
}

impl Drop for VendorCalibrator {
    fn drop(&mut self) {
        if self.vendor_handle != 0 {
            unsafe { (self.functions.close)(self.vendor_handle) };
        }
    }
}

/// One of {error stub, vendor-backed} for a single physical quantity.
pub enum Calibrator {
    ErrorStub,
    VendorBacked(VendorCalibrator),
}

impl Calibrator {
    pub fn description(&self) -> String {
        match self {
            Calibrator::ErrorStub => "ErrorStub".to_string(),
            Calibrator::VendorBacked(v) => v.description(),
        }
    }

    pub fn convert(&self, frame_id: u32, input: &[u32], output: &mut [f64]) -> Result<(), Error> {
        match self {
            Calibrator::ErrorStub => Err(Error::CalibrationNotConfigured),
            Calibrator::VendorBacked(v) => v.convert(frame_id, input, output),
        }
    }
}

/// Constructs a fresh [`Calibrator`] for a given acquisition directory.
/// Installed process-wide via [`set_default_tof_to_mz_factory`] /
/// [`set_default_scan_to_mobility_factory`] and consulted once per
/// `DataHandle` construction.
pub type CalibratorFactory = Box<dyn Fn(&str) -> Calibrator + Send + Sync>;

fn error_stub_factory() -> CalibratorFactory {
    Box::new(|_acquisition_dir| Calibrator::ErrorStub)
}

static DEFAULT_TOF_TO_MZ: OnceLock<Mutex<CalibratorFactory>> = OnceLock::new();
static DEFAULT_SCAN_TO_MOBILITY: OnceLock<Mutex<CalibratorFactory>> = OnceLock::new();

fn default_tof_to_mz_slot() -> &'static Mutex<CalibratorFactory> {
    DEFAULT_TOF_TO_MZ.get_or_init(|| Mutex::new(error_stub_factory()))
}

fn default_scan_to_mobility_slot() -> &'static Mutex<CalibratorFactory> {
    DEFAULT_SCAN_TO_MOBILITY.get_or_init(|| Mutex::new(error_stub_factory()))
}

/// Install the process-wide default tof→mz calibrator factory. Only
/// affects `DataHandle`s constructed after this call returns.
pub fn set_default_tof_to_mz_factory(factory: CalibratorFactory) {
    *default_tof_to_mz_slot().lock().expect("default factory lock poisoned") = factory;
}

/// Install the process-wide default scan→mobility calibrator factory.
pub fn set_default_scan_to_mobility_factory(factory: CalibratorFactory) {
    *default_scan_to_mobility_slot().lock().expect("default factory lock poisoned") = factory;
}

/// Reset both default factories to the error stub. Exposed for tests that
/// must not leak process-wide state across test functions.
pub fn reset_defaults_to_error_stub() {
    set_default_tof_to_mz_factory(error_stub_factory());
    set_default_scan_to_mobility_factory(error_stub_factory());
}

pub(crate) fn produce_default_tof_to_mz(acquisition_dir: &str) -> Calibrator {
    (default_tof_to_mz_slot().lock().expect("default factory lock poisoned"))(acquisition_dir)
}

pub(crate) fn produce_default_scan_to_mobility(acquisition_dir: &str) -> Calibrator {
    (default_scan_to_mobility_slot().lock().expect("default factory lock poisoned"))(acquisition_dir)
}

/// Convenience factory: a vendor-backed calibrator rooted at `library_path`.
pub fn vendor_factory(library_path: &str, kind: ConversionKind) -> CalibratorFactory {
    let library_path = library_path.to_string();
    Box::new(move |acquisition_dir: &str| {
        match VendorCalibrator::new(&library_path, acquisition_dir, kind) {
            Ok(calibrator) => Calibrator::VendorBacked(calibrator),
            Err(err) => {
                log::warn!("vendor calibrator construction failed, falling back to error stub: {err}");
                Calibrator::ErrorStub
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_stub_fails_every_convert() {
        let calibrator = Calibrator::ErrorStub;
        let mut out = [0.0f64; 1];
        let err = calibrator.convert(1, &[5], &mut out).unwrap_err();
        assert!(matches!(err, Error::CalibrationNotConfigured));
    }

    #[test]
    fn default_factory_starts_as_error_stub() {
        reset_defaults_to_error_stub();
        let calibrator = produce_default_tof_to_mz("/tmp/does-not-matter.d");
        assert_eq!(calibrator.description(), "ErrorStub");
    }
}
