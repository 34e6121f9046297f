//! Crate-wide error taxonomy.

use thiserror::Error;

/// Every way the frame access engine can fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load shared library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },

    #[error("symbol {symbol} not found in shared library: {reason}")]
    SymbolMissing { symbol: String, reason: String },

    #[error("dynamic library loading is not supported on this platform")]
    UnsupportedPlatform,

    #[error("failed to read acquisition metadata: {0}")]
    Metadata(#[from] rusqlite::Error),

    #[error("unknown frame id {id}")]
    UnknownFrame { id: u32 },

    #[error("frame {id} is corrupt: {reason}")]
    CorruptFrame { id: u32, reason: &'static str },

    #[error("failed to decompress frame {frame_id}: {reason}")]
    Decompression { frame_id: u32, reason: String },

    #[error("calibration requested but no strategy is configured; install one with set_tof_to_mz/set_scan_to_mobility or a default factory before opening the handle")]
    CalibrationNotConfigured,

    #[error("vendor library error during {operation}: {message}")]
    Vendor { operation: &'static str, message: String },

    #[error("failed to memory-map {path}: {source}")]
    Mapping { path: String, source: std::io::Error },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
