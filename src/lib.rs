//! A reader for Bruker TimsTOF (`.d`) mass-spectrometer acquisitions.
//!
//! Construct a [`handle::DataHandle`] over an acquisition directory, then
//! extract flat peak columns by frame id list or by slice. See
//! [`handle::DataHandle::open`] for the entry point.

pub mod calibration;
pub mod columns;
pub mod decode;
pub mod decompression;
pub mod descriptors;
pub mod error;
pub mod handle;
pub mod metadata;
pub mod platform;
pub mod threading;
pub mod vendor;

#[cfg(test)]
pub(crate) mod test_support;

pub use calibration::{Calibrator, ConversionKind, VendorCalibrator};
pub use columns::ColumnRequest;
pub use descriptors::{DescriptorTable, FrameDescriptor};
pub use error::{Error, Result};
pub use handle::{DataHandle, DataHandleConfig, DecodedFrame};
pub use metadata::{FrameRecord, MetadataProvider, SqliteMetadataProvider};
