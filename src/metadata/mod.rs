//! Acquisition metadata: the `Frames` table of `analysis.tdf`.
//!
//! Reads frame-level metadata (scan/peak counts, accumulation time,
//! retention time, binary offset) from the SQLite database that ships
//! alongside a Bruker TimsTOF acquisition. This is the one component the
//! specification calls out as an external collaborator; a `rusqlite`-backed
//! implementation is provided as the canonical default so the crate is
//! usable standalone.

use std::path::Path;

use crate::error::Error;

/// One row of the `Frames` table, before derived fields are computed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameRecord {
    pub id: u32,
    pub num_scans: u32,
    pub num_peaks: u32,
    pub msms_type: u32,
    pub accumulation_time_ms: f64,
    pub time: f64,
    pub byte_offset: u64,
}

/// Produces one [`FrameRecord`] per frame in an acquisition.
///
/// Implementations need not be backed by `analysis.tdf` at all; tests
/// supply an in-memory `MetadataProvider` built from literal records.
pub trait MetadataProvider {
    fn frame_records(&self) -> Result<Vec<FrameRecord>, Error>;
}

/// Reads frame metadata from `analysis.tdf` via `rusqlite`.
pub struct SqliteMetadataProvider {
    connection: rusqlite::Connection,
}

impl SqliteMetadataProvider {
    pub fn open(tdf_path: impl AsRef<Path>) -> Result<Self, Error> {
        let connection = rusqlite::Connection::open_with_flags(
            tdf_path.as_ref(),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        Ok(Self { connection })
    }
}

impl MetadataProvider for SqliteMetadataProvider {
    fn frame_records(&self) -> Result<Vec<FrameRecord>, Error> {
        let mut stmt = self.connection.prepare(
            "SELECT Id, NumScans, NumPeaks, MsMsType, AccumulationTime, Time, TimsId FROM Frames",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FrameRecord {
                id: row.get(0)?,
                num_scans: row.get(1)?,
                num_peaks: row.get(2)?,
                msms_type: row.get(3)?,
                accumulation_time_ms: row.get(4)?,
                time: row.get(5)?,
                byte_offset: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
