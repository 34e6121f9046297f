//! Reusable zstd decompression context and scratch buffer.
//!
//! One `Decompressor` and one scratch `Vec<u8>` live for the lifetime of a
//! `DataHandle`, sized once at construction to the largest frame's
//! decompressed payload. Frames are decoded one at a time against this
//! shared state (see the concurrency model in the crate root docs).

use crate::error::Error;

pub struct DecompressionPool {
    decompressor: zstd::bulk::Decompressor<'static>,
    scratch: Vec<u8>,
}

impl DecompressionPool {
    /// Build a pool whose scratch buffer holds `max_decompressed_payload`
    /// bytes — the largest frame observed across the acquisition.
    pub fn new(max_decompressed_payload: usize) -> Result<Self, Error> {
        let decompressor = zstd::bulk::Decompressor::new().map_err(|e| Error::Decompression {
            frame_id: 0,
            reason: format!("failed to create zstd context: {e}"),
        })?;
        Ok(Self { decompressor, scratch: vec![0u8; max_decompressed_payload] })
    }

    /// Decompress `input` (the `tims_packet_size - 8` compressed bytes) into
    /// the pool's scratch buffer and return the slice actually written.
    pub fn decompress(&mut self, frame_id: u32, input: &[u8]) -> Result<&[u8], Error> {
        let written = self
            .decompressor
            .decompress_to_buffer(input, &mut self.scratch)
            .map_err(|e| Error::Decompression { frame_id, reason: e.to_string() })?;
        Ok(&self.scratch[..written])
    }

    pub fn scratch_capacity(&self) -> usize {
        self.scratch.len()
    }
}
