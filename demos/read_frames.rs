//! Example: read frame metadata and a peak table out of a TimsTOF
//! acquisition directory.
//!
//! Run with: cargo run --example read_frames -- <path-to-data.d>

use std::env;
use std::path::Path;

use opentims::{ColumnRequest, DataHandle};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <path-to-data.d>", args[0]);
        std::process::exit(1);
    }

    let data_path = &args[1];
    if !Path::new(data_path).exists() {
        eprintln!("Error: path does not exist: {data_path}");
        std::process::exit(1);
    }

    let mut handle = DataHandle::open(data_path)?;

    println!("Opened acquisition: {}", handle.acquisition_dir().display());
    println!(
        "Frame ids {}..={}, total peaks: {}, largest frame: {} peaks",
        handle.min_frame_id().unwrap_or(0),
        handle.max_frame_id().unwrap_or(0),
        handle.peaks_total(),
        handle.max_peaks_in_frame(),
    );

    let Some(min_id) = handle.min_frame_id() else {
        println!("Acquisition has no frames.");
        return Ok(());
    };
    let max_id = handle.max_frame_id().unwrap_or(min_id);
    let sample_end = (min_id + 5).min(max_id + 1);
    let sample_ids: Vec<u32> = (min_id..sample_end).filter(|id| handle.has_frame(*id)).collect();

    let peak_count = handle.peaks_in(&sample_ids)? as usize;
    let mut frame_id = vec![0u32; peak_count];
    let mut scan_id = vec![0u32; peak_count];
    let mut tof = vec![0u32; peak_count];
    let mut intensity = vec![0u32; peak_count];
    let mut retention_time = vec![0f64; peak_count];

    let written = handle.extract_by_ids(
        &sample_ids,
        ColumnRequest {
            frame_id: Some(&mut frame_id),
            scan_id: Some(&mut scan_id),
            tof: Some(&mut tof),
            intensity: Some(&mut intensity),
            mz: None,
            inv_ion_mobility: None,
            retention_time: Some(&mut retention_time),
        },
    )?;

    println!("\n=== First {} frames, {written} peaks ===", sample_ids.len());
    for i in 0..written.min(20) {
        println!(
            "frame={} scan={} tof={} intensity={} rt={:.2}s",
            frame_id[i], scan_id[i], tof[i], intensity[i], retention_time[i]
        );
    }

    Ok(())
}
