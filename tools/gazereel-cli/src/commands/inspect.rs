//! Show how frames and eye data line up.

use std::path::PathBuf;

use clap::Args;

use gazereel_common::clock::{format_elapsed_ms, pts_to_secs};
use gazereel_recording_model::event_log::MalformedRowPolicy;
use gazereel_recording_model::frame_index::NameMismatchPolicy;
use gazereel_render_engine::export::{prepare, ExportJob, ExportOptions};

use super::{frame_range, SchemaArg};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Folder containing frame_<n>.<ext> images
    #[arg(long)]
    pub frames: PathBuf,

    /// Eye data CSV (`;`-separated)
    #[arg(long)]
    pub eyedata: PathBuf,

    /// Only consider frames with LO <= frame number < HI
    #[arg(long, num_args = 2, value_names = ["LO", "HI"])]
    pub frame_range: Option<Vec<u64>>,

    /// Eye data layout
    #[arg(long, value_enum, default_value_t = SchemaArg::Auto)]
    pub schema: SchemaArg,

    /// Skip malformed frame names and eye data rows instead of failing
    #[arg(long)]
    pub lenient: bool,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let mut options = ExportOptions {
        use_real_fps: true,
        frame_range: frame_range(args.frame_range.as_deref())?,
        schema: args.schema.into(),
        ..ExportOptions::default()
    };
    if args.lenient {
        options.frame_scan.on_mismatch = NameMismatchPolicy::Skip;
        options.malformed_rows = MalformedRowPolicy::Skip;
    }
    let mut job = ExportJob::new(args.frames, args.eyedata);
    job.options = options;

    let prepared = prepare(&job)?;
    let records = &prepared.sync.records;

    println!("Recording: {}", job.frames_dir.display());
    println!();

    println!("Frames:");
    println!("  Indexed: {}", prepared.frame_count);
    println!("  Duplicate keys ignored: {}", prepared.duplicate_frames);
    println!("  Malformed names skipped: {}", prepared.skipped_frames);
    println!();

    println!("Eye data:");
    println!("  Rows: {}", records.len());
    println!("  Malformed rows skipped: {}", prepared.skipped_rows);
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        println!(
            "  Frame numbers: {} .. {}",
            first.event.frame_key, last.event.frame_key
        );
        println!(
            "  Time: {} .. {}",
            format_elapsed_ms(first.event.timestamp_ms),
            format_elapsed_ms(last.event.timestamp_ms)
        );
        let duration = pts_to_secs(last.pts);
        if duration > 0.0 {
            println!(
                "  Duration: {duration:.2}s (~{:.1} rows/s)",
                (records.len() - 1) as f64 / duration
            );
        }
        let without_gaze = records.iter().filter(|r| !r.event.has_gaze()).count();
        println!("  Rows without gaze: {without_gaze}");
    }
    println!();

    println!("Synchronization:");
    println!("  Matched rows: {}", prepared.sync.matched);
    println!("  Rows reusing previous frame: {}", prepared.sync.missing);
    println!("  Frames never referenced: {}", prepared.sync.unused_frames);
    if records.first().is_some_and(|r| r.is_missing_frame()) {
        println!("  [WARN] First row has no frame file; rendering would fail");
    }

    Ok(())
}
