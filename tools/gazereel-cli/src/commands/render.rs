//! Render a single recording.

use std::path::PathBuf;

use clap::Args;

use gazereel_common::config::AppConfig;
use gazereel_recording_model::event_log::MalformedRowPolicy;
use gazereel_recording_model::frame_index::NameMismatchPolicy;
use gazereel_render_engine::export::{export_video, ExportJob, ExportOptions};
use gazereel_render_engine::TracingObserver;

use super::{frame_range, SchemaArg};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Folder containing frame_<n>.<ext> images
    #[arg(long)]
    pub frames: PathBuf,

    /// Eye data CSV (`;`-separated)
    #[arg(long)]
    pub eyedata: PathBuf,

    /// Output frame rate (also the timing step without --use-real-fps)
    #[arg(long)]
    pub framerate: Option<u32>,

    /// Draw the gaze point
    #[arg(long)]
    pub draw_gaze: bool,

    /// Draw the frame number
    #[arg(long)]
    pub draw_frame_number: bool,

    /// Draw the elapsed time
    #[arg(long)]
    pub draw_time: bool,

    /// Only render frames with LO <= frame number < HI
    #[arg(long, num_args = 2, value_names = ["LO", "HI"])]
    pub frame_range: Option<Vec<u64>>,

    /// Time frames from the eye data timestamps
    #[arg(long)]
    pub use_real_fps: bool,

    /// Output video name without extension (default: frames folder name)
    #[arg(long)]
    pub video_name: Option<String>,

    /// Directory for the output video
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Report progress every N frames
    #[arg(long)]
    pub progress_interval: Option<usize>,

    /// Video codec: h264 or mpeg4
    #[arg(long)]
    pub codec: Option<String>,

    /// Font file for text overlays
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Skip frame files whose names do not match frame_<n>.<ext>
    #[arg(long)]
    pub skip_malformed_frames: bool,

    /// Skip eye data rows with unreadable values
    #[arg(long)]
    pub skip_malformed_rows: bool,

    /// Eye data layout
    #[arg(long, value_enum, default_value_t = SchemaArg::Auto)]
    pub schema: SchemaArg,

    /// Print the export summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl RenderArgs {
    /// Build the job, letting flags override the configured defaults.
    pub fn into_job(self, config: &AppConfig) -> anyhow::Result<ExportJob> {
        let mut options = ExportOptions::from_video_defaults(&config.video)?;
        if let Some(framerate) = self.framerate {
            options.framerate = framerate;
        }
        options.draw_gaze |= self.draw_gaze;
        options.draw_frame_number |= self.draw_frame_number;
        options.draw_time |= self.draw_time;
        options.use_real_fps |= self.use_real_fps;
        options.frame_range = frame_range(self.frame_range.as_deref())?;
        if let Some(interval) = self.progress_interval {
            options.progress_interval = interval;
        }
        if let Some(codec) = &self.codec {
            options.codec = codec.parse()?;
        }
        if self.font.is_some() {
            options.font_path = self.font;
        }
        if let Some(ffmpeg) = self.ffmpeg {
            options.ffmpeg = ffmpeg;
        }
        if self.skip_malformed_frames {
            options.frame_scan.on_mismatch = NameMismatchPolicy::Skip;
        }
        if self.skip_malformed_rows {
            options.malformed_rows = MalformedRowPolicy::Skip;
        }
        options.schema = self.schema.into();

        Ok(ExportJob {
            frames_dir: self.frames,
            eye_data: self.eyedata,
            output_dir: self.output_dir.unwrap_or_else(|| config.output_dir.clone()),
            video_name: self.video_name,
            options,
        })
    }
}

pub async fn run(args: RenderArgs, config: &AppConfig) -> anyhow::Result<()> {
    let json = args.json;
    let job = args.into_job(config)?;

    if !json {
        println!("Rendering: {}", job.frames_dir.display());
        println!("  Eye data: {}", job.eye_data.display());
        println!("  Output: {}", job.output_path().display());
        println!(
            "  Timing: {}",
            if job.options.use_real_fps {
                "eye data timestamps".to_string()
            } else {
                format!("{} fps", job.options.framerate)
            }
        );
    }

    let summary =
        tokio::task::spawn_blocking(move || export_video(&job, &TracingObserver)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Video saved as {}", summary.output_path.display());
        println!(
            "  Frames: {} written, {} missing, {} substituted",
            summary.frames_written, summary.missing_frames, summary.substituted_frames
        );
        println!(
            "  Encoded: {} output frames ({} dropped, {} duplicated, {} retimed) in {:.1}s",
            summary.encode.frames_out,
            summary.encode.dropped,
            summary.encode.duplicated,
            summary.encode.retimed,
            summary.elapsed_secs
        );
    }

    Ok(())
}
