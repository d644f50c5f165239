//! Export configuration and job management.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use gazereel_common::clock::TIME_BASE;
use gazereel_common::config::{AppConfig, VideoDefaults};
use gazereel_common::error::{GazereelError, GazereelResult};
use gazereel_recording_model::event_log::{EventLog, FrameRange, MalformedRowPolicy, SchemaHint};
use gazereel_recording_model::frame_index::{FrameIndex, FrameScanOptions};
use gazereel_recording_model::recording::{folder_name, RecordingLayout};

use crate::encoder::{
    EncodeSummary, EncoderSettings, FfmpegEncoder, FrameSink, StreamTiming, VideoCodec,
    DEFAULT_FFMPEG,
};
use crate::overlay::ImageprocPainter;
use crate::progress::{
    clamp_interval, ExportStage, ProgressObserver, ProgressReport, ProgressTracker,
};
use crate::renderer::{FrameRenderer, OverlayConfig};
use crate::sync::{self, SyncOutcome, SyncedRecord};
use crate::timeline::{self, TimingPolicy};

/// Name used when neither a video name nor a usable folder name exists.
const FALLBACK_VIDEO_NAME: &str = "output";

/// Rendering options for one video.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Output frame rate, and the timing step when `use_real_fps` is off.
    pub framerate: u32,

    pub draw_gaze: bool,
    pub draw_frame_number: bool,
    pub draw_time: bool,

    /// Only render event rows with a frame key in this range.
    pub frame_range: Option<FrameRange>,

    /// Time frames from the event log instead of `framerate`.
    pub use_real_fps: bool,

    /// Report progress after this many written frames (clamped per video).
    pub progress_interval: usize,

    pub codec: VideoCodec,

    /// ffmpeg executable.
    pub ffmpeg: PathBuf,

    /// Font for text overlays; a system font is used when unset.
    pub font_path: Option<PathBuf>,

    pub frame_scan: FrameScanOptions,
    pub schema: SchemaHint,
    pub malformed_rows: MalformedRowPolicy,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            framerate: 25,
            draw_gaze: false,
            draw_frame_number: false,
            draw_time: false,
            frame_range: None,
            use_real_fps: false,
            progress_interval: 1000,
            codec: VideoCodec::default(),
            ffmpeg: PathBuf::from(DEFAULT_FFMPEG),
            font_path: None,
            frame_scan: FrameScanOptions::default(),
            schema: SchemaHint::Auto,
            malformed_rows: MalformedRowPolicy::Abort,
        }
    }
}

impl ExportOptions {
    /// Options for a single render, from the configured defaults.
    pub fn from_video_defaults(video: &VideoDefaults) -> GazereelResult<Self> {
        Ok(Self {
            framerate: video.framerate,
            draw_gaze: video.draw_gaze,
            draw_frame_number: video.draw_frame_number,
            draw_time: video.draw_time,
            use_real_fps: video.use_real_fps,
            progress_interval: video.progress_interval,
            codec: video.codec.parse()?,
            ffmpeg: video.ffmpeg.clone(),
            font_path: video.font_path.clone(),
            ..Self::default()
        })
    }

    /// Options applied to every folder in batch mode.
    pub fn batch_preset(config: &AppConfig) -> GazereelResult<Self> {
        let batch = &config.batch;
        Ok(Self {
            draw_gaze: batch.draw_gaze,
            draw_frame_number: batch.draw_frame_number,
            draw_time: batch.draw_time,
            use_real_fps: batch.use_real_fps,
            progress_interval: batch.progress_interval,
            ..Self::from_video_defaults(&config.video)?
        })
    }

    pub fn overlays(&self) -> OverlayConfig {
        OverlayConfig {
            draw_gaze: self.draw_gaze,
            draw_frame_key: self.draw_frame_number,
            draw_time: self.draw_time,
        }
    }

    pub fn timing(&self) -> TimingPolicy {
        TimingPolicy::from_options(self.use_real_fps, self.framerate)
    }

    /// Real timestamps are kept per frame; fixed-rate ones already sit on
    /// the output grid.
    pub fn stream_timing(&self) -> StreamTiming {
        if self.use_real_fps {
            StreamTiming::Variable
        } else {
            StreamTiming::Constant
        }
    }
}

/// An export job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Folder of `frame_<n>.<ext>` images.
    pub frames_dir: PathBuf,

    /// `;`-separated event log.
    pub eye_data: PathBuf,

    /// Directory receiving `<video name>.mp4`.
    pub output_dir: PathBuf,

    /// Output name without extension; defaults to the frames folder name.
    pub video_name: Option<String>,

    pub options: ExportOptions,
}

impl ExportJob {
    pub fn new(frames_dir: impl Into<PathBuf>, eye_data: impl Into<PathBuf>) -> Self {
        Self {
            frames_dir: frames_dir.into(),
            eye_data: eye_data.into(),
            output_dir: PathBuf::from("."),
            video_name: None,
            options: ExportOptions::default(),
        }
    }

    /// Job for a recording folder, named after the folder.
    pub fn from_layout(
        layout: &RecordingLayout,
        output_dir: impl Into<PathBuf>,
        options: ExportOptions,
    ) -> Self {
        Self {
            frames_dir: layout.frames_dir.clone(),
            eye_data: layout.eye_data.clone(),
            output_dir: output_dir.into(),
            video_name: Some(layout.name()),
            options,
        }
    }

    /// Output name without extension.
    pub fn name(&self) -> String {
        match self.video_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let name = folder_name(&self.frames_dir);
                if name.is_empty() {
                    FALLBACK_VIDEO_NAME.to_string()
                } else {
                    name
                }
            }
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.mp4", self.name()))
    }
}

/// Result of a finished export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub output_path: PathBuf,

    /// Records rendered and written to the sink.
    pub frames_written: u64,

    /// Event rows without a frame file.
    pub missing_frames: usize,

    /// Records rendered from the previous image (missing or unreadable files).
    pub substituted_frames: usize,

    /// Frames scaled to the first frame's size.
    pub resized_frames: usize,

    pub elapsed_secs: f64,

    pub encode: EncodeSummary,
}

/// Event rows joined with frame files and timed, before any rendering.
#[derive(Debug, Clone)]
pub struct PreparedExport {
    pub sync: SyncOutcome,
    pub frame_count: usize,
    pub duplicate_frames: usize,
    pub skipped_frames: usize,
    pub skipped_rows: usize,
}

/// Load, filter, join and time the inputs of `job`.
pub fn prepare(job: &ExportJob) -> GazereelResult<PreparedExport> {
    let options = &job.options;
    let mut log = EventLog::load(&job.eye_data, options.schema, options.malformed_rows)?;
    if let Some(range) = &options.frame_range {
        let removed = log.retain_range(range);
        tracing::debug!(range = %range, removed, kept = log.len(), "Frame range applied");
        if log.is_empty() {
            return Err(GazereelError::range(format!(
                "no event rows with frame key in {range}"
            )));
        }
    }
    let skipped_rows = log.skipped_rows();

    let frames = FrameIndex::build(&job.frames_dir, &options.frame_scan)?;
    let frame_count = frames.len();
    tracing::info!(
        frames = frame_count,
        rows = log.len(),
        frame_keys = ?log.frame_key_span(),
        schema = ?log.schema(),
        "Inputs loaded"
    );

    let mut sync = sync::join(log.into_events(), &frames);
    timeline::assign(&mut sync.records, options.timing())?;

    Ok(PreparedExport {
        sync,
        frame_count,
        duplicate_frames: frames.duplicates(),
        skipped_frames: frames.skipped(),
        skipped_rows,
    })
}

/// Render `job` to an MP4 with the system ffmpeg.
pub fn export_video(
    job: &ExportJob,
    observer: &dyn ProgressObserver,
) -> GazereelResult<ExportSummary> {
    export_with_sink(job, FfmpegEncoder::open, observer)
}

/// Render `job` into the sink produced by `open_sink`.
///
/// The sink is opened once the first frame is rendered, with that frame's
/// size. On failure the sink is dropped without being finished.
pub fn export_with_sink<S, F>(
    job: &ExportJob,
    open_sink: F,
    observer: &dyn ProgressObserver,
) -> GazereelResult<ExportSummary>
where
    S: FrameSink,
    F: FnOnce(EncoderSettings) -> GazereelResult<S>,
{
    let started = Instant::now();
    let video = job.name();
    tracing::info!(
        video = %video,
        frames = %job.frames_dir.display(),
        eye_data = %job.eye_data.display(),
        output = %job.output_path().display(),
        "Starting export"
    );
    observer.on_progress(&ProgressReport::stage(&video, ExportStage::Preparing, 0, 0));

    let mut written = 0u64;
    let mut total = 0u64;
    let result = prepare(job).and_then(|prepared| {
        total = prepared.sync.records.len() as u64;
        run_pipeline(job, &video, prepared, open_sink, observer, &mut written)
    });

    match result {
        Ok(mut summary) => {
            summary.elapsed_secs = started.elapsed().as_secs_f64();
            observer.on_progress(&ProgressReport::stage(
                &video,
                ExportStage::Complete,
                summary.frames_written,
                summary.frames_written,
            ));
            tracing::info!(
                video = %video,
                output = %summary.output_path.display(),
                frames = summary.frames_written,
                missing = summary.missing_frames,
                elapsed_secs = summary.elapsed_secs,
                "Export finished"
            );
            Ok(summary)
        }
        Err(err) => {
            observer.on_progress(&ProgressReport::stage(
                &video,
                ExportStage::Failed,
                written,
                total,
            ));
            Err(err)
        }
    }
}

fn run_pipeline<S, F>(
    job: &ExportJob,
    video: &str,
    prepared: PreparedExport,
    open_sink: F,
    observer: &dyn ProgressObserver,
    written: &mut u64,
) -> GazereelResult<ExportSummary>
where
    S: FrameSink,
    F: FnOnce(EncoderSettings) -> GazereelResult<S>,
{
    let options = &job.options;
    let records = prepared.sync.records;
    let total = records.len() as u64;

    let painter = if options.draw_frame_number || options.draw_time {
        ImageprocPainter::with_font(options.font_path.as_deref())?
    } else {
        ImageprocPainter::new(None)
    };
    let mut renderer = FrameRenderer::new(options.overlays(), Box::new(painter));

    let mut tracker = ProgressTracker::new(clamp_interval(
        options.progress_interval,
        records.len(),
        prepared.frame_count,
    ));
    tracing::debug!(interval = tracker.interval(), total, "Progress interval");

    let output_path = job.output_path();
    let mut open_sink = Some(open_sink);
    let mut sink: Option<S> = None;

    for record in &records {
        let frame_started = Instant::now();
        let frame = renderer.render(record)?;

        if sink.is_none() {
            let (width, height) = frame.dimensions();
            let settings = EncoderSettings {
                output_path: output_path.clone(),
                width,
                height,
                rate: options.framerate,
                time_base: TIME_BASE,
                codec: options.codec,
                timing: options.stream_timing(),
                program: options.ffmpeg.clone(),
            };
            let open = open_sink
                .take()
                .ok_or_else(|| GazereelError::encode("sink already opened"))?;
            sink = Some(open(settings)?);
        }
        if let Some(sink) = sink.as_mut() {
            sink.write(&frame, record.pts)?;
        }

        *written += 1;
        tracker.record(frame_started.elapsed());
        if tracker.should_report(*written) {
            observer.on_progress(&rendering_report(video, record, *written, total, &tracker));
        }
    }

    observer.on_progress(&ProgressReport::stage(
        video,
        ExportStage::Finalizing,
        *written,
        total,
    ));
    let encode = match sink.as_mut() {
        Some(sink) => sink.finish()?,
        None => return Err(GazereelError::range("no records to render")),
    };
    let stats = renderer.stats();

    Ok(ExportSummary {
        output_path,
        frames_written: *written,
        missing_frames: prepared.sync.missing,
        substituted_frames: stats.substituted,
        resized_frames: stats.resized,
        elapsed_secs: 0.0,
        encode,
    })
}

fn rendering_report(
    video: &str,
    record: &SyncedRecord,
    written: u64,
    total: u64,
    tracker: &ProgressTracker,
) -> ProgressReport {
    let estimate = tracker.estimate(written, total);
    ProgressReport {
        video: video.to_string(),
        stage: ExportStage::Rendering,
        frames_written: written,
        total_frames: total,
        frame_key: Some(record.event.frame_key),
        frames_per_sec: estimate.frames_per_sec,
        eta_secs: estimate.eta_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazereel_common::config::AppConfig;

    #[test]
    fn test_default_name_is_frames_folder() {
        let job = ExportJob::new("/data/P01/ScenePics", "/data/P01/eyeData.csv");
        assert_eq!(job.name(), "ScenePics");
        assert_eq!(job.output_path(), PathBuf::from("./ScenePics.mp4"));
    }

    #[test]
    fn test_explicit_name_wins() {
        let mut job = ExportJob::new("/data/P01/ScenePics", "/data/P01/eyeData.csv");
        job.video_name = Some("participant01".into());
        job.output_dir = PathBuf::from("/videos");
        assert_eq!(job.output_path(), PathBuf::from("/videos/participant01.mp4"));

        job.video_name = Some("  ".into());
        assert_eq!(job.name(), "ScenePics");
    }

    #[test]
    fn test_job_from_layout_uses_folder_name() {
        let layout = RecordingLayout::from_folder("/data/P07");
        let job = ExportJob::from_layout(&layout, "/out", ExportOptions::default());
        assert_eq!(job.frames_dir, PathBuf::from("/data/P07/ScenePics"));
        assert_eq!(job.output_path(), PathBuf::from("/out/P07.mp4"));
    }

    #[test]
    fn test_batch_preset_overrides_overlays() {
        let config = AppConfig::default();
        let options = ExportOptions::batch_preset(&config).unwrap();
        assert!(options.draw_frame_number);
        assert!(options.draw_time);
        assert!(!options.draw_gaze);
        assert!(options.use_real_fps);
        assert_eq!(options.progress_interval, 500);
        assert_eq!(options.framerate, 25);
        assert_eq!(options.stream_timing(), StreamTiming::Variable);
    }

    #[test]
    fn test_fixed_rate_uses_constant_stream() {
        let mut config = AppConfig::default();
        config.video.ffmpeg = PathBuf::from("/opt/ffmpeg/bin/ffmpeg");
        let options = ExportOptions::from_video_defaults(&config.video).unwrap();
        assert_eq!(options.stream_timing(), StreamTiming::Constant);
        assert_eq!(options.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_unknown_codec_in_config_is_rejected() {
        let mut config = AppConfig::default();
        config.video.codec = "prores".into();
        assert!(matches!(
            ExportOptions::from_video_defaults(&config.video),
            Err(GazereelError::Config { .. })
        ));
    }
}
