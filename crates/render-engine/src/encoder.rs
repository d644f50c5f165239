//! Video output.
//!
//! Rendered frames arrive with presentation timestamps in 1/1000 s units and
//! are streamed into a system `ffmpeg` process that writes the MP4.
//!
//! Two stream timings are supported:
//!
//! - [`StreamTiming::Constant`]: raw `rgb24` frames at a fixed rate.
//!   [`CfrClock`] maps timestamps onto output frame slots, which is lossless
//!   when the timestamps already sit on that grid.
//! - [`StreamTiming::Variable`]: frames are wrapped in a Matroska stream so
//!   every frame keeps its own timestamp, and the MP4 is written with a
//!   variable frame rate. [`VfrClock`] keeps timestamps strictly increasing.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::str::FromStr;

use image::RgbImage;
use serde::Serialize;

use gazereel_common::clock::Pts;
use gazereel_common::error::{GazereelError, GazereelResult};

use crate::matroska::MatroskaWriter;

/// Program used when no ffmpeg path is configured.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Ordered consumer of rendered frames.
pub trait FrameSink {
    /// Accept one frame. `pts` must not be smaller than the previous one.
    fn write(&mut self, frame: &RgbImage, pts: Pts) -> GazereelResult<()>;

    /// Flush buffered frames and finalize the output. Called exactly once.
    fn finish(&mut self) -> GazereelResult<EncodeSummary>;
}

/// Frame accounting reported when a sink is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncodeSummary {
    /// Frames handed to the sink.
    pub frames_in: u64,
    /// Frames written to the output stream.
    pub frames_out: u64,
    /// Input frames replaced by a later frame in the same output slot.
    pub dropped: u64,
    /// Extra copies written to fill gaps between timestamps.
    pub duplicated: u64,
    /// Frames moved one time base unit later to follow an equal timestamp.
    pub retimed: u64,
}

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    #[default]
    H264,
    Mpeg4,
}

impl VideoCodec {
    fn encoder_args(self) -> &'static [&'static str] {
        match self {
            VideoCodec::H264 => &["-c:v", "libx264", "-preset", "medium"],
            VideoCodec::Mpeg4 => &["-c:v", "mpeg4", "-q:v", "3"],
        }
    }
}

impl FromStr for VideoCodec {
    type Err = GazereelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "libx264" | "avc" => Ok(VideoCodec::H264),
            "mpeg4" | "mp4v" => Ok(VideoCodec::Mpeg4),
            other => Err(GazereelError::config(format!(
                "unsupported codec '{other}' (expected h264 or mpeg4)"
            ))),
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "h264"),
            VideoCodec::Mpeg4 => write!(f, "mpeg4"),
        }
    }
}

/// How frame timestamps reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTiming {
    /// Constant frame rate at `rate`.
    #[default]
    Constant,
    /// Every frame at its own timestamp.
    Variable,
}

/// Parameters of one output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Output frames per second for constant timing.
    pub rate: u32,
    /// Timestamp units per second.
    pub time_base: i64,
    pub codec: VideoCodec,
    pub timing: StreamTiming,
    /// ffmpeg executable.
    pub program: PathBuf,
}

impl EncoderSettings {
    fn validate(&self) -> GazereelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GazereelError::encode(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        if self.rate == 0 {
            return Err(GazereelError::config("frame rate must be greater than zero"));
        }
        if self.time_base <= 0 {
            return Err(GazereelError::encode("time base must be positive"));
        }
        if self.timing == StreamTiming::Variable && self.matroska().is_none() {
            return Err(GazereelError::encode(format!(
                "time base 1/{} cannot be expressed in nanoseconds",
                self.time_base
            )));
        }
        Ok(())
    }

    fn matroska(&self) -> Option<MatroskaWriter> {
        MatroskaWriter::new(self.width, self.height, self.time_base)
    }

    /// Arguments passed to `ffmpeg`, output path last.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        match self.timing {
            StreamTiming::Constant => {
                args.extend(
                    ["-f", "rawvideo", "-pix_fmt", "rgb24"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                args.push("-s".to_string());
                args.push(format!("{}x{}", self.width, self.height));
                args.push("-r".to_string());
                args.push(self.rate.to_string());
            }
            StreamTiming::Variable => {
                args.push("-f".to_string());
                args.push("matroska".to_string());
            }
        }
        args.push("-i".to_string());
        args.push("pipe:0".to_string());
        args.push("-an".to_string());

        if self.width % 2 != 0 || self.height % 2 != 0 {
            args.push("-vf".to_string());
            args.push("pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string());
        }
        args.extend(self.codec.encoder_args().iter().map(|s| s.to_string()));
        if self.timing == StreamTiming::Variable {
            args.push("-vsync".to_string());
            args.push("vfr".to_string());
            args.push("-video_track_timescale".to_string());
            args.push(self.time_base.to_string());
        }
        args.extend(
            ["-pix_fmt", "yuv420p", "-movflags", "+faststart"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(self.output_path.to_string_lossy().into_owned());
        args
    }
}

fn check_pts(pts: Pts, last: Option<Pts>) -> GazereelResult<()> {
    if pts < 0 {
        return Err(GazereelError::encode(format!("negative timestamp {pts}")));
    }
    match last {
        Some(last) if pts < last => Err(GazereelError::encode(format!(
            "timestamp {pts} is earlier than previous timestamp {last}"
        ))),
        _ => Ok(()),
    }
}

/// What to do with the currently held frame when a new one arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAction {
    /// Nothing held yet; hold the new frame.
    Hold,
    /// Same output slot; the new frame replaces the held one.
    Replace,
    /// Write the held frame `count` times, then hold the new frame.
    Emit { count: u64 },
}

/// Maps presentation timestamps onto constant-rate output slots.
///
/// Slot of a timestamp is `round(pts * rate / time_base)`. The most recent
/// frame is held until a frame for a later slot arrives, so each slot shows
/// the last frame whose timestamp falls into it and empty slots repeat the
/// previous frame.
#[derive(Debug, Clone)]
pub struct CfrClock {
    rate: i64,
    time_base: i64,
    last_pts: Option<Pts>,
    held_slot: Option<i64>,
    summary: EncodeSummary,
}

impl CfrClock {
    pub fn new(rate: u32, time_base: i64) -> Self {
        Self {
            rate: i64::from(rate.max(1)),
            time_base: time_base.max(1),
            last_pts: None,
            held_slot: None,
            summary: EncodeSummary::default(),
        }
    }

    /// Output slot for `pts`.
    pub fn slot(&self, pts: Pts) -> i64 {
        (pts as f64 * self.rate as f64 / self.time_base as f64).round() as i64
    }

    /// Register a frame at `pts`.
    pub fn advance(&mut self, pts: Pts) -> GazereelResult<SlotAction> {
        check_pts(pts, self.last_pts)?;
        self.last_pts = Some(pts);
        self.summary.frames_in += 1;

        let slot = self.slot(pts);
        let action = match self.held_slot {
            None => SlotAction::Hold,
            Some(held) if slot <= held => {
                self.summary.dropped += 1;
                SlotAction::Replace
            }
            Some(held) => {
                let count = (slot - held) as u64;
                self.summary.frames_out += count;
                self.summary.duplicated += count - 1;
                SlotAction::Emit { count }
            }
        };
        if !matches!(action, SlotAction::Replace) {
            self.held_slot = Some(slot);
        }
        Ok(action)
    }

    /// Flush the held frame. Returns how many times to write it.
    pub fn finish(&mut self) -> u64 {
        match self.held_slot.take() {
            Some(_) => {
                self.summary.frames_out += 1;
                1
            }
            None => 0,
        }
    }

    pub fn summary(&self) -> EncodeSummary {
        self.summary
    }
}

/// Passes every frame through at its own timestamp.
///
/// Containers need strictly increasing timestamps, so a frame whose
/// timestamp equals the previous one is written one time base unit after it.
#[derive(Debug, Clone, Default)]
pub struct VfrClock {
    last_in: Option<Pts>,
    last_out: Option<Pts>,
    summary: EncodeSummary,
}

impl VfrClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frame at `pts`; returns the timestamp to write it at.
    pub fn advance(&mut self, pts: Pts) -> GazereelResult<Pts> {
        check_pts(pts, self.last_in)?;
        self.last_in = Some(pts);

        let out = match self.last_out {
            Some(previous) if pts <= previous => {
                self.summary.retimed += 1;
                previous + 1
            }
            _ => pts,
        };
        self.last_out = Some(out);
        self.summary.frames_in += 1;
        self.summary.frames_out += 1;
        Ok(out)
    }

    pub fn summary(&self) -> EncodeSummary {
        self.summary
    }
}

enum Pacing {
    Constant {
        clock: CfrClock,
        held: Option<Vec<u8>>,
    },
    Variable {
        clock: VfrClock,
        muxer: MatroskaWriter,
    },
}

impl Pacing {
    fn summary(&self) -> EncodeSummary {
        match self {
            Pacing::Constant { clock, .. } => clock.summary(),
            Pacing::Variable { clock, .. } => clock.summary(),
        }
    }
}

/// [`FrameSink`] backed by an `ffmpeg` process.
pub struct FfmpegEncoder {
    settings: EncoderSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    pacing: Pacing,
}

impl FfmpegEncoder {
    /// Spawn `settings.program` writing to `settings.output_path`.
    pub fn open(settings: EncoderSettings) -> GazereelResult<Self> {
        settings.validate()?;
        if let Some(parent) = settings.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pacing = match (settings.timing, settings.matroska()) {
            (StreamTiming::Variable, Some(muxer)) => Pacing::Variable {
                clock: VfrClock::new(),
                muxer,
            },
            _ => Pacing::Constant {
                clock: CfrClock::new(settings.rate, settings.time_base),
                held: None,
            },
        };

        let args = settings.ffmpeg_args();
        tracing::debug!(program = %settings.program.display(), args = ?args, "Running ffmpeg");
        let mut child = Command::new(&settings.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                GazereelError::encode(format!(
                    "failed to spawn {} (is ffmpeg installed and on PATH?): {e}",
                    settings.program.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GazereelError::encode("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| GazereelError::encode("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        tracing::info!(
            pid = child.id(),
            output = %settings.output_path.display(),
            width = settings.width,
            height = settings.height,
            rate = settings.rate,
            timing = ?settings.timing,
            codec = %settings.codec,
            "ffmpeg encoder started"
        );

        let mut encoder = Self {
            settings,
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
            pacing,
        };
        if let (Pacing::Variable { muxer, .. }, Some(stdin)) =
            (&encoder.pacing, encoder.stdin.as_mut())
        {
            stdin.write_all(&muxer.header()).map_err(pipe_error)?;
        }
        Ok(encoder)
    }

    fn collect_stderr(&mut self) -> String {
        match self.stderr_drain.take().map(|handle| handle.join()) {
            Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Some(Ok(Err(err))) => format!("<failed to read ffmpeg stderr: {err}>"),
            Some(Err(_)) => "<ffmpeg stderr reader panicked>".to_string(),
            None => String::new(),
        }
    }

    fn discard_output(&self) {
        if self.settings.output_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.settings.output_path) {
                tracing::warn!(
                    path = %self.settings.output_path.display(),
                    error = %err,
                    "Failed to remove incomplete output"
                );
            }
        }
    }
}

fn finalized() -> GazereelError {
    GazereelError::encode("ffmpeg encoder is already finalized")
}

fn pipe_error(err: std::io::Error) -> GazereelError {
    GazereelError::encode(format!("failed to write frame to ffmpeg stdin: {err}"))
}

fn write_repeated(stdin: &mut ChildStdin, frame: &[u8], count: u64) -> GazereelResult<()> {
    for _ in 0..count {
        stdin.write_all(frame).map_err(pipe_error)?;
    }
    Ok(())
}

impl FrameSink for FfmpegEncoder {
    fn write(&mut self, frame: &RgbImage, pts: Pts) -> GazereelResult<()> {
        if frame.dimensions() != (self.settings.width, self.settings.height) {
            return Err(GazereelError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.settings.width,
                self.settings.height
            )));
        }
        let stdin = self.stdin.as_mut().ok_or_else(finalized)?;

        match &mut self.pacing {
            Pacing::Constant { clock, held } => {
                if let SlotAction::Emit { count } = clock.advance(pts)? {
                    if let Some(previous) = held.as_deref() {
                        write_repeated(stdin, previous, count)?;
                    }
                }
                match held.as_mut() {
                    Some(buffer) => buffer.copy_from_slice(frame.as_raw()),
                    None => *held = Some(frame.as_raw().clone()),
                }
            }
            Pacing::Variable { clock, muxer } => {
                let pts = clock.advance(pts)?;
                muxer
                    .write_frame(stdin, pts, frame.as_raw())
                    .map_err(pipe_error)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> GazereelResult<EncodeSummary> {
        let stdin = self.stdin.as_mut().ok_or_else(finalized)?;
        if let Pacing::Constant { clock, held } = &mut self.pacing {
            let repeats = clock.finish();
            if let Some(last) = held.as_deref() {
                write_repeated(stdin, last, repeats)?;
            }
        }
        drop(self.stdin.take());

        let mut child = self.child.take().ok_or_else(finalized)?;
        let status = child
            .wait()
            .map_err(|e| GazereelError::encode(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = self.collect_stderr();

        if !status.success() {
            self.discard_output();
            return Err(GazereelError::encode(format!(
                "ffmpeg exited with status {status}: {stderr}"
            )));
        }

        let summary = self.pacing.summary();
        tracing::info!(
            output = %self.settings.output_path.display(),
            frames_in = summary.frames_in,
            frames_out = summary.frames_out,
            dropped = summary.dropped,
            duplicated = summary.duplicated,
            retimed = summary.retimed,
            "ffmpeg encoder finished"
        );
        Ok(summary)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        drop(self.stdin.take());
        let _ = child.kill();
        let _ = child.wait();
        let stderr = self.collect_stderr();
        tracing::warn!(
            output = %self.settings.output_path.display(),
            stderr = %stderr,
            "Encoder dropped before finishing; removing incomplete output"
        );
        self.discard_output();
    }
}

/// First line of `<program> -version`, if it runs.
pub fn ffmpeg_version(program: &Path) -> Option<String> {
    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}
