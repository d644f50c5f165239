//! Gazereel Render Engine
//!
//! Offline pipeline that joins scene camera frames with the gaze tracker's
//! event log and writes one annotated video per recording.
//!
//! # Pipeline Architecture
//!
//! ```text
//! eyeData.csv ──── EventLog ──┐
//!                             ├── sync::join ── timeline::assign
//! ScenePics/ ──── FrameIndex ─┘                        │
//!                                                      ▼
//!                                   FrameRenderer (freeze-frame, overlays)
//!                                                      │
//!                                                      ▼
//!                 FrameSink (CFR slots or per-frame pts → ffmpeg) ── out.mp4
//!                                                      │
//!                                              ProgressObserver
//! ```

pub mod batch;
pub mod encoder;
pub mod export;
mod matroska;
pub mod overlay;
pub mod progress;
pub mod renderer;
pub mod sync;
pub mod timeline;

pub use batch::{export_batch, run_batch, BatchOptions, BatchOutcome};
pub use encoder::{
    ffmpeg_version, CfrClock, EncodeSummary, EncoderSettings, FfmpegEncoder, FrameSink,
    StreamTiming, VfrClock, VideoCodec,
};
pub use export::*;
pub use overlay::{ImageprocPainter, OverlayPainter};
pub use progress::{
    ExportStage, NullObserver, ProgressObserver, ProgressReport, ProgressTracker, TracingObserver,
};
pub use renderer::{FrameRenderer, OverlayConfig};
pub use sync::{SyncOutcome, SyncedRecord};
pub use timeline::TimingPolicy;
