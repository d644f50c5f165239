//! Throughput tracking and progress reporting.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    /// Output video name.
    pub video: String,

    pub stage: ExportStage,

    /// Records rendered and written so far.
    pub frames_written: u64,

    /// Records to write in total.
    pub total_frames: u64,

    /// Frame key of the last written record.
    pub frame_key: Option<u64>,

    /// Mean throughput over the tracker window.
    pub frames_per_sec: f64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,
}

impl ProgressReport {
    /// Report carrying only a stage, used outside the render loop.
    pub fn stage(video: &str, stage: ExportStage, frames_written: u64, total_frames: u64) -> Self {
        Self {
            video: video.to_string(),
            stage,
            frames_written,
            total_frames,
            frame_key: None,
            frames_per_sec: 0.0,
            eta_secs: 0.0,
        }
    }

    /// Current progress in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.frames_written as f64 / self.total_frames as f64).clamp(0.0, 1.0)
    }
}

/// Receiver of progress reports.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, report: &ProgressReport);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressReport) + Send + Sync,
{
    fn on_progress(&self, report: &ProgressReport) {
        self(report)
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_progress(&self, _report: &ProgressReport) {}
}

/// Emits reports as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, report: &ProgressReport) {
        match report.stage {
            ExportStage::Rendering => tracing::info!(
                video = %report.video,
                frame = ?report.frame_key,
                written = report.frames_written,
                total = report.total_frames,
                percent = %format!("{:.1}", report.fraction() * 100.0),
                fps = %format!("{:.1}", report.frames_per_sec),
                eta_secs = %format!("{:.0}", report.eta_secs),
                "Writing frames"
            ),
            ExportStage::Failed => tracing::warn!(
                video = %report.video,
                written = report.frames_written,
                total = report.total_frames,
                "Export failed"
            ),
            stage => tracing::debug!(
                video = %report.video,
                stage = ?stage,
                written = report.frames_written,
                total = report.total_frames,
                "Export stage"
            ),
        }
    }
}

/// Throughput and remaining time derived from the tracker window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressEstimate {
    pub frames_per_sec: f64,
    pub eta_secs: f64,
}

/// Rolling window of per-frame write durations.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    window: VecDeque<Duration>,
    interval: usize,
}

impl ProgressTracker {
    /// Tracker reporting every `interval` frames over a window of the same size.
    pub fn new(interval: usize) -> Self {
        let interval = interval.max(1);
        Self {
            window: VecDeque::with_capacity(interval),
            interval,
        }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Add one frame's write duration, evicting the oldest beyond the window.
    pub fn record(&mut self, duration: Duration) {
        if self.window.len() == self.interval {
            self.window.pop_front();
        }
        self.window.push_back(duration);
    }

    /// Whether a report is due after `count` written frames.
    pub fn should_report(&self, count: u64) -> bool {
        count > 0 && count % self.interval as u64 == 0
    }

    /// Mean throughput over the window and linear time remaining.
    pub fn estimate(&self, frames_written: u64, total_frames: u64) -> ProgressEstimate {
        if self.window.is_empty() {
            return ProgressEstimate::default();
        }
        let total: Duration = self.window.iter().sum();
        let mean_secs = total.as_secs_f64() / self.window.len() as f64;
        if mean_secs <= 0.0 {
            return ProgressEstimate::default();
        }
        let remaining = total_frames.saturating_sub(frames_written);
        ProgressEstimate {
            frames_per_sec: 1.0 / mean_secs,
            eta_secs: remaining as f64 * mean_secs,
        }
    }
}

/// Reporting interval bounded by half the record count and half the number
/// of frame files, never below one.
pub fn clamp_interval(requested: usize, total_records: usize, discovered_frames: usize) -> usize {
    requested
        .min(total_records / 2)
        .min(discovered_frames / 2)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_clamp_interval() {
        assert_eq!(clamp_interval(1000, 10_000, 10_000), 1000);
        assert_eq!(clamp_interval(1000, 300, 10_000), 150);
        assert_eq!(clamp_interval(1000, 10_000, 40), 20);
        assert_eq!(clamp_interval(1000, 1, 1), 1);
        assert_eq!(clamp_interval(0, 100, 100), 1);
    }

    #[test]
    fn test_should_report_every_interval() {
        let tracker = ProgressTracker::new(3);
        let due: Vec<u64> = (0..10).filter(|n| tracker.should_report(*n)).collect();
        assert_eq!(due, vec![3, 6, 9]);
    }

    #[test]
    fn test_estimate_uses_window_mean() {
        let mut tracker = ProgressTracker::new(2);
        tracker.record(Duration::from_millis(500));
        tracker.record(Duration::from_millis(100));
        tracker.record(Duration::from_millis(100));

        let estimate = tracker.estimate(10, 30);
        assert!((estimate.frames_per_sec - 10.0).abs() < 1e-9);
        assert!((estimate.eta_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_with_empty_window() {
        let tracker = ProgressTracker::new(5);
        assert_eq!(tracker.estimate(0, 100), ProgressEstimate::default());
    }

    #[test]
    fn test_estimate_past_total_has_no_eta() {
        let mut tracker = ProgressTracker::new(1);
        tracker.record(Duration::from_millis(20));
        assert_eq!(tracker.estimate(12, 10).eta_secs, 0.0);
    }

    #[test]
    fn test_closure_observer_receives_reports() {
        let seen = Mutex::new(Vec::new());
        let observer = |report: &ProgressReport| seen.lock().unwrap().push(report.stage);
        observer.on_progress(&ProgressReport::stage("v", ExportStage::Preparing, 0, 4));
        observer.on_progress(&ProgressReport::stage("v", ExportStage::Complete, 4, 4));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ExportStage::Preparing, ExportStage::Complete]
        );
    }

    #[test]
    fn test_report_fraction() {
        assert_eq!(ProgressReport::stage("v", ExportStage::Rendering, 5, 0).fraction(), 0.0);
        assert_eq!(ProgressReport::stage("v", ExportStage::Rendering, 1, 4).fraction(), 0.25);
    }

    proptest::proptest! {
        #[test]
        fn prop_clamped_interval_is_within_bounds(
            requested in 0usize..5000,
            total in 0usize..5000,
            discovered in 0usize..5000,
        ) {
            let n = clamp_interval(requested, total, discovered);
            proptest::prop_assert!(n >= 1);
            proptest::prop_assert!(n <= requested.max(1));
            proptest::prop_assert!(n <= (total / 2).max(1));
            proptest::prop_assert!(n <= (discovered / 2).max(1));
        }

        #[test]
        fn prop_window_never_exceeds_interval(
            interval in 1usize..50,
            samples in proptest::collection::vec(1u64..1000, 0..200),
        ) {
            let mut tracker = ProgressTracker::new(interval);
            for ms in samples {
                tracker.record(Duration::from_millis(ms));
            }
            proptest::prop_assert!(tracker.window.len() <= interval);
        }
    }
}
