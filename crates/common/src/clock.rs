//! Time base and elapsed-time helpers.
//!
//! Eye data timestamps are milliseconds on the tracker's own clock. They are
//! only ever used as durations (relative to the first row) and for the
//! `HH:MM:SS:mmm` label burned into frames, never as wall-clock time.

use chrono::DateTime;

/// Encoder time base denominator: presentation timestamps are in 1/1000 s.
pub const TIME_BASE: i64 = 1000;

/// Presentation timestamp in [`TIME_BASE`] units.
pub type Pts = i64;

/// Format a millisecond timestamp as `HH:MM:SS:mmm`.
///
/// The value is treated as milliseconds since the Unix epoch, so anything at
/// or beyond 24 hours wraps around the clock face.
pub fn format_elapsed_ms(timestamp_ms: i64) -> String {
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(dt) => dt.format("%H:%M:%S:%3f").to_string(),
        None => "--:--:--:---".to_string(),
    }
}

/// Convert a duration in time base units to seconds.
pub fn pts_to_secs(pts: Pts) -> f64 {
    pts as f64 / TIME_BASE as f64
}

/// Length of one frame in time base units at `fps`.
pub fn frame_period(fps: u32) -> f64 {
    TIME_BASE as f64 / fps.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed_zero() {
        assert_eq!(format_elapsed_ms(0), "00:00:00:000");
    }

    #[test]
    fn test_format_elapsed_truncates_to_millis() {
        // 1h 2m 3s 45ms
        let ms = ((60 + 2) * 60 + 3) * 1000 + 45;
        assert_eq!(format_elapsed_ms(ms), "01:02:03:045");
    }

    #[test]
    fn test_format_elapsed_wraps_after_a_day() {
        assert_eq!(format_elapsed_ms(24 * 3_600_000 + 1), "00:00:00:001");
    }

    #[test]
    fn test_pts_conversion() {
        assert!((pts_to_secs(1500) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_frame_period() {
        assert!((frame_period(25) - 40.0).abs() < 1e-9);
        assert!((frame_period(0) - 1000.0).abs() < 1e-9);
    }
}
