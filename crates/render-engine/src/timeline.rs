//! Presentation timestamps for synchronized records.
//!
//! Both policies produce timestamps in the encoder time base (1/1000 s), so
//! the encoder never needs to know which one was used.

use gazereel_common::clock::{frame_period, Pts};
use gazereel_common::error::{GazereelError, GazereelResult};

use crate::sync::SyncedRecord;

/// How presentation timestamps are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingPolicy {
    /// Elapsed tracker time since the first row.
    RealFps,
    /// Constant period of `1/rate` seconds per row.
    FixedFps(u32),
}

impl TimingPolicy {
    pub fn from_options(use_real_fps: bool, framerate: u32) -> Self {
        if use_real_fps {
            Self::RealFps
        } else {
            Self::FixedFps(framerate)
        }
    }
}

/// Fill `pts` on every record according to `policy`.
///
/// Timestamps never decrease: a tracker timestamp earlier than its
/// predecessor is held at the previous value and reported once.
pub fn assign(records: &mut [SyncedRecord], policy: TimingPolicy) -> GazereelResult<()> {
    match policy {
        TimingPolicy::RealFps => assign_real(records),
        TimingPolicy::FixedFps(0) => {
            return Err(GazereelError::config("frame rate must be greater than zero"));
        }
        TimingPolicy::FixedFps(rate) => assign_fixed(records, rate),
    }
    Ok(())
}

fn assign_real(records: &mut [SyncedRecord]) {
    let Some(origin) = records.first().map(|r| r.event.timestamp_ms) else {
        return;
    };

    let mut previous: Pts = 0;
    let mut held = 0usize;
    for record in records.iter_mut() {
        let pts = record.event.timestamp_ms - origin;
        record.pts = if pts < previous {
            held += 1;
            previous
        } else {
            pts
        };
        previous = record.pts;
    }

    if held > 0 {
        tracing::warn!(
            rows = held,
            "Event timestamps went backwards; held those rows at the previous timestamp"
        );
    }
}

fn assign_fixed(records: &mut [SyncedRecord], rate: u32) {
    let step = frame_period(rate);
    for (i, record) in records.iter_mut().enumerate() {
        record.pts = (i as f64 * step).round() as Pts;
    }
}
