//! Frame/gaze synchronization.
//!
//! Frame numbering comes from the scene camera writer and the event log from
//! the gaze tracker, so the keys can be sparse or offset at the start of a
//! recording. The event log drives the join: every row yields exactly one
//! record, and rows without a frame file are marked for freeze-frame
//! substitution instead of failing.

use std::path::PathBuf;

use gazereel_common::clock::Pts;
use gazereel_recording_model::event_log::GazeEvent;
use gazereel_recording_model::frame_index::FrameIndex;

/// One event row joined with its frame file.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedRecord {
    pub event: GazeEvent,

    /// Frame file for this row; `None` means reuse the previous image.
    pub frame_path: Option<PathBuf>,

    /// Presentation timestamp, assigned by the timeline builder.
    pub pts: Pts,
}

impl SyncedRecord {
    pub fn is_missing_frame(&self) -> bool {
        self.frame_path.is_none()
    }
}

/// Result of joining an event log with a frame index.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// One record per event row, in event order.
    pub records: Vec<SyncedRecord>,
    /// Rows that found a frame file.
    pub matched: usize,
    /// Rows without a frame file.
    pub missing: usize,
    /// Indexed frames that no row referenced.
    pub unused_frames: usize,
}

/// Left-join `events` to `frames` on frame key, preserving event order.
///
/// A frame referenced by several rows appears in each of them; frames never
/// referenced are only counted.
pub fn join(events: Vec<GazeEvent>, frames: &FrameIndex) -> SyncOutcome {
    let mut outcome = SyncOutcome {
        records: Vec::with_capacity(events.len()),
        ..SyncOutcome::default()
    };
    let mut referenced = std::collections::BTreeSet::new();

    for event in events {
        let frame_path = frames.get(event.frame_key).map(|p| p.to_path_buf());
        if frame_path.is_some() {
            outcome.matched += 1;
            referenced.insert(event.frame_key);
        } else {
            outcome.missing += 1;
        }
        outcome.records.push(SyncedRecord {
            event,
            frame_path,
            pts: 0,
        });
    }
    outcome.unused_frames = frames.len() - referenced.len();

    if outcome.missing > 0 {
        tracing::info!(
            missing = outcome.missing,
            matched = outcome.matched,
            "Event rows without a frame file will reuse the previous frame"
        );
    }
    tracing::debug!(
        records = outcome.records.len(),
        unused_frames = outcome.unused_frames,
        "Event log joined with frame index"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazereel_recording_model::frame_index::FrameRecord;

    fn frames(keys: &[u64]) -> FrameIndex {
        FrameIndex::from_records(keys.iter().map(|k| FrameRecord {
            frame_key: *k,
            path: PathBuf::from(format!("frame_{k}.jpeg")),
        }))
    }

    fn events(keys: &[u64]) -> Vec<GazeEvent> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| GazeEvent::new(*k, i as i64 * 40, 0.5, 0.5))
            .collect()
    }

    #[test]
    fn test_join_marks_missing_frames() {
        let outcome = join(events(&[1, 2, 3, 4]), &frames(&[1, 2, 4]));
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.matched, 3);
        assert_eq!(outcome.missing, 1);
        assert!(outcome.records[2].is_missing_frame());
        assert_eq!(
            outcome.records[3].frame_path.as_deref(),
            Some(std::path::Path::new("frame_4.jpeg"))
        );
    }

    #[test]
    fn test_join_preserves_event_order_and_repeats() {
        let outcome = join(events(&[5, 3, 3, 9]), &frames(&[3, 5, 7]));
        let keys: Vec<_> = outcome.records.iter().map(|r| r.event.frame_key).collect();
        assert_eq!(keys, vec![5, 3, 3, 9]);
        assert_eq!(outcome.matched, 3);
        assert_eq!(outcome.unused_frames, 1);
    }

    #[test]
    fn test_join_with_offset_keys() {
        // Frame writer started ten frames after the tracker.
        let outcome = join(events(&[0, 5, 10, 11]), &frames(&[10, 11, 12]));
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.missing, 2);
        assert!(outcome.records[0].is_missing_frame());
    }

    #[test]
    fn test_join_empty_inputs() {
        let outcome = join(Vec::new(), &frames(&[1]));
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.unused_frames, 1);
    }
}
