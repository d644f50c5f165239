//! Per-record frame rendering.
//!
//! Each synchronized record becomes one RGB8 buffer (the encoder's `rgb24`
//! input). Records without a frame file reuse the last successfully loaded
//! image; overlays are always redrawn from the record's own metadata, so a
//! frozen frame still shows the current frame number and time.

use std::path::Path;

use image::imageops::FilterType;
use image::{Rgb, RgbImage};

use gazereel_common::error::{GazereelError, GazereelResult};
use gazereel_recording_model::event_log::GazeEvent;

use crate::overlay::OverlayPainter;
use crate::sync::SyncedRecord;

pub const GAZE_MARKER_RADIUS: i32 = 5;
pub const GAZE_MARKER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 255]);

/// Top-left corner of the frame number label.
pub const FRAME_KEY_ORIGIN: (i32, i32) = (25, 5);
/// Top-left corner of the elapsed time label, below the frame number.
pub const ELAPSED_ORIGIN: (i32, i32) = (25, 25);

/// Which overlays are drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayConfig {
    pub draw_gaze: bool,
    pub draw_frame_key: bool,
    pub draw_time: bool,
}

impl OverlayConfig {
    pub fn any(&self) -> bool {
        self.draw_gaze || self.draw_frame_key || self.draw_time
    }
}

/// Counters collected while rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub loaded: usize,
    /// Records rendered from the previous image.
    pub substituted: usize,
    /// Loaded images scaled to the first frame's size.
    pub resized: usize,
}

/// Turns synchronized records into pixel buffers.
pub struct FrameRenderer {
    overlays: OverlayConfig,
    painter: Box<dyn OverlayPainter>,
    /// Last successfully loaded image, before overlays.
    last_base: Option<RgbImage>,
    size: Option<(u32, u32)>,
    stats: RenderStats,
}

impl FrameRenderer {
    pub fn new(overlays: OverlayConfig, painter: Box<dyn OverlayPainter>) -> Self {
        Self {
            overlays,
            painter,
            last_base: None,
            size: None,
            stats: RenderStats::default(),
        }
    }

    /// Render one record.
    pub fn render(&mut self, record: &SyncedRecord) -> GazereelResult<RgbImage> {
        let frame_key = record.event.frame_key;
        match record.frame_path.as_deref() {
            Some(path) => match self.load(path) {
                Ok(image) => {
                    self.stats.loaded += 1;
                    self.last_base = Some(image);
                }
                Err(err) if self.last_base.is_some() => {
                    tracing::warn!(frame_key, error = %err, "Unreadable frame; reusing previous frame");
                    self.stats.substituted += 1;
                }
                Err(err) => return Err(err),
            },
            None if self.last_base.is_none() => {
                return Err(GazereelError::MissingInitialFrame { frame_key });
            }
            None => self.stats.substituted += 1,
        }

        let mut frame = self
            .last_base
            .clone()
            .ok_or(GazereelError::MissingInitialFrame { frame_key })?;
        self.draw_overlays(&mut frame, &record.event);
        Ok(frame)
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    fn load(&mut self, path: &Path) -> GazereelResult<RgbImage> {
        let image = image::open(path)
            .map_err(|e| GazereelError::render(format!("failed to decode {}: {e}", path.display())))?
            .into_rgb8();

        match self.size {
            None => {
                self.size = Some(image.dimensions());
                Ok(image)
            }
            Some(size) if size == image.dimensions() => Ok(image),
            Some((width, height)) => {
                if self.stats.resized == 0 {
                    tracing::warn!(
                        path = %path.display(),
                        expected = ?(width, height),
                        actual = ?image.dimensions(),
                        "Frame size differs from the first frame; scaling to match"
                    );
                }
                self.stats.resized += 1;
                Ok(image::imageops::resize(
                    &image,
                    width,
                    height,
                    FilterType::Triangle,
                ))
            }
        }
    }

    /// Overlays in fixed order: gaze marker, frame number, elapsed time.
    fn draw_overlays(&mut self, frame: &mut RgbImage, event: &GazeEvent) {
        if !self.overlays.any() {
            return;
        }
        if self.overlays.draw_gaze {
            if let Some(center) = gaze_to_pixels(event, frame.dimensions()) {
                self.painter
                    .marker(frame, center, GAZE_MARKER_RADIUS, GAZE_MARKER_COLOR);
            }
        }
        if self.overlays.draw_frame_key {
            self.painter.label(
                frame,
                FRAME_KEY_ORIGIN,
                &event.frame_key.to_string(),
                TEXT_COLOR,
            );
        }
        if self.overlays.draw_time {
            self.painter
                .label(frame, ELAPSED_ORIGIN, &event.elapsed, TEXT_COLOR);
        }
    }
}

/// Gaze point in pixels, or `None` when the tracker had no gaze for the row.
///
/// Ratios are scaled by the frame size and truncated toward zero.
pub fn gaze_to_pixels(event: &GazeEvent, (width, height): (u32, u32)) -> Option<(i32, i32)> {
    if !event.has_gaze() {
        return None;
    }
    Some((
        (event.regard_x * width as f64) as i32,
        (event.regard_y * height as f64) as i32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingPainter {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl OverlayPainter for RecordingPainter {
        fn marker(&mut self, _: &mut RgbImage, center: (i32, i32), radius: i32, _: Rgb<u8>) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("marker {},{} r{radius}", center.0, center.1));
        }

        fn label(&mut self, frame: &mut RgbImage, origin: (i32, i32), text: &str, _: Rgb<u8>) {
            frame.put_pixel(origin.0 as u32, origin.1 as u32, Rgb([text.len() as u8, 0, 0]));
            self.calls
                .lock()
                .unwrap()
                .push(format!("label {},{} {text}", origin.0, origin.1));
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gazereel_test_renderer_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_frame(dir: &Path, key: u64, size: (u32, u32), color: [u8; 3]) -> PathBuf {
        let path = dir.join(format!("frame_{key}.png"));
        RgbImage::from_pixel(size.0, size.1, Rgb(color))
            .save(&path)
            .unwrap();
        path
    }

    fn record(key: u64, ts: i64, path: Option<PathBuf>) -> SyncedRecord {
        SyncedRecord {
            event: GazeEvent::new(key, ts, 0.5, 0.25),
            frame_path: path,
            pts: ts,
        }
    }

    #[test]
    fn test_freeze_frame_reuses_previous_image() {
        let dir = scratch_dir("freeze");
        let first = write_frame(&dir, 1, (64, 48), [10, 20, 30]);

        let mut renderer =
            FrameRenderer::new(OverlayConfig::default(), Box::new(RecordingPainter::default()));
        let a = renderer.render(&record(1, 0, Some(first))).unwrap();
        let b = renderer.render(&record(2, 40, None)).unwrap();

        assert_eq!(a, b);
        assert_eq!(*a.get_pixel(3, 3), Rgb([10, 20, 30]));
        assert_eq!(renderer.stats().substituted, 1);
        assert_eq!(b.dimensions(), (64, 48));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_freeze_frame_redraws_overlays_for_current_record() {
        let dir = scratch_dir("freeze_overlays");
        let first = write_frame(&dir, 1, (64, 48), [0, 0, 0]);
        let painter = RecordingPainter::default();
        let calls = painter.calls.clone();

        let overlays = OverlayConfig {
            draw_gaze: false,
            draw_frame_key: true,
            draw_time: true,
        };
        let mut renderer = FrameRenderer::new(overlays, Box::new(painter));
        let a = renderer.render(&record(1, 0, Some(first))).unwrap();
        let b = renderer.render(&record(20, 40, None)).unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "label 25,5 1",
                "label 25,25 00:00:00:000",
                "label 25,5 20",
                "label 25,25 00:00:00:040",
            ]
        );
        // Same base image, different frame number label.
        assert_ne!(a.get_pixel(25, 5), b.get_pixel(25, 5));
        assert_eq!(a.get_pixel(40, 40), b.get_pixel(40, 40));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_initial_frame() {
        let mut renderer =
            FrameRenderer::new(OverlayConfig::default(), Box::new(RecordingPainter::default()));
        let err = renderer.render(&record(7, 0, None)).unwrap_err();
        assert!(matches!(
            err,
            GazereelError::MissingInitialFrame { frame_key: 7 }
        ));
    }

    #[test]
    fn test_overlay_order_and_gaze_conversion() {
        let dir = scratch_dir("order");
        let first = write_frame(&dir, 1, (200, 100), [0, 0, 0]);
        let painter = RecordingPainter::default();
        let calls = painter.calls.clone();

        let overlays = OverlayConfig {
            draw_gaze: true,
            draw_frame_key: true,
            draw_time: true,
        };
        let mut renderer = FrameRenderer::new(overlays, Box::new(painter));
        renderer.render(&record(3, 1000, Some(first))).unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec!["marker 100,25 r5", "label 25,5 3", "label 25,25 00:00:01:000"]
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_gaze_marker_skipped_without_gaze() {
        let event = GazeEvent::new(1, 0, -1.0, -1.0);
        assert_eq!(gaze_to_pixels(&event, (640, 480)), None);
        let event = GazeEvent::new(1, 0, 0.999, 0.5);
        assert_eq!(gaze_to_pixels(&event, (640, 480)), Some((639, 240)));
    }

    #[test]
    fn test_unreadable_frame_is_substituted_after_first() {
        let dir = scratch_dir("unreadable");
        let first = write_frame(&dir, 1, (16, 16), [1, 2, 3]);
        let broken = dir.join("frame_2.png");
        std::fs::write(&broken, b"not an image").unwrap();

        let mut renderer =
            FrameRenderer::new(OverlayConfig::default(), Box::new(RecordingPainter::default()));
        let a = renderer.render(&record(1, 0, Some(first))).unwrap();
        let b = renderer.render(&record(2, 40, Some(broken.clone()))).unwrap();
        assert_eq!(a, b);
        assert_eq!(renderer.stats().substituted, 1);

        let mut fresh =
            FrameRenderer::new(OverlayConfig::default(), Box::new(RecordingPainter::default()));
        assert!(matches!(
            fresh.render(&record(2, 0, Some(broken))),
            Err(GazereelError::Render { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_mismatched_frame_size_is_scaled() {
        let dir = scratch_dir("resize");
        let first = write_frame(&dir, 1, (32, 24), [0, 0, 0]);
        let second = write_frame(&dir, 2, (64, 48), [200, 0, 0]);

        let mut renderer =
            FrameRenderer::new(OverlayConfig::default(), Box::new(RecordingPainter::default()));
        renderer.render(&record(1, 0, Some(first))).unwrap();
        let b = renderer.render(&record(2, 40, Some(second))).unwrap();
        assert_eq!(b.dimensions(), (32, 24));
        assert_eq!(renderer.stats().resized, 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
