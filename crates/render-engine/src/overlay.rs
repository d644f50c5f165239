//! Overlay drawing primitives.
//!
//! The renderer decides *what* to draw and in which order; a painter only
//! knows how to put a marker or a text label onto an RGB frame. Tests swap
//! in a recording painter.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_text_mut};

use gazereel_common::error::{GazereelError, GazereelResult};

/// Fonts tried, in order, when no font is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Text height in pixels.
pub const TEXT_SCALE_PX: f32 = 14.0;

/// Outline thickness of the gaze marker in pixels.
pub const MARKER_THICKNESS: i32 = 2;

/// Something that can draw overlays onto a frame.
pub trait OverlayPainter: Send {
    /// Draw a circular outline centred at `center`.
    fn marker(&mut self, frame: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>);

    /// Draw `text` with its top-left corner at `origin`.
    fn label(&mut self, frame: &mut RgbImage, origin: (i32, i32), text: &str, color: Rgb<u8>);
}

/// Painter backed by `imageproc`, with text through an optional TrueType font.
pub struct ImageprocPainter {
    font: Option<FontVec>,
    scale: PxScale,
    warned_no_font: bool,
}

impl ImageprocPainter {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            scale: PxScale::from(TEXT_SCALE_PX),
            warned_no_font: false,
        }
    }

    /// Painter using the font at `font_path`, or the first usable system font.
    ///
    /// Fails with `Config` when no font can be loaded.
    pub fn with_font(font_path: Option<&Path>) -> GazereelResult<Self> {
        let font = match font_path {
            Some(path) => load_font(path)?,
            None => load_first_font(SYSTEM_FONT_CANDIDATES.iter().map(Path::new))?,
        };
        Ok(Self::new(Some(font)))
    }
}

impl OverlayPainter for ImageprocPainter {
    fn marker(&mut self, frame: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
        for inset in 0..MARKER_THICKNESS {
            let r = radius - inset;
            if r > 0 {
                draw_hollow_circle_mut(frame, center, r, color);
            }
        }
    }

    fn label(&mut self, frame: &mut RgbImage, origin: (i32, i32), text: &str, color: Rgb<u8>) {
        match &self.font {
            Some(font) => draw_text_mut(frame, color, origin.0, origin.1, self.scale, font, text),
            None => {
                if !self.warned_no_font {
                    tracing::warn!("No font available; text overlays are disabled (configure font_path)");
                    self.warned_no_font = true;
                }
            }
        }
    }
}

/// First existing font among the well-known system locations.
pub fn resolve_system_font() -> Option<PathBuf> {
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

fn load_first_font<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> GazereelResult<FontVec> {
    for path in candidates.into_iter().filter(|path| path.is_file()) {
        match load_font(path) {
            Ok(font) => {
                tracing::debug!(path = %path.display(), "Using system font");
                return Ok(font);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Ignoring unreadable system font")
            }
        }
    }
    Err(GazereelError::config(
        "text overlays need a font and no system font was found; set video.font_path or pass --font",
    ))
}

/// Load a TrueType/OpenType font from disk.
pub fn load_font(path: &Path) -> GazereelResult<FontVec> {
    let bytes = std::fs::read(path).map_err(|e| {
        GazereelError::config(format!("failed to read font {}: {e}", path.display()))
    })?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| GazereelError::config(format!("invalid font {}: {e}", path.display())))
}
