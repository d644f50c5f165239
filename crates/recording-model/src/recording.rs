//! Recording folder layout and discovery.
//!
//! A recording folder written by the tracker holds the scene frames in
//! `ScenePics/` and the event log in `eyeData.csv`:
//!
//! ```text
//! P01/
//! ├── ScenePics/
//! │   ├── frame_1.jpeg
//! │   └── ...
//! └── eyeData.csv
//! ```

use std::path::{Path, PathBuf};

use gazereel_common::error::{GazereelError, GazereelResult};

/// Subfolder holding the scene frames.
pub const FRAMES_DIR_NAME: &str = "ScenePics";

/// Event log file name.
pub const EYE_DATA_FILE_NAME: &str = "eyeData.csv";

/// Resolved input paths of one recording folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingLayout {
    pub root: PathBuf,
    pub frames_dir: PathBuf,
    pub eye_data: PathBuf,
}

impl RecordingLayout {
    /// Standard layout rooted at `root`.
    pub fn from_folder(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            frames_dir: root.join(FRAMES_DIR_NAME),
            eye_data: root.join(EYE_DATA_FILE_NAME),
            root,
        }
    }

    /// Folder name, used as the default output video name.
    pub fn name(&self) -> String {
        folder_name(&self.root)
    }

    /// Check that both inputs are present. Returns human-readable problems.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.frames_dir.is_dir() {
            errors.push(format!(
                "Frames folder not found: {}",
                self.frames_dir.display()
            ));
        }
        if !self.eye_data.is_file() {
            errors.push(format!("Eye data file not found: {}", self.eye_data.display()));
        }
        errors
    }
}

/// Last path component of `path` as a string (empty when there is none).
pub fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Find recording folders matching a glob `pattern` (e.g. `participants/P*`).
///
/// Non-directories are ignored; directories lacking either input are skipped
/// with a warning. Results are sorted by path.
pub fn discover_recordings(pattern: &str) -> GazereelResult<Vec<RecordingLayout>> {
    let paths = glob::glob(pattern)
        .map_err(|e| GazereelError::config(format!("invalid folder pattern '{pattern}': {e}")))?;

    let mut layouts = Vec::new();
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!(error = %err, "Unreadable path while matching folders");
                continue;
            }
        };
        if !path.is_dir() {
            continue;
        }

        let layout = RecordingLayout::from_folder(path);
        let problems = layout.validate();
        if problems.is_empty() {
            layouts.push(layout);
        } else {
            tracing::warn!(
                folder = %layout.root.display(),
                problems = ?problems,
                "Skipping folder without recording inputs"
            );
        }
    }

    layouts.sort_by(|a, b| a.root.cmp(&b.root));
    Ok(layouts)
}
