//! Scene frame index.
//!
//! The eye tracker stores each scene camera frame as `frame_<n>.<ext>`,
//! where `<n>` is the same frame number written to the event log. The index
//! maps that number (the frame key) to the file on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use gazereel_common::error::{GazereelError, GazereelResult};

/// Frame number shared by the frame files and the event log.
pub type FrameKey = u64;

const FRAME_NAME_PREFIX: &str = "frame_";

/// One frame file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    pub frame_key: FrameKey,
    pub path: PathBuf,
}

/// What to do with an image file whose name is not `frame_<digits>.<ext>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMismatchPolicy {
    /// Fail the scan with a parse error.
    #[default]
    Abort,
    /// Log a warning and leave the file out of the index.
    Skip,
}

/// Options for [`FrameIndex::build`].
#[derive(Debug, Clone)]
pub struct FrameScanOptions {
    /// Lowercase file extensions treated as frames.
    pub extensions: Vec<String>,
    pub on_mismatch: NameMismatchPolicy,
}

impl Default for FrameScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["jpeg".into(), "jpg".into(), "png".into()],
            on_mismatch: NameMismatchPolicy::Abort,
        }
    }
}

/// Frame files ordered by frame key.
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    frames: BTreeMap<FrameKey, PathBuf>,
    duplicates: usize,
    skipped: usize,
}

impl FrameIndex {
    /// Scan `dir` and index every frame file in it.
    ///
    /// When two files share a key, the lexicographically smallest path is
    /// kept so the result never depends on directory iteration order.
    pub fn build(dir: &Path, options: &FrameScanOptions) -> GazereelResult<Self> {
        if !dir.is_dir() {
            return Err(GazereelError::FileNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || !has_frame_extension(&path, &options.extensions) {
                continue;
            }
            candidates.push(path);
        }
        candidates.sort();

        let mut index = Self::default();
        for path in candidates {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = match parse_frame_key(&name) {
                Ok(key) => key,
                Err(err) => match options.on_mismatch {
                    NameMismatchPolicy::Abort => return Err(err),
                    NameMismatchPolicy::Skip => {
                        tracing::warn!(file = %path.display(), "Skipping unrecognized frame file name");
                        index.skipped += 1;
                        continue;
                    }
                },
            };
            index.insert(key, path);
        }

        if index.duplicates > 0 {
            tracing::warn!(
                dir = %dir.display(),
                duplicates = index.duplicates,
                "Frame keys shared by several files; kept the first path of each"
            );
        }
        tracing::debug!(dir = %dir.display(), frames = index.len(), "Frame index built");

        Ok(index)
    }

    /// Build an index from already known records (same tie-break as [`build`](Self::build)).
    pub fn from_records(records: impl IntoIterator<Item = FrameRecord>) -> Self {
        let mut records: Vec<FrameRecord> = records.into_iter().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        let mut index = Self::default();
        for record in records {
            index.insert(record.frame_key, record.path);
        }
        index
    }

    fn insert(&mut self, key: FrameKey, path: PathBuf) {
        if self.frames.contains_key(&key) {
            self.duplicates += 1;
        } else {
            self.frames.insert(key, path);
        }
    }

    /// Path of the frame with `key`, if one exists.
    pub fn get(&self, key: FrameKey) -> Option<&Path> {
        self.frames.get(&key).map(PathBuf::as_path)
    }

    /// All frames in ascending key order.
    pub fn records(&self) -> impl Iterator<Item = FrameRecord> + '_ {
        self.frames.iter().map(|(key, path)| FrameRecord {
            frame_key: *key,
            path: path.clone(),
        })
    }

    /// Frame with the smallest key.
    pub fn first(&self) -> Option<FrameRecord> {
        self.records().next()
    }

    pub fn keys(&self) -> impl Iterator<Item = FrameKey> + '_ {
        self.frames.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Files dropped because their key was already taken.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Files skipped under [`NameMismatchPolicy::Skip`].
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Extract the frame key from a `frame_<digits>.<ext>` file name.
pub fn parse_frame_key(file_name: &str) -> GazereelResult<FrameKey> {
    let invalid = || {
        GazereelError::parse(format!(
            "frame file name '{file_name}' does not match frame_<number>.<ext>"
        ))
    };

    let stem = file_name.strip_prefix(FRAME_NAME_PREFIX).ok_or_else(invalid)?;
    let (digits, ext) = stem.split_once('.').ok_or_else(invalid)?;
    if digits.is_empty() || ext.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}

fn has_frame_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|allowed| *allowed == ext)
        })
        .unwrap_or(false)
}
