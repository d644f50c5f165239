//! Error types shared across Gazereel crates.

use std::path::PathBuf;

/// Top-level error type for Gazereel operations.
#[derive(Debug, thiserror::Error)]
pub enum GazereelError {
    /// A frame file name did not match `frame_<digits>.<ext>`.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// The eye data table has neither the named nor the positional layout,
    /// or a row could not be converted.
    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Range error: {message}")]
    Range { message: String },

    #[error("Missing initial frame: no image for frame {frame_key} and no earlier frame to reuse")]
    MissingInitialFrame { frame_key: u64 },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GazereelError.
pub type GazereelResult<T> = Result<T, GazereelError>;

impl GazereelError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_initial_frame_message_names_frame() {
        let err = GazereelError::MissingInitialFrame { frame_key: 42 };
        assert!(err.to_string().contains("frame 42"));
    }

    #[test]
    fn test_constructors_keep_message() {
        assert_eq!(
            GazereelError::range("300 >= 200").to_string(),
            "Range error: 300 >= 200"
        );
        assert!(matches!(
            GazereelError::schema("x"),
            GazereelError::Schema { .. }
        ));
    }
}
