//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where rendered videos are written.
    pub output_dir: PathBuf,

    /// Defaults for single-video renders.
    pub video: VideoDefaults,

    /// Defaults applied to every folder in batch mode.
    pub batch: BatchDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default rendering parameters for a single video.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDefaults {
    /// Output frame rate (also the fixed-rate timing step).
    pub framerate: u32,

    /// Video codec name (`h264` or `mpeg4`).
    pub codec: String,

    /// Report progress after this many written frames.
    pub progress_interval: usize,

    pub draw_gaze: bool,
    pub draw_frame_number: bool,
    pub draw_time: bool,

    /// Time frames from the eye data timestamps instead of a fixed rate.
    pub use_real_fps: bool,

    /// TrueType/OpenType font used for text overlays.
    pub font_path: Option<PathBuf>,

    /// ffmpeg executable (looked up on PATH when not absolute).
    pub ffmpeg: PathBuf,
}

/// Preset used for every recording folder in batch mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDefaults {
    pub draw_gaze: bool,
    pub draw_frame_number: bool,
    pub draw_time: bool,
    pub use_real_fps: bool,
    pub progress_interval: usize,

    /// Upper bound on concurrently rendered folders (0 = available cores).
    pub max_workers: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gazereel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            video: VideoDefaults::default(),
            batch: BatchDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            framerate: 25,
            codec: "h264".to_string(),
            progress_interval: 1000,
            draw_gaze: false,
            draw_frame_number: false,
            draw_time: false,
            use_real_fps: false,
            font_path: None,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            draw_gaze: false,
            draw_frame_number: true,
            draw_time: true,
            use_real_fps: true,
            progress_interval: 500,
            max_workers: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(
                            path = %config_path.display(),
                            error = %e,
                            "Failed to parse config; using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %config_path.display(),
                        error = %e,
                        "Failed to read config; using defaults"
                    );
                }
            }
        }
        Self::default()
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("gazereel").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tool_conventions() {
        let config = AppConfig::default();
        assert_eq!(config.video.framerate, 25);
        assert_eq!(config.video.progress_interval, 1000);
        assert!(!config.video.use_real_fps);
        assert!(config.batch.use_real_fps);
        assert!(config.batch.draw_frame_number);
        assert_eq!(config.batch.progress_interval, 500);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "video": { "framerate": 30 } }"#).unwrap();
        assert_eq!(parsed.video.framerate, 30);
        assert_eq!(parsed.video.codec, "h264");
        assert_eq!(parsed.video.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(parsed.logging.level, "info");
    }
}
