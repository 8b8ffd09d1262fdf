//! Viewer settings, persisted as JSON under the user config directory

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Sources tried in order when no input URI is given
pub const DEFAULT_INPUT_URIS: &[&str] = &[
    "dc1394:[fps=30,dma=10,size=640x480,iso=400]//0",
    "convert:[fmt=RGB24]//v4l:///dev/video0",
    "convert:[fmt=RGB24]//v4l:///dev/video1",
    "openni:[img1=rgb]//",
    "test:[size=160x120,n=1,fmt=RGB24]//",
];

pub const DEFAULT_OUTPUT_URI: &str = "pango://video.pango";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Frames skipped per seek key press
    pub frame_skip: usize,
    pub default_output_uri: String,
    pub default_input_uris: Vec<String>,
    /// Base screenshot name, made unique per save
    pub screenshot_name: String,
    pub window_title: String,
    /// Zoom factor per scroll step
    pub zoom_step: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            frame_skip: 30,
            default_output_uri: DEFAULT_OUTPUT_URI.to_string(),
            default_input_uris: DEFAULT_INPUT_URIS.iter().map(|s| s.to_string()).collect(),
            screenshot_name: "capture.png".to_string(),
            window_title: "vidview".to_string(),
            zoom_step: 1.1,
        }
    }
}

impl ViewerConfig {
    /// Load from the user config directory. A missing file gives the
    /// defaults; a broken one is reported and the defaults used.
    pub fn load() -> Self {
        let path = config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        std::fs::write(path, content).map_err(io_err)
    }
}

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("vidview");
    path.push("config.json");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ViewerConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.frame_skip, 30);
        assert_eq!(config.default_input_uris.last().unwrap(), "test:[size=160x120,n=1,fmt=RGB24]//");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "frame_skip": 5, "window_title": "lab" }"#).unwrap();

        let config = ViewerConfig::load_from(&path).unwrap();
        assert_eq!(config.frame_skip, 5);
        assert_eq!(config.window_title, "lab");
        assert_eq!(config.screenshot_name, "capture.png");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ViewerConfig {
            zoom_step: 1.25,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(ViewerConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ViewerConfig::load_from(&path), Err(ConfigError::Parse { .. })));
    }
}
