//! Application configuration.
//!
//! This is the tool-level configuration (paths, preview size, logging).
//! Per-run stage settings live in `reefshader_media_model::ConfigSnapshot`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Output directory, relative to each source video's directory.
    pub output_subdir: PathBuf,

    /// Preview display settings.
    pub preview: PreviewDefaults,

    /// External media tool locations.
    pub tools: MediaTools,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Preview display parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreviewDefaults {
    /// Preview box width in pixels.
    pub width: u32,

    /// Preview box height in pixels.
    pub height: u32,
}

/// Names or paths of external binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaTools {
    pub ffmpeg: String,
    pub ffprobe: String,

    /// Gyroflow command line, used to build stabilization project files.
    #[serde(default = "default_gyroflow")]
    pub gyroflow: String,
}

fn default_gyroflow() -> String {
    "gyroflow".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reefshader=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_subdir: PathBuf::from("processed"),
            preview: PreviewDefaults::default(),
            tools: MediaTools::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PreviewDefaults {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            gyroflow: default_gyroflow(),
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
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Where the rendered version of `source` is written.
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        let file_name = source.file_name().map(PathBuf::from).unwrap_or_default();
        dir.join(&self.output_subdir).join(file_name)
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
    base.join("reefshader").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_is_relative_to_source() {
        let config = AppConfig::default();
        let out = config.output_path_for(Path::new("/dives/day1/GX010042.MP4"));
        assert_eq!(out, PathBuf::from("/dives/day1/processed/GX010042.MP4"));
    }

    #[test]
    fn test_unparseable_config_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("reefshader-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.preview.width, 800);
        assert_eq!(config.output_subdir, PathBuf::from("processed"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let mut config = AppConfig::default();
        config.preview.width = 1280;
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.preview.width, 1280);
        assert_eq!(back.tools.ffmpeg, "ffmpeg");
    }
}
