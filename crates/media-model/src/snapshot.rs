//! Stage configuration snapshots.
//!
//! A [`ConfigSnapshot`] is captured once per processing invocation from the
//! UI's nested stage-name → parameter mapping. Parsing is strict: every key
//! must be present, and unknown keys are rejected, so a missing parameter is
//! reported as a configuration error instead of silently defaulting.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reefshader_common::error::{ReefError, ReefResult};

use crate::frame::Rotation;

/// Output widths offered by the resolution stage.
pub const SUPPORTED_WIDTHS: [u32; 2] = [1920, 1280];

/// Immutable view of all stage settings for one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSnapshot {
    pub resolution: ResolutionConfig,
    pub gamma: GammaConfig,
    pub colour_norm: ColourNormConfig,
    pub stabilization: StabilizationConfig,
    pub output: OutputConfig,
    pub encode: EncodeConfig,
}

/// Output resolution scaling. Height follows the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfig {
    pub enabled: bool,
    pub width: u32,
}

/// Gamma (contrast) correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GammaConfig {
    pub enabled: bool,
    pub gamma: f32,
}

/// Per-channel color normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColourNormConfig {
    pub enabled: bool,

    /// Upper bound on the per-channel gain.
    pub max_gain: f32,

    /// Weight of the previous frame's bounds, in `[0, 1)`.
    pub temporal_smoothing: f32,
}

/// Gyroscope-based stabilization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StabilizationConfig {
    pub enabled: bool,

    /// Use the underwater lens-refraction preset.
    pub underwater: bool,

    /// Path to the stabilization library. Empty means not configured.
    pub library_path: String,
}

/// Output formatting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Show the processed frame next to the unprocessed reference.
    pub side_by_side: bool,
}

/// Encoder selection for batch rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncodeConfig {
    pub codec: Codec,

    /// Target bitrate in megabits per second.
    pub bitrate_mbps: u32,
}

/// Supported output codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264, 8-bit.
    H264,
    /// HEVC, 8-bit.
    Hevc,
    /// HEVC, 10-bit.
    Hevc10,
}

impl Codec {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::H264 => "H264 (8-bit)",
            Self::Hevc => "HEVC (8-bit)",
            Self::Hevc10 => "HEVC (10-bit)",
        }
    }
}

impl StabilizationConfig {
    /// The configured library path, if any.
    pub fn library_path(&self) -> Option<&Path> {
        let trimmed = self.library_path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Path::new(trimmed))
        }
    }

    /// Whether stabilization will actually run: enabled and a library is set.
    pub fn is_effective(&self) -> bool {
        self.enabled && self.library_path().is_some()
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            resolution: ResolutionConfig {
                enabled: false,
                width: 1920,
            },
            gamma: GammaConfig {
                enabled: false,
                gamma: 1.0,
            },
            colour_norm: ColourNormConfig {
                enabled: false,
                max_gain: 10.0,
                temporal_smoothing: 0.95,
            },
            stabilization: StabilizationConfig {
                enabled: false,
                underwater: false,
                library_path: String::new(),
            },
            output: OutputConfig {
                side_by_side: false,
            },
            encode: EncodeConfig {
                codec: Codec::H264,
                bitrate_mbps: 20,
            },
        }
    }
}

impl ConfigSnapshot {
    /// Parse and validate a snapshot from a JSON string.
    pub fn from_json_str(json: &str) -> ReefResult<Self> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| ReefError::config(format!("Invalid stage configuration: {e}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Parse and validate a snapshot from an already-parsed JSON mapping.
    pub fn from_value(value: serde_json::Value) -> ReefResult<Self> {
        let snapshot: Self = serde_json::from_value(value)
            .map_err(|e| ReefError::config(format!("Invalid stage configuration: {e}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> ReefResult<Self> {
        if !path.exists() {
            return Err(ReefError::FileNotFound {
                path: PathBuf::from(path),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: &Path) -> ReefResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> ReefResult<()> {
        if !SUPPORTED_WIDTHS.contains(&self.resolution.width) {
            return Err(ReefError::config(format!(
                "resolution.width must be one of {SUPPORTED_WIDTHS:?}, got {}",
                self.resolution.width
            )));
        }
        if !(0.5..=2.0).contains(&self.gamma.gamma) {
            return Err(ReefError::config(format!(
                "gamma.gamma must be in [0.5, 2.0], got {}",
                self.gamma.gamma
            )));
        }
        if !(1.0..=25.0).contains(&self.colour_norm.max_gain) {
            return Err(ReefError::config(format!(
                "colour_norm.max_gain must be in [1, 25], got {}",
                self.colour_norm.max_gain
            )));
        }
        let smoothing = self.colour_norm.temporal_smoothing;
        if !(0.0..1.0).contains(&smoothing) {
            return Err(ReefError::config(format!(
                "colour_norm.temporal_smoothing must be in [0, 1), got {smoothing}"
            )));
        }
        if !(1..=200).contains(&self.encode.bitrate_mbps) {
            return Err(ReefError::config(format!(
                "encode.bitrate_mbps must be in [1, 200], got {}",
                self.encode.bitrate_mbps
            )));
        }
        Ok(())
    }

    /// Check settings that depend on the stream being processed.
    ///
    /// Stabilization cannot handle rotated footage, so a rotated stream with
    /// stabilization enabled is rejected before any frame is decoded.
    pub fn validate_for_stream(&self, rotation: Rotation) -> ReefResult<()> {
        self.validate()?;
        if self.stabilization.is_effective() && !rotation.is_upright() {
            return Err(ReefError::config(format!(
                "Stabilization cannot be combined with rotated video ({} degrees)",
                rotation.degrees()
            )));
        }
        Ok(())
    }
}
