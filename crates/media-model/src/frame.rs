//! Frame and stream metadata types.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use reefshader_common::error::{ReefError, ReefResult};

/// Number of color channels in a frame buffer.
pub const CHANNELS: usize = 3;

/// Counter-clockwise rotation that brings the coded frame upright, as stored
/// in the container's display matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse a rotation in degrees. Negative values wrap (`-90` is `270`).
    pub fn from_degrees(degrees: i32) -> ReefResult<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => Err(ReefError::config(format!(
                "Rotation must be a multiple of 90 degrees, got {degrees}"
            ))),
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Number of quarter turns.
    pub fn quarter_turns(self) -> usize {
        (self.degrees() / 90) as usize
    }

    pub fn is_upright(self) -> bool {
        self == Self::Deg0
    }
}

impl TryFrom<i32> for Rotation {
    type Error = ReefError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees)
    }
}

impl From<Rotation> for i32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// A decoded video frame.
///
/// Frames are never mutated once built; stages produce new frames via
/// [`Frame::with_pixels`].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Array3<f32>,
    timestamp: f64,
    rotation: Rotation,
}

impl Frame {
    /// Build a frame from an `(height, width, 3)` buffer.
    pub fn new(pixels: Array3<f32>, timestamp: f64, rotation: Rotation) -> ReefResult<Self> {
        if pixels.shape()[2] != CHANNELS {
            return Err(ReefError::decode(format!(
                "Frame buffer must have {CHANNELS} channels, got shape {:?}",
                pixels.shape()
            )));
        }
        Ok(Self {
            pixels,
            timestamp,
            rotation,
        })
    }

    /// Build a frame from packed 8-bit RGB bytes (row-major).
    pub fn from_rgb8(
        data: &[u8],
        width: usize,
        height: usize,
        timestamp: f64,
        rotation: Rotation,
    ) -> ReefResult<Self> {
        let expected = width * height * CHANNELS;
        if data.len() != expected {
            return Err(ReefError::decode(format!(
                "Raw frame size mismatch: expected {expected} bytes, got {}",
                data.len()
            )));
        }
        let samples = data.iter().map(|&b| f32::from(b) / 255.0).collect();
        let pixels = Array3::from_shape_vec((height, width, CHANNELS), samples)
            .map_err(|e| ReefError::decode(format!("Invalid frame shape: {e}")))?;
        Ok(Self {
            pixels,
            timestamp,
            rotation,
        })
    }

    /// Pack the frame into 8-bit RGB bytes, clamping samples to `[0, 1]`.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }

    /// A new frame with the same timestamp and rotation but different pixels.
    pub fn with_pixels(&self, pixels: Array3<f32>) -> Frame {
        Frame {
            pixels,
            timestamp: self.timestamp,
            rotation: self.rotation,
        }
    }

    /// The same frame tagged with a different rotation.
    pub fn with_rotation(mut self, rotation: Rotation) -> Frame {
        self.rotation = rotation;
        self
    }

    pub fn pixels(&self) -> &Array3<f32> {
        &self.pixels
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.pixels.view()
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.pixels.dim()
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    /// Presentation timestamp in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }
}

/// Stream properties reported when a video is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Coded width in pixels (before rotation).
    pub width: u32,

    /// Coded height in pixels (before rotation).
    pub height: u32,

    /// Frames per second.
    pub frame_rate: f64,

    /// Duration in seconds.
    pub duration: f64,

    /// Number of frames in the stream.
    pub frame_count: u64,

    /// Name of the decoder used for this stream.
    pub decoder_name: String,

    /// Display rotation from container metadata.
    #[serde(default)]
    pub rotation: Rotation,
}

impl VideoInfo {
    /// Duration of one frame in seconds.
    pub fn frame_interval(&self) -> f64 {
        if self.frame_rate > 0.0 {
            1.0 / self.frame_rate
        } else {
            0.0
        }
    }

    /// Timestamp of the last decodable frame.
    pub fn last_frame_time(&self) -> f64 {
        (self.duration - self.frame_interval()).max(0.0)
    }

    /// Human-readable summary, one property per line.
    pub fn summary(&self) -> String {
        format!(
            "Resolution: {}x{}\nFrame rate: {:.2}\nDuration: {}\nNum Frames: {}\nDecoder: {}",
            self.width,
            self.height,
            self.frame_rate,
            reefshader_common::clock::format_position(self.duration, None),
            self.frame_count,
            self.decoder_name,
        )
    }
}
