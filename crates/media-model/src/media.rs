//! Decoder and encoder contracts.
//!
//! The container and codec handling lives outside the core. Adapters (the
//! ffmpeg-backed ones in the render engine, or fakes in tests) implement
//! these traits; the playback worker and the render loop only see the traits.

use std::path::{Path, PathBuf};

use reefshader_common::error::ReefResult;

use crate::frame::{Frame, VideoInfo};
use crate::snapshot::Codec;

/// File extensions accepted as input videos (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "mov", "avi"];

/// Result of asking a decoder for the next frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Frame(Frame),
    EndOfStream,
}

/// An opened video stream.
pub trait Decoder: Send {
    /// Properties of the opened stream.
    fn info(&self) -> &VideoInfo;

    /// Reposition so the next decoded frame is the one at `time_secs`.
    fn seek(&mut self, time_secs: f64) -> ReefResult<()>;

    /// Decode the next frame in presentation order.
    fn next_frame(&mut self) -> ReefResult<DecodedFrame>;

    /// Decoder name for logging.
    fn name(&self) -> &str {
        &self.info().decoder_name
    }
}

/// Opens decoders for video files.
pub trait DecoderFactory: Send + Sync {
    fn open(&self, path: &Path) -> ReefResult<Box<dyn Decoder>>;
}

/// Settings an encoder is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub codec: Codec,
    pub bitrate_mbps: u32,
}

/// A sink for processed frames.
pub trait Encoder: Send {
    /// Append one frame. All frames must match the configured size.
    fn write_frame(&mut self, frame: &Frame) -> ReefResult<()>;

    /// Flush and finalize the output file.
    fn finish(&mut self) -> ReefResult<()>;
}

/// Creates encoders for output files.
pub trait EncoderFactory: Send + Sync {
    fn create(&self, output: &Path, settings: &EncoderSettings) -> ReefResult<Box<dyn Encoder>>;
}

/// Whether a path has one of the accepted video extensions.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// List the video files directly inside `dir`, sorted by path.
pub fn discover_videos(dir: &Path) -> ReefResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_video_file(&path) {
            found.push(path);
        }
    }
    found.sort();
    tracing::debug!(dir = %dir.display(), count = found.len(), "Discovered videos");
    Ok(found)
}
