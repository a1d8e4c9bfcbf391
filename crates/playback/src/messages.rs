//! Messages between the control context and the decode worker.
//!
//! Every message carries the generation of the video it belongs to. The
//! coordinator bumps the generation on unload, so replies still in flight for
//! a previous video can be recognised and dropped.

use std::path::PathBuf;
use std::sync::Arc;

use reefshader_media_model::frame::{Frame, VideoInfo};
use reefshader_media_model::snapshot::ConfigSnapshot;

/// Video identity tag.
pub type Generation = u64;

/// Control → worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    /// Open a video. Preview frames are fit inside `preview_size` if set.
    Load {
        generation: Generation,
        path: PathBuf,
        preview_size: Option<(usize, usize)>,
    },

    /// Decode and process one frame: the one at `seek_to`, or the next one
    /// in stream order.
    Frame {
        generation: Generation,
        seek_to: Option<f64>,
        snapshot: Arc<ConfigSnapshot>,
    },

    /// Close the video and discard its pipeline state.
    Unload { generation: Generation },

    /// Stop the worker thread.
    Shutdown,
}

/// What a frame request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// A processed frame ready for display.
    Frame { frame: Frame, time: f64 },

    /// A frame was decoded but stabilization had nothing to show yet.
    NotReady { time: f64 },

    /// No frames left.
    EndOfStream,
}

/// Worker → control.
#[derive(Debug, Clone)]
pub enum WorkerReply {
    VideoInfoReady {
        generation: Generation,
        info: VideoInfo,
    },
    LoadFailed {
        generation: Generation,
        error: String,
    },
    FrameDecoded {
        generation: Generation,
        outcome: FrameOutcome,
    },
    FrameFailed {
        generation: Generation,
        error: String,
    },
    /// Stabilization could not be set up; processing continues without it.
    SessionWarning {
        generation: Generation,
        message: String,
    },
}

impl WorkerReply {
    pub fn generation(&self) -> Generation {
        match self {
            Self::VideoInfoReady { generation, .. }
            | Self::LoadFailed { generation, .. }
            | Self::FrameDecoded { generation, .. }
            | Self::FrameFailed { generation, .. }
            | Self::SessionWarning { generation, .. } => *generation,
        }
    }
}
