//! ReefShader Render Engine
//!
//! Concrete media adapters and the offline batch renderer.
//!
//! ```text
//! video.mp4 ── ffprobe ──> VideoInfo
//!     │
//!     └── ffmpeg (rawvideo rgb24) ──> FrameTransformPipeline ──> resize
//!                                                                  │
//!                                      ffmpeg (libx264/libx265) <──┘
//!                                                  │
//!                                                  ▼
//!                                   <video dir>/processed/video.mp4
//! ```

pub mod export;
pub mod ffmpeg;
pub mod stabilization;

pub use export::*;
pub use ffmpeg::{command_exists, probe_video, FfmpegDecoderFactory, FfmpegEncoderFactory};
pub use stabilization::GyroflowCliBackend;
