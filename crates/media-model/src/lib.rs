//! ReefShader Media Model
//!
//! Defines the core data contracts shared by the processing pipeline,
//! the playback worker, and the render engine:
//! - **Frame:** A decoded RGB frame with its timestamp and rotation
//! - **VideoInfo:** Stream properties reported when a video is opened
//! - **ConfigSnapshot:** Immutable per-run view of stage settings
//! - **Media contracts:** Decoder and encoder traits implemented by adapters
//!
//! Pixel samples are `f32` in `[0.0, 1.0]`, laid out as `(height, width, 3)`.

pub mod frame;
pub mod media;
pub mod snapshot;

pub use frame::*;
pub use media::*;
pub use snapshot::*;
