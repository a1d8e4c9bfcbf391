//! ReefShader Playback
//!
//! Interactive preview of the correction pipeline:
//! - **Coordinator:** single-flight frame requests, latest seek wins, paced display
//! - **Worker:** one thread owning the decoder and pipeline state
//! - **Player:** async driver connecting the two to a display sink
//!
//! Control and worker only talk through the messages in [`messages`].

pub mod coordinator;
pub mod messages;
pub mod player;
pub mod worker;

pub use coordinator::{CoordinatorAction, FlightState, PlaybackCoordinator};
pub use messages::{FrameOutcome, Generation, WorkerReply, WorkerRequest};
pub use player::{FrameSink, PreviewPlayer};
pub use worker::PlaybackWorker;
