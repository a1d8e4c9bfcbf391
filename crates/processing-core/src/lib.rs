//! ReefShader Processing Core
//!
//! Per-frame corrections for underwater footage:
//! - **Rotate:** bring the frame upright from container rotation metadata
//! - **Colour normalization:** per-channel stretch with temporal smoothing
//! - **Gamma:** elementwise power curve
//! - **Stabilization:** session lifecycle around an external gyro library
//! - **Side-by-side:** processed frame next to the untouched reference
//!
//! Everything here is computation on in-memory frames. Decoding, encoding,
//! and the stabilization library itself are supplied by callers through the
//! traits in `reefshader-media-model` and [`stabilization`].

pub mod gamma;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod rotate;
pub mod scale;
pub mod stabilization;

pub use pipeline::{FrameTransformPipeline, PipelineCarry, Stage, StagePlan, Transformed};
pub use stabilization::{StabilizationBackend, StabilizationSession, Stabilizer};
