//! The frame transform pipeline.
//!
//! Stages run in a fixed order:
//!
//! 1. rotate to upright
//! 2. colour normalization (carries bounds between frames)
//! 3. gamma
//! 4. stabilization (only while a session is active)
//! 5. side-by-side merge with the rotated reference
//!
//! Which of the optional stages run is decided once per invocation from the
//! [`ConfigSnapshot`] and captured in a [`StagePlan`]. State that must survive
//! from one frame to the next lives in [`PipelineCarry`], which the caller
//! owns and hands back on every call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reefshader_common::error::{ReefError, ReefResult};
use reefshader_media_model::frame::{Frame, VideoInfo};
use reefshader_media_model::snapshot::{ConfigSnapshot, StabilizationConfig};

use crate::gamma::apply_gamma;
use crate::merge::merge_side_by_side;
use crate::normalize::{normalize, NormalizationBounds, NormalizeParams};
use crate::rotate::rotate_upright;
use crate::stabilization::{StabilizationBackend, StabilizationState};

/// An optional stage, resolved up front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage<P> {
    Active(P),
    Skipped,
}

impl<P> Stage<P> {
    pub fn when(enabled: bool, params: P) -> Self {
        if enabled {
            Self::Active(params)
        } else {
            Self::Skipped
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Stage selection for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub normalization: Stage<NormalizeParams>,
    pub gamma: Stage<f32>,
    pub side_by_side: Stage<()>,
    pub stabilization: StabilizationConfig,
}

impl StagePlan {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let norm = &snapshot.colour_norm;
        Self {
            normalization: Stage::when(
                norm.enabled,
                NormalizeParams {
                    max_gain: norm.max_gain,
                    temporal_smoothing: norm.temporal_smoothing,
                },
            ),
            gamma: Stage::when(snapshot.gamma.enabled, snapshot.gamma.gamma),
            side_by_side: Stage::when(snapshot.output.side_by_side, ()),
            stabilization: snapshot.stabilization.clone(),
        }
    }
}

/// State threaded from frame to frame within one run.
#[derive(Debug, Default)]
pub struct PipelineCarry {
    /// Effective normalization bounds of the previous frame. `None` whenever
    /// normalization was skipped for that frame.
    pub normalization_bounds: Option<NormalizationBounds>,

    pub stabilization: StabilizationState,
}

/// Result of transforming one frame.
#[derive(Debug)]
pub struct Transformed {
    /// The processed frame, or `None` when stabilization had nothing to
    /// show for this timestamp yet.
    pub output: Option<Frame>,

    /// The rotated source frame before any correction.
    pub reference: Frame,

    pub carry: PipelineCarry,

    /// Set when the stabilization session could not be (re)built. The frame
    /// was still processed, without stabilization.
    pub session_error: Option<ReefError>,
}

/// Applies the correction stages to frames of one source video.
pub struct FrameTransformPipeline {
    source: PathBuf,
    backend: Arc<dyn StabilizationBackend>,
}

impl FrameTransformPipeline {
    pub fn new(source: impl Into<PathBuf>, backend: Arc<dyn StabilizationBackend>) -> Self {
        Self {
            source: source.into(),
            backend,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Validate the snapshot against the stream and return an empty carry.
    ///
    /// Configuration errors are reported here, before any frame is decoded.
    pub fn start_run(
        &self,
        snapshot: &ConfigSnapshot,
        info: &VideoInfo,
    ) -> ReefResult<PipelineCarry> {
        snapshot.validate_for_stream(info.rotation)?;
        tracing::debug!(
            source = %self.source.display(),
            plan = ?StagePlan::from_snapshot(snapshot),
            "Pipeline run started"
        );
        Ok(PipelineCarry::default())
    }

    /// Transform one frame.
    pub fn transform(
        &self,
        frame: &Frame,
        mut carry: PipelineCarry,
        plan: &StagePlan,
    ) -> ReefResult<Transformed> {
        let session_error = match carry.stabilization.sync(
            &plan.stabilization,
            &self.source,
            self.backend.as_ref(),
        ) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Continuing without stabilization");
                Some(e)
            }
        };

        if carry.stabilization.is_active() && !frame.rotation().is_upright() {
            return Err(ReefError::stage(format!(
                "Stabilization cannot handle rotated frames ({} degrees)",
                frame.rotation().degrees()
            )));
        }

        let reference = rotate_upright(frame);

        let mut processed = match plan.normalization {
            Stage::Active(params) => {
                let (out, bounds) =
                    normalize(&reference, carry.normalization_bounds.as_ref(), params);
                carry.normalization_bounds = Some(bounds);
                out
            }
            Stage::Skipped => {
                carry.normalization_bounds = None;
                reference.clone()
            }
        };

        if let Stage::Active(gamma) = plan.gamma {
            processed = apply_gamma(&processed, gamma);
        }

        let stabilized = match carry.stabilization.session_mut() {
            Some(session) => session.process(&processed, frame.timestamp(), frame.rotation())?,
            None => Some(processed),
        };

        let output = stabilized.map(|out| match plan.side_by_side {
            Stage::Active(()) => match merge_side_by_side(&out, &reference) {
                Some(merged) => merged,
                None => {
                    tracing::debug!(
                        processed = ?out.shape(),
                        reference = ?reference.shape(),
                        "Side-by-side skipped: shape mismatch"
                    );
                    out
                }
            },
            Stage::Skipped => out,
        });

        Ok(Transformed {
            output,
            reference,
            carry,
            session_error,
        })
    }
}
