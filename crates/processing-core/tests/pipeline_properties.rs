use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array3;

use reefshader_common::error::ReefResult;
use reefshader_media_model::frame::{Frame, Rotation};
use reefshader_media_model::snapshot::ConfigSnapshot;
use reefshader_processing_core::normalize::{measure_bounds, DOWNSAMPLE_WINDOW};
use reefshader_processing_core::stabilization::{
    AnalysisArtifact, StabilizationBackend, Stabilizer, StabilizerFrame,
};
use reefshader_processing_core::{FrameTransformPipeline, PipelineCarry, StagePlan};

struct Identity;

impl Stabilizer for Identity {
    fn process(
        &mut self,
        frame: StabilizerFrame,
        _time_secs: f64,
        _rotation: Rotation,
    ) -> Option<StabilizerFrame> {
        Some(frame)
    }
}

#[derive(Default)]
struct CountingBackend {
    analyses: Arc<AtomicUsize>,
}

impl StabilizationBackend for CountingBackend {
    fn create_analysis(&self, video: &Path, _preset: Option<&str>) -> ReefResult<AnalysisArtifact> {
        self.analyses.fetch_add(1, Ordering::SeqCst);
        Ok(AnalysisArtifact {
            project_path: video.with_extension("gyroflow"),
        })
    }

    fn open_session(
        &self,
        _artifact: &AnalysisArtifact,
        _library: &Path,
    ) -> ReefResult<Box<dyn Stabilizer>> {
        Ok(Box::new(Identity))
    }
}

/// 8x8 frame: top-left 4x4 block at `low`, the rest at `high`.
fn two_level(low: f32, high: f32, timestamp: f64) -> Frame {
    let pixels =
        Array3::from_shape_fn((8, 8, 3), |(y, x, _)| if y < 4 && x < 4 { low } else { high });
    Frame::new(pixels, timestamp, Rotation::Deg0).unwrap()
}

fn normalizing(smoothing: f32) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::default();
    snapshot.colour_norm.enabled = true;
    snapshot.colour_norm.temporal_smoothing = smoothing;
    snapshot
}

fn pipeline() -> FrameTransformPipeline {
    FrameTransformPipeline::new("/dive/GX010042.MP4", Arc::new(CountingBackend::default()))
}

#[test]
fn carry_blends_consecutive_bounds() {
    let pipeline = pipeline();
    let s = 0.6;
    let plan = StagePlan::from_snapshot(&normalizing(s));

    let f1 = two_level(0.1, 0.7, 0.0);
    let f2 = two_level(0.3, 0.5, 1.0 / 30.0);
    let b1 = measure_bounds(f1.view(), DOWNSAMPLE_WINDOW);
    let b2 = measure_bounds(f2.view(), DOWNSAMPLE_WINDOW);

    let first = pipeline.transform(&f1, PipelineCarry::default(), &plan).unwrap();
    assert_eq!(first.carry.normalization_bounds, Some(b1));

    let second = pipeline.transform(&f2, first.carry, &plan).unwrap();
    let effective = second.carry.normalization_bounds.unwrap();
    for c in 0..3 {
        assert!((effective.mins[c] - (s * b1.mins[c] + (1.0 - s) * b2.mins[c])).abs() < 1e-6);
        assert!((effective.maxs[c] - (s * b1.maxs[c] + (1.0 - s) * b2.maxs[c])).abs() < 1e-6);
    }
}

#[test]
fn zero_smoothing_uses_current_bounds_exactly() {
    let pipeline = pipeline();
    let plan = StagePlan::from_snapshot(&normalizing(0.0));

    let first = pipeline
        .transform(&two_level(0.1, 0.7, 0.0), PipelineCarry::default(), &plan)
        .unwrap();
    let f2 = two_level(0.3, 0.5, 0.1);
    let second = pipeline.transform(&f2, first.carry, &plan).unwrap();
    assert_eq!(
        second.carry.normalization_bounds,
        Some(measure_bounds(f2.view(), DOWNSAMPLE_WINDOW))
    );
}

#[test]
fn toggling_normalization_resets_carry() {
    let pipeline = pipeline();
    let on = StagePlan::from_snapshot(&normalizing(0.9));
    let off = StagePlan::from_snapshot(&ConfigSnapshot::default());
    let f3 = two_level(0.3, 0.5, 0.2);

    let a = pipeline
        .transform(&two_level(0.1, 0.7, 0.0), PipelineCarry::default(), &on)
        .unwrap();
    let b = pipeline
        .transform(&two_level(0.1, 0.7, 0.1), a.carry, &off)
        .unwrap();
    assert!(b.carry.normalization_bounds.is_none());
    let toggled = pipeline.transform(&f3, b.carry, &on).unwrap();

    let fresh = pipeline
        .transform(&f3, PipelineCarry::default(), &on)
        .unwrap();
    assert_eq!(
        toggled.carry.normalization_bounds,
        fresh.carry.normalization_bounds
    );
    assert_eq!(toggled.output, fresh.output);
}

#[test]
fn unchanged_stabilization_config_analyses_once() {
    let backend = CountingBackend::default();
    let analyses = Arc::clone(&backend.analyses);
    let pipeline = FrameTransformPipeline::new("/dive/GX010042.MP4", Arc::new(backend));

    let mut snapshot = ConfigSnapshot::default();
    snapshot.stabilization.enabled = true;
    snapshot.stabilization.library_path = "/opt/gyroflow/libgyroflow.so".to_string();
    let plan = StagePlan::from_snapshot(&snapshot);

    let mut carry = PipelineCarry::default();
    for i in 0..10 {
        let frame = two_level(0.2, 0.4, i as f64 / 30.0);
        carry = pipeline.transform(&frame, carry, &plan).unwrap().carry;
    }
    assert_eq!(analyses.load(Ordering::SeqCst), 1);

    snapshot.stabilization.underwater = true;
    let underwater = StagePlan::from_snapshot(&snapshot);
    for i in 10..15 {
        let frame = two_level(0.2, 0.4, i as f64 / 30.0);
        carry = pipeline.transform(&frame, carry, &underwater).unwrap().carry;
    }
    assert_eq!(analyses.load(Ordering::SeqCst), 2);
}
