//! Export jobs and batch rendering.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use reefshader_common::config::AppConfig;
use reefshader_common::error::{ReefError, ReefResult};
use reefshader_media_model::frame::{Frame, VideoInfo};
use reefshader_media_model::media::{
    DecodedFrame, DecoderFactory, Encoder, EncoderFactory, EncoderSettings,
};
use reefshader_media_model::snapshot::ConfigSnapshot;
use reefshader_processing_core::scale::scale_to_width;
use reefshader_processing_core::stabilization::StabilizationBackend;
use reefshader_processing_core::{FrameTransformPipeline, StagePlan};

use crate::ffmpeg::{FfmpegDecoderFactory, FfmpegEncoderFactory};
use crate::stabilization::GyroflowCliBackend;

/// Frames between progress reports.
const PROGRESS_EVERY_FRAMES: u64 = 10;

/// One video to render.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Source video.
    pub source: PathBuf,

    /// Output file path.
    pub output_path: PathBuf,

    /// Stage settings captured when the job was queued.
    pub snapshot: Arc<ConfigSnapshot>,
}

/// Progress callback for export rendering.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current progress of this video, [0.0, 1.0].
    pub progress: f64,

    /// Source frames consumed so far.
    pub frames_rendered: u64,

    /// Frame count reported by the container.
    pub total_frames: u64,

    /// Processing rate in source frames per second.
    pub fps: f64,

    /// Estimated time remaining for this video, in seconds.
    pub eta_secs: f64,

    /// 1-based position of this video in the batch.
    pub video_index: usize,

    pub video_count: usize,

    pub stage: ExportStage,
}

impl ExportProgress {
    /// One-line status, e.g. `30% 15 FPS (video 3/15)`.
    pub fn summary(&self) -> String {
        format!(
            "{:.0}% {:.0} FPS (video {}/{})",
            self.progress * 100.0,
            self.fps,
            self.video_index,
            self.video_count
        )
    }
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub rendered: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, ReefError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Renders videos through the transform pipeline into encoded files.
#[derive(Clone)]
pub struct Exporter {
    decoders: Arc<dyn DecoderFactory>,
    encoders: Arc<dyn EncoderFactory>,
    stabilization: Arc<dyn StabilizationBackend>,
}

impl Exporter {
    pub fn new(
        decoders: Arc<dyn DecoderFactory>,
        encoders: Arc<dyn EncoderFactory>,
        stabilization: Arc<dyn StabilizationBackend>,
    ) -> Self {
        Self {
            decoders,
            encoders,
            stabilization,
        }
    }

    /// Exporter backed by the ffmpeg and gyroflow binaries named in `config`.
    pub fn with_ffmpeg(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(FfmpegDecoderFactory::new(&config.tools)),
            Arc::new(FfmpegEncoderFactory::new(&config.tools)),
            Arc::new(GyroflowCliBackend::new(config.tools.gyroflow.clone())),
        )
    }

    /// Render one video. Frame work runs on the blocking pool.
    pub async fn export_video(
        &self,
        job: ExportJob,
        progress: Option<ProgressCallback>,
    ) -> ReefResult<PathBuf> {
        self.export_indexed(job, progress, 1, 1).await
    }

    /// Render videos one after another. A failed video is recorded and the
    /// batch moves on.
    pub async fn export_batch(
        &self,
        jobs: Vec<ExportJob>,
        progress: Option<ProgressCallback>,
    ) -> BatchReport {
        let count = jobs.len();
        let mut report = BatchReport::default();
        for (i, job) in jobs.into_iter().enumerate() {
            let source = job.source.clone();
            match self.export_indexed(job, progress.clone(), i + 1, count).await {
                Ok(path) => report.rendered.push(path),
                Err(e) => {
                    tracing::error!(source = %source.display(), error = %e, "Render failed");
                    report.failed.push((source, e));
                }
            }
        }
        tracing::info!(
            rendered = report.rendered.len(),
            failed = report.failed.len(),
            "Batch finished"
        );
        report
    }

    async fn export_indexed(
        &self,
        job: ExportJob,
        progress: Option<ProgressCallback>,
        video_index: usize,
        video_count: usize,
    ) -> ReefResult<PathBuf> {
        let exporter = self.clone();
        let reporter = Reporter {
            callback: progress,
            video_index,
            video_count,
        };
        tokio::task::spawn_blocking(move || {
            let result = exporter.render(&job, &reporter);
            if result.is_err() {
                reporter.report(ExportStage::Failed, 0, 0, 0.0);
            }
            result
        })
        .await
        .map_err(|e| ReefError::render(format!("Render task panicked: {e}")))?
    }

    fn render(&self, job: &ExportJob, reporter: &Reporter) -> ReefResult<PathBuf> {
        tracing::info!(
            source = %job.source.display(),
            output = %job.output_path.display(),
            "Starting export"
        );
        reporter.report(ExportStage::Preparing, 0, 0, 0.0);

        job.snapshot.validate()?;
        let mut decoder = self.decoders.open(&job.source)?;
        let info = decoder.info().clone();
        tracing::info!(info = %info.summary(), "Source opened");

        let pipeline = FrameTransformPipeline::new(&job.source, Arc::clone(&self.stabilization));
        let mut carry = pipeline.start_run(&job.snapshot, &info)?;
        let plan = StagePlan::from_snapshot(&job.snapshot);
        let target_width = job
            .snapshot
            .resolution
            .enabled
            .then_some(job.snapshot.resolution.width as usize);

        if let Some(parent) = job.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        let mut encoder: Option<Box<dyn Encoder>> = None;
        let mut frames_read = 0u64;
        let mut frames_written = 0u64;

        let result = (|| -> ReefResult<()> {
            loop {
                let frame = match decoder.next_frame()? {
                    DecodedFrame::Frame(frame) => frame,
                    DecodedFrame::EndOfStream => break,
                };
                frames_read += 1;

                let transformed = pipeline.transform(&frame, std::mem::take(&mut carry), &plan)?;
                carry = transformed.carry;

                if let Some(output) = transformed.output {
                    let output = match target_width {
                        Some(width) => scale_output(&output, transformed.reference.width(), width),
                        None => output,
                    };
                    if encoder.is_none() {
                        encoder = Some(self.create_encoder(job, &info, &output)?);
                    }
                    if let Some(encoder) = encoder.as_mut() {
                        encoder.write_frame(&output)?;
                        frames_written += 1;
                    }
                }

                if frames_read % PROGRESS_EVERY_FRAMES == 0 {
                    reporter.report(
                        ExportStage::Rendering,
                        frames_read,
                        info.frame_count,
                        started.elapsed().as_secs_f64(),
                    );
                }
            }

            reporter.report(
                ExportStage::Finalizing,
                frames_read,
                info.frame_count,
                started.elapsed().as_secs_f64(),
            );
            match encoder.as_mut() {
                Some(encoder) => encoder.finish(),
                None => Err(ReefError::render(format!(
                    "No frames were produced for {}",
                    job.source.display()
                ))),
            }
        })();

        if let Err(e) = result {
            if encoder.is_some() {
                drop(encoder);
                let _ = std::fs::remove_file(&job.output_path);
            }
            return Err(e);
        }

        reporter.report(
            ExportStage::Complete,
            frames_read,
            info.frame_count,
            started.elapsed().as_secs_f64(),
        );
        tracing::info!(
            output = %job.output_path.display(),
            frames_read,
            frames_written,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Export complete"
        );
        Ok(job.output_path.clone())
    }

    fn create_encoder(
        &self,
        job: &ExportJob,
        info: &VideoInfo,
        first: &Frame,
    ) -> ReefResult<Box<dyn Encoder>> {
        let settings = EncoderSettings {
            width: first.width() as u32,
            height: first.height() as u32,
            frame_rate: info.frame_rate,
            codec: job.snapshot.encode.codec,
            bitrate_mbps: job.snapshot.encode.bitrate_mbps,
        };
        tracing::debug!(settings = ?settings, "Creating encoder");
        self.encoders.create(&job.output_path, &settings)
    }
}

/// Scale a processed frame so its reference view is `target_width` wide.
/// Side-by-side frames scale by the same factor, so each half matches.
pub fn scale_output(frame: &Frame, reference_width: usize, target_width: usize) -> Frame {
    if reference_width == 0 || reference_width == target_width {
        return frame.clone();
    }
    let factor = target_width as f64 / reference_width as f64;
    let width = (((frame.width() as f64 * factor) / 2.0).round() as usize * 2).max(2);
    scale_to_width(frame, width)
}

struct Reporter {
    callback: Option<ProgressCallback>,
    video_index: usize,
    video_count: usize,
}

impl Reporter {
    fn report(&self, stage: ExportStage, frames: u64, total_frames: u64, elapsed_secs: f64) {
        let Some(callback) = &self.callback else {
            return;
        };
        callback(progress_report(
            stage,
            frames,
            total_frames,
            elapsed_secs,
            self.video_index,
            self.video_count,
        ));
    }
}

fn progress_report(
    stage: ExportStage,
    frames: u64,
    total_frames: u64,
    elapsed_secs: f64,
    video_index: usize,
    video_count: usize,
) -> ExportProgress {
    let progress = match stage {
        ExportStage::Complete => 1.0,
        _ if total_frames == 0 => 0.0,
        _ => (frames as f64 / total_frames as f64).clamp(0.0, 1.0),
    };
    let fps = if elapsed_secs > 0.0 {
        frames as f64 / elapsed_secs
    } else {
        0.0
    };
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ExportProgress {
        progress,
        frames_rendered: frames,
        total_frames,
        fps,
        eta_secs,
        video_index,
        video_count,
        stage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use reefshader_media_model::frame::Rotation;

    fn frame(width: usize, height: usize) -> Frame {
        Frame::new(
            Array3::from_elem((height, width, 3), 0.25),
            0.0,
            Rotation::Deg0,
        )
        .unwrap()
    }

    #[test]
    fn test_scale_output_keeps_even_aspect() {
        let out = scale_output(&frame(64, 36), 64, 32);
        assert_eq!((out.width(), out.height()), (32, 18));
    }

    #[test]
    fn test_scale_output_scales_side_by_side_per_view() {
        let out = scale_output(&frame(128, 36), 64, 32);
        assert_eq!((out.width(), out.height()), (64, 18));
    }

    #[test]
    fn test_scale_output_is_noop_at_target_width() {
        let input = frame(32, 18);
        assert_eq!(scale_output(&input, 32, 32), input);
    }

    #[test]
    fn test_progress_report_fraction_and_eta() {
        let report = progress_report(ExportStage::Rendering, 30, 100, 2.0, 3, 15);
        assert!((report.progress - 0.3).abs() < 1e-9);
        assert!((report.fps - 15.0).abs() < 1e-9);
        assert!((report.eta_secs - (2.0 / 0.3 - 2.0)).abs() < 1e-9);
        assert_eq!(report.summary(), "30% 15 FPS (video 3/15)");
    }

    #[test]
    fn test_progress_report_without_frame_count() {
        let report = progress_report(ExportStage::Rendering, 30, 0, 2.0, 1, 1);
        assert_eq!(report.progress, 0.0);
        assert_eq!(report.eta_secs, 0.0);
        let done = progress_report(ExportStage::Complete, 30, 0, 2.0, 1, 1);
        assert_eq!(done.progress, 1.0);
    }
}
