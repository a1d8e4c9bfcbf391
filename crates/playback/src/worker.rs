//! Decode/process worker thread.
//!
//! The worker owns the decoder, the transform pipeline and its carry for the
//! loaded video; nothing else touches them. It handles one request at a time
//! from a crossbeam channel and answers on a tokio channel so the control
//! side can await replies.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender};
use tokio::sync::mpsc::UnboundedSender;

use reefshader_common::error::{ReefError, ReefResult};
use reefshader_media_model::frame::VideoInfo;
use reefshader_media_model::media::{DecodedFrame, Decoder, DecoderFactory};
use reefshader_media_model::snapshot::ConfigSnapshot;
use reefshader_processing_core::scale::{fit_within, resize};
use reefshader_processing_core::stabilization::StabilizationBackend;
use reefshader_processing_core::{FrameTransformPipeline, PipelineCarry, StagePlan};

use crate::messages::{FrameOutcome, Generation, WorkerReply, WorkerRequest};

/// Handle to the worker thread.
pub struct PlaybackWorker {
    requests: Sender<WorkerRequest>,
    join: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Spawn the worker thread.
    pub fn spawn(
        decoders: Arc<dyn DecoderFactory>,
        stabilization: Arc<dyn StabilizationBackend>,
        replies: UnboundedSender<WorkerReply>,
    ) -> ReefResult<Self> {
        let (requests, inbox) = crossbeam::channel::unbounded::<WorkerRequest>();
        let join = std::thread::Builder::new()
            .name("reefshader-decode".to_string())
            .spawn(move || run_worker(inbox, replies, decoders, stabilization))
            .map_err(|e| ReefError::playback(format!("Failed to spawn decode worker: {e}")))?;

        Ok(Self {
            requests,
            join: Some(join),
        })
    }

    pub fn send(&self, request: WorkerRequest) -> ReefResult<()> {
        self.requests
            .send(request)
            .map_err(|_| ReefError::playback("Decode worker has stopped"))
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("Decode worker panicked");
            }
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.requests.send(WorkerRequest::Shutdown);
        }
    }
}

struct LoadedVideo {
    generation: Generation,
    decoder: Box<dyn Decoder>,
    pipeline: FrameTransformPipeline,
    carry: Option<PipelineCarry>,
    preview_size: Option<(usize, usize)>,
}

fn run_worker(
    inbox: Receiver<WorkerRequest>,
    replies: UnboundedSender<WorkerReply>,
    decoders: Arc<dyn DecoderFactory>,
    stabilization: Arc<dyn StabilizationBackend>,
) {
    tracing::debug!("Decode worker started");
    let mut loaded: Option<LoadedVideo> = None;

    while let Ok(request) = inbox.recv() {
        let reply = match request {
            WorkerRequest::Load {
                generation,
                path,
                preview_size,
            } => {
                loaded = None;
                match open_video(&path, decoders.as_ref(), &stabilization) {
                    Ok((decoder, pipeline)) => {
                        let info = decoder.info().clone();
                        tracing::info!(
                            path = %path.display(),
                            width = info.width,
                            height = info.height,
                            fps = info.frame_rate,
                            decoder = decoder.name(),
                            "Video opened"
                        );
                        loaded = Some(LoadedVideo {
                            generation,
                            decoder,
                            pipeline,
                            carry: None,
                            preview_size,
                        });
                        WorkerReply::VideoInfoReady { generation, info }
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to open video");
                        WorkerReply::LoadFailed {
                            generation,
                            error: e.to_string(),
                        }
                    }
                }
            }
            WorkerRequest::Frame {
                generation,
                seek_to,
                snapshot,
            } => match loaded.as_mut().filter(|v| v.generation == generation) {
                Some(video) => {
                    match process_frame(video, seek_to, &snapshot, &replies) {
                        Ok(outcome) => WorkerReply::FrameDecoded {
                            generation,
                            outcome,
                        },
                        Err(e) => {
                            // The run halts; the video stays open for a retry or seek.
                            video.carry = None;
                            tracing::warn!(error = %e, "Frame request failed");
                            WorkerReply::FrameFailed {
                                generation,
                                error: e.to_string(),
                            }
                        }
                    }
                }
                None => WorkerReply::FrameFailed {
                    generation,
                    error: "No video loaded".to_string(),
                },
            },
            WorkerRequest::Unload { generation } => {
                if loaded.as_ref().is_some_and(|v| v.generation == generation) {
                    loaded = None;
                    tracing::debug!(generation, "Video closed");
                }
                continue;
            }
            WorkerRequest::Shutdown => break,
        };

        if replies.send(reply).is_err() {
            tracing::debug!("Reply channel closed");
            break;
        }
    }
    tracing::debug!("Decode worker stopped");
}

fn open_video(
    path: &Path,
    decoders: &dyn DecoderFactory,
    stabilization: &Arc<dyn StabilizationBackend>,
) -> ReefResult<(Box<dyn Decoder>, FrameTransformPipeline)> {
    let decoder = decoders.open(path)?;
    let pipeline = FrameTransformPipeline::new(path, Arc::clone(stabilization));
    Ok((decoder, pipeline))
}

fn process_frame(
    video: &mut LoadedVideo,
    seek_to: Option<f64>,
    snapshot: &ConfigSnapshot,
    replies: &UnboundedSender<WorkerReply>,
) -> ReefResult<FrameOutcome> {
    let info: VideoInfo = video.decoder.info().clone();
    let carry = match video.carry.take() {
        Some(carry) => {
            snapshot.validate_for_stream(info.rotation)?;
            carry
        }
        None => video.pipeline.start_run(snapshot, &info)?,
    };

    if let Some(target) = seek_to {
        tracing::debug!(target, "Seeking");
        video.decoder.seek(target)?;
    }

    let frame = match video.decoder.next_frame()? {
        DecodedFrame::Frame(frame) => frame,
        DecodedFrame::EndOfStream => {
            video.carry = Some(carry);
            return Ok(FrameOutcome::EndOfStream);
        }
    };
    let time = frame.timestamp();

    let plan = StagePlan::from_snapshot(snapshot);
    let transformed = video.pipeline.transform(&frame, carry, &plan)?;
    video.carry = Some(transformed.carry);

    if let Some(e) = transformed.session_error {
        let warning = WorkerReply::SessionWarning {
            generation: video.generation,
            message: e.to_string(),
        };
        if replies.send(warning).is_err() {
            tracing::debug!(error = %e, "Reply channel closed; session warning dropped");
        }
    }

    let Some(output) = transformed.output else {
        return Ok(FrameOutcome::NotReady { time });
    };
    let output = match video.preview_size {
        Some((max_w, max_h)) => {
            let (w, h) = fit_within(output.width(), output.height(), max_w, max_h);
            resize(&output, w, h)
        }
        None => output,
    };
    Ok(FrameOutcome::Frame {
        frame: output,
        time,
    })
}
