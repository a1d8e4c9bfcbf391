//! Async driver tying the coordinator to the worker and a display sink.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedReceiver;

use reefshader_common::error::{ReefError, ReefResult};
use reefshader_media_model::frame::{Frame, VideoInfo};
use reefshader_media_model::media::DecoderFactory;
use reefshader_media_model::snapshot::ConfigSnapshot;
use reefshader_processing_core::stabilization::StabilizationBackend;

use crate::coordinator::{CoordinatorAction, PlaybackCoordinator};
use crate::messages::WorkerReply;
use crate::worker::PlaybackWorker;

/// Receives what the preview would show.
pub trait FrameSink {
    fn present(&mut self, frame: &Frame, time: f64);

    fn video_ready(&mut self, _info: &VideoInfo) {}

    fn position_changed(&mut self, _label: &str, _slider: u64) {}

    fn playback_stopped(&mut self) {}

    fn error(&mut self, _message: &str) {}
}

struct ScheduledFrame {
    frame: Frame,
    time: f64,
    at: Instant,
}

/// Preview player: one coordinator, one worker thread.
pub struct PreviewPlayer {
    coordinator: PlaybackCoordinator,
    worker: PlaybackWorker,
    replies: UnboundedReceiver<WorkerReply>,
    scheduled: VecDeque<ScheduledFrame>,
}

impl PreviewPlayer {
    pub fn start(
        decoders: Arc<dyn DecoderFactory>,
        stabilization: Arc<dyn StabilizationBackend>,
        snapshot: Arc<ConfigSnapshot>,
        preview_size: Option<(usize, usize)>,
    ) -> ReefResult<Self> {
        let (tx, replies) = tokio::sync::mpsc::unbounded_channel();
        let worker = PlaybackWorker::spawn(decoders, stabilization, tx)?;
        Ok(Self {
            coordinator: PlaybackCoordinator::new(snapshot, preview_size),
            worker,
            replies,
            scheduled: VecDeque::new(),
        })
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator {
        &self.coordinator
    }

    pub fn load_video(&mut self, path: impl Into<PathBuf>) -> ReefResult<()> {
        self.scheduled.clear();
        let actions = self.coordinator.load_video(path);
        self.dispatch(actions, None)
    }

    pub fn unload(&mut self) -> ReefResult<()> {
        self.scheduled.clear();
        let actions = self.coordinator.unload();
        self.dispatch(actions, None)
    }

    pub fn request_frame(&mut self) -> ReefResult<()> {
        let actions = self.coordinator.request_frame();
        self.dispatch(actions, None)
    }

    pub fn seek_to(&mut self, time_secs: f64) -> ReefResult<()> {
        self.scheduled.clear();
        let actions = self.coordinator.seek_to(time_secs);
        self.dispatch(actions, None)
    }

    pub fn play(&mut self) -> ReefResult<()> {
        let actions = self.coordinator.play();
        self.dispatch(actions, None)
    }

    pub fn stop(&mut self) -> ReefResult<()> {
        let actions = self.coordinator.stop();
        self.dispatch(actions, None)
    }

    pub fn set_snapshot(&mut self, snapshot: Arc<ConfigSnapshot>) {
        self.coordinator.set_snapshot(snapshot);
    }

    /// Whether nothing is in flight, queued for display, or playing.
    pub fn is_settled(&self) -> bool {
        self.coordinator.is_idle() && !self.coordinator.is_playing() && self.scheduled.is_empty()
    }

    /// Process replies and presentations until `deadline`, or until the
    /// player settles if `stop_when_settled` is set.
    pub async fn run_until(
        &mut self,
        deadline: Instant,
        stop_when_settled: bool,
        sink: &mut dyn FrameSink,
    ) -> ReefResult<()> {
        loop {
            let now = Instant::now();
            self.present_due(now, sink)?;
            if now >= deadline || (stop_when_settled && self.is_settled()) {
                return Ok(());
            }

            let wake = self
                .scheduled
                .front()
                .map_or(deadline, |next| next.at.min(deadline));

            tokio::select! {
                reply = self.replies.recv() => {
                    let reply = reply.ok_or_else(|| ReefError::playback("Decode worker has stopped"))?;
                    let actions = self.coordinator.handle_reply(reply, Instant::now());
                    self.dispatch(actions, Some(&mut *sink))?;
                }
                _ = tokio::time::sleep_until(wake.into()) => {}
            }
        }
    }

    /// Stop the worker thread.
    pub fn shutdown(self) {
        self.worker.shutdown();
    }

    fn present_due(&mut self, now: Instant, sink: &mut dyn FrameSink) -> ReefResult<()> {
        while self.scheduled.front().is_some_and(|next| next.at <= now) {
            let Some(next) = self.scheduled.pop_front() else {
                break;
            };
            sink.present(&next.frame, next.time);
            let actions = self.coordinator.presented(next.time);
            self.dispatch(actions, Some(&mut *sink))?;
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        actions: Vec<CoordinatorAction>,
        mut sink: Option<&mut dyn FrameSink>,
    ) -> ReefResult<()> {
        for action in actions {
            match action {
                CoordinatorAction::Send(request) => self.worker.send(request)?,
                CoordinatorAction::Present { frame, time, at } => {
                    self.scheduled.push_back(ScheduledFrame { frame, time, at });
                }
                CoordinatorAction::PositionChanged { label, slider, .. } => {
                    if let Some(sink) = sink.as_deref_mut() {
                        sink.position_changed(&label, slider);
                    }
                }
                CoordinatorAction::VideoReady(info) => {
                    if let Some(sink) = sink.as_deref_mut() {
                        sink.video_ready(&info);
                    }
                }
                CoordinatorAction::PlaybackStopped => {
                    if let Some(sink) = sink.as_deref_mut() {
                        sink.playback_stopped();
                    }
                }
                CoordinatorAction::Warning(message) => {
                    tracing::warn!(%message, "Preview warning");
                }
                CoordinatorAction::Error(message) => {
                    tracing::error!(%message, "Preview error");
                    if let Some(sink) = sink.as_deref_mut() {
                        sink.error(&message);
                    }
                }
            }
        }
        Ok(())
    }
}
