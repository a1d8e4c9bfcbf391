//! Single-flight playback coordinator.
//!
//! The coordinator sits between UI events (load, play, seek) and the decode
//! worker. It keeps at most one frame request outstanding; seeks that arrive
//! while a request is in flight overwrite each other and only the latest is
//! sent once the reply comes back. During playback it paces presentation at
//! the source frame rate and requests the next frame as soon as the previous
//! one is scheduled, so decoding overlaps display.
//!
//! The coordinator does no I/O. Every method returns the actions the caller
//! must carry out, which keeps the state machine testable without threads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use reefshader_common::clock::{format_position, slider_value_for, DisplayPacer};
use reefshader_media_model::frame::{Frame, VideoInfo};
use reefshader_media_model::snapshot::ConfigSnapshot;

use crate::messages::{FrameOutcome, Generation, WorkerReply, WorkerRequest};

/// Frames allowed to wait for their display deadline before the next
/// request is held back.
pub const MAX_QUEUED_PRESENTATIONS: usize = 1;

/// Request state towards the worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightState {
    Idle,
    /// One frame request is outstanding. `pending_seek` holds the latest
    /// seek target received since it was sent.
    RequestPending { pending_seek: Option<f64> },
}

/// Something the caller must do on behalf of the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorAction {
    /// Forward a request to the worker.
    Send(WorkerRequest),

    /// Show `frame` at `at`, then report back with
    /// [`PlaybackCoordinator::presented`].
    Present { frame: Frame, time: f64, at: Instant },

    /// Update the position indicator.
    PositionChanged { time: f64, label: String, slider: u64 },

    VideoReady(VideoInfo),
    PlaybackStopped,
    Warning(String),
    Error(String),
}

/// Preview playback state machine.
#[derive(Debug)]
pub struct PlaybackCoordinator {
    generation: Generation,
    flight: FlightState,
    snapshot: Arc<ConfigSnapshot>,
    preview_size: Option<(usize, usize)>,
    loaded: bool,
    video: Option<VideoInfo>,
    playing: bool,
    at_end: bool,
    pacer: DisplayPacer,
    position: f64,
    queued_presentations: usize,
    rearm_on_present: bool,
}

impl PlaybackCoordinator {
    pub fn new(snapshot: Arc<ConfigSnapshot>, preview_size: Option<(usize, usize)>) -> Self {
        Self {
            generation: 0,
            flight: FlightState::Idle,
            snapshot,
            preview_size,
            loaded: false,
            video: None,
            playing: false,
            at_end: false,
            pacer: DisplayPacer::new(0.0),
            position: 0.0,
            queued_presentations: 0,
            rearm_on_present: false,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn flight(&self) -> FlightState {
        self.flight
    }

    pub fn is_idle(&self) -> bool {
        self.flight == FlightState::Idle
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn video(&self) -> Option<&VideoInfo> {
        self.video.as_ref()
    }

    /// Settings used for subsequent frame requests.
    pub fn set_snapshot(&mut self, snapshot: Arc<ConfigSnapshot>) {
        self.snapshot = snapshot;
    }

    /// Switch to a new video and request its first frame.
    pub fn load_video(&mut self, path: impl Into<PathBuf>) -> Vec<CoordinatorAction> {
        let mut actions = self.unload();
        let path = path.into();
        tracing::info!(path = %path.display(), generation = self.generation, "Loading video");

        self.loaded = true;
        actions.push(CoordinatorAction::Send(WorkerRequest::Load {
            generation: self.generation,
            path,
            preview_size: self.preview_size,
        }));
        actions.extend(self.request_frame());
        actions
    }

    /// Close the current video. Replies still in flight for it are ignored.
    pub fn unload(&mut self) -> Vec<CoordinatorAction> {
        if !self.loaded {
            return Vec::new();
        }
        let mut actions = self.stop();
        let old = self.generation;
        self.generation += 1;
        self.loaded = false;
        self.video = None;
        self.flight = FlightState::Idle;
        self.at_end = false;
        self.position = 0.0;
        self.queued_presentations = 0;
        self.rearm_on_present = false;
        tracing::debug!(generation = old, "Video unloaded");
        actions.push(CoordinatorAction::Send(WorkerRequest::Unload { generation: old }));
        actions
    }

    /// Ask for the next frame unless a request is already outstanding.
    pub fn request_frame(&mut self) -> Vec<CoordinatorAction> {
        if !self.loaded || self.flight != FlightState::Idle {
            return Vec::new();
        }
        vec![self.send_frame_request(None)]
    }

    /// Seek to `time_secs`. Stops playback.
    ///
    /// Frames handed out for presentation before the seek are dropped by
    /// the caller; the coordinator stops counting them.
    pub fn seek_to(&mut self, time_secs: f64) -> Vec<CoordinatorAction> {
        let mut actions = self.stop();
        self.queued_presentations = 0;
        actions.extend(self.schedule_seek(time_secs));
        actions
    }

    /// Start playback. Playing from the end restarts from the beginning.
    pub fn play(&mut self) -> Vec<CoordinatorAction> {
        if !self.loaded || self.playing {
            return Vec::new();
        }
        self.playing = true;
        self.pacer.reset();
        tracing::debug!(position = self.position, "Playback started");
        if self.at_end {
            self.schedule_seek(0.0)
        } else {
            self.request_frame()
        }
    }

    pub fn stop(&mut self) -> Vec<CoordinatorAction> {
        if !self.playing {
            return Vec::new();
        }
        self.playing = false;
        self.pacer.reset();
        self.rearm_on_present = false;
        tracing::debug!(position = self.position, "Playback stopped");
        vec![CoordinatorAction::PlaybackStopped]
    }

    /// Process a worker reply received at `now`.
    pub fn handle_reply(&mut self, reply: WorkerReply, now: Instant) -> Vec<CoordinatorAction> {
        if reply.generation() != self.generation || !self.loaded {
            tracing::debug!(
                reply_generation = reply.generation(),
                current = self.generation,
                "Discarding stale reply"
            );
            return Vec::new();
        }

        match reply {
            WorkerReply::VideoInfoReady { info, .. } => {
                self.pacer = DisplayPacer::new(info.frame_rate);
                self.position = 0.0;
                self.video = Some(info.clone());
                vec![
                    CoordinatorAction::VideoReady(info),
                    self.position_action(0.0),
                ]
            }
            WorkerReply::LoadFailed { error, .. } => {
                self.video = None;
                let mut actions = self.stop();
                actions.push(CoordinatorAction::Error(error));
                actions
            }
            WorkerReply::SessionWarning { message, .. } => {
                vec![CoordinatorAction::Warning(message)]
            }
            WorkerReply::FrameFailed { error, .. } => {
                let mut actions = self.stop();
                actions.push(CoordinatorAction::Error(error));
                actions.extend(self.finish_request());
                actions
            }
            WorkerReply::FrameDecoded { outcome, .. } => {
                let superseded = matches!(
                    self.flight,
                    FlightState::RequestPending {
                        pending_seek: Some(_)
                    }
                );
                let mut actions = if superseded {
                    tracing::trace!("Dropping frame superseded by a seek");
                    Vec::new()
                } else {
                    self.apply_outcome(outcome, now)
                };
                actions.extend(self.finish_request());
                actions
            }
        }
    }

    /// The frame scheduled by a `Present` action is now on screen.
    pub fn presented(&mut self, time: f64) -> Vec<CoordinatorAction> {
        self.queued_presentations = self.queued_presentations.saturating_sub(1);

        let mut actions = Vec::new();
        if !self.at_end {
            self.position = time;
            actions.push(self.position_action(time));
        }
        if self.rearm_on_present && self.playing && self.flight == FlightState::Idle {
            self.rearm_on_present = false;
            actions.push(self.send_frame_request(None));
        }
        actions
    }

    fn apply_outcome(&mut self, outcome: FrameOutcome, now: Instant) -> Vec<CoordinatorAction> {
        match outcome {
            FrameOutcome::Frame { frame, time } => {
                self.at_end = false;
                let at = if self.playing {
                    self.pacer.schedule(now)
                } else {
                    now
                };
                self.queued_presentations += 1;
                vec![CoordinatorAction::Present { frame, time, at }]
            }
            FrameOutcome::NotReady { time } => {
                tracing::trace!(time, "No frame produced this tick");
                Vec::new()
            }
            FrameOutcome::EndOfStream => {
                self.at_end = true;
                let mut actions = self.stop();
                let (end, slider, label) = match &self.video {
                    Some(info) => (
                        info.duration,
                        info.frame_count,
                        format_position(info.duration, Some(info.duration)),
                    ),
                    None => (self.position, 0, format_position(self.position, None)),
                };
                self.position = end;
                actions.push(CoordinatorAction::PositionChanged {
                    time: end,
                    label,
                    slider,
                });
                actions
            }
        }
    }

    /// Complete the outstanding request and decide what to send next.
    fn finish_request(&mut self) -> Vec<CoordinatorAction> {
        let pending_seek = match self.flight {
            FlightState::RequestPending { pending_seek } => pending_seek,
            FlightState::Idle => {
                tracing::warn!("Frame reply without an outstanding request");
                None
            }
        };
        self.flight = FlightState::Idle;

        if let Some(target) = pending_seek {
            return vec![self.send_frame_request(Some(target))];
        }
        if self.playing && !self.at_end {
            if self.queued_presentations <= MAX_QUEUED_PRESENTATIONS {
                return vec![self.send_frame_request(None)];
            }
            self.rearm_on_present = true;
        }
        Vec::new()
    }

    fn schedule_seek(&mut self, time_secs: f64) -> Vec<CoordinatorAction> {
        if !self.loaded {
            return Vec::new();
        }
        let target = time_secs.max(0.0);
        self.at_end = false;
        if let FlightState::RequestPending { pending_seek } = &mut self.flight {
            tracing::trace!(target, replaced = ?pending_seek, "Seek coalesced");
            *pending_seek = Some(target);
            return Vec::new();
        }
        vec![self.send_frame_request(Some(target))]
    }

    fn send_frame_request(&mut self, seek_to: Option<f64>) -> CoordinatorAction {
        self.flight = FlightState::RequestPending { pending_seek: None };
        CoordinatorAction::Send(WorkerRequest::Frame {
            generation: self.generation,
            seek_to,
            snapshot: Arc::clone(&self.snapshot),
        })
    }

    fn position_action(&self, time: f64) -> CoordinatorAction {
        let (label, slider) = match &self.video {
            Some(info) => (
                format_position(time, Some(info.duration)),
                slider_value_for(time, info.duration, info.frame_count),
            ),
            None => (format_position(time, None), 0),
        };
        CoordinatorAction::PositionChanged {
            time,
            label,
            slider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use reefshader_media_model::frame::Rotation;
    use std::time::Duration;

    fn info() -> VideoInfo {
        VideoInfo {
            width: 8,
            height: 8,
            frame_rate: 25.0,
            duration: 2.0,
            frame_count: 50,
            decoder_name: "fake".to_string(),
            rotation: Rotation::Deg0,
        }
    }

    fn frame_at(time: f64) -> FrameOutcome {
        let frame = Frame::new(Array3::zeros((2, 2, 3)), time, Rotation::Deg0).unwrap();
        FrameOutcome::Frame { frame, time }
    }

    fn frame_requests(actions: &[CoordinatorAction]) -> Vec<Option<f64>> {
        actions
            .iter()
            .filter_map(|a| match a {
                CoordinatorAction::Send(WorkerRequest::Frame { seek_to, .. }) => Some(*seek_to),
                _ => None,
            })
            .collect()
    }

    fn presents(actions: &[CoordinatorAction]) -> Vec<(f64, Instant)> {
        actions
            .iter()
            .filter_map(|a| match a {
                CoordinatorAction::Present { time, at, .. } => Some((*time, *at)),
                _ => None,
            })
            .collect()
    }

    /// A coordinator with a loaded video whose first frame was delivered.
    fn loaded(now: Instant) -> PlaybackCoordinator {
        let mut c = PlaybackCoordinator::new(Arc::new(ConfigSnapshot::default()), None);
        c.load_video("/dive/clip.mp4");
        let g = c.generation();
        c.handle_reply(
            WorkerReply::VideoInfoReady {
                generation: g,
                info: info(),
            },
            now,
        );
        c.handle_reply(
            WorkerReply::FrameDecoded {
                generation: g,
                outcome: frame_at(0.0),
            },
            now,
        );
        c.presented(0.0);
        assert!(c.is_idle());
        c
    }

    fn reply(c: &PlaybackCoordinator, outcome: FrameOutcome) -> WorkerReply {
        WorkerReply::FrameDecoded {
            generation: c.generation(),
            outcome,
        }
    }

    #[test]
    fn test_load_sends_load_then_first_frame() {
        let mut c = PlaybackCoordinator::new(Arc::new(ConfigSnapshot::default()), Some((800, 600)));
        let actions = c.load_video("clip.mp4");
        assert!(matches!(
            actions[0],
            CoordinatorAction::Send(WorkerRequest::Load { generation: 0, .. })
        ));
        assert_eq!(frame_requests(&actions), vec![None]);
        assert!(!c.is_idle());
    }

    #[test]
    fn test_seeks_while_pending_collapse_to_latest() {
        let now = Instant::now();
        let mut c = loaded(now);

        let first = c.seek_to(0.5);
        assert_eq!(frame_requests(&first), vec![Some(0.5)]);

        for t in [0.6, 0.7, 0.8, 1.2] {
            assert!(frame_requests(&c.seek_to(t)).is_empty());
        }
        assert_eq!(
            c.flight(),
            FlightState::RequestPending {
                pending_seek: Some(1.2)
            }
        );

        // The frame for 0.5 is stale by the time it arrives.
        let after = c.handle_reply(reply(&c, frame_at(0.5)), now);
        assert_eq!(frame_requests(&after), vec![Some(1.2)]);
        assert!(presents(&after).is_empty());

        let last = c.handle_reply(reply(&c, frame_at(1.2)), now);
        assert_eq!(presents(&last), vec![(1.2, now)]);
        assert!(frame_requests(&last).is_empty());
        assert!(c.is_idle());
    }

    #[test]
    fn test_seek_during_playback_forgets_queued_frames() {
        let start = Instant::now();
        let mut c = loaded(start);
        c.play();
        c.handle_reply(reply(&c, frame_at(0.04)), start);
        let held = c.handle_reply(reply(&c, frame_at(0.08)), start);
        assert!(frame_requests(&held).is_empty());

        assert_eq!(frame_requests(&c.seek_to(1.0)), vec![Some(1.0)]);
        let shown = start + Duration::from_millis(3);
        let target = c.handle_reply(reply(&c, frame_at(1.0)), shown);
        assert_eq!(presents(&target), vec![(1.0, shown)]);
        c.presented(1.0);
        assert_eq!(c.position(), 1.0);

        // Nothing from before the seek holds back the next request.
        c.play();
        let next = c.handle_reply(reply(&c, frame_at(1.04)), shown);
        assert_eq!(frame_requests(&next), vec![None]);
    }

    #[test]
    fn test_request_frame_is_single_flight() {
        let now = Instant::now();
        let mut c = loaded(now);
        assert_eq!(frame_requests(&c.request_frame()), vec![None]);
        assert!(c.request_frame().is_empty());
    }

    #[test]
    fn test_seek_stops_playback() {
        let now = Instant::now();
        let mut c = loaded(now);
        c.play();
        let actions = c.seek_to(1.0);
        assert!(actions.contains(&CoordinatorAction::PlaybackStopped));
        assert!(!c.is_playing());
    }

    #[test]
    fn test_playback_paces_early_frames_and_pipelines_requests() {
        let start = Instant::now();
        let mut c = loaded(start);
        let interval = Duration::from_millis(40);

        assert_eq!(frame_requests(&c.play()), vec![None]);

        // Decoding is faster than real time.
        let a = c.handle_reply(reply(&c, frame_at(0.04)), start + Duration::from_millis(5));
        assert_eq!(presents(&a)[0].1, start + Duration::from_millis(5));
        assert_eq!(frame_requests(&a), vec![None]);

        let b = c.handle_reply(reply(&c, frame_at(0.08)), start + Duration::from_millis(10));
        assert_eq!(presents(&b)[0].1, start + Duration::from_millis(5) + interval);
        // Two frames waiting: hold the next request until one is shown.
        assert!(frame_requests(&b).is_empty());

        let shown = c.presented(0.04);
        assert_eq!(frame_requests(&shown), vec![None]);
        c.presented(0.08);
        assert_eq!(c.position(), 0.08);
    }

    #[test]
    fn test_late_frames_are_shown_immediately_without_skipping() {
        let start = Instant::now();
        let mut c = loaded(start);
        c.play();

        let late = start + Duration::from_millis(500);
        let a = c.handle_reply(reply(&c, frame_at(0.04)), late);
        assert_eq!(presents(&a), vec![(0.04, late)]);
        c.presented(0.04);

        let later = late + Duration::from_millis(300);
        let b = c.handle_reply(reply(&c, frame_at(0.08)), later);
        assert_eq!(presents(&b), vec![(0.08, later)]);
    }

    #[test]
    fn test_not_ready_requests_next_without_presenting() {
        let now = Instant::now();
        let mut c = loaded(now);
        c.play();
        let actions = c.handle_reply(reply(&c, FrameOutcome::NotReady { time: 0.04 }), now);
        assert!(presents(&actions).is_empty());
        assert_eq!(frame_requests(&actions), vec![None]);
        assert_eq!(c.position(), 0.0);
    }

    #[test]
    fn test_end_of_stream_stops_and_pins_position() {
        let now = Instant::now();
        let mut c = loaded(now);
        c.play();
        let actions = c.handle_reply(reply(&c, FrameOutcome::EndOfStream), now);

        assert!(actions.contains(&CoordinatorAction::PlaybackStopped));
        assert!(actions.contains(&CoordinatorAction::PositionChanged {
            time: 2.0,
            label: "00:02.000".to_string(),
            slider: 50,
        }));
        assert!(!c.is_playing());
        assert!(c.is_idle());

        // A frame queued before the end does not move the pinned position.
        assert!(c.presented(1.96).is_empty());
        assert_eq!(c.position(), 2.0);

        // Playing again restarts from the beginning.
        assert_eq!(frame_requests(&c.play()), vec![Some(0.0)]);
    }

    #[test]
    fn test_replies_after_unload_are_discarded() {
        let now = Instant::now();
        let mut c = loaded(now);
        c.request_frame();
        let old = c.generation();

        let actions = c.load_video("/dive/other.mp4");
        assert!(actions.contains(&CoordinatorAction::Send(WorkerRequest::Unload {
            generation: old
        })));
        assert_eq!(c.generation(), old + 1);

        let stale = WorkerReply::FrameDecoded {
            generation: old,
            outcome: frame_at(0.04),
        };
        assert!(c.handle_reply(stale, now).is_empty());
        // The request for the new video is still outstanding.
        assert!(!c.is_idle());
    }

    #[test]
    fn test_frame_failure_stops_and_returns_to_idle() {
        let now = Instant::now();
        let mut c = loaded(now);
        c.play();
        let g = c.generation();
        let actions = c.handle_reply(
            WorkerReply::FrameFailed {
                generation: g,
                error: "Decode error: corrupt packet".to_string(),
            },
            now,
        );
        assert!(actions.contains(&CoordinatorAction::PlaybackStopped));
        assert!(matches!(actions.last(), Some(CoordinatorAction::Error(_))));
        assert!(c.is_idle());
    }
}
