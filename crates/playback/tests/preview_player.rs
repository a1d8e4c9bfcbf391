use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::Array3;

use reefshader_common::error::{ReefError, ReefResult};
use reefshader_media_model::frame::{Frame, Rotation, VideoInfo};
use reefshader_media_model::media::{DecodedFrame, Decoder, DecoderFactory};
use reefshader_media_model::snapshot::ConfigSnapshot;
use reefshader_playback::{FrameSink, PreviewPlayer};
use reefshader_processing_core::stabilization::{
    AnalysisArtifact, StabilizationBackend, Stabilizer,
};

const FPS: f64 = 50.0;
const FRAMES: u64 = 10;

struct Counter {
    info: VideoInfo,
    next: u64,
}

impl Decoder for Counter {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn seek(&mut self, time_secs: f64) -> ReefResult<()> {
        self.next = (time_secs * FPS).round() as u64;
        Ok(())
    }

    fn next_frame(&mut self) -> ReefResult<DecodedFrame> {
        if self.next >= FRAMES {
            return Ok(DecodedFrame::EndOfStream);
        }
        let time = self.next as f64 / FPS;
        self.next += 1;
        let frame = Frame::new(Array3::from_elem((4, 4, 3), 0.5), time, Rotation::Deg0)?;
        Ok(DecodedFrame::Frame(frame))
    }
}

struct CounterFactory;

impl DecoderFactory for CounterFactory {
    fn open(&self, path: &Path) -> ReefResult<Box<dyn Decoder>> {
        Ok(Box::new(Counter {
            info: VideoInfo {
                width: 4,
                height: 4,
                frame_rate: FPS,
                duration: FRAMES as f64 / FPS,
                frame_count: FRAMES,
                decoder_name: path.display().to_string(),
                rotation: Rotation::Deg0,
            },
            next: 0,
        }))
    }
}

struct NoStabilization;

impl StabilizationBackend for NoStabilization {
    fn create_analysis(&self, _video: &Path, _preset: Option<&str>) -> ReefResult<AnalysisArtifact> {
        Err(ReefError::unsupported("no library"))
    }

    fn open_session(
        &self,
        _artifact: &AnalysisArtifact,
        _library: &Path,
    ) -> ReefResult<Box<dyn Stabilizer>> {
        Err(ReefError::unsupported("no library"))
    }
}

#[derive(Default)]
struct Recorder {
    presented: Vec<(f64, Instant)>,
    labels: Vec<String>,
    infos: Vec<VideoInfo>,
    stopped: usize,
}

impl FrameSink for Recorder {
    fn present(&mut self, _frame: &Frame, time: f64) {
        self.presented.push((time, Instant::now()));
    }

    fn video_ready(&mut self, info: &VideoInfo) {
        self.infos.push(info.clone());
    }

    fn position_changed(&mut self, label: &str, _slider: u64) {
        self.labels.push(label.to_string());
    }

    fn playback_stopped(&mut self) {
        self.stopped += 1;
    }
}

fn player() -> PreviewPlayer {
    PreviewPlayer::start(
        Arc::new(CounterFactory),
        Arc::new(NoStabilization),
        Arc::new(ConfigSnapshot::default()),
        None,
    )
    .unwrap()
}

fn in_secs(secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(secs)
}

#[tokio::test]
async fn load_shows_first_frame() {
    let mut player = player();
    let mut sink = Recorder::default();

    player.load_video(PathBuf::from("/dive/clip.mp4")).unwrap();
    player.run_until(in_secs(5), true, &mut sink).await.unwrap();

    assert_eq!(sink.infos.len(), 1);
    assert_eq!(sink.presented.len(), 1);
    assert_eq!(sink.presented[0].0, 0.0);
    player.shutdown();
}

#[tokio::test]
async fn playback_runs_to_end_in_order_and_paced() {
    let mut player = player();
    let mut sink = Recorder::default();

    player.load_video("/dive/clip.mp4").unwrap();
    player.run_until(in_secs(5), true, &mut sink).await.unwrap();

    player.play().unwrap();
    player.run_until(in_secs(5), true, &mut sink).await.unwrap();

    let times: Vec<f64> = sink.presented.iter().map(|(t, _)| *t).collect();
    let expected: Vec<f64> = (0..FRAMES).map(|i| i as f64 / FPS).collect();
    assert_eq!(times, expected);

    // Frames 2.. are paced one interval apart (allow scheduler slack).
    let first_paced = sink.presented[2].1;
    let last = sink.presented.last().unwrap().1;
    let min_span = Duration::from_secs_f64((FRAMES - 3) as f64 / FPS) - Duration::from_millis(10);
    assert!(last.duration_since(first_paced) >= min_span);

    assert_eq!(sink.stopped, 1);
    assert_eq!(sink.labels.last().map(String::as_str), Some("00:00.200"));
    assert!(!player.coordinator().is_playing());
    player.shutdown();
}

#[tokio::test]
async fn rapid_seeks_show_latest_target() {
    let mut player = player();
    let mut sink = Recorder::default();

    player.load_video("/dive/clip.mp4").unwrap();
    player.run_until(in_secs(5), true, &mut sink).await.unwrap();

    for t in [0.02, 0.04, 0.06, 0.14] {
        player.seek_to(t).unwrap();
    }
    player.run_until(in_secs(5), true, &mut sink).await.unwrap();

    let times: Vec<f64> = sink.presented.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![0.0, 0.14]);
    player.shutdown();
}

#[tokio::test]
async fn seek_during_playback_discards_frames_queued_before_it() {
    let mut player = player();
    let mut sink = Recorder::default();

    player.load_video("/dive/clip.mp4").unwrap();
    player.run_until(in_secs(5), true, &mut sink).await.unwrap();

    player.play().unwrap();
    let partway = Instant::now() + Duration::from_millis(70);
    player.run_until(partway, false, &mut sink).await.unwrap();
    assert!(player.coordinator().is_playing());
    let before_seek = sink.presented.len();

    player.seek_to(0.02).unwrap();
    player.run_until(in_secs(5), true, &mut sink).await.unwrap();

    let after: Vec<f64> = sink.presented[before_seek..].iter().map(|(t, _)| *t).collect();
    assert_eq!(after, vec![0.02]);
    assert_eq!(player.coordinator().position(), 0.02);
    player.shutdown();
}
