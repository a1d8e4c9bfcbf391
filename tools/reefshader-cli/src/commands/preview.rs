//! Headless preview: drive the playback coordinator and report what a
//! display would show.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reefshader_common::clock::seek_time_for;
use reefshader_common::config::AppConfig;
use reefshader_media_model::frame::{Frame, VideoInfo};
use reefshader_playback::{FrameSink, PreviewPlayer};
use reefshader_render_engine::{FfmpegDecoderFactory, GyroflowCliBackend};

use super::load_snapshot;

/// Upper bound on waiting for the player to settle after a command.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ConsoleSink {
    frames: u64,
    last_label: String,
    errors: Vec<String>,
}

impl FrameSink for ConsoleSink {
    fn present(&mut self, frame: &Frame, time: f64) {
        self.frames += 1;
        tracing::debug!(time, width = frame.width(), height = frame.height(), "Frame shown");
    }

    fn video_ready(&mut self, info: &VideoInfo) {
        println!("{}", info.summary());
    }

    fn position_changed(&mut self, label: &str, slider: u64) {
        if label != self.last_label {
            println!("  position {label} (slider {slider})");
            self.last_label = label.to_string();
        }
    }

    fn playback_stopped(&mut self) {
        println!("  playback stopped");
    }

    fn error(&mut self, message: &str) {
        println!("  error: {message}");
        self.errors.push(message.to_string());
    }
}

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    snapshot_path: Option<PathBuf>,
    seeks: Vec<f64>,
    seek_frames: Vec<u64>,
    play_secs: f64,
) -> anyhow::Result<()> {
    let snapshot = load_snapshot(snapshot_path.as_deref())?;
    let preview_size = Some((
        config.preview.width as usize,
        config.preview.height as usize,
    ));

    let mut player = PreviewPlayer::start(
        Arc::new(FfmpegDecoderFactory::new(&config.tools)),
        Arc::new(GyroflowCliBackend::new(config.tools.gyroflow.clone())),
        snapshot,
        preview_size,
    )?;
    let mut sink = ConsoleSink::default();

    println!("Loading {}", path.display());
    player.load_video(path)?;
    player
        .run_until(Instant::now() + SETTLE_TIMEOUT, true, &mut sink)
        .await?;

    let mut targets = seeks;
    if !seek_frames.is_empty() {
        let Some(frame_rate) = player.coordinator().video().map(|info| info.frame_rate) else {
            player.shutdown();
            anyhow::bail!("Video did not load; cannot seek by frame");
        };
        targets.extend(seek_frames.iter().map(|&n| seek_time_for(n, frame_rate)));
    }

    for target in targets {
        println!("Seek to {target:.3}s");
        player.seek_to(target)?;
        player
            .run_until(Instant::now() + SETTLE_TIMEOUT, true, &mut sink)
            .await?;
    }

    if play_secs > 0.0 {
        println!("Playing for {play_secs:.1}s");
        player.play()?;
        player
            .run_until(
                Instant::now() + Duration::from_secs_f64(play_secs),
                false,
                &mut sink,
            )
            .await?;
        player.stop()?;
        player
            .run_until(Instant::now() + SETTLE_TIMEOUT, true, &mut sink)
            .await?;
    }

    println!(
        "Shown {} frame(s), final position {:.3}s",
        sink.frames,
        player.coordinator().position()
    );
    player.shutdown();

    if !sink.errors.is_empty() {
        anyhow::bail!("{} preview error(s)", sink.errors.len());
    }
    Ok(())
}
