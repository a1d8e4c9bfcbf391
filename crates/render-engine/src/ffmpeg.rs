//! ffmpeg-backed decoder and encoder.
//!
//! Both sides talk raw RGB24 over pipes. The decoder restarts its ffmpeg
//! process on every seek; `-noautorotate` keeps frames in coded orientation
//! so the pipeline's rotate stage stays in charge.

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::Deserialize;

use reefshader_common::config::MediaTools;
use reefshader_common::error::{ReefError, ReefResult};
use reefshader_media_model::frame::{Frame, Rotation, VideoInfo, CHANNELS};
use reefshader_media_model::media::{
    DecodedFrame, Decoder, DecoderFactory, Encoder, EncoderFactory, EncoderSettings,
};
use reefshader_media_model::snapshot::Codec;

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Build [`VideoInfo`] from `ffprobe -of json` output.
fn parse_probe(json: &str) -> ReefResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ReefError::decode(format!("Unreadable ffprobe output: {e}")))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| ReefError::decode("No video stream found"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ReefError::decode("Video stream has no dimensions")),
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| ReefError::decode("Video stream has no frame rate"))?;

    let duration = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * frame_rate).round() as u64);

    // Display-matrix rotation is counter-clockwise; the legacy `rotate` tag
    // is clockwise.
    let degrees = stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .map(|r| r.round() as i32)
        .or_else(|| {
            stream
                .tags
                .get("rotate")
                .and_then(|r| r.parse::<i32>().ok())
                .map(|r| -r)
        })
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        duration,
        frame_count,
        decoder_name: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
        rotation: Rotation::from_degrees(degrees)?,
    })
}

/// Probe a video with ffprobe.
pub fn probe_video(ffprobe: &str, path: &Path) -> ReefResult<VideoInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,codec_name,avg_frame_rate,r_frame_rate,nb_frames,duration:\
             stream_side_data=rotation:stream_tags=rotate:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| ReefError::decode(format!("Failed to run {ffprobe}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReefError::decode(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            stderr.trim()
        )));
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

/// Opens [`FfmpegDecoder`]s.
#[derive(Debug, Clone)]
pub struct FfmpegDecoderFactory {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegDecoderFactory {
    pub fn new(tools: &MediaTools) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }
}

impl DecoderFactory for FfmpegDecoderFactory {
    fn open(&self, path: &Path) -> ReefResult<Box<dyn Decoder>> {
        if !path.exists() {
            return Err(ReefError::FileNotFound {
                path: PathBuf::from(path),
            });
        }
        let info = probe_video(&self.ffprobe, path)?;
        let mut decoder = FfmpegDecoder {
            ffmpeg: self.ffmpeg.clone(),
            path: PathBuf::from(path),
            info,
            process: None,
            ended: false,
        };
        decoder.start_at(0.0)?;
        Ok(Box::new(decoder))
    }
}

struct DecodeProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
    start_secs: f64,
    frames_read: u64,
}

/// Decoder reading raw RGB24 frames from an ffmpeg child process.
pub struct FfmpegDecoder {
    ffmpeg: String,
    path: PathBuf,
    info: VideoInfo,
    process: Option<DecodeProcess>,
    /// Set once ffmpeg has exited cleanly; later reads keep reporting the end.
    ended: bool,
}

impl FfmpegDecoder {
    fn start_at(&mut self, start_secs: f64) -> ReefResult<()> {
        self.stop();
        self.ended = false;

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-nostdin", "-noautorotate"]);
        if start_secs > 0.0 {
            cmd.arg("-ss").arg(format!("{start_secs:.6}"));
        }
        cmd.arg("-i")
            .arg(&self.path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| ReefError::decode(format!("Failed to start {}: {e}", self.ffmpeg)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReefError::decode("Failed to capture ffmpeg stdout"))?;

        tracing::debug!(
            pid = child.id(),
            path = %self.path.display(),
            start_secs,
            "ffmpeg decoder started"
        );

        self.process = Some(DecodeProcess {
            child,
            stdout: BufReader::new(stdout),
            start_secs,
            frames_read: 0,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.child.kill();
            let _ = process.child.wait();
        }
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fill `buf` as far as the stream allows; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl Decoder for FfmpegDecoder {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn seek(&mut self, time_secs: f64) -> ReefResult<()> {
        self.start_at(time_secs.max(0.0))
    }

    fn next_frame(&mut self) -> ReefResult<DecodedFrame> {
        if self.ended {
            return Ok(DecodedFrame::EndOfStream);
        }
        let (width, height) = (self.info.width as usize, self.info.height as usize);
        let frame_rate = self.info.frame_rate;
        let rotation = self.info.rotation;
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| ReefError::decode("Decoder is not running"))?;

        let mut buf = vec![0u8; width * height * CHANNELS];
        let filled = read_full(&mut process.stdout, &mut buf)
            .map_err(|e| ReefError::decode(format!("Failed reading decoded frame: {e}")))?;

        if filled == 0 {
            let status = process.child.wait()?;
            self.process = None;
            if !status.success() {
                return Err(ReefError::decode(format!("ffmpeg exited with {status}")));
            }
            self.ended = true;
            return Ok(DecodedFrame::EndOfStream);
        }
        if filled < buf.len() {
            return Err(ReefError::decode(format!(
                "Truncated frame: got {filled} of {} bytes",
                buf.len()
            )));
        }

        let timestamp = process.start_secs + process.frames_read as f64 / frame_rate;
        process.frames_read += 1;
        let frame = Frame::from_rgb8(&buf, width, height, timestamp, rotation)?;
        Ok(DecodedFrame::Frame(frame))
    }
}

/// ffmpeg arguments selecting the output codec.
fn codec_args(codec: Codec, bitrate_mbps: u32) -> Vec<String> {
    let bitrate = format!("{}M", bitrate_mbps.max(1));
    let (encoder, pix_fmt) = match codec {
        Codec::H264 => ("libx264", "yuv420p"),
        Codec::Hevc => ("libx265", "yuv420p"),
        Codec::Hevc10 => ("libx265", "yuv420p10le"),
    };
    let mut args = vec![
        "-c:v".to_string(),
        encoder.to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-pix_fmt".to_string(),
        pix_fmt.to_string(),
        "-b:v".to_string(),
        bitrate,
    ];
    if codec != Codec::H264 {
        // Lets QuickTime recognise HEVC in mp4/mov.
        args.push("-tag:v".to_string());
        args.push("hvc1".to_string());
    }
    args.push("-movflags".to_string());
    args.push("+faststart".to_string());
    args
}

/// Creates [`FfmpegEncoder`]s.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    ffmpeg: String,
}

impl FfmpegEncoderFactory {
    pub fn new(tools: &MediaTools) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, output: &Path, settings: &EncoderSettings) -> ReefResult<Box<dyn Encoder>> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", settings.width, settings.height),
            "-r".to_string(),
            format!("{}", settings.frame_rate),
            "-i".to_string(),
            "pipe:0".to_string(),
        ];
        args.extend(codec_args(settings.codec, settings.bitrate_mbps));
        args.push(output.display().to_string());

        tracing::debug!(args = ?args, "Starting ffmpeg encoder");
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReefError::encode(format!("Failed to start {}: {e}", self.ffmpeg)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReefError::encode("Failed to capture ffmpeg stdin"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReefError::encode("Failed to capture ffmpeg stderr"))?;

        // Drain stderr so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        Ok(Box::new(FfmpegEncoder {
            child,
            stdin: Some(stdin),
            stderr_task: Some(stderr_task),
            width: settings.width as usize,
            height: settings.height as usize,
            output: PathBuf::from(output),
        }))
    }
}

/// Encoder piping raw RGB24 frames into an ffmpeg child process.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<std::thread::JoinHandle<String>>,
    width: usize,
    height: usize,
    output: PathBuf,
}

impl FfmpegEncoder {
    fn stderr_output(&mut self) -> String {
        self.stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default()
    }
}

impl Encoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> ReefResult<()> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(ReefError::encode(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReefError::encode("Encoder already finished"))?;
        if let Err(e) = stdin.write_all(&frame.to_rgb8()) {
            let stderr = self.stderr_output();
            return Err(ReefError::encode(format!(
                "ffmpeg stopped accepting frames: {e}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn finish(&mut self) -> ReefResult<()> {
        // Closing stdin signals end of input.
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| ReefError::encode(format!("Failed waiting for ffmpeg: {e}")))?;
        let stderr = self.stderr_output();
        if !status.success() {
            return Err(ReefError::encode(format!(
                "ffmpeg exited with {status}: {}",
                stderr.trim()
            )));
        }
        tracing::info!(output = %self.output.display(), "Encoding finished");
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
