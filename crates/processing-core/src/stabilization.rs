//! Stabilization session lifecycle.
//!
//! Gyroscope stabilization is delegated to an external library. Opening it
//! requires an analysis artifact (a project file produced from the source
//! video's motion data), which is expensive to build, so the session is kept
//! across frames and only rebuilt when one of the settings that affect it
//! changes. Those settings are summarised in a fingerprint string.

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::Array3;

use reefshader_common::error::{ReefError, ReefResult};
use reefshader_media_model::frame::{Frame, Rotation, CHANNELS};
use reefshader_media_model::snapshot::StabilizationConfig;

/// Lens preset used for footage shot through a flat underwater port.
pub const UNDERWATER_PRESET: &str = r#"{ "light_refraction_coefficient": 1.33 }"#;

/// Bytes per pixel in the stabilizer's frame layout.
const STABILIZER_BPP: usize = 4;

/// Handle to an analysis artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisArtifact {
    pub project_path: PathBuf,
}

/// A frame in the layout the stabilization library consumes: packed 8-bit
/// RGBA, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilizerFrame {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl StabilizerFrame {
    /// Convert a pipeline frame to the stabilizer layout.
    pub fn from_frame(frame: &Frame) -> Self {
        let (height, width, _) = frame.shape();
        let mut rgba = Vec::with_capacity(width * height * STABILIZER_BPP);
        for pixel in frame.pixels().rows() {
            for &v in pixel.iter() {
                rgba.push((v.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
            rgba.push(u8::MAX);
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Convert back to a pipeline frame, dropping alpha.
    pub fn into_frame(self, timestamp: f64, rotation: Rotation) -> ReefResult<Frame> {
        let expected = self.width * self.height * STABILIZER_BPP;
        if self.rgba.len() != expected {
            return Err(ReefError::stage(format!(
                "Stabilizer returned {} bytes for a {}x{} frame, expected {expected}",
                self.rgba.len(),
                self.width,
                self.height
            )));
        }
        let width = self.width;
        let pixels = Array3::from_shape_fn((self.height, self.width, CHANNELS), |(y, x, c)| {
            f32::from(self.rgba[(y * width + x) * STABILIZER_BPP + c]) / 255.0
        });
        Frame::new(pixels, timestamp, rotation)
    }
}

/// An opened stabilization engine bound to one analysis artifact.
pub trait Stabilizer: Send {
    /// Stabilize the frame shown at `time_secs`.
    ///
    /// Returns `None` while the engine has no usable motion data for that
    /// time yet (warm-up). That is not an error; the caller skips the frame.
    fn process(
        &mut self,
        frame: StabilizerFrame,
        time_secs: f64,
        rotation: Rotation,
    ) -> Option<StabilizerFrame>;
}

/// Entry points of the stabilization library.
pub trait StabilizationBackend: Send + Sync {
    /// Whether sessions can be opened through `library` at all. Checked
    /// before the analysis is built.
    fn check_library(&self, _library: &Path) -> ReefResult<()> {
        Ok(())
    }

    /// Build an analysis artifact for `video`, optionally with a lens preset
    /// (JSON).
    fn create_analysis(&self, video: &Path, preset: Option<&str>)
        -> ReefResult<AnalysisArtifact>;

    /// Load the library at `library` and open a session on `artifact`.
    fn open_session(
        &self,
        artifact: &AnalysisArtifact,
        library: &Path,
    ) -> ReefResult<Box<dyn Stabilizer>>;
}

/// Key over the settings that require a new session when they change.
pub fn fingerprint(config: &StabilizationConfig) -> String {
    format!(
        "enabled={};underwater={};library={}",
        config.enabled,
        config.underwater,
        config
            .library_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    )
}

fn preset_for(config: &StabilizationConfig) -> Option<&'static str> {
    config.underwater.then_some(UNDERWATER_PRESET)
}

/// An active stabilization session.
pub struct StabilizationSession {
    fingerprint: String,
    artifact: AnalysisArtifact,
    stabilizer: Box<dyn Stabilizer>,
}

impl fmt::Debug for StabilizationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StabilizationSession")
            .field("fingerprint", &self.fingerprint)
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

impl StabilizationSession {
    /// Build the analysis artifact and open a session on it.
    pub fn open(
        config: &StabilizationConfig,
        video: &Path,
        library: &Path,
        backend: &dyn StabilizationBackend,
    ) -> ReefResult<Self> {
        backend
            .check_library(library)
            .map_err(|e| ReefError::session(format!("Library unavailable: {e}")))?;
        let artifact = backend
            .create_analysis(video, preset_for(config))
            .map_err(|e| ReefError::session(format!("Analysis failed: {e}")))?;
        let stabilizer = backend
            .open_session(&artifact, library)
            .map_err(|e| ReefError::session(format!("Could not open session: {e}")))?;

        tracing::info!(
            video = %video.display(),
            project = %artifact.project_path.display(),
            underwater = config.underwater,
            "Stabilization session opened"
        );

        Ok(Self {
            fingerprint: fingerprint(config),
            artifact,
            stabilizer,
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn artifact(&self) -> &AnalysisArtifact {
        &self.artifact
    }

    /// Stabilize one upright frame. `None` means "no frame this tick".
    pub fn process(
        &mut self,
        frame: &Frame,
        time_secs: f64,
        rotation: Rotation,
    ) -> ReefResult<Option<Frame>> {
        let input = StabilizerFrame::from_frame(frame);
        match self.stabilizer.process(input, time_secs, rotation) {
            Some(out) => out.into_frame(frame.timestamp(), frame.rotation()).map(Some),
            None => {
                tracing::trace!(time = time_secs, "Stabilizer not ready");
                Ok(None)
            }
        }
    }
}

/// Stabilization part of the pipeline carry.
///
/// The session exists only while stabilization is enabled and the analysis
/// for the current fingerprint succeeded.
#[derive(Debug, Default)]
pub struct StabilizationState {
    fingerprint: Option<String>,
    session: Option<StabilizationSession>,
}

impl StabilizationState {
    /// Bring the session in line with `config`.
    ///
    /// Does nothing while the fingerprint is unchanged. On a change the old
    /// session is dropped and, if stabilization is enabled with a library
    /// configured, a new one is opened. A failure to open is returned as a
    /// session error; the failing fingerprint is remembered so the same
    /// configuration is not retried on every frame.
    pub fn sync(
        &mut self,
        config: &StabilizationConfig,
        video: &Path,
        backend: &dyn StabilizationBackend,
    ) -> ReefResult<()> {
        let wanted = fingerprint(config);
        if self.fingerprint.as_deref() == Some(wanted.as_str()) {
            return Ok(());
        }

        if let Some(old) = self.session.take() {
            tracing::info!(fingerprint = %old.fingerprint, "Stabilization session closed");
        }
        self.fingerprint = Some(wanted);

        if !config.enabled {
            return Ok(());
        }
        let Some(library) = config.library_path() else {
            tracing::debug!("Stabilization enabled without a library path; skipping");
            return Ok(());
        };

        self.session = Some(StabilizationSession::open(config, video, library, backend)?);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_mut(&mut self) -> Option<&mut StabilizationSession> {
        self.session.as_mut()
    }

    /// Drop the session and forget the fingerprint.
    pub fn reset(&mut self) {
        self.session = None;
        self.fingerprint = None;
    }
}
