//! Stabilization backend driving the gyroflow command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use reefshader_common::error::{ReefError, ReefResult};
use reefshader_processing_core::stabilization::{
    AnalysisArtifact, StabilizationBackend, Stabilizer,
};

use crate::ffmpeg::command_exists;

/// Builds analysis projects with `gyroflow --export-project`.
///
/// Frame-by-frame stabilization needs the gyroflow core library loaded
/// in-process, which this build does not link. `check_library` reports that
/// before any analysis runs, and the pipeline continues unstabilized.
#[derive(Debug, Clone)]
pub struct GyroflowCliBackend {
    binary: String,
}

impl GyroflowCliBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Whether this build can open in-process stabilization sessions.
    pub fn session_support(&self) -> ReefResult<()> {
        Err(ReefError::unsupported(
            "in-process stabilization is not available in this build",
        ))
    }

    /// Where gyroflow writes the project for `video`.
    pub fn project_path_for(video: &Path) -> PathBuf {
        video.with_extension("gyroflow")
    }

    fn write_preset(video: &Path, preset: &str) -> ReefResult<PathBuf> {
        let path = video.with_extension("preset.json");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(preset.as_bytes())?;
        Ok(path)
    }
}

impl StabilizationBackend for GyroflowCliBackend {
    fn check_library(&self, library: &Path) -> ReefResult<()> {
        self.session_support().map_err(|e| {
            ReefError::unsupported(format!("{} cannot be used: {e}", library.display()))
        })
    }

    fn create_analysis(&self, video: &Path, preset: Option<&str>) -> ReefResult<AnalysisArtifact> {
        if !command_exists(&self.binary) {
            return Err(ReefError::unsupported(format!(
                "{} not found in PATH; cannot analyse {}",
                self.binary,
                video.display()
            )));
        }

        let mut cmd = Command::new(&self.binary);
        cmd.arg(video).args(["--export-project", "2"]);
        let preset_path = match preset {
            Some(preset) => {
                let path = Self::write_preset(video, preset)?;
                cmd.arg("--preset").arg(&path);
                Some(path)
            }
            None => None,
        };

        tracing::info!(video = %video.display(), "Running gyroflow analysis");
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ReefError::session(format!("Failed to run {}: {e}", self.binary)))?;

        if let Some(path) = preset_path {
            let _ = std::fs::remove_file(path);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReefError::session(format!(
                "gyroflow analysis failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let project_path = Self::project_path_for(video);
        if !project_path.exists() {
            return Err(ReefError::session(format!(
                "gyroflow did not produce {}",
                project_path.display()
            )));
        }
        Ok(AnalysisArtifact { project_path })
    }

    fn open_session(
        &self,
        artifact: &AnalysisArtifact,
        library: &Path,
    ) -> ReefResult<Box<dyn Stabilizer>> {
        tracing::debug!(
            project = %artifact.project_path.display(),
            library = %library.display(),
            "Stabilization session requested"
        );
        Err(ReefError::unsupported(format!(
            "In-process stabilization through {} is not available in this build",
            library.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reefshader_media_model::snapshot::StabilizationConfig;
    use reefshader_processing_core::stabilization::StabilizationState;

    #[test]
    fn test_project_path_sits_next_to_video() {
        assert_eq!(
            GyroflowCliBackend::project_path_for(Path::new("/dives/reef.MP4")),
            PathBuf::from("/dives/reef.gyroflow")
        );
    }

    #[test]
    fn test_missing_binary_is_unsupported() {
        let backend = GyroflowCliBackend::new("reefshader-no-such-gyroflow");
        let err = backend
            .create_analysis(Path::new("/dives/reef.mp4"), None)
            .unwrap_err();
        assert!(matches!(err, ReefError::Unsupported { .. }));
    }

    #[test]
    fn test_library_is_rejected_before_analysis() {
        let backend = GyroflowCliBackend::new("reefshader-no-such-gyroflow");
        let config = StabilizationConfig {
            enabled: true,
            underwater: true,
            library_path: "/opt/gyroflow/libgyroflow_core.so".to_string(),
        };
        let mut state = StabilizationState::default();

        let err = state
            .sync(&config, Path::new("/dives/reef.mp4"), &backend)
            .unwrap_err();
        // The analysis would have failed with "not found in PATH".
        assert!(err.to_string().contains("libgyroflow_core.so cannot be used"));
        assert!(!err.to_string().contains("PATH"));
    }

    #[test]
    fn test_open_session_reports_unavailable_library() {
        let backend = GyroflowCliBackend::new("gyroflow");
        let artifact = AnalysisArtifact {
            project_path: PathBuf::from("/dives/reef.gyroflow"),
        };
        let err = backend
            .open_session(&artifact, Path::new("/opt/gyroflow/libgyroflow_core.so"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("libgyroflow_core.so"));
    }
}
