pub mod check;
pub mod info;
pub mod init_config;
pub mod preview;
pub mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reefshader_media_model::media::{discover_videos, is_video_file};
use reefshader_media_model::snapshot::ConfigSnapshot;

/// Load a snapshot file, or the defaults when none is given.
pub fn load_snapshot(path: Option<&Path>) -> anyhow::Result<Arc<ConfigSnapshot>> {
    let snapshot = match path {
        Some(path) => ConfigSnapshot::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?,
        None => ConfigSnapshot::default(),
    };
    snapshot.validate()?;
    Ok(Arc::new(snapshot))
}

/// Expand directories into the videos they contain.
pub fn collect_videos(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for path in paths {
        if path.is_dir() {
            videos.extend(discover_videos(path)?);
        } else if is_video_file(path) {
            videos.push(path.clone());
        } else {
            tracing::warn!(path = %path.display(), "Skipping non-video path");
        }
    }
    Ok(videos)
}
