//! Show stream information.

use std::path::PathBuf;

use reefshader_common::clock::format_position;
use reefshader_common::config::AppConfig;
use reefshader_render_engine::probe_video;

pub fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let info = probe_video(&config.tools.ffprobe, &path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;

    println!("Video: {}", path.display());
    println!("{}", info.summary());
    println!(
        "  Last frame at: {}",
        format_position(info.last_frame_time(), Some(info.duration))
    );
    if !info.rotation.is_upright() {
        println!(
            "  Note: stabilization is unavailable for rotated video ({} degrees)",
            info.rotation.degrees()
        );
    }

    Ok(())
}
