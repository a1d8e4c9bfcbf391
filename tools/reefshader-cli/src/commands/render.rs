//! Batch-render videos.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use reefshader_common::config::AppConfig;
use reefshader_render_engine::{ExportJob, ExportProgress, ExportStage, Exporter, ProgressCallback};

use super::{collect_videos, load_snapshot};

pub async fn run(
    config: &AppConfig,
    paths: Vec<PathBuf>,
    snapshot_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let snapshot = load_snapshot(snapshot_path.as_deref())?;
    let videos = collect_videos(&paths)?;
    if videos.is_empty() {
        anyhow::bail!("No videos found");
    }

    let jobs: Vec<ExportJob> = videos
        .iter()
        .map(|source| {
            let output_path = match &output_dir {
                Some(dir) => dir.join(source.file_name().map(PathBuf::from).unwrap_or_default()),
                None => config.output_path_for(source),
            };
            ExportJob {
                source: source.clone(),
                output_path,
                snapshot: Arc::clone(&snapshot),
            }
        })
        .collect();

    println!(
        "Rendering {} video(s) as {} at {} Mbps",
        jobs.len(),
        snapshot.encode.codec.display_name(),
        snapshot.encode.bitrate_mbps
    );
    for job in &jobs {
        println!("  {} -> {}", job.source.display(), job.output_path.display());
    }

    let progress: ProgressCallback = Arc::new(|p: ExportProgress| match p.stage {
        ExportStage::Rendering => {
            print!("\r  {}  ", p.summary());
            let _ = std::io::stdout().flush();
        }
        ExportStage::Complete => println!("\r  {}  done", p.summary()),
        _ => {}
    });

    let report = Exporter::with_ffmpeg(config)
        .export_batch(jobs, Some(progress))
        .await;

    println!();
    for path in &report.rendered {
        println!("Rendered: {}", path.display());
    }
    for (source, error) in &report.failed {
        println!("Failed: {} ({error})", source.display());
    }

    if !report.is_success() {
        anyhow::bail!("{} of {} video(s) failed", report.failed.len(), videos.len());
    }
    Ok(())
}
