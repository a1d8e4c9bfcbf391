//! ReefShader CLI: inspect, preview, and batch-render underwater footage.
//!
//! Usage:
//!   reefshader check                     Check for ffmpeg, ffprobe and gyroflow
//!   reefshader info <PATH>               Show stream information
//!   reefshader init-config <FILE>        Write a default settings file
//!   reefshader render <PATHS>...         Render videos into the output folder
//!   reefshader preview <PATH>            Play a video through the preview path

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reefshader_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "reefshader",
    about = "Colour correction and stabilization for underwater video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Application config file (defaults to the user config location)
    #[arg(long, global = true)]
    app_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the external media tools are installed
    Check,

    /// Show stream information for a video
    Info {
        /// Path to the video file
        path: PathBuf,
    },

    /// Write a settings file with default stage values
    InitConfig {
        /// Destination file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Render videos (or every video in a directory)
    Render {
        /// Video files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Stage settings file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory (defaults to <video dir>/<output subdir>)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Play a video through the preview pipeline without a display
    Preview {
        /// Path to the video file
        path: PathBuf,

        /// Stage settings file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seek targets in seconds, applied in order
        #[arg(long, value_delimiter = ',')]
        seek: Vec<f64>,

        /// Seek targets as frame numbers, applied after `--seek`
        #[arg(long, value_delimiter = ',')]
        seek_frame: Vec<u64>,

        /// Play for this many seconds after loading and seeking
        #[arg(long, default_value = "0")]
        play_secs: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app_config = match &cli.app_config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = app_config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    reefshader_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Check => commands::check::run(&app_config),
        Commands::Info { path } => commands::info::run(&app_config, path),
        Commands::InitConfig { path, force } => commands::init_config::run(path, force),
        Commands::Render {
            paths,
            config,
            output_dir,
        } => commands::render::run(&app_config, paths, config, output_dir).await,
        Commands::Preview {
            path,
            config,
            seek,
            seek_frame,
            play_secs,
        } => commands::preview::run(&app_config, path, config, seek, seek_frame, play_secs).await,
    }
}
