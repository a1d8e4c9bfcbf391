//! Check external tool availability.

use reefshader_common::config::AppConfig;
use reefshader_render_engine::{command_exists, GyroflowCliBackend};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("ReefShader System Check");
    println!("{}", "=".repeat(50));

    let tools = [
        (config.tools.ffmpeg.as_str(), "decoding and encoding", true),
        (config.tools.ffprobe.as_str(), "stream information", true),
        (config.tools.gyroflow.as_str(), "stabilization analysis", false),
    ];

    let mut all_required_ok = true;
    for (binary, purpose, required) in tools {
        let found = command_exists(binary);
        let tag = match (found, required) {
            (true, _) => "[OK]  ",
            (false, true) => "[FAIL]",
            (false, false) => "[WARN]",
        };
        println!("{tag} {binary} ({purpose})");
        all_required_ok &= found || !required;
    }

    if let Err(e) = GyroflowCliBackend::new(config.tools.gyroflow.clone()).session_support() {
        println!("[WARN] stabilization sessions: {e}");
        println!("       Frames render unstabilized even when stabilization is enabled.");
    }

    println!();
    println!(
        "Config file: {}",
        reefshader_common::config::config_file_path().display()
    );
    println!(
        "Output folder: <video dir>/{}",
        config.output_subdir.display()
    );

    println!();
    if all_required_ok {
        println!("All required tools are available. ReefShader is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg or set tools in the config file.");
    }

    Ok(())
}
