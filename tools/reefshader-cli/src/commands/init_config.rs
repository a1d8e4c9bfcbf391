//! Write a default stage settings file.

use std::path::PathBuf;

use reefshader_media_model::snapshot::ConfigSnapshot;

pub fn run(path: PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let snapshot = ConfigSnapshot::default();
    snapshot.save(&path)?;

    println!("Wrote default settings to {}", path.display());
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
