// ABOUTME: `botfleet init`: writes a default settings file.
// ABOUTME: Refuses to clobber an existing file unless forced.

use anyhow::{bail, Context, Result};
use botfleet_core::Settings;
use std::path::{Path, PathBuf};

/// Write default settings to `path`, failing if it exists and `force` is false.
pub fn write_default_settings(path: &Path, force: bool) -> Result<Settings> {
    if path.exists() && !force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        );
    }
    let settings = Settings::default();
    settings
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(settings)
}

pub fn run_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let settings = write_default_settings(&path, force)?;

    println!("Wrote {}", path.display());
    println!("  database: {}", settings.database_path().display());
    println!("  socket:   {}", settings.socket_path().display());
    println!("\nStart the daemon with: botfleet serve");
    Ok(())
}
