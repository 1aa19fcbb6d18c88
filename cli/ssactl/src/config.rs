//! CLI file locations.

use std::path::PathBuf;

use anyhow::Result;
use directories::ProjectDirs;

/// Provider data file name in the config directory.
const PROVIDER_DATA_FILE: &str = "providers.toml";

/// Get the config directory path.
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "ssa", "ssactl")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Default provider data document, in the config directory.
pub fn default_provider_data() -> Result<PathBuf> {
    Ok(config_dir()?.join(PROVIDER_DATA_FILE))
}
