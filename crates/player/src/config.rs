use std::path::{Path, PathBuf};

use stepcast_runtime_config::{CONFIG_FILE_NAME, StepcastConfig};
use tracing::debug;

use crate::error::Result;

/// `stepcast.toml` inside `dir`.
pub fn config_path_in(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load the player config.
///
/// An explicit path must exist. Without one, `stepcast.toml` in the working
/// directory is used when present, and defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<StepcastConfig> {
    match path {
        Some(path) => Ok(StepcastConfig::load(path)?),
        None => {
            let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            load_config_from_dir(&dir)
        }
    }
}

/// Load `stepcast.toml` from `dir`, falling back to defaults when absent.
pub fn load_config_from_dir(dir: &Path) -> Result<StepcastConfig> {
    let path = config_path_in(dir);
    if !path.exists() {
        debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, dir.display());
        return Ok(StepcastConfig::default());
    }
    Ok(StepcastConfig::load(&path)?)
}
