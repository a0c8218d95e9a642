//! Engine configuration file (`config.toml`).
//!
//! Looked up at an explicit path or in the platform config directory
//! (`~/.config/cellflow/config.toml` on Linux). A missing default file means
//! built-in defaults; a missing explicit file is an error.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{CellflowError, Result};
use cellflow_engine::EngineConfig;

const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576; // 1 MiB

/// Default location of the user's config file.
pub fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "cellflow")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

/// Load the engine config from `explicit`, or from the user config path.
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match user_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(EngineConfig::default()),
        },
    };

    let meta = std::fs::metadata(&path)?;
    if meta.len() > MAX_CONFIG_FILE_BYTES {
        return Err(CellflowError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Refusing to read {}: config file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_CONFIG_FILE_BYTES
            ),
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content).map_err(|message| CellflowError::Config {
        path: path.clone(),
        message,
    })?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Parse config TOML. Unknown keys are rejected.
pub fn parse_config(content: &str) -> std::result::Result<EngineConfig, String> {
    toml::from_str::<EngineConfig>(content).map_err(|e| e.to_string())
}
