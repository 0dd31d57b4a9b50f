//! Path management for Learning Assistant files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/learning-assistant/   # Config directory
//! ├── config.toml                 # Optional configuration file
//! └── store.json                  # Durable key-value store (session, config keys)
//! ```

use std::path::PathBuf;

const APP_DIR_NAME: &str = "learning-assistant";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for la_core::LaError {
    fn from(e: PathError) -> Self {
        la_core::LaError::storage(e.to_string())
    }
}

/// Resolves the well-known file locations.
pub struct LaPaths;

impl LaPaths {
    /// Returns the configuration directory (e.g. `~/.config/learning-assistant/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the optional TOML configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the path to the durable store file.
    pub fn store_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("store.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let config_dir = LaPaths::config_dir().unwrap();
        assert!(config_dir.ends_with(APP_DIR_NAME));
    }

    #[test]
    fn test_files_live_under_config_dir() {
        let config_dir = LaPaths::config_dir().unwrap();

        let store_file = LaPaths::store_file().unwrap();
        assert!(store_file.ends_with("store.json"));
        assert!(store_file.starts_with(&config_dir));

        let config_file = LaPaths::config_file().unwrap();
        assert!(config_file.ends_with("config.toml"));
        assert!(config_file.starts_with(&config_dir));
    }
}
