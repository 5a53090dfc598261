//! Persistent settings for the command-line tool.
//!
//! Stored as TOML at `<config dir>/simidge/config.toml`; the directory can be
//! overridden with `SIMIDGE_CONFIG_DIR`. A missing file is created with
//! defaults on first load.

use crate::error::{DbpfError, Result};
use crate::registry::is_package;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the settings directory.
pub const CONFIG_DIR_ENV: &str = "SIMIDGE_CONFIG_DIR";

/// File name of the settings file.
pub const CONFIG_FILE: &str = "config.toml";

/// Locations the tool searches by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paths {
    /// Directory of downloaded mods.
    pub downloads: PathBuf,
    /// The game's `objects.package`.
    pub objects: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        Self {
            downloads: home.join("Documents/EA Games/The Sims\u{2122} 2 Ultimate Collection/Downloads"),
            objects: PathBuf::from(
                "C:/Program Files (x86)/Origin Games/The Sims 2 Ultimate Collection/Fun with Pets/SP9/TSData/Res/Objects/objects.package",
            ),
        }
    }
}

/// All persisted settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Search locations.
    #[serde(default)]
    pub paths: Paths,
}

impl Settings {
    /// Returns the default settings file location, if one can be determined.
    pub fn default_path() -> Option<PathBuf> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()?.join("simidge"),
        };
        Some(dir.join(CONFIG_FILE))
    }

    /// Reads settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableFile` if the file cannot be read and
    /// `InvalidConfig` if it is not valid settings TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DbpfError::unreadable(path, e))?;
        let settings = toml::from_str(&text)
            .map_err(|e| DbpfError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Reads settings from `path`, writing defaults there first if it does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns the [`load`](Self::load) and [`save`](Self::save) errors.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let settings = Self::default();
        settings.save(path)?;
        info!(path = %path.display(), "Created default settings");
        Ok(settings)
    }

    /// Writes settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableFile` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DbpfError::unreadable(parent, e))?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| DbpfError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| DbpfError::unreadable(path, e))
    }

    /// Checks that the downloads path is a directory and the objects path
    /// is an existing `.package` file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first bad path.
    pub fn validate(&self) -> Result<()> {
        if !self.paths.downloads.is_dir() {
            return Err(DbpfError::InvalidConfig(format!(
                "Not a valid downloads directory: {}",
                self.paths.downloads.display()
            )));
        }
        if !self.paths.objects.is_file() || !is_package(&self.paths.objects) {
            return Err(DbpfError::InvalidConfig(format!(
                "Not a valid objects.package: {}",
                self.paths.objects.display()
            )));
        }
        Ok(())
    }
}
