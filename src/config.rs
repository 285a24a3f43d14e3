//! # Settings
//!
//! This module defines the `dbclone` settings file and how it is located and
//! parsed. Settings are stored as YAML, default to sensible values when the
//! file is missing, and can be partially overridden through environment
//! variables.
//!
//! ## Example
//!
//! ```yaml
//! store:
//!   backend: sqlite
//!   path: /var/lib/dbclone/registry.db
//! clone:
//!   subdirectory: clone
//! remote:
//!   ssh_user: provisioner
//! ```
//!
//! ## Environment
//!
//! - `DBCLONE_STORE_BACKEND` overrides `store.backend` (`sqlite` or `file`).
//! - `DBCLONE_STORE_PATH` overrides `store.path`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the store backend.
pub const ENV_STORE_BACKEND: &str = "DBCLONE_STORE_BACKEND";
/// Environment variable overriding the store location.
pub const ENV_STORE_PATH: &str = "DBCLONE_STORE_PATH";

/// Which metadata store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Relational store in a SQLite database file
    Sqlite,
    /// JSON documents in a directory
    #[default]
    File,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" => Ok(StoreBackend::Sqlite),
            "file" | "json" => Ok(StoreBackend::File),
            other => Err(Error::Config {
                message: format!("unknown store backend '{}' (expected sqlite or file)", other),
            }),
        }
    }
}

/// Metadata store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// SQLite database file, or directory holding the JSON documents
    pub path: Option<PathBuf>,
    /// How long a writer waits for the document lock
    pub lock_timeout_ms: u64,
    /// Age after which an abandoned lock file is broken
    pub stale_lock_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            lock_timeout_ms: 10_000,
            stale_lock_secs: 300,
        }
    }
}

impl StoreSettings {
    /// Store location, falling back to the user data directory.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".dbclone"))
            .join("dbclone");
        match self.backend {
            StoreBackend::Sqlite => base.join("store.db"),
            StoreBackend::File => base.join("store"),
        }
    }
}

/// Clone naming and layout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneSettings {
    /// Directory appended to the server's default data directory when no
    /// destination is given
    pub subdirectory: String,
    /// File patterns treated as database files inside a mounted clone
    pub data_file_patterns: Vec<String>,
    /// Length of the random suffix appended to generated access folders
    pub suffix_length: usize,
}

impl Default for CloneSettings {
    fn default() -> Self {
        Self {
            subdirectory: "clone".to_string(),
            data_file_patterns: vec![
                "*.mdf".to_string(),
                "*.ndf".to_string(),
                "*.ldf".to_string(),
            ],
            suffix_length: 5,
        }
    }
}

/// Remote execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub ssh_user: Option<String>,
    pub ssh_port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            ssh_user: None,
            ssh_port: 22,
            connect_timeout_secs: 10,
        }
    }
}

/// Complete settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub clone: CloneSettings,
    pub remote: RemoteSettings,
}

impl Settings {
    /// Parse settings from YAML.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load settings and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut settings = Self::load(path)?;
        settings.apply_env()?;
        Ok(settings)
    }

    /// Apply `DBCLONE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var(ENV_STORE_BACKEND) {
            self.store.backend = backend.parse()?;
        }
        if let Ok(path) = std::env::var(ENV_STORE_PATH) {
            if !path.is_empty() {
                self.store.path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    /// Write settings as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.clone.subdirectory.trim().is_empty() {
            return Err(Error::Config {
                message: "clone.subdirectory must not be empty".to_string(),
            });
        }
        if self.clone.data_file_patterns.is_empty() {
            return Err(Error::Config {
                message: "clone.data_file_patterns must list at least one pattern".to_string(),
            });
        }
        for pattern in &self.clone.data_file_patterns {
            glob::Pattern::new(pattern)?;
        }
        Ok(())
    }
}

/// Default settings file location.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".dbclone"))
        .join("dbclone")
        .join("config.yaml")
}
