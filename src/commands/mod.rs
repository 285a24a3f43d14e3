//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the `dbclone`
//! command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and the shared
//!   [`Context`] and performs the command's logic by calling into the
//!   `dbclone` library.

use anyhow::{Context as _, Result};
use std::path::PathBuf;

use dbclone::config::Settings;
use dbclone::output::OutputConfig;
use dbclone::store::{self, MetadataStore};

pub mod completions;
pub mod hosts;
pub mod images;
pub mod init;
pub mod ls;
pub mod new;

/// State shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings_path: PathBuf,
    pub output: OutputConfig,
}

impl Context {
    /// Settings from the settings file with environment overrides applied.
    pub fn settings(&self) -> Result<Settings> {
        Settings::load_with_env(&self.settings_path).with_context(|| {
            format!(
                "Failed to load settings from {}",
                self.settings_path.display()
            )
        })
    }

    /// Open and initialize the configured store.
    pub fn open_store(&self, settings: &Settings) -> Result<Box<dyn MetadataStore>> {
        let store = store::open_store(&settings.store).with_context(|| {
            format!(
                "Failed to open store at {}",
                settings.store.resolved_path().display()
            )
        })?;
        store.initialize()?;
        Ok(store)
    }
}
