//! # Init Command Implementation
//!
//! This module implements the `init` subcommand, which writes a settings file
//! and creates an empty store at the configured location.
//!
//! ## Functionality
//!
//! - **Flags**: `--backend`, `--store-path` and `--ssh-user` set the main options
//! - **Interactive**: `--interactive` prompts for the same options
//! - **Force Mode**: overwrites an existing settings file when specified

use anyhow::Result;
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use std::path::PathBuf;

use super::Context;
use dbclone::config::{Settings, StoreBackend};
use dbclone::output::emoji;

/// Write a settings file and initialize the store
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Store backend: sqlite or file
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend)]
    pub backend: Option<StoreBackend>,

    /// SQLite database file or JSON document directory
    #[arg(long, value_name = "PATH")]
    pub store_path: Option<PathBuf>,

    /// Default user for remote hosts
    #[arg(long, value_name = "USER")]
    pub ssh_user: Option<String>,

    /// Prompt for each setting
    #[arg(short, long)]
    pub interactive: bool,

    /// Overwrite an existing settings file
    #[arg(short, long)]
    pub force: bool,
}

fn parse_backend(value: &str) -> std::result::Result<StoreBackend, String> {
    value.parse().map_err(|e: dbclone::error::Error| e.to_string())
}

/// Settings produced by the given flags on top of defaults.
pub fn settings_from_args(args: &InitArgs) -> Settings {
    let mut settings = Settings::default();
    if let Some(backend) = args.backend {
        settings.store.backend = backend;
    }
    settings.store.path = args.store_path.clone();
    settings.remote.ssh_user = args.ssh_user.clone();
    settings
}

fn prompt_settings(mut settings: Settings) -> Result<Settings> {
    let theme = ColorfulTheme::default();

    let backends = ["file", "sqlite"];
    let default = match settings.store.backend {
        StoreBackend::File => 0,
        StoreBackend::Sqlite => 1,
    };
    let choice = Select::with_theme(&theme)
        .with_prompt("Store backend")
        .items(&backends)
        .default(default)
        .interact()?;
    settings.store.backend = backends[choice].parse()?;

    let path: String = Input::with_theme(&theme)
        .with_prompt("Store location")
        .default(settings.store.resolved_path().display().to_string())
        .interact_text()?;
    settings.store.path = Some(PathBuf::from(path));

    let user: String = Input::with_theme(&theme)
        .with_prompt("Remote user (leave empty for the ssh default)")
        .allow_empty(true)
        .default(settings.remote.ssh_user.clone().unwrap_or_default())
        .interact_text()?;
    settings.remote.ssh_user = (!user.trim().is_empty()).then(|| user.trim().to_string());

    Ok(settings)
}

/// Execute the `init` command.
pub fn execute(args: InitArgs, ctx: &Context) -> Result<()> {
    let path = &ctx.settings_path;
    if path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Settings file '{}' already exists. Use --force to overwrite.",
            path.display()
        ));
    }

    let mut settings = settings_from_args(&args);
    if args.interactive {
        settings = prompt_settings(settings)?;
    }
    settings.apply_env()?;

    settings.save(path)?;
    println!(
        "{} Wrote {}",
        emoji(&ctx.output, "✅", "[OK]"),
        path.display()
    );

    ctx.open_store(&settings)?;
    println!(
        "{} Store ready at {}",
        emoji(&ctx.output, "✅", "[OK]"),
        settings.store.resolved_path().display()
    );
    Ok(())
}
