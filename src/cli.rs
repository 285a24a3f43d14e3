//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, Context};
use dbclone::output::OutputConfig;

/// dbclone - Provision database clones from parent disk images
#[derive(Parser, Debug)]
#[command(name = "dbclone")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE", env = "DBCLONE_CONFIG")]
    config: Option<PathBuf>,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision clones on one or more database server instances
    New(commands::new::NewArgs),

    /// List registered clones
    Ls(commands::ls::LsArgs),

    /// Register and list parent images
    Images(commands::images::ImagesArgs),

    /// List registered hosts
    Hosts(commands::hosts::HostsArgs),

    /// Write a settings file and initialize the store
    Init(commands::init::InitArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        let ctx = Context {
            settings_path: self
                .config
                .unwrap_or_else(dbclone::config::default_settings_path),
            output: OutputConfig::from_env_and_flag(&self.color),
        };

        match self.command {
            Commands::New(args) => commands::new::execute(args, &ctx),
            Commands::Ls(args) => commands::ls::execute(args, &ctx),
            Commands::Images(args) => commands::images::execute(args, &ctx),
            Commands::Hosts(args) => commands::hosts::execute(args, &ctx),
            Commands::Init(args) => commands::init::execute(args, &ctx),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // Already initialized when embedded in tests.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .try_init();
}
