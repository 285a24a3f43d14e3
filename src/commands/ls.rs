//! # Ls Command Implementation
//!
//! This module implements the `ls` subcommand, which lists registered clones.
//!
//! ## Functionality
//!
//! - **Filtering**: by host, instance, database, image and enabled state
//! - **Output**: an aligned table, a bare count, or JSON records
//!
//! This command is a read-only operation against the store.

use anyhow::Result;
use clap::Args;

use super::Context;
use dbclone::model::CloneFilter;
use dbclone::output;

/// List registered clones
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Only clones on this host
    #[arg(long, value_name = "NAME")]
    pub host: Option<String>,

    /// Only clones attached to this instance
    #[arg(short = 's', long, value_name = "INSTANCE")]
    pub sql_instance: Option<String>,

    /// Only clones with this database name
    #[arg(short, long, value_name = "NAME")]
    pub database: Option<String>,

    /// Only clones of this image
    #[arg(long, value_name = "ID")]
    pub image_id: Option<i64>,

    /// Only enabled clones
    #[arg(long)]
    pub enabled: bool,

    /// Show only the number of matching clones
    #[arg(long, conflicts_with = "json")]
    pub count: bool,

    /// Print clone records as JSON
    #[arg(long)]
    pub json: bool,
}

impl LsArgs {
    fn filter(&self) -> CloneFilter {
        CloneFilter {
            host_name: self.host.clone(),
            sql_instance: self.sql_instance.clone(),
            database_name: self.database.clone(),
            image_id: self.image_id,
            enabled_only: self.enabled,
        }
    }
}

/// Execute the `ls` command.
pub fn execute(args: LsArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let store = ctx.open_store(&settings)?;
    let clones = store.list_clones(&args.filter())?;

    if args.count {
        println!("{}", clones.len());
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&clones)?);
        return Ok(());
    }

    if clones.is_empty() {
        println!("No clones registered.");
        return Ok(());
    }

    print!("{}", output::clone_table(&clones));
    println!();
    println!("{} clone(s)", clones.len());
    Ok(())
}
