//! # Hosts Command Implementation
//!
//! Lists the hosts the registry knows about. Hosts are registered
//! automatically the first time a clone is provisioned on them.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;
use dbclone::output;

/// Inspect registered hosts
#[derive(Args, Debug)]
pub struct HostsArgs {
    #[command(subcommand)]
    pub command: HostsCommand,
}

#[derive(Subcommand, Debug)]
pub enum HostsCommand {
    /// List registered hosts
    Ls {
        /// Print host records as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Execute the `hosts` command.
pub fn execute(args: HostsArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let store = ctx.open_store(&settings)?;

    match args.command {
        HostsCommand::Ls { json } => {
            let hosts = store.list_hosts()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
            } else if hosts.is_empty() {
                println!("No hosts registered.");
            } else {
                print!("{}", output::host_table(&hosts));
            }
        }
    }
    Ok(())
}
