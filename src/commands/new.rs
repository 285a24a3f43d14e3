//! # New Command Implementation
//!
//! This module implements the `new` subcommand, which provisions clones on
//! one or more database server instances.
//!
//! ## Functionality
//!
//! - **Latest Image**: `--latest -d DB1 -d DB2` clones the newest image of
//!   each database
//! - **Explicit Image**: `--parent-image D:\images\DB1_2024.vhdx` clones one
//!   registered image
//! - **Per-Pair Isolation**: every instance × database pair succeeds or fails
//!   on its own; the command exits non-zero if any pair failed
//! - **JSON Output**: `--json` prints the created clones and failures

use anyhow::Result;
use clap::Args;
use std::io::IsTerminal;
use std::sync::Arc;

use super::Context;
use dbclone::database::SqlcmdServer;
use dbclone::disk::QemuDiskBackend;
use dbclone::gateway::{Credential, Gateway, HostOperations};
use dbclone::output::{self, emoji};
use dbclone::provision::{ImageSelector, ProvisionRequest, Provisioner};

/// Provision clones from a parent image
#[derive(Args, Debug)]
pub struct NewArgs {
    /// Database server instance to provision on (repeatable)
    #[arg(short = 's', long = "sql-instance", value_name = "INSTANCE", required = true)]
    pub sql_instances: Vec<String>,

    /// Source database whose latest image is cloned (repeatable)
    #[arg(short, long = "database", value_name = "NAME", requires = "latest")]
    pub databases: Vec<String>,

    /// Use the newest registered image of each database
    #[arg(long, conflicts_with = "parent_image")]
    pub latest: bool,

    /// Location of a registered parent image to clone
    #[arg(short, long, value_name = "PATH", required_unless_present = "latest")]
    pub parent_image: Option<String>,

    /// Name of the clone and its database (defaults to the image file name)
    #[arg(short = 'n', long, value_name = "NAME")]
    pub clone_name: Option<String>,

    /// Directory for the clone disk and access path
    #[arg(long, value_name = "DIR")]
    pub destination: Option<String>,

    /// SQL login (Windows/integrated authentication when omitted)
    #[arg(long, value_name = "USER")]
    pub sql_user: Option<String>,

    /// Password for --sql-user; prompted for on a terminal when omitted
    #[arg(long, value_name = "PASSWORD", env = "DBCLONE_SQL_PASSWORD", hide_env_values = true)]
    pub sql_password: Option<String>,

    /// User for remote hosts (defaults to remote.ssh_user)
    #[arg(long, value_name = "USER")]
    pub host_user: Option<String>,

    /// Register the clones as disabled
    #[arg(long)]
    pub disabled: bool,

    /// Replace an existing disk file of the same name
    #[arg(short, long)]
    pub force: bool,

    /// Unmount and delete the disk of a failed clone
    #[arg(long)]
    pub cleanup_on_failure: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

fn sql_credential(args: &NewArgs) -> Result<Option<Credential>> {
    let Some(user) = &args.sql_user else {
        return Ok(None);
    };
    let password = match &args.sql_password {
        Some(password) => Some(password.clone()),
        None if std::io::stdin().is_terminal() => Some(
            dialoguer::Password::new()
                .with_prompt(format!("Password for {}", user))
                .interact()?,
        ),
        None => None,
    };
    Ok(Some(Credential::new(user.clone(), password)))
}

/// Build the library request from command-line arguments.
pub fn build_request(args: &NewArgs) -> Result<ProvisionRequest> {
    let image = match &args.parent_image {
        Some(location) => ImageSelector::Explicit(location.clone()),
        None => ImageSelector::Latest,
    };
    let mut request = ProvisionRequest::new(args.sql_instances.clone(), image);
    request.databases = args.databases.clone();
    request.clone_name = args.clone_name.clone();
    request.destination = args.destination.clone();
    request.sql_credential = sql_credential(args)?;
    request.host_credential = args
        .host_user
        .as_ref()
        .map(|user| Credential::new(user.clone(), None));
    request.disabled = args.disabled;
    request.force = args.force;
    request.cleanup_on_failure = args.cleanup_on_failure;
    Ok(request)
}

/// Execute the `new` command.
pub fn execute(args: NewArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let store = ctx.open_store(&settings)?;
    let request = build_request(&args)?;

    let gateway: Arc<dyn HostOperations> = Arc::new(Gateway::new(&settings.remote));
    let backend = QemuDiskBackend::new(Arc::clone(&gateway));
    let server = SqlcmdServer::new();
    let provisioner = Provisioner::new(
        store.as_ref(),
        gateway.as_ref(),
        &backend,
        &server,
        &settings.clone,
    );

    if !args.json {
        println!(
            "{} Provisioning on {} instance(s)...",
            emoji(&ctx.output, "🔧", "[RUN]"),
            request.sql_instances.len()
        );
    }

    let report = provisioner.provision(&request, &mut rand::thread_rng())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output::report_json(&report))?);
    } else {
        for record in &report.clones {
            println!("{}", output::clone_line(&ctx.output, record));
        }
        for failure in &report.failures {
            eprintln!("{}", output::failure_line(&ctx.output, failure));
        }
        println!(
            "{} created, {} failed",
            report.clones.len(),
            report.failures.len()
        );
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} of {} clone(s) failed",
            report.failures.len(),
            report.failures.len() + report.clones.len()
        ))
    }
}
