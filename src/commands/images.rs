//! # Images Command Implementation
//!
//! This module implements the `images` subcommand, which registers parent
//! images produced by an external imaging job and lists the registered ones.
//!
//! Registering records metadata only; the image file itself is never
//! modified. When the image is reachable from this machine its size is read
//! from the file unless `--size-mb` is given.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use std::path::Path;

use super::Context;
use dbclone::model::NewImage;
use dbclone::output::{self, emoji};
use dbclone::path;

/// Register and list parent images
#[derive(Args, Debug)]
pub struct ImagesArgs {
    #[command(subcommand)]
    pub command: ImagesCommand,
}

#[derive(Subcommand, Debug)]
pub enum ImagesCommand {
    /// Register an existing parent image
    Add(AddImageArgs),

    /// List registered images
    Ls {
        /// Only images of this source database
        #[arg(short, long, value_name = "NAME")]
        database: Option<String>,

        /// Print image records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct AddImageArgs {
    /// Location of the image file as seen by database hosts
    #[arg(value_name = "LOCATION")]
    pub location: String,

    /// Source database the image holds
    #[arg(short, long, value_name = "NAME")]
    pub database: String,

    /// Image name (defaults to the file name without extension)
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Image size in megabytes
    #[arg(long, value_name = "MB")]
    pub size_mb: Option<u64>,

    /// When the image was created, RFC 3339 (defaults to now)
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub created_on: Option<DateTime<Utc>>,

    /// Point in time of the database contents, RFC 3339
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub database_timestamp: Option<DateTime<Utc>>,
}

fn parse_time(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time '{}': {}", value, e))
}

/// Build the image record to register.
pub fn new_image(args: &AddImageArgs) -> NewImage {
    let size_mb = args.size_mb.unwrap_or_else(|| {
        std::fs::metadata(Path::new(&args.location))
            .map(|m| m.len() / (1024 * 1024))
            .unwrap_or(0)
    });
    NewImage {
        image_name: args
            .name
            .clone()
            .unwrap_or_else(|| path::file_stem(&args.location).to_string()),
        image_location: args.location.clone(),
        size_mb,
        database_name: args.database.clone(),
        database_timestamp: args.database_timestamp,
        created_on: args.created_on.unwrap_or_else(Utc::now),
    }
}

/// Execute the `images` command.
pub fn execute(args: ImagesArgs, ctx: &Context) -> Result<()> {
    let settings = ctx.settings()?;
    let store = ctx.open_store(&settings)?;

    match args.command {
        ImagesCommand::Add(add) => {
            let image = store
                .register_image(&new_image(&add))
                .with_context(|| format!("Failed to register {}", add.location))?;
            println!(
                "{} Registered image {} ({}) for {}",
                emoji(&ctx.output, "✅", "[OK]"),
                image.image_id,
                image.image_name,
                image.database_name
            );
        }
        ImagesCommand::Ls { database, json } => {
            let images = store.list_images(database.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&images)?);
            } else if images.is_empty() {
                println!("No images registered.");
            } else {
                print!("{}", output::image_table(&images));
            }
        }
    }
    Ok(())
}
