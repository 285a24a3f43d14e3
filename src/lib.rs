//! # dbclone
//!
//! This library provisions writable database clones from read-only parent
//! disk images and keeps a registry of the hosts, images and clones involved.
//! It is designed to be used by the `dbclone` command-line tool but can also
//! be embedded by automation that provisions clones itself.
//!
//! ## Quick Example
//!
//! ```
//! use dbclone::model::NewImage;
//! use dbclone::store::{MetadataStore, SqliteStore};
//! use chrono::Utc;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let image = store
//!     .register_image(&NewImage {
//!         image_name: "DB1_2024".to_string(),
//!         image_location: "D:\\images\\DB1_2024.vhdx".to_string(),
//!         size_mb: 10240,
//!         database_name: "DB1".to_string(),
//!         database_timestamp: None,
//!         created_on: Utc::now(),
//!     })
//!     .unwrap();
//!
//! let latest = store.latest_image_for_database("DB1").unwrap();
//! assert_eq!(latest.map(|i| i.image_id), Some(image.image_id));
//! ```
//!
//! ## Core Concepts
//!
//! - **Registry (`model`, `store`)**: Host, Image and Clone records behind the
//!   `MetadataStore` trait, with a SQLite backend and a flat JSON document
//!   backend that behave identically.
//! - **Identity (`identity`)**: Maps a machine's network identity to its Host
//!   record, registering new hosts on first sight.
//! - **Execution (`gateway`)**: Runs commands and file operations on the
//!   local machine or on remote hosts over `ssh`.
//! - **Disks (`disk`)**: Creates and mounts differencing disks whose parent is
//!   a registered image.
//! - **Databases (`database`)**: Queries database servers and attaches a
//!   clone's files.
//! - **Provisioning (`provision`)**: Validates requests and drives every
//!   instance × database pair through the stages above, isolating failures
//!   per pair.
//!
//! ## Execution Flow
//!
//! For each pair, `provision::Provisioner` resolves the parent image,
//! derives the clone name and paths, creates and mounts the disk, attaches
//! the database, resolves the host and finally records the clone.

pub mod config;
pub mod database;
pub mod disk;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod model;
pub mod output;
pub mod path;
pub mod provision;
pub mod store;

#[cfg(test)]
mod path_proptest;
