//! # Metadata Store
//!
//! The registry of hosts, images and clones. Two interchangeable backends
//! implement the [`MetadataStore`] contract:
//!
//! - **`SqliteStore`** (`store::sqlite`): a relational store. Identifier
//!   allocation and duplicate checks run inside one `IMMEDIATE` transaction,
//!   and identifiers are assigned by the database (`INTEGER PRIMARY KEY`
//!   yields the current maximum plus one).
//! - **`FileStore`** (`store::file`): one JSON document per record type in a
//!   directory. Each allocate-and-append step holds an exclusive lock file
//!   for the document being written and replaces the document atomically.
//!
//! Both backends return identical results for identical call sequences:
//! identifiers start at 1 and grow by one, host names are unique ignoring
//! case, and a clone is rejected with `DuplicateClone` when its
//! `(SqlInstance, DatabaseName)` pair or its `(HostID, CloneLocation)` pair is
//! already registered.

use crate::config::{StoreBackend, StoreSettings};
use crate::error::Result;
use crate::model::{CloneFilter, CloneRecord, Host, Image, NewClone, NewImage};
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

pub mod file;
pub mod lock;
pub mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

/// Registry contract shared by every backend.
pub trait MetadataStore: Send + Sync {
    /// Create the schema or documents if they do not exist yet. Idempotent.
    fn initialize(&self) -> Result<()>;

    /// Look up a host by name, ignoring case.
    fn resolve_host_by_name(&self, name: &str) -> Result<Option<Host>>;

    /// Register a host, allocating the next HostID.
    ///
    /// Fails with `DuplicateHost` if the name already resolves.
    fn create_host(&self, host_name: &str, ip_address: &str, fqdn: &str) -> Result<Host>;

    /// All registered hosts ordered by HostID.
    fn list_hosts(&self) -> Result<Vec<Host>>;

    /// Record an image built elsewhere, allocating the next ImageID.
    ///
    /// Fails with `DuplicateImage` if the location is already registered.
    fn register_image(&self, image: &NewImage) -> Result<Image>;

    /// Look up an image by its exact location.
    fn find_image_by_location(&self, location: &str) -> Result<Option<Image>>;

    /// The image with the greatest CreatedOn among those taken from
    /// `database_name`. Ties go to the higher ImageID.
    fn latest_image_for_database(&self, database_name: &str) -> Result<Option<Image>>;

    /// Images ordered by ImageID, optionally restricted to one source database.
    fn list_images(&self, database_name: Option<&str>) -> Result<Vec<Image>>;

    /// Clones matching `filter`, ordered by CloneID.
    fn list_clones(&self, filter: &CloneFilter) -> Result<Vec<CloneRecord>>;

    /// Register a clone, allocating the next CloneID.
    ///
    /// Fails with `ImageNotFound` / `HostNotFound` for dangling references and
    /// with `DuplicateClone` when the database or disk is already registered.
    /// A database is identified by (SqlInstance, DatabaseName) and a disk by
    /// (HostID, CloneLocation): the same local path on two hosts names two
    /// different disks.
    fn create_clone(&self, clone: &NewClone) -> Result<CloneRecord>;
}

/// Open the backend selected in `settings`.
pub fn open_store(settings: &StoreSettings) -> Result<Box<dyn MetadataStore>> {
    let path = settings.resolved_path();
    let lock_timeout = Duration::from_millis(settings.lock_timeout_ms);
    log::debug!("Opening {:?} store at {}", settings.backend, path.display());

    let store: Box<dyn MetadataStore> = match settings.backend {
        StoreBackend::Sqlite => Box::new(SqliteStore::open(&path, lock_timeout)?),
        StoreBackend::File => Box::new(FileStore::with_lock_settings(
            &path,
            lock_timeout,
            Duration::from_secs(settings.stale_lock_secs),
        )),
    };
    Ok(store)
}

/// Fixed-width UTC timestamp, so that text ordering equals time ordering.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| crate::error::Error::Store {
            message: format!("invalid timestamp '{}': {}", text, e),
        })
}
