//! # Error Handling
//!
//! This module defines the centralized error type for `dbclone`. It uses the
//! `thiserror` library to describe every failure mode of the provisioning
//! workflow with enough context to report it per host and database.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum covering registry conflicts, missing records,
//!   collaborator failures (remote execution, disk backend, database attach),
//!   request validation and wrapped library errors.
//!
//! - **`ErrorKind`**: The coarse classification callers use to decide how far a
//!   failure propagates:
//!   - `NotFound`: an image, host or file is absent.
//!   - `Conflict`: a record, database or disk already exists.
//!   - `Unavailable`: connectivity, mount, attach or lock acquisition failed.
//!   - `InvalidRequest`: the request itself is malformed. These abort a whole
//!     invocation before any side effect occurs.
//!   - `Internal`: store corruption, serialization or I/O faults.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.

use thiserror::Error;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unavailable,
    InvalidRequest,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Main error type for dbclone operations
#[derive(Error, Debug)]
pub enum Error {
    /// No image matched the requested location or source database.
    #[error("No image found for {reference}")]
    ImageNotFound { reference: String },

    /// A host referenced by a clone record does not exist in the store.
    #[error("Host not found: {name}")]
    HostNotFound { name: String },

    /// The parent image file is not reachable from the executing host.
    #[error("Parent image not found on {host}: {path}")]
    ParentNotFound { host: String, path: String },

    /// A host with the same name is already registered.
    #[error("Host already registered: {name}")]
    DuplicateHost { name: String },

    /// An image with the same location is already registered.
    #[error("Image already registered: {location}")]
    DuplicateImage { location: String },

    /// A clone record already exists for this database or disk location.
    #[error("Clone already registered for {sql_instance}/{database} at {location}")]
    DuplicateClone {
        sql_instance: String,
        database: String,
        location: String,
    },

    /// The target server already lists a database with this name.
    #[error("Database {database} already exists on {sql_instance}")]
    DatabaseAlreadyExists {
        sql_instance: String,
        database: String,
    },

    /// A clone disk with the derived name already exists at the destination.
    #[error("Clone disk already exists: {path}")]
    CloneAlreadyExists { path: String },

    /// The disk manager refused to overwrite an existing disk.
    #[error("Disk already exists: {path}")]
    DiskAlreadyExists { path: String },

    /// The access directory could not be created on the target host.
    #[error("Access path unavailable: {path} - {message}")]
    AccessPathUnavailable { path: String, message: String },

    /// The disk backend failed to create a child image.
    #[error("Disk creation failed for {path}: {message}")]
    DiskCreateFailed { path: String, message: String },

    /// The disk backend failed to mount an image.
    #[error("Mount failed for {path}: {message}")]
    MountFailed { path: String, message: String },

    /// The database server refused to attach the clone's files.
    #[error("Attach of {database} on {sql_instance} failed: {message}")]
    AttachFailed {
        sql_instance: String,
        database: String,
        message: String,
    },

    /// A database server could not be queried.
    #[error("Database server {sql_instance} unavailable: {message}")]
    ServerUnavailable {
        sql_instance: String,
        message: String,
    },

    /// The connectivity probe for a remote host failed.
    #[error("Cannot connect to host {host}")]
    Connectivity { host: String },

    /// A command run through the execution gateway failed.
    #[error("Command failed on {host}: {command} - {stderr}")]
    Execution {
        host: String,
        command: String,
        stderr: String,
    },

    /// An exclusive store lock could not be acquired in time.
    #[error("Store busy: timed out waiting for lock {path}")]
    StoreBusy { path: String },

    /// The request is malformed; nothing has been changed.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The settings file is malformed.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The store content is inconsistent or unreadable.
    #[error("Store error: {message}")]
    Store { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A SQLite error, wrapped from `rusqlite::Error`.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ImageNotFound { .. }
            | Error::HostNotFound { .. }
            | Error::ParentNotFound { .. } => ErrorKind::NotFound,

            Error::DuplicateHost { .. }
            | Error::DuplicateImage { .. }
            | Error::DuplicateClone { .. }
            | Error::DatabaseAlreadyExists { .. }
            | Error::CloneAlreadyExists { .. }
            | Error::DiskAlreadyExists { .. } => ErrorKind::Conflict,

            Error::AccessPathUnavailable { .. }
            | Error::DiskCreateFailed { .. }
            | Error::MountFailed { .. }
            | Error::AttachFailed { .. }
            | Error::ServerUnavailable { .. }
            | Error::Connectivity { .. }
            | Error::Execution { .. }
            | Error::StoreBusy { .. } => ErrorKind::Unavailable,

            Error::InvalidRequest { .. } | Error::Config { .. } => ErrorKind::InvalidRequest,

            Error::Store { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::Yaml(_)
            | Error::Sqlite(_)
            | Error::Glob(_)
            | Error::LockPoisoned { .. } => ErrorKind::Internal,
        }
    }

    /// Shorthand for building an `InvalidRequest` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
