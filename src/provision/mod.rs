//! Clone provisioning.
//!
//! ## Overview
//!
//! A request names one or more database server instances and either an
//! explicit parent image or a list of source databases whose latest image
//! should be used. Every instance × subject pair is provisioned on its own
//! through these stages:
//!
//! 1. ResolvingImage - find the parent image in the registry
//! 2. ValidatingTarget - derive names and paths, refuse existing clones
//! 3. CreatingDisk - create the differencing disk next to the parent
//! 4. Mounting - expose the disk at its access path
//! 5. AttachingDatabase - attach the data and log files found on the disk
//! 6. ResolvingHost - map the target's network identity to a Host record
//! 7. CommittingRegistry - record the clone
//!
//! Request validation runs before any stage and rejects the whole request on
//! the first problem with the request itself. After that, a failing pair is
//! recorded in the report and the remaining pairs still run, including when
//! a host could not be reached while validating its destination.

use crate::error::Error;
use crate::gateway::Credential;
use crate::model::CloneRecord;
use serde::Serialize;
use std::fmt;

pub mod naming;
pub mod orchestrator;
pub mod validate;

pub use orchestrator::Provisioner;

/// How the parent image is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSelector {
    /// Use the registered image at this location.
    Explicit(String),
    /// Use the newest image of each requested database.
    Latest,
}

/// A provisioning request.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub sql_instances: Vec<String>,
    /// Source databases; required in `Latest` mode
    pub databases: Vec<String>,
    pub image: ImageSelector,
    /// Name for the clone and its database instead of the image file stem
    pub clone_name: Option<String>,
    /// Directory for disks and access paths instead of the server default
    pub destination: Option<String>,
    pub sql_credential: Option<Credential>,
    pub host_credential: Option<Credential>,
    /// Register the clone as disabled
    pub disabled: bool,
    /// Replace an existing disk file of the same name
    pub force: bool,
    /// Unmount and delete the disk of a failed pair
    pub cleanup_on_failure: bool,
}

impl ProvisionRequest {
    /// Request with default options.
    pub fn new(sql_instances: Vec<String>, image: ImageSelector) -> Self {
        Self {
            sql_instances,
            databases: Vec::new(),
            image,
            clone_name: None,
            destination: None,
            sql_credential: None,
            host_credential: None,
            disabled: false,
            force: false,
            cleanup_on_failure: false,
        }
    }
}

/// Stage of one provisioning pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    ResolvingImage,
    ValidatingTarget,
    CreatingDisk,
    Mounting,
    AttachingDatabase,
    ResolvingHost,
    CommittingRegistry,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolvingImage => "resolving image",
            Stage::ValidatingTarget => "validating target",
            Stage::CreatingDisk => "creating disk",
            Stage::Mounting => "mounting",
            Stage::AttachingDatabase => "attaching database",
            Stage::ResolvingHost => "resolving host",
            Stage::CommittingRegistry => "committing registry",
            Stage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// A pair that did not produce a clone.
#[derive(Debug)]
pub struct ProvisionFailure {
    pub sql_instance: String,
    /// Database name or image location the pair was for
    pub subject: String,
    /// Stage the pair failed in
    pub stage: Stage,
    pub error: Error,
    /// Problems hit while cleaning up after the failure
    pub cleanup_errors: Vec<String>,
}

/// Outcome of a request: clones created and pairs that failed.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub clones: Vec<CloneRecord>,
    pub failures: Vec<ProvisionFailure>,
}

impl ProvisionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}
