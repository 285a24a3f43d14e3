//! Request validation.
//!
//! Everything here runs before the first side effect. Any problem with the
//! request itself rejects the whole request with `InvalidRequest`. A host
//! that cannot be reached only affects its own pairs.

use super::{ImageSelector, ProvisionRequest};
use crate::database::instance_host;
use crate::error::{Error, ErrorKind, Result};
use crate::gateway::{HostOperations, Target};
use crate::path;

/// One database server instance a request provisions on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePlan {
    pub sql_instance: String,
    /// Host the instance runs on
    pub target: Target,
    /// Local destination on that host, if the request gave one. Stays a
    /// network path when the host could not be asked where the share lives.
    pub destination: Option<String>,
}

/// What a single pair clones from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// A registered image location
    Image(String),
    /// The newest image of a source database
    Database(String),
}

impl Subject {
    pub fn label(&self) -> &str {
        match self {
            Subject::Image(location) => location,
            Subject::Database(name) => name,
        }
    }
}

/// Validated request: instances to visit and subjects to clone on each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub instances: Vec<InstancePlan>,
    pub subjects: Vec<Subject>,
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn subjects(request: &ProvisionRequest) -> Result<Vec<Subject>> {
    if request.databases.iter().any(|db| blank(db)) {
        return Err(Error::invalid("database names must not be empty"));
    }
    match &request.image {
        ImageSelector::Explicit(location) => {
            if blank(location) {
                return Err(Error::invalid("parent image location must not be empty"));
            }
            if !request.databases.is_empty() {
                return Err(Error::invalid(
                    "an explicit parent image cannot be combined with a database list",
                ));
            }
            Ok(vec![Subject::Image(location.trim().to_string())])
        }
        ImageSelector::Latest => {
            if request.databases.is_empty() {
                return Err(Error::invalid(
                    "at least one database is required when using the latest image",
                ));
            }
            Ok(request
                .databases
                .iter()
                .map(|db| Subject::Database(db.trim().to_string()))
                .collect())
        }
    }
}

fn check_clone_name(request: &ProvisionRequest, subject_count: usize) -> Result<()> {
    let Some(name) = &request.clone_name else {
        return Ok(());
    };
    if blank(name) {
        return Err(Error::invalid("clone name must not be empty"));
    }
    if name.contains(['\\', '/', ':']) {
        return Err(Error::invalid(format!(
            "clone name {} must not contain path separators",
            name
        )));
    }
    if subject_count > 1 {
        return Err(Error::invalid(
            "an explicit clone name can only be used with a single database",
        ));
    }
    Ok(())
}

/// Map `destination` to a local path on `target`.
pub(crate) fn local_destination(
    hosts: &dyn HostOperations,
    target: &Target,
    destination: &str,
) -> Result<String> {
    if !path::is_network_path(destination) {
        return Ok(path::trim_trailing_separator(destination).to_string());
    }
    match hosts.resolve_local_path(target, destination)? {
        Some(local) => {
            log::debug!("Destination {} is {} on {}", destination, local, target.host);
            Ok(path::trim_trailing_separator(&local).to_string())
        }
        None => Err(Error::invalid(format!(
            "destination {} has no local equivalent on {}",
            destination, target.host
        ))),
    }
}

/// Validate `request` and resolve its per-instance destinations.
///
/// Network destinations are rewritten to the path the share maps to on each
/// instance's host, which may query the host. A share without a local path
/// rejects the request; a host that fails to answer keeps the network path
/// and its pairs fail on their own later.
pub fn plan(request: &ProvisionRequest, hosts: &dyn HostOperations) -> Result<Plan> {
    if request.sql_instances.is_empty() {
        return Err(Error::invalid("at least one database server instance is required"));
    }
    if request.sql_instances.iter().any(|i| blank(i)) {
        return Err(Error::invalid("database server instance names must not be empty"));
    }

    let subjects = subjects(request)?;
    check_clone_name(request, subjects.len())?;

    if let Some(dest) = &request.destination {
        if blank(dest) {
            return Err(Error::invalid("destination must not be empty"));
        }
    }

    let mut instances: Vec<InstancePlan> = Vec::new();
    for instance in &request.sql_instances {
        let instance = instance.trim();
        if instances
            .iter()
            .any(|p| p.sql_instance.eq_ignore_ascii_case(instance))
        {
            log::debug!("Skipping repeated instance {}", instance);
            continue;
        }

        let target = Target::new(instance_host(instance), request.host_credential.clone());
        let destination = match &request.destination {
            Some(dest) => match local_destination(hosts, &target, dest.trim()) {
                Ok(local) => Some(local),
                Err(e) if e.kind() == ErrorKind::InvalidRequest => return Err(e),
                Err(e) => {
                    log::warn!(
                        "Cannot resolve destination {} on {}: {}",
                        dest.trim(),
                        target.host,
                        e
                    );
                    Some(dest.trim().to_string())
                }
            },
            None => None,
        };
        instances.push(InstancePlan {
            sql_instance: instance.to_string(),
            target,
            destination,
        });
    }

    Ok(Plan {
        instances,
        subjects,
    })
}
