//! Registry records: hosts, images and clones.
//!
//! Field names serialize in the registry's column naming (`CloneID`,
//! `ImageLocation`, ...) so that the flat-document store and the JSON output
//! of the CLI read the same as the relational schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A machine that owns one or more clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Host {
    #[serde(rename = "HostID")]
    pub host_id: i64,
    pub host_name: String,
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    #[serde(rename = "FQDN")]
    pub fqdn: String,
}

/// Network identity of a host as reported by the execution gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub host_name: String,
    pub ip_address: String,
    pub fqdn: String,
}

/// A read-only parent disk holding one database at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    #[serde(rename = "ImageID")]
    pub image_id: i64,
    pub image_name: String,
    pub image_location: String,
    /// Size of the backing file in megabytes
    #[serde(default)]
    pub size_mb: u64,
    /// Source database this image was taken from
    pub database_name: String,
    /// Point in time of the database contents
    #[serde(default)]
    pub database_timestamp: Option<DateTime<Utc>>,
    pub created_on: DateTime<Utc>,
}

/// Fields supplied when registering an image built elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub image_name: String,
    pub image_location: String,
    pub size_mb: u64,
    pub database_name: String,
    pub database_timestamp: Option<DateTime<Utc>>,
    pub created_on: DateTime<Utc>,
}

/// A stored clone row, referencing its image and host by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloneEntry {
    #[serde(rename = "CloneID")]
    pub clone_id: i64,
    #[serde(rename = "ImageID")]
    pub image_id: i64,
    #[serde(rename = "HostID")]
    pub host_id: i64,
    pub clone_location: String,
    pub access_path: String,
    pub sql_instance: String,
    pub database_name: String,
    pub is_enabled: bool,
}

/// Fields supplied when creating a clone record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClone {
    pub image_id: i64,
    pub host_id: i64,
    pub clone_location: String,
    pub access_path: String,
    pub sql_instance: String,
    pub database_name: String,
    pub is_enabled: bool,
}

/// The clone shape returned to callers, denormalized with image and host
/// fields. This layout is identical for every store backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloneRecord {
    #[serde(rename = "CloneID")]
    pub clone_id: i64,
    pub clone_location: String,
    pub access_path: String,
    pub sql_instance: String,
    pub database_name: String,
    pub is_enabled: bool,
    #[serde(rename = "ImageID")]
    pub image_id: i64,
    pub image_name: String,
    pub image_location: String,
    pub host_name: String,
}

impl CloneRecord {
    /// Join a stored clone with its image and host.
    pub fn assemble(clone: &CloneEntry, image: &Image, host: &Host) -> Self {
        Self {
            clone_id: clone.clone_id,
            clone_location: clone.clone_location.clone(),
            access_path: clone.access_path.clone(),
            sql_instance: clone.sql_instance.clone(),
            database_name: clone.database_name.clone(),
            is_enabled: clone.is_enabled,
            image_id: image.image_id,
            image_name: image.image_name.clone(),
            image_location: image.image_location.clone(),
            host_name: host.host_name.clone(),
        }
    }
}

/// Filter for clone listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneFilter {
    pub host_name: Option<String>,
    pub sql_instance: Option<String>,
    pub database_name: Option<String>,
    pub image_id: Option<i64>,
    pub enabled_only: bool,
}

impl CloneFilter {
    /// Check a denormalized record against the filter.
    ///
    /// Name comparisons are case-insensitive, matching how database servers
    /// and hostnames compare.
    pub fn matches(&self, record: &CloneRecord) -> bool {
        fn eq(expected: &Option<String>, actual: &str) -> bool {
            expected
                .as_deref()
                .is_none_or(|e| e.eq_ignore_ascii_case(actual))
        }

        eq(&self.host_name, &record.host_name)
            && eq(&self.sql_instance, &record.sql_instance)
            && eq(&self.database_name, &record.database_name)
            && self.image_id.is_none_or(|id| id == record.image_id)
            && (!self.enabled_only || record.is_enabled)
    }
}
