//! Flat-document metadata store.
//!
//! Records live in three JSON documents inside one directory:
//! `hosts.json`, `images.json` and `clones.json`, each holding an array of
//! records. Readers load a document without locking; writers take the
//! document's [`DocumentLock`], re-read it, allocate the next identifier,
//! append and replace the file through a temporary file and rename, so a
//! reader never observes a partially written document.

use super::lock::DocumentLock;
use super::MetadataStore;
use crate::error::{Error, Result};
use crate::model::{CloneEntry, CloneFilter, CloneRecord, Host, Image, NewClone, NewImage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

const HOSTS: &str = "hosts.json";
const IMAGES: &str = "images.json";
const CLONES: &str = "clones.json";

/// JSON document store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
}

impl FileStore {
    /// Open a store rooted at `root` with default lock settings.
    pub fn new(root: &Path) -> Self {
        Self::with_lock_settings(root, Duration::from_secs(10), Duration::from_secs(300))
    }

    /// Open a store with explicit lock timeout and stale-lock threshold.
    pub fn with_lock_settings(root: &Path, lock_timeout: Duration, stale_after: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            lock_timeout,
            stale_after,
        }
    }

    /// Directory holding the documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_document<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.document(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| Error::Store {
            message: format!("{} is corrupt: {}", path.display(), e),
        })
    }

    fn write_document<T: Serialize>(&self, name: &str, records: &[T]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        let bytes = serde_json::to_vec_pretty(records)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.document(name))
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Run `update` on a document while holding its lock, then persist it.
    fn modify_document<T, R, F>(&self, name: &str, update: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> Result<R>,
    {
        fs::create_dir_all(&self.root)?;
        let _lock = DocumentLock::acquire(&self.document(name), self.lock_timeout, self.stale_after)?;
        let mut records: Vec<T> = self.read_document(name)?;
        let result = update(&mut records)?;
        self.write_document(name, &records)?;
        Ok(result)
    }

    fn join_clones(&self, clones: &[CloneEntry]) -> Result<Vec<CloneRecord>> {
        let hosts: Vec<Host> = self.read_document(HOSTS)?;
        let images: Vec<Image> = self.read_document(IMAGES)?;

        clones
            .iter()
            .map(|clone| {
                let image = images
                    .iter()
                    .find(|i| i.image_id == clone.image_id)
                    .ok_or_else(|| Error::Store {
                        message: format!(
                            "clone {} references missing image {}",
                            clone.clone_id, clone.image_id
                        ),
                    })?;
                let host = hosts
                    .iter()
                    .find(|h| h.host_id == clone.host_id)
                    .ok_or_else(|| Error::Store {
                        message: format!(
                            "clone {} references missing host {}",
                            clone.clone_id, clone.host_id
                        ),
                    })?;
                Ok(CloneRecord::assemble(clone, image, host))
            })
            .collect()
    }
}

/// Next identifier: current maximum plus one, or 1 for an empty document.
fn next_id<T>(records: &[T], id: impl Fn(&T) -> i64) -> i64 {
    records.iter().map(id).max().unwrap_or(0) + 1
}

impl MetadataStore for FileStore {
    fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        for name in [HOSTS, IMAGES, CLONES] {
            if !self.document(name).exists() {
                self.write_document::<serde_json::Value>(name, &[])?;
            }
        }
        Ok(())
    }

    fn resolve_host_by_name(&self, name: &str) -> Result<Option<Host>> {
        let hosts: Vec<Host> = self.read_document(HOSTS)?;
        Ok(hosts
            .into_iter()
            .find(|h| h.host_name.eq_ignore_ascii_case(name)))
    }

    fn create_host(&self, host_name: &str, ip_address: &str, fqdn: &str) -> Result<Host> {
        let host = self.modify_document(HOSTS, |hosts: &mut Vec<Host>| {
            if hosts.iter().any(|h| h.host_name.eq_ignore_ascii_case(host_name)) {
                return Err(Error::DuplicateHost {
                    name: host_name.to_string(),
                });
            }
            let host = Host {
                host_id: next_id(hosts, |h| h.host_id),
                host_name: host_name.to_string(),
                ip_address: ip_address.to_string(),
                fqdn: fqdn.to_string(),
            };
            hosts.push(host.clone());
            Ok(host)
        })?;
        log::info!("Registered host {} as {}", host.host_name, host.host_id);
        Ok(host)
    }

    fn list_hosts(&self) -> Result<Vec<Host>> {
        let mut hosts: Vec<Host> = self.read_document(HOSTS)?;
        hosts.sort_by_key(|h| h.host_id);
        Ok(hosts)
    }

    fn register_image(&self, new: &NewImage) -> Result<Image> {
        self.modify_document(IMAGES, |images: &mut Vec<Image>| {
            if images.iter().any(|i| i.image_location == new.image_location) {
                return Err(Error::DuplicateImage {
                    location: new.image_location.clone(),
                });
            }
            let image = Image {
                image_id: next_id(images, |i| i.image_id),
                image_name: new.image_name.clone(),
                image_location: new.image_location.clone(),
                size_mb: new.size_mb,
                database_name: new.database_name.clone(),
                database_timestamp: new.database_timestamp,
                created_on: new.created_on,
            };
            images.push(image.clone());
            Ok(image)
        })
    }

    fn find_image_by_location(&self, location: &str) -> Result<Option<Image>> {
        let images: Vec<Image> = self.read_document(IMAGES)?;
        Ok(images.into_iter().find(|i| i.image_location == location))
    }

    fn latest_image_for_database(&self, database_name: &str) -> Result<Option<Image>> {
        let images: Vec<Image> = self.read_document(IMAGES)?;
        Ok(images
            .into_iter()
            .filter(|i| i.database_name.eq_ignore_ascii_case(database_name))
            .max_by(|a, b| {
                a.created_on
                    .cmp(&b.created_on)
                    .then(a.image_id.cmp(&b.image_id))
            }))
    }

    fn list_images(&self, database_name: Option<&str>) -> Result<Vec<Image>> {
        let mut images: Vec<Image> = self.read_document(IMAGES)?;
        if let Some(db) = database_name {
            images.retain(|i| i.database_name.eq_ignore_ascii_case(db));
        }
        images.sort_by_key(|i| i.image_id);
        Ok(images)
    }

    fn list_clones(&self, filter: &CloneFilter) -> Result<Vec<CloneRecord>> {
        let mut clones: Vec<CloneEntry> = self.read_document(CLONES)?;
        clones.sort_by_key(|c| c.clone_id);
        Ok(self
            .join_clones(&clones)?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    fn create_clone(&self, new: &NewClone) -> Result<CloneRecord> {
        // Images and hosts are append-only, so references checked here stay valid.
        let image = self
            .read_document::<Image>(IMAGES)?
            .into_iter()
            .find(|i| i.image_id == new.image_id)
            .ok_or_else(|| Error::ImageNotFound {
                reference: format!("ImageID {}", new.image_id),
            })?;
        let host = self
            .read_document::<Host>(HOSTS)?
            .into_iter()
            .find(|h| h.host_id == new.host_id)
            .ok_or_else(|| Error::HostNotFound {
                name: format!("HostID {}", new.host_id),
            })?;

        let entry = self.modify_document(CLONES, |clones: &mut Vec<CloneEntry>| {
            let duplicate = clones.iter().any(|c| {
                (c.sql_instance.eq_ignore_ascii_case(&new.sql_instance)
                    && c.database_name.eq_ignore_ascii_case(&new.database_name))
                    || (c.host_id == new.host_id && c.clone_location == new.clone_location)
            });
            if duplicate {
                return Err(Error::DuplicateClone {
                    sql_instance: new.sql_instance.clone(),
                    database: new.database_name.clone(),
                    location: new.clone_location.clone(),
                });
            }
            let entry = CloneEntry {
                clone_id: next_id(clones, |c| c.clone_id),
                image_id: new.image_id,
                host_id: new.host_id,
                clone_location: new.clone_location.clone(),
                access_path: new.access_path.clone(),
                sql_instance: new.sql_instance.clone(),
                database_name: new.database_name.clone(),
                is_enabled: new.is_enabled,
            };
            clones.push(entry.clone());
            Ok(entry)
        })?;

        log::info!(
            "Registered clone {} for {}/{}",
            entry.clone_id,
            entry.sql_instance,
            entry.database_name
        );
        Ok(CloneRecord::assemble(&entry, &image, &host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn image(location: &str, db: &str) -> NewImage {
        NewImage {
            image_name: crate::path::file_stem(location).to_string(),
            image_location: location.to_string(),
            size_mb: 1024,
            database_name: db.to_string(),
            database_timestamp: None,
            created_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_initialize_creates_documents() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(&temp.path().join("store"));
        store.initialize().unwrap();
        store.initialize().unwrap();

        for name in [HOSTS, IMAGES, CLONES] {
            let content = fs::read_to_string(store.root().join(name)).unwrap();
            assert_eq!(content.trim(), "[]");
        }
    }

    #[test]
    fn test_missing_documents_read_as_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        assert!(store.list_hosts().unwrap().is_empty());
        assert!(store.resolve_host_by_name("hosta").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(HOSTS), "{ not json").unwrap();
        let store = FileStore::new(temp.path());
        let err = store.list_hosts().unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn test_documents_use_registry_field_names() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        store.create_host("HOSTA", "10.0.0.4", "hosta.corp").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join(HOSTS)).unwrap()).unwrap();
        assert_eq!(raw[0]["HostID"], 1);
        assert_eq!(raw[0]["HostName"], "HOSTA");
    }

    #[test]
    fn test_lock_released_after_write() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        store.register_image(&image("/images/db1.qcow2", "db1")).unwrap();
        assert!(!DocumentLock::lock_path(&temp.path().join(IMAGES)).exists());
    }

    #[test]
    fn test_lock_released_after_rejected_write() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        store.create_host("hosta", "", "").unwrap();
        assert!(store.create_host("HostA", "", "").is_err());
        assert!(!DocumentLock::lock_path(&temp.path().join(HOSTS)).exists());
        assert_eq!(store.list_hosts().unwrap().len(), 1);
    }

    #[test]
    fn test_held_lock_makes_writer_busy() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::with_lock_settings(
            temp.path(),
            Duration::from_millis(100),
            Duration::from_secs(300),
        );
        let _held = DocumentLock::acquire(
            &temp.path().join(HOSTS),
            Duration::from_secs(1),
            Duration::from_secs(300),
        )
        .unwrap();

        let err = store.create_host("hosta", "", "").unwrap_err();
        assert!(matches!(err, Error::StoreBusy { .. }));
    }

    #[test]
    fn test_next_id() {
        let ids = vec![3_i64, 1, 2];
        assert_eq!(next_id(&ids, |i| *i), 4);
        let empty: Vec<i64> = Vec::new();
        assert_eq!(next_id(&empty, |i| *i), 1);
    }
}
