//! Runs a validated request pair by pair.

use super::naming;
use super::validate::{self, InstancePlan, Subject};
use super::{ProvisionFailure, ProvisionReport, ProvisionRequest, Stage};
use crate::config::CloneSettings;
use crate::database::DatabaseServer;
use crate::disk::{DiskImageBackend, DiskManager};
use crate::error::{Error, Result};
use crate::gateway::HostOperations;
use crate::identity;
use crate::model::{CloneRecord, Image, NewClone};
use crate::path;
use crate::store::MetadataStore;
use rand::Rng;

/// Where a pair got to, and what it left behind.
#[derive(Debug)]
struct Progress {
    stage: Stage,
    disk: Option<String>,
    mounted: Option<String>,
    /// Database attached from the mounted disk
    attached: Option<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            stage: Stage::ResolvingImage,
            disk: None,
            mounted: None,
            attached: None,
        }
    }

    fn enter(&mut self, stage: Stage, pair: &str) {
        log::debug!("[{}] {} -> {}", pair, self.stage, stage);
        self.stage = stage;
    }
}

/// Provisions clones using the given store and collaborators.
pub struct Provisioner<'a> {
    store: &'a dyn MetadataStore,
    hosts: &'a dyn HostOperations,
    disks: DiskManager<'a>,
    databases: &'a dyn DatabaseServer,
    settings: &'a CloneSettings,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        store: &'a dyn MetadataStore,
        hosts: &'a dyn HostOperations,
        backend: &'a dyn DiskImageBackend,
        databases: &'a dyn DatabaseServer,
        settings: &'a CloneSettings,
    ) -> Self {
        Self {
            store,
            hosts,
            disks: DiskManager::new(hosts, backend),
            databases,
            settings,
        }
    }

    /// Provision every instance × subject pair of `request`.
    ///
    /// Returns `Err` only when the request itself is rejected, before anything
    /// was changed. Failures of individual pairs are collected in the report.
    pub fn provision<R: Rng + ?Sized>(
        &self,
        request: &ProvisionRequest,
        rng: &mut R,
    ) -> Result<ProvisionReport> {
        let plan = validate::plan(request, self.hosts)?;
        let mut report = ProvisionReport::default();

        for instance in &plan.instances {
            for subject in &plan.subjects {
                let pair = format!("{}/{}", instance.sql_instance, subject.label());
                let mut progress = Progress::new();

                let outcome = self.provision_pair(
                    request,
                    instance,
                    subject,
                    &mut *rng,
                    &mut progress,
                    &pair,
                );
                match outcome {
                    Ok(record) => {
                        log::info!(
                            "Provisioned clone {} ({}) on {}",
                            record.clone_id,
                            record.database_name,
                            record.sql_instance
                        );
                        report.clones.push(record);
                    }
                    Err(error) => {
                        log::warn!("[{}] failed while {}: {}", pair, progress.stage, error);
                        let cleanup_errors = if request.cleanup_on_failure {
                            self.clean_up(instance, &progress)
                        } else {
                            Vec::new()
                        };
                        report.failures.push(ProvisionFailure {
                            sql_instance: instance.sql_instance.clone(),
                            subject: subject.label().to_string(),
                            stage: progress.stage,
                            error,
                            cleanup_errors,
                        });
                    }
                }
            }
        }

        Ok(report)
    }

    fn resolve_image(&self, subject: &Subject) -> Result<Image> {
        let image = match subject {
            Subject::Image(location) => self.store.find_image_by_location(location)?,
            Subject::Database(name) => self.store.latest_image_for_database(name)?,
        };
        image.ok_or_else(|| Error::ImageNotFound {
            reference: subject.label().to_string(),
        })
    }

    fn database_files(&self, instance: &InstancePlan, mounted: &str) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for file in self.hosts.list_files(&instance.target, mounted)? {
            let name = path::file_name(&file);
            for pattern in &self.settings.data_file_patterns {
                if path::glob_match(pattern, name)? {
                    files.push(file);
                    break;
                }
            }
        }
        Ok(files)
    }

    fn provision_pair<R: Rng + ?Sized>(
        &self,
        request: &ProvisionRequest,
        instance: &InstancePlan,
        subject: &Subject,
        rng: &mut R,
        progress: &mut Progress,
        pair: &str,
    ) -> Result<CloneRecord> {
        let target = &instance.target;
        let sql_credential = request.sql_credential.as_ref();

        let image = self.resolve_image(subject)?;
        log::debug!("[{}] using image {} ({})", pair, image.image_id, image.image_location);

        progress.enter(Stage::ValidatingTarget, pair);
        let clone_name = naming::clone_name(request.clone_name.as_deref(), &image.image_location);
        let destination = match &instance.destination {
            Some(dest) if path::is_network_path(dest) => {
                validate::local_destination(self.hosts, target, dest)?
            }
            Some(dest) => dest.clone(),
            None => {
                let data_dir = self
                    .databases
                    .default_data_directory(&instance.sql_instance, sql_credential)?;
                path::join(&data_dir, &self.settings.subdirectory)
            }
        };

        let disk_path = self
            .disks
            .child_disk_path(&image.image_location, &destination, &clone_name)?;
        if !request.force && self.hosts.path_exists(target, &disk_path)? {
            return Err(Error::CloneAlreadyExists { path: disk_path });
        }
        let existing = self
            .databases
            .list_databases(&instance.sql_instance, sql_credential)?;
        if existing.iter().any(|db| db.eq_ignore_ascii_case(&clone_name)) {
            return Err(Error::DatabaseAlreadyExists {
                sql_instance: instance.sql_instance.clone(),
                database: clone_name,
            });
        }
        let access_path = naming::access_path(
            &destination,
            &clone_name,
            request.clone_name.is_some(),
            rng,
            self.settings.suffix_length,
        );

        progress.enter(Stage::CreatingDisk, pair);
        let disk = self.disks.create_child_disk(
            target,
            &image.image_location,
            &destination,
            &clone_name,
            request.force,
        )?;
        progress.disk = Some(disk.clone());

        progress.enter(Stage::Mounting, pair);
        let mounted = self.disks.mount_disk(target, &disk, &access_path)?;
        progress.mounted = Some(mounted.clone());

        progress.enter(Stage::AttachingDatabase, pair);
        let files = self.database_files(instance, &mounted)?;
        if files.is_empty() {
            return Err(Error::AttachFailed {
                sql_instance: instance.sql_instance.clone(),
                database: clone_name,
                message: format!("no database files found under {}", mounted),
            });
        }
        self.databases
            .attach_database(&instance.sql_instance, sql_credential, &clone_name, &files)?;
        progress.attached = Some(clone_name.clone());

        progress.enter(Stage::ResolvingHost, pair);
        let identity = self.hosts.network_identity(target)?;
        let host = identity::resolve_host(self.store, &identity)?;

        progress.enter(Stage::CommittingRegistry, pair);
        let record = self.store.create_clone(&NewClone {
            image_id: image.image_id,
            host_id: host.host_id,
            clone_location: disk,
            access_path: mounted,
            sql_instance: instance.sql_instance.clone(),
            database_name: clone_name,
            is_enabled: !request.disabled,
        })?;

        progress.enter(Stage::Done, pair);
        Ok(record)
    }

    /// Unmount and delete what a failed pair created.
    ///
    /// Once the database is attached its files must stay in place, so the
    /// disk is left alone and the leftover is reported instead.
    fn clean_up(&self, instance: &InstancePlan, progress: &Progress) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(database) = &progress.attached {
            let disk = progress.disk.as_deref().unwrap_or_default();
            log::warn!(
                "Cleanup: {} is attached on {}, leaving {} in place",
                database,
                instance.sql_instance,
                disk
            );
            errors.push(format!(
                "database {} is attached on {}; detach it, then unmount and remove {} manually",
                database, instance.sql_instance, disk
            ));
            return errors;
        }
        if let Some(mounted) = &progress.mounted {
            if let Err(e) = self.disks.unmount_disk(&instance.target, mounted) {
                log::warn!("Cleanup: cannot unmount {}: {}", mounted, e);
                errors.push(format!("unmount {}: {}", mounted, e));
            }
        }
        // A disk that is still mounted cannot be removed.
        if let Some(disk) = &progress.disk {
            if errors.is_empty() {
                match self.disks.remove_disk(&instance.target, disk) {
                    Ok(()) => log::info!("Cleanup: removed {}", disk),
                    Err(e) => {
                        log::warn!("Cleanup: cannot remove {}: {}", disk, e);
                        errors.push(format!("remove {}: {}", disk, e));
                    }
                }
            }
        }
        errors
    }
}
