//! Differencing disk lifecycle.
//!
//! `DiskManager` validates and normalizes paths and then delegates to a
//! `DiskImageBackend`, the only code that knows how child images are
//! materialized and mounted. The shipped backend drives `qemu-img` and the
//! libguestfs `guestmount`/`guestunmount` tools through the execution
//! gateway, so the same code works on the local machine and on remote hosts.

use crate::error::{Error, Result};
use crate::gateway::{HostOperations, Target};
use crate::path;
use std::sync::Arc;

/// Primitive disk image operations.
pub trait DiskImageBackend: Send + Sync {
    /// File extension used for a child of `parent`.
    fn child_extension(&self, parent: &str) -> String;

    /// Create a copy-on-write image at `dest` whose parent is `parent`.
    fn create_child_image(&self, target: &Target, parent: &str, dest: &str) -> Result<()>;

    /// Expose `image` at `access_path`, returning a device handle.
    fn mount(&self, target: &Target, image: &str, access_path: &str) -> Result<String>;

    /// Detach whatever is mounted at `access_path`.
    fn unmount(&self, target: &Target, access_path: &str) -> Result<()>;
}

/// `qemu-img` format name for an image file.
fn qemu_format(image: &str) -> &'static str {
    match path::extension(image).map(str::to_ascii_lowercase).as_deref() {
        Some("vhdx") => "vhdx",
        Some("vhd") => "vpc",
        Some("vmdk") => "vmdk",
        Some("img") | Some("raw") => "raw",
        _ => "qcow2",
    }
}

/// Backend using `qemu-img` for child images and libguestfs for mounting.
pub struct QemuDiskBackend {
    hosts: Arc<dyn HostOperations>,
    partition: String,
}

impl QemuDiskBackend {
    pub fn new(hosts: Arc<dyn HostOperations>) -> Self {
        Self {
            hosts,
            partition: "/dev/sda1".to_string(),
        }
    }

    /// Mount a different partition of the image.
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Arguments for `qemu-img create`.
    pub fn create_args(parent: &str, dest: &str) -> Vec<String> {
        vec![
            "create".to_string(),
            "-f".to_string(),
            "qcow2".to_string(),
            "-F".to_string(),
            qemu_format(parent).to_string(),
            "-b".to_string(),
            parent.to_string(),
            dest.to_string(),
        ]
    }
}

impl DiskImageBackend for QemuDiskBackend {
    fn child_extension(&self, _parent: &str) -> String {
        "qcow2".to_string()
    }

    fn create_child_image(&self, target: &Target, parent: &str, dest: &str) -> Result<()> {
        self.hosts
            .run(target, "qemu-img", &Self::create_args(parent, dest))?;
        Ok(())
    }

    fn mount(&self, target: &Target, image: &str, access_path: &str) -> Result<String> {
        let args = vec![
            "-a".to_string(),
            image.to_string(),
            "-m".to_string(),
            self.partition.clone(),
            "--rw".to_string(),
            access_path.to_string(),
        ];
        self.hosts.run(target, "guestmount", &args)?;
        Ok(format!("{}:{}", image, self.partition))
    }

    fn unmount(&self, target: &Target, access_path: &str) -> Result<()> {
        self.hosts
            .run(target, "guestunmount", &[access_path.to_string()])?;
        Ok(())
    }
}

/// Creates, mounts and removes differencing disks on a target host.
pub struct DiskManager<'a> {
    hosts: &'a dyn HostOperations,
    backend: &'a dyn DiskImageBackend,
}

impl<'a> DiskManager<'a> {
    pub fn new(hosts: &'a dyn HostOperations, backend: &'a dyn DiskImageBackend) -> Self {
        Self { hosts, backend }
    }

    fn local_directory(dir: &str) -> Result<&str> {
        if path::is_network_path(dir) {
            return Err(Error::invalid(format!(
                "network path {} must be rewritten to a local path first",
                dir
            )));
        }
        let dir = path::trim_trailing_separator(dir.trim());
        if dir.is_empty() {
            return Err(Error::invalid("directory must not be empty"));
        }
        Ok(dir)
    }

    /// Path the child disk of `parent` named `name` gets in `destination`.
    pub fn child_disk_path(&self, parent: &str, destination: &str, name: &str) -> Result<String> {
        let dir = Self::local_directory(destination)?;
        let file = format!("{}.{}", name, self.backend.child_extension(parent));
        Ok(path::join(dir, &file))
    }

    /// Create a child disk of `parent` in `destination`.
    ///
    /// An existing disk of the same name is replaced only when `force` is set.
    pub fn create_child_disk(
        &self,
        target: &Target,
        parent: &str,
        destination: &str,
        name: &str,
        force: bool,
    ) -> Result<String> {
        if !self.hosts.path_exists(target, parent)? {
            return Err(Error::ParentNotFound {
                host: target.host.clone(),
                path: parent.to_string(),
            });
        }

        let dir = Self::local_directory(destination)?;
        let disk = self.child_disk_path(parent, dir, name)?;
        if self.hosts.path_exists(target, &disk)? {
            if !force {
                return Err(Error::DiskAlreadyExists { path: disk });
            }
            log::warn!("Replacing existing disk {}", disk);
            self.hosts.remove_file(target, &disk)?;
        }

        self.hosts
            .create_directory(target, dir)
            .map_err(|e| Error::DiskCreateFailed {
                path: disk.clone(),
                message: e.to_string(),
            })?;
        self.backend
            .create_child_image(target, parent, &disk)
            .map_err(|e| Error::DiskCreateFailed {
                path: disk.clone(),
                message: e.to_string(),
            })?;

        log::debug!("Created {} from {}", disk, parent);
        Ok(disk)
    }

    /// Mount `disk` at `access_path`, creating the directory if needed.
    pub fn mount_disk(&self, target: &Target, disk: &str, access_path: &str) -> Result<String> {
        let access = Self::local_directory(access_path)?;

        let exists = self.hosts.path_exists(target, access).map_err(|e| {
            Error::AccessPathUnavailable {
                path: access.to_string(),
                message: e.to_string(),
            }
        })?;
        if !exists {
            self.hosts
                .create_directory(target, access)
                .map_err(|e| Error::AccessPathUnavailable {
                    path: access.to_string(),
                    message: e.to_string(),
                })?;
        }

        let device = self
            .backend
            .mount(target, disk, access)
            .map_err(|e| Error::MountFailed {
                path: disk.to_string(),
                message: e.to_string(),
            })?;
        log::debug!("Mounted {} at {} ({})", disk, access, device);
        Ok(access.to_string())
    }

    /// Unmount whatever is mounted at `access_path`.
    pub fn unmount_disk(&self, target: &Target, access_path: &str) -> Result<()> {
        let access = Self::local_directory(access_path)?;
        self.backend.unmount(target, access)
    }

    /// Delete a disk file.
    pub fn remove_disk(&self, target: &Target, disk: &str) -> Result<()> {
        self.hosts.remove_file(target, disk)
    }
}
