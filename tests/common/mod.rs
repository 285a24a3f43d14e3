//! Shared test utilities for integration and E2E tests.
//!
//! This module provides a CLI fixture with an isolated settings file and
//! store, and in-memory stand-ins for the host, disk backend and database
//! server so the provisioning workflow can run without real infrastructure.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_file_store();
//!     fixture.command().arg("ls").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::fakes;
    pub use super::TestFixture;
}

/// A temporary directory holding a settings file and the store it points to.
#[allow(dead_code)]
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write a settings file using the JSON document store.
    pub fn with_file_store(self) -> Self {
        let store = self.path().join("store");
        self.with_settings(&format!(
            "store:\n  backend: file\n  path: {}\n",
            store.display()
        ))
    }

    /// Write a settings file using the SQLite store.
    pub fn with_sqlite_store(self) -> Self {
        let store = self.path().join("registry.db");
        self.with_settings(&format!(
            "store:\n  backend: sqlite\n  path: {}\n",
            store.display()
        ))
    }

    /// Write the settings file with the given content.
    pub fn with_settings(self, content: &str) -> Self {
        self.temp_dir
            .child("config.yaml")
            .write_str(content)
            .expect("Failed to write settings file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.temp_dir.path().join("config.yaml")
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A `dbclone` command bound to this fixture's settings file.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("dbclone");
        cmd.current_dir(self.path())
            .env("DBCLONE_CONFIG", self.settings_path())
            .env("NO_COLOR", "1")
            .env_remove("DBCLONE_STORE_BACKEND")
            .env_remove("DBCLONE_STORE_PATH")
            .env_remove("DBCLONE_SQL_PASSWORD")
            .env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory collaborators for provisioning tests.
#[allow(dead_code)]
pub mod fakes {
    use dbclone::database::DatabaseServer;
    use dbclone::disk::DiskImageBackend;
    use dbclone::error::{Error, Result};
    use dbclone::gateway::{Credential, HostOperations, Target};
    use dbclone::model::NetworkIdentity;
    use dbclone::path;
    use std::collections::{BTreeSet, HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    fn is_below(path: &str, dir: &str) -> bool {
        let dir = path::trim_trailing_separator(dir);
        path.len() > dir.len()
            && path.starts_with(dir)
            && matches!(path[dir.len()..].chars().next(), Some('\\') | Some('/'))
    }

    /// Hosts whose file systems are sets of paths. Paths are shared by every
    /// host, which is enough when each test targets distinct directories.
    #[derive(Default)]
    pub struct FakeHosts {
        paths: Mutex<BTreeSet<String>>,
        read_only: Mutex<HashSet<String>>,
        shares: Mutex<HashMap<String, String>>,
        unreachable: Mutex<HashSet<String>>,
    }

    impl FakeHosts {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn add_file(&self, path: &str) {
            self.paths.lock().unwrap().insert(path.to_string());
        }

        pub fn exists(&self, path: &str) -> bool {
            self.paths.lock().unwrap().contains(path)
        }

        /// Refuse directory creation at `path`.
        pub fn make_read_only(&self, path: &str) {
            self.read_only.lock().unwrap().insert(path.to_string());
        }

        /// Expose `local` as the network path `share` on every host.
        pub fn add_share(&self, share: &str, local: &str) {
            self.shares
                .lock()
                .unwrap()
                .insert(share.to_lowercase(), local.to_string());
        }

        /// Fail every query to `host` with a connectivity error.
        pub fn make_unreachable(&self, host: &str) {
            self.unreachable.lock().unwrap().insert(host.to_uppercase());
        }

        pub fn files_below(&self, dir: &str) -> Vec<String> {
            self.paths
                .lock()
                .unwrap()
                .iter()
                .filter(|p| is_below(p, dir))
                .cloned()
                .collect()
        }
    }

    impl HostOperations for FakeHosts {
        fn network_identity(&self, target: &Target) -> Result<NetworkIdentity> {
            Ok(NetworkIdentity {
                host_name: target.host.clone(),
                ip_address: "10.0.0.10".to_string(),
                fqdn: format!("{}.corp.local", target.host.to_lowercase()),
            })
        }

        fn path_exists(&self, _target: &Target, path: &str) -> Result<bool> {
            Ok(self.exists(path))
        }

        fn create_directory(&self, target: &Target, path: &str) -> Result<()> {
            if self.read_only.lock().unwrap().contains(path) {
                return Err(Error::Execution {
                    host: target.host.clone(),
                    command: format!("mkdir -p {}", path),
                    stderr: "Read-only file system".to_string(),
                });
            }
            self.add_file(path);
            Ok(())
        }

        fn list_files(&self, _target: &Target, dir: &str) -> Result<Vec<String>> {
            Ok(self.files_below(dir))
        }

        fn remove_file(&self, _target: &Target, path: &str) -> Result<()> {
            self.paths.lock().unwrap().remove(path);
            Ok(())
        }

        fn resolve_local_path(&self, target: &Target, path: &str) -> Result<Option<String>> {
            if self
                .unreachable
                .lock()
                .unwrap()
                .contains(&target.host.to_uppercase())
            {
                return Err(Error::Connectivity {
                    host: target.host.clone(),
                });
            }
            let share = path::trim_trailing_separator(path).to_lowercase();
            Ok(self.shares.lock().unwrap().get(&share).cloned())
        }

        fn run(&self, _target: &Target, program: &str, _args: &[String]) -> Result<String> {
            Err(Error::Execution {
                host: "fake".to_string(),
                command: program.to_string(),
                stderr: "not supported".to_string(),
            })
        }
    }

    /// Disk backend that materializes images as paths on `FakeHosts`.
    ///
    /// Mounting an image exposes `<stem>.mdf` and `<stem>_log.ldf` below the
    /// access path.
    pub struct FakeDisks {
        hosts: Arc<FakeHosts>,
        pub fail_mount: Mutex<bool>,
        pub mounted: Mutex<Vec<String>>,
        pub unmounted: Mutex<Vec<String>>,
    }

    impl FakeDisks {
        pub fn new(hosts: Arc<FakeHosts>) -> Self {
            Self {
                hosts,
                fail_mount: Mutex::new(false),
                mounted: Mutex::new(Vec::new()),
                unmounted: Mutex::new(Vec::new()),
            }
        }
    }

    impl DiskImageBackend for FakeDisks {
        fn child_extension(&self, parent: &str) -> String {
            path::extension(parent).unwrap_or("vhdx").to_string()
        }

        fn create_child_image(&self, _target: &Target, _parent: &str, dest: &str) -> Result<()> {
            self.hosts.add_file(dest);
            Ok(())
        }

        fn mount(&self, target: &Target, image: &str, access_path: &str) -> Result<String> {
            if *self.fail_mount.lock().unwrap() {
                return Err(Error::Execution {
                    host: target.host.clone(),
                    command: "mount".to_string(),
                    stderr: "device busy".to_string(),
                });
            }
            let stem = path::file_stem(image);
            self.hosts
                .add_file(&path::join(access_path, &format!("{}.mdf", stem)));
            self.hosts
                .add_file(&path::join(access_path, &format!("{}_log.ldf", stem)));
            self.hosts
                .add_file(&path::join(access_path, "readme.txt"));
            self.mounted.lock().unwrap().push(access_path.to_string());
            Ok(format!("fake:{}", image))
        }

        fn unmount(&self, _target: &Target, access_path: &str) -> Result<()> {
            for file in self.hosts.files_below(access_path) {
                self.hosts.paths.lock().unwrap().remove(&file);
            }
            self.unmounted.lock().unwrap().push(access_path.to_string());
            Ok(())
        }
    }

    /// Database servers keyed by instance name.
    #[derive(Default)]
    pub struct FakeServers {
        databases: Mutex<HashMap<String, Vec<String>>>,
        data_dirs: Mutex<HashMap<String, String>>,
        failing_attach: Mutex<HashSet<String>>,
        pub attached: Mutex<Vec<(String, String, Vec<String>)>>,
    }

    impl FakeServers {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_database(self, instance: &str, database: &str) -> Self {
            self.databases
                .lock()
                .unwrap()
                .entry(instance.to_uppercase())
                .or_default()
                .push(database.to_string());
            self
        }

        pub fn with_data_dir(self, instance: &str, dir: &str) -> Self {
            self.data_dirs
                .lock()
                .unwrap()
                .insert(instance.to_uppercase(), dir.to_string());
            self
        }

        pub fn failing_attach(self, instance: &str) -> Self {
            self.failing_attach
                .lock()
                .unwrap()
                .insert(instance.to_uppercase());
            self
        }
    }

    impl DatabaseServer for FakeServers {
        fn list_databases(
            &self,
            instance: &str,
            _credential: Option<&Credential>,
        ) -> Result<Vec<String>> {
            Ok(self
                .databases
                .lock()
                .unwrap()
                .get(&instance.to_uppercase())
                .cloned()
                .unwrap_or_default())
        }

        fn default_data_directory(
            &self,
            instance: &str,
            _credential: Option<&Credential>,
        ) -> Result<String> {
            Ok(self
                .data_dirs
                .lock()
                .unwrap()
                .get(&instance.to_uppercase())
                .cloned()
                .unwrap_or_else(|| "C:\\".to_string()))
        }

        fn attach_database(
            &self,
            instance: &str,
            _credential: Option<&Credential>,
            database: &str,
            files: &[String],
        ) -> Result<()> {
            if self
                .failing_attach
                .lock()
                .unwrap()
                .contains(&instance.to_uppercase())
            {
                return Err(Error::AttachFailed {
                    sql_instance: instance.to_string(),
                    database: database.to_string(),
                    message: "Msg 5120: unable to open the physical file".to_string(),
                });
            }
            self.databases
                .lock()
                .unwrap()
                .entry(instance.to_uppercase())
                .or_default()
                .push(database.to_string());
            self.attached.lock().unwrap().push((
                instance.to_string(),
                database.to_string(),
                files.to_vec(),
            ));
            Ok(())
        }
    }
}
