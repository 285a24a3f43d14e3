//! # Execution Gateway
//!
//! Runs work on the machine that hosts a database server, which is either the
//! machine `dbclone` runs on or a remote host reached over `ssh`.
//!
//! ## Design
//!
//! Two traits separate transport from capability:
//!
//! - **`Executor`**: runs one program with arguments on a target and reports
//!   its exit status and output. `LocalExecutor` spawns processes directly;
//!   `SshExecutor` runs them through the system `ssh` client, which picks up
//!   keys, agents and `~/.ssh/config` on its own.
//!
//! - **`HostOperations`**: the capabilities the provisioning workflow needs
//!   from a host (identity, path checks, directory creation, file listing,
//!   share-to-local path mapping, arbitrary commands). `Gateway` implements it
//!   on top of a local and a remote executor and probes connectivity once per
//!   remote host before the first remote operation. Tests substitute their
//!   own `HostOperations`.

use crate::config::RemoteSettings;
use crate::error::{Error, Result};
use crate::model::NetworkIdentity;
use crate::path;
use std::collections::HashMap;
use std::fmt;
use std::process::Command;
use std::sync::{Mutex, OnceLock};
use walkdir::WalkDir;

/// Login used for a host or database server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

/// A host that work is executed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub credential: Option<Credential>,
}

impl Target {
    pub fn new(host: impl Into<String>, credential: Option<Credential>) -> Self {
        Self {
            host: host.into(),
            credential,
        }
    }

    /// Whether the target names the machine `dbclone` runs on.
    pub fn is_local(&self) -> bool {
        let host = self.host.trim();
        if host.is_empty()
            || host == "."
            || host == "127.0.0.1"
            || host == "::1"
            || host.eq_ignore_ascii_case("localhost")
            || host.eq_ignore_ascii_case("(local)")
        {
            return true;
        }
        local_host_name()
            .map(|name| name.eq_ignore_ascii_case(host))
            .unwrap_or(false)
    }
}

/// Short name of this machine, looked up once per process.
fn local_host_name() -> Option<&'static str> {
    static NAME: OnceLock<Option<String>> = OnceLock::new();
    NAME.get_or_init(|| {
        let output = Command::new("hostname").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let short = name.split('.').next().unwrap_or("").to_string();
        (!short.is_empty()).then_some(short)
    })
    .as_deref()
}

/// Exit status and captured output of a command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Transport that runs a program on a target.
pub trait Executor: Send + Sync {
    /// Cheap probe that the target accepts commands.
    fn test_connectivity(&self, target: &Target) -> bool;

    /// Run `program` with `args`. A non-zero exit is reported through
    /// `CommandOutput::success`, not as an error.
    fn run(&self, target: &Target, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs programs on the local machine.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn test_connectivity(&self, _target: &Target) -> bool {
        true
    }

    fn run(&self, target: &Target, program: &str, args: &[String]) -> Result<CommandOutput> {
        log::debug!("[{}] {} {}", target.host, program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::Execution {
                host: target.host.clone(),
                command: program.to_string(),
                stderr: e.to_string(),
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Quote an argument for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Runs programs on remote hosts through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    default_user: Option<String>,
    port: u16,
    connect_timeout_secs: u64,
}

impl SshExecutor {
    pub fn new(settings: &RemoteSettings) -> Self {
        Self {
            default_user: settings.ssh_user.clone(),
            port: settings.ssh_port,
            connect_timeout_secs: settings.connect_timeout_secs,
        }
    }

    fn destination(&self, target: &Target) -> String {
        let user = target
            .credential
            .as_ref()
            .map(|c| c.username.clone())
            .or_else(|| self.default_user.clone());
        match user {
            Some(user) => format!("{}@{}", user, target.host),
            None => target.host.clone(),
        }
    }

    /// Arguments passed to `ssh` for running `program args...` on `target`.
    pub fn ssh_args(&self, target: &Target, program: &str, args: &[String]) -> Vec<String> {
        let remote_command = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-p".to_string(),
            self.port.to_string(),
            self.destination(target),
            "--".to_string(),
            remote_command,
        ]
    }
}

impl Executor for SshExecutor {
    fn test_connectivity(&self, target: &Target) -> bool {
        match LocalExecutor.run(target, "ssh", &self.ssh_args(target, "true", &[])) {
            Ok(output) => output.success,
            Err(e) => {
                log::debug!("Connectivity probe for {} failed: {}", target.host, e);
                false
            }
        }
    }

    fn run(&self, target: &Target, program: &str, args: &[String]) -> Result<CommandOutput> {
        LocalExecutor.run(target, "ssh", &self.ssh_args(target, program, args))
    }
}

/// Host capabilities used by the disk manager and the orchestrator.
pub trait HostOperations: Send + Sync {
    /// Host name, primary address and FQDN of the target.
    fn network_identity(&self, target: &Target) -> Result<NetworkIdentity>;

    /// Whether a file or directory exists on the target.
    fn path_exists(&self, target: &Target, path: &str) -> Result<bool>;

    /// Create a directory (and parents) on the target.
    fn create_directory(&self, target: &Target, path: &str) -> Result<()>;

    /// All regular files below `dir`, recursively.
    fn list_files(&self, target: &Target, dir: &str) -> Result<Vec<String>>;

    /// Delete a file on the target. Missing files are not an error.
    fn remove_file(&self, target: &Target, path: &str) -> Result<()>;

    /// Local path on `target` that a `\\server\share\...` path refers to, if
    /// the share is exported by that host.
    fn resolve_local_path(&self, target: &Target, network_path: &str) -> Result<Option<String>>;

    /// Run a command on the target, failing with `Execution` on non-zero exit.
    fn run(&self, target: &Target, program: &str, args: &[String]) -> Result<String>;
}

/// `HostOperations` over a local and a remote executor.
pub struct Gateway {
    local: Box<dyn Executor>,
    remote: Box<dyn Executor>,
    probed: Mutex<HashMap<String, bool>>,
}

impl Gateway {
    /// Gateway using process spawning locally and `ssh` remotely.
    pub fn new(settings: &RemoteSettings) -> Self {
        Self::with_executors(Box::new(LocalExecutor), Box::new(SshExecutor::new(settings)))
    }

    /// Gateway with custom executors.
    pub fn with_executors(local: Box<dyn Executor>, remote: Box<dyn Executor>) -> Self {
        Self {
            local,
            remote,
            probed: Mutex::new(HashMap::new()),
        }
    }

    fn executor_for(&self, target: &Target) -> Result<&dyn Executor> {
        if target.is_local() {
            return Ok(self.local.as_ref());
        }

        let key = target.host.to_ascii_lowercase();
        let known = {
            let probed = self.probed.lock().map_err(|_| Error::LockPoisoned {
                context: "gateway connectivity cache".to_string(),
            })?;
            probed.get(&key).copied()
        };
        let reachable = match known {
            Some(reachable) => reachable,
            None => {
                let reachable = self.remote.test_connectivity(target);
                log::debug!("Connectivity to {}: {}", target.host, reachable);
                if let Ok(mut probed) = self.probed.lock() {
                    probed.insert(key, reachable);
                }
                reachable
            }
        };

        if reachable {
            Ok(self.remote.as_ref())
        } else {
            Err(Error::Connectivity {
                host: target.host.clone(),
            })
        }
    }

    fn run_checked(&self, target: &Target, program: &str, args: &[String]) -> Result<String> {
        let output = self.executor_for(target)?.run(target, program, args)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(Error::Execution {
                host: target.host.clone(),
                command: format!("{} {}", program, args.join(" ")),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    fn first_line(text: &str) -> String {
        text.lines().next().unwrap_or("").trim().to_string()
    }
}

impl HostOperations for Gateway {
    fn network_identity(&self, target: &Target) -> Result<NetworkIdentity> {
        let short = self.run_checked(target, "hostname", &["-s".to_string()])?;
        let host_name = Self::first_line(&short);
        let fqdn = self
            .run_checked(target, "hostname", &["-f".to_string()])
            .map(|out| Self::first_line(&out))
            .unwrap_or_else(|e| {
                log::warn!("Cannot resolve FQDN of {}: {}", target.host, e);
                host_name.clone()
            });
        let ip_address = self
            .run_checked(target, "hostname", &["-I".to_string()])
            .map(|out| out.split_whitespace().next().unwrap_or("").to_string())
            .unwrap_or_else(|e| {
                log::warn!("Cannot resolve address of {}: {}", target.host, e);
                String::new()
            });

        if host_name.is_empty() {
            return Err(Error::Execution {
                host: target.host.clone(),
                command: "hostname -s".to_string(),
                stderr: "empty host name".to_string(),
            });
        }
        Ok(NetworkIdentity {
            host_name,
            ip_address,
            fqdn,
        })
    }

    fn path_exists(&self, target: &Target, path: &str) -> Result<bool> {
        if target.is_local() {
            return Ok(std::path::Path::new(path).exists());
        }
        let output = self
            .executor_for(target)?
            .run(target, "test", &["-e".to_string(), path.to_string()])?;
        Ok(output.success)
    }

    fn create_directory(&self, target: &Target, path: &str) -> Result<()> {
        if target.is_local() {
            std::fs::create_dir_all(path)?;
            return Ok(());
        }
        self.run_checked(target, "mkdir", &["-p".to_string(), path.to_string()])?;
        Ok(())
    }

    fn list_files(&self, target: &Target, dir: &str) -> Result<Vec<String>> {
        if target.is_local() {
            let mut files = Vec::new();
            for entry in WalkDir::new(dir).follow_links(false) {
                let entry = entry.map_err(|e| Error::Io(e.into()))?;
                if entry.file_type().is_file() {
                    files.push(entry.path().to_string_lossy().to_string());
                }
            }
            files.sort();
            return Ok(files);
        }
        let out = self.run_checked(
            target,
            "find",
            &[dir.to_string(), "-type".to_string(), "f".to_string()],
        )?;
        let mut files: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        files.sort();
        Ok(files)
    }

    fn remove_file(&self, target: &Target, path: &str) -> Result<()> {
        if target.is_local() {
            return match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }
        self.run_checked(target, "rm", &["-f".to_string(), path.to_string()])?;
        Ok(())
    }

    fn resolve_local_path(&self, target: &Target, network_path: &str) -> Result<Option<String>> {
        let Some(unc) = path::parse_network_path(network_path) else {
            return Ok(None);
        };
        let server = unc.server.split('.').next().unwrap_or("");
        let target_short = target.host.split('.').next().unwrap_or("");
        if !target.is_local() && !server.eq_ignore_ascii_case(target_short) {
            return Ok(None);
        }

        let out = match self.run_checked(
            target,
            "testparm",
            &[
                "-s".to_string(),
                format!("--section-name={}", unc.share),
                "--parameter-name=path".to_string(),
            ],
        ) {
            Ok(out) => out,
            Err(Error::Execution { stderr, .. }) => {
                log::debug!("Share {} not exported by {}: {}", unc.share, target.host, stderr);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let share_root = Self::first_line(&out);
        if share_root.is_empty() {
            return Ok(None);
        }
        if unc.rest.is_empty() {
            return Ok(Some(share_root));
        }
        let rest = unc.rest.replace('\\', "/");
        Ok(Some(path::join(&share_root, &rest)))
    }

    fn run(&self, target: &Target, program: &str, args: &[String]) -> Result<String> {
        self.run_checked(target, program, args)
    }
}
