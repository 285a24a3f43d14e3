//! Exclusive lock files for the flat-document store.
//!
//! A lock is a sibling file `<document>.lock` created with `create_new`, which
//! succeeds for exactly one writer at a time, across threads and processes.
//! The lock is released when the guard is dropped. A lock file older than the
//! stale threshold is assumed to belong to a crashed writer and is broken.
//!
//! Breaking a stale lock happens only while holding `<document>.lock.break`,
//! and the lock's age is checked again under it, so a lock another writer
//! has just taken is never removed.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const RETRY_INTERVAL: Duration = Duration::from_millis(20);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Identifies one acquisition across threads and processes.
fn owner_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "{} {} {}",
        std::process::id(),
        nanos,
        NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
    )
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Guard holding an exclusive lock on one document.
#[derive(Debug)]
pub struct DocumentLock {
    path: PathBuf,
    token: String,
}

impl DocumentLock {
    /// Lock file path for a document.
    pub fn lock_path(document: &Path) -> PathBuf {
        with_suffix(document, ".lock")
    }

    /// Acquire the lock for `document`, waiting up to `timeout`.
    ///
    /// Fails with `StoreBusy` if another writer holds the lock for longer.
    pub fn acquire(document: &Path, timeout: Duration, stale_after: Duration) -> Result<Self> {
        let path = Self::lock_path(document);
        let deadline = Instant::now() + timeout;

        loop {
            match File::options().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let token = owner_token();
                    if let Err(e) = writeln!(file, "{}", token) {
                        let _ = fs::remove_file(&path);
                        return Err(e.into());
                    }
                    log::trace!("Acquired {}", path.display());
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path, stale_after)
                        && Self::break_stale(&path, stale_after)?
                    {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::StoreBusy {
                            path: path.display().to_string(),
                        });
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove the stale lock at `path` while holding its breaker file.
    ///
    /// Returns false when another writer is breaking it.
    fn break_stale(path: &Path, stale_after: Duration) -> Result<bool> {
        let breaker = with_suffix(path, ".break");
        match File::options().write(true).create_new(true).open(&breaker) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if Self::is_stale(&breaker, stale_after) {
                    log::warn!(
                        "Stale lock {} cannot be broken while {} exists; remove both manually",
                        path.display(),
                        breaker.display()
                    );
                }
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        let outcome = if Self::is_stale(path, stale_after) {
            log::warn!("Breaking stale lock {}", path.display());
            match fs::remove_file(path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
                Err(e) => Err(e.into()),
            }
        } else {
            Ok(true)
        };

        if let Err(e) = fs::remove_file(&breaker) {
            log::warn!("Failed to release {}: {}", breaker.display(), e);
        }
        outcome
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > stale_after)
            .unwrap_or(false)
    }

    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        // A lock held past the stale threshold may have been taken over.
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == self.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    log::warn!("Failed to release lock {}: {}", self.path.display(), e);
                }
            }
            Ok(_) => log::warn!("Lock {} was taken over by another writer", self.path.display()),
            Err(e) => log::warn!("Failed to release lock {}: {}", self.path.display(), e),
        }
    }
}
