//! Process-level locking of a backup directory.
//!
//! Backup and restore both hold an exclusive advisory lock on
//! `<root>/.databack.lock` for the whole run. Uses `fs2` for cross-platform
//! file locking (std's `File::lock` needs a newer toolchain than our MSRV).

use crate::error::{DataBackError, Result};
use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LOCK_FILE: &str = ".databack.lock";

/// Holds the directory lock until dropped.
pub struct BackupDirLock {
    _file: File,
    lock_path: PathBuf,
    sidecar_path: Option<PathBuf>,
}

impl BackupDirLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl std::fmt::Debug for BackupDirLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupDirLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

#[derive(Serialize)]
struct LockSidecar {
    pid: u32,
    exe: Option<String>,
    timestamp: String,
    operation: String,
}

fn sidecar_path_for(lock_path: &Path) -> PathBuf {
    lock_path.with_extension("lock.json")
}

fn write_lock_sidecar(lock_path: &Path, operation: &str) -> Option<PathBuf> {
    let sidecar = LockSidecar {
        pid: std::process::id(),
        exe: std::env::current_exe().ok().map(|p| p.display().to_string()),
        timestamp: Utc::now().to_rfc3339(),
        operation: operation.to_string(),
    };
    let sidecar_path = sidecar_path_for(lock_path);
    match serde_json::to_vec_pretty(&sidecar)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .and_then(|payload| fs::write(&sidecar_path, payload))
    {
        Ok(()) => Some(sidecar_path),
        Err(e) => {
            warn!(
                "Failed to write lock sidecar {}: {}",
                sidecar_path.display(),
                e
            );
            None
        }
    }
}

impl Drop for BackupDirLock {
    fn drop(&mut self) {
        debug!("Releasing backup directory lock: {}", self.lock_path.display());
        if let Some(path) = &self.sidecar_path {
            if let Err(e) = fs::remove_file(path) {
                debug!("Failed to remove lock sidecar {}: {}", path.display(), e);
            }
        }
    }
}

/// Try to take the exclusive lock on `root`, creating the directory if needed.
///
/// Non-blocking: if another process holds the lock this returns
/// [`DataBackError::Locked`] immediately. `operation` is recorded in the
/// sidecar file for whoever finds the directory locked.
pub fn try_lock_backup_dir(root: &Path, operation: &str) -> Result<BackupDirLock> {
    fs::create_dir_all(root).map_err(|e| DataBackError::io(root, e))?;
    let lock_path = root.join(LOCK_FILE);

    debug!("Attempting to acquire backup directory lock: {}", lock_path.display());

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| DataBackError::io(&lock_path, e))?;

    // Fully qualified so std's File::try_lock_exclusive (1.89+) is never picked.
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            info!("Acquired backup directory lock: {}", lock_path.display());
            let sidecar_path = write_lock_sidecar(&lock_path, operation);
            Ok(BackupDirLock {
                _file: file,
                lock_path,
                sidecar_path,
            })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!("Backup directory is locked by another process");
            Err(DataBackError::Locked(root.to_path_buf()))
        }
        Err(e) => Err(DataBackError::io(&lock_path, e)),
    }
}
