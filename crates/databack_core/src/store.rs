//! Artifact file I/O.
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place, so a reader never observes a half-written artifact.

use crate::error::{DataBackError, Result};
use crate::value::{Delta, Snapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// A per-table artifact as found on disk.
///
/// Older backups stored a full snapshot where a delta was expected, so both
/// shapes are accepted when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredArtifact {
    Full(Snapshot),
    Changes(Delta),
}

/// Write `content` to `path` via temp file + rename, creating parent directories.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| DataBackError::io(parent, e))?;

    let temp_path = parent.join(format!(".tmp_{}", uuid::Uuid::new_v4()));
    let write_temp = || -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()
    };
    if let Err(e) = write_temp() {
        let _ = fs::remove_file(&temp_path);
        return Err(DataBackError::io(&temp_path, e));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        DataBackError::io(path, e)
    })?;
    debug!(path = %path.display(), bytes = content.len(), "Wrote artifact");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| DataBackError::serialization(path, e.to_string()))?;
    atomic_write(path, &bytes)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| DataBackError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| DataBackError::serialization(path, e.to_string()))
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    atomic_write(path, text.as_bytes())
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| DataBackError::io(path, e))
}

pub fn read_artifact(path: &Path) -> Result<StoredArtifact> {
    read_json(path)
}
