//! Error types for the backup engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Engine operation result type.
pub type Result<T> = std::result::Result<T, DataBackError>;

/// Errors returned by catalog/row source and statement executor implementations.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The database could not be reached or the session was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A catalog query, row read or statement failed.
    #[error("Query error: {0}")]
    Query(String),
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum DataBackError {
    /// Database connectivity failure (fatal).
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Catalog or row read failure for one table.
    #[error("Catalog read failed for table '{table}': {message}")]
    CatalogRead { table: String, message: String },

    /// Missing or corrupt base/delta artifact during chain replay.
    #[error("Chain integrity error for table '{table}': {message}")]
    ChainIntegrity { table: String, message: String },

    /// Requested version is not recorded in the index.
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    /// Version string is not of the form `v<N>`.
    #[error("Invalid version '{0}': expected v<N>, e.g. v3")]
    InvalidVersion(String),

    /// Malformed persisted file.
    #[error("Serialization error in {}: {message}", path.display())]
    Serialization { path: PathBuf, message: String },

    /// File system failure.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process holds the backup directory lock.
    #[error("Backup directory is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// Statement execution against the destination failed.
    #[error("Statement failed during {stage}: {message}")]
    Execution { stage: String, message: String },
}

/// Coarse classification used by callers to report failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    CatalogRead,
    ChainIntegrity,
    VersionNotFound,
    Serialization,
    Io,
    Locked,
    Execution,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connectivity => "ConnectivityError",
            ErrorKind::CatalogRead => "CatalogReadError",
            ErrorKind::ChainIntegrity => "ChainIntegrityError",
            ErrorKind::VersionNotFound => "VersionNotFoundError",
            ErrorKind::Serialization => "SerializationError",
            ErrorKind::Io => "IoError",
            ErrorKind::Locked => "LockedError",
            ErrorKind::Execution => "ExecutionError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DataBackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataBackError::Connectivity(_) => ErrorKind::Connectivity,
            DataBackError::CatalogRead { .. } => ErrorKind::CatalogRead,
            DataBackError::ChainIntegrity { .. } => ErrorKind::ChainIntegrity,
            DataBackError::VersionNotFound(_) | DataBackError::InvalidVersion(_) => {
                ErrorKind::VersionNotFound
            }
            DataBackError::Serialization { .. } => ErrorKind::Serialization,
            DataBackError::Io { .. } => ErrorKind::Io,
            DataBackError::Locked(_) => ErrorKind::Locked,
            DataBackError::Execution { .. } => ErrorKind::Execution,
        }
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn serialization(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Serialization {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn chain(table: &str, message: impl Into<String>) -> Self {
        Self::ChainIntegrity {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Wrap a collaborator failure that happened while reading `table`.
    ///
    /// Lost connections stay fatal connectivity errors regardless of the table.
    pub(crate) fn catalog_read(table: &str, err: SourceError) -> Self {
        match err {
            SourceError::Connection(message) => Self::Connectivity(message),
            SourceError::Query(message) => Self::CatalogRead {
                table: table.to_string(),
                message,
            },
        }
    }

    pub(crate) fn execution(stage: &str, err: SourceError) -> Self {
        match err {
            SourceError::Connection(message) => Self::Connectivity(message),
            SourceError::Query(message) => Self::Execution {
                stage: stage.to_string(),
                message,
            },
        }
    }
}
