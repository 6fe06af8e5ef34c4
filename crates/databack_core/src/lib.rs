//! Versioned incremental backup engine for DataBack
//!
//! Captures a database's schema, constraints and rows once per backup cycle,
//! storing a base snapshot per table followed by one delta per later version,
//! and restores any recorded version by replaying those chains.
//!
//! The engine never talks to a database itself. Callers hand it a
//! [`CatalogSource`] (and for restores a [`StatementExecutor`]); the
//! `databack_db` crate provides the PostgreSQL implementation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use databack_core::{try_lock_backup_dir, BackupOrchestrator, VersionIndex};
//!
//! let _lock = try_lock_backup_dir(root, "backup")?;
//! let mut index = VersionIndex::open(root)?;
//! let report = BackupOrchestrator::new(&mut index, &mut source).run()?;
//! println!("wrote {}", report.version);
//! ```

pub mod backup;
pub mod catalog;
pub mod chain;
pub mod ddl;
pub mod delta;
mod error;
pub mod index;
pub mod insert;
pub mod lock;
pub mod restore;
pub mod store;
pub mod type_map;
pub mod value;

pub use backup::{BackupOrchestrator, BackupReport, BackupStage, TableChange};
pub use catalog::{
    CatalogSource, ColumnDefinition, ConstraintDefinition, ConstraintKind, StatementExecutor,
    TableDefinition,
};
pub use error::{DataBackError, ErrorKind, Result, SourceError};
pub use index::{ArtifactKind, TableEntry, Version, VersionIndex};
pub use lock::{try_lock_backup_dir, BackupDirLock};
pub use restore::{RestoreOrchestrator, RestoreReport, RestoreStage};
pub use value::{Delta, Payload, RecordId, RowRecord, Scalar, Snapshot};
