//! Destructive restore of a recorded version.
//!
//! Everything that can fail on the backup side (missing scripts, broken
//! chains) is checked before the first DROP, so a bad backup directory never
//! leaves the destination half-restored.

use crate::catalog::{CatalogSource, StatementExecutor};
use crate::chain;
use crate::ddl::{self, quote_ident};
use crate::error::{DataBackError, Result};
use crate::index::{ArtifactKind, Version, VersionIndex};
use crate::insert;
use crate::store;
use crate::value::Snapshot;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Where a restore is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    ResolveFiles,
    ReconstructRows,
    DropAllTables,
    CreateTables,
    GenerateInserts,
    ExecuteInserts,
    ApplyConstraints,
    Done,
}

impl RestoreStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStage::ResolveFiles => "RESOLVE_FILES",
            RestoreStage::ReconstructRows => "RECONSTRUCT_ROWS",
            RestoreStage::DropAllTables => "DROP_ALL_TABLES",
            RestoreStage::CreateTables => "CREATE_TABLES",
            RestoreStage::GenerateInserts => "GENERATE_INSERTS",
            RestoreStage::ExecuteInserts => "EXECUTE_INSERTS",
            RestoreStage::ApplyConstraints => "APPLY_CONSTRAINTS",
            RestoreStage::Done => "DONE",
        }
    }
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub version: Version,
    /// Destination tables dropped before the rebuild.
    pub dropped: Vec<String>,
    /// Tables created by the version's schema script.
    pub created: Vec<String>,
    /// Rows inserted per table; tables without rows are absent.
    pub rows: BTreeMap<String, usize>,
    pub duration_ms: u64,
}

impl RestoreReport {
    pub fn total_rows(&self) -> usize {
        self.rows.values().sum()
    }
}

/// Restores one version onto a destination database.
pub struct RestoreOrchestrator<'a, D: CatalogSource + StatementExecutor + ?Sized> {
    index: &'a VersionIndex,
    destination: &'a mut D,
    target: Option<Version>,
    stage: RestoreStage,
}

impl<'a, D: CatalogSource + StatementExecutor + ?Sized> RestoreOrchestrator<'a, D> {
    /// Restore `target`, or the latest version when `None`.
    pub fn new(index: &'a VersionIndex, destination: &'a mut D, target: Option<Version>) -> Self {
        Self {
            index,
            destination,
            target,
            stage: RestoreStage::ResolveFiles,
        }
    }

    pub fn stage(&self) -> RestoreStage {
        self.stage
    }

    fn enter(&mut self, stage: RestoreStage) {
        debug!(from = %self.stage, to = %stage, "Restore stage");
        self.stage = stage;
    }

    pub fn run(&mut self) -> Result<RestoreReport> {
        let start = Instant::now();

        self.enter(RestoreStage::ResolveFiles);
        let version = self.index.resolve_version(self.target)?;
        let span = info_span!("restore", version = %version);
        let _guard = span.enter();
        info!("Starting restore");

        let schema_script =
            store::read_text(&self.index.resolve(ArtifactKind::Schema, Some(version))?)?;
        let constraints_script =
            store::read_text(&self.index.resolve(ArtifactKind::Constraints, Some(version))?)?;
        let created = ddl::created_tables(&schema_script);

        self.enter(RestoreStage::ReconstructRows);
        let mut datasets: Vec<(String, Snapshot)> = Vec::new();
        for table in self.index.known_tables() {
            let _table_span = info_span!("table", table = %table).entered();
            let Some(snapshot) = chain::reconstruct(self.index, &table, version)? else {
                continue;
            };
            if !created.contains(&table) {
                if !snapshot.is_empty() {
                    warn!(rows = snapshot.len(), "Table not in schema script, rows not restored");
                }
                continue;
            }
            if !snapshot.is_empty() {
                datasets.push((table, snapshot));
            }
        }

        self.enter(RestoreStage::DropAllTables);
        let existing = self
            .destination
            .list_tables()
            .map_err(|e| DataBackError::execution(RestoreStage::DropAllTables.as_str(), e))?;
        for table in &existing {
            self.execute(&format!("DROP TABLE IF EXISTS {} CASCADE;", quote_ident(table)))?;
        }
        info!(dropped = existing.len(), "Dropped destination tables");

        self.enter(RestoreStage::CreateTables);
        if !schema_script.trim().is_empty() {
            self.execute(&schema_script)?;
        }
        info!(created = created.len(), "Created tables");

        self.enter(RestoreStage::GenerateInserts);
        let mut batches: Vec<(String, Vec<String>)> = Vec::with_capacity(datasets.len());
        for (table, snapshot) in &datasets {
            let columns = self
                .destination
                .columns_of(table)
                .map_err(|e| DataBackError::execution(RestoreStage::GenerateInserts.as_str(), e))?;
            batches.push((
                table.clone(),
                insert::insert_statements(table, &columns, snapshot),
            ));
        }

        self.enter(RestoreStage::ExecuteInserts);
        let mut rows = BTreeMap::new();
        for (table, statements) in &batches {
            let _table_span = info_span!("table", table = %table).entered();
            for statement in statements {
                self.execute(statement)?;
            }
            info!(rows = statements.len(), "Inserted rows");
            rows.insert(table.clone(), statements.len());
        }

        self.enter(RestoreStage::ApplyConstraints);
        if !constraints_script.trim().is_empty() {
            self.execute(&constraints_script)?;
        }

        self.enter(RestoreStage::Done);
        let duration_ms = start.elapsed().as_millis() as u64;
        let report = RestoreReport {
            version,
            dropped: existing,
            created,
            rows,
            duration_ms,
        };
        info!(
            tables = report.created.len(),
            rows = report.total_rows(),
            duration_ms,
            "Restore complete"
        );
        Ok(report)
    }

    fn execute(&mut self, statement: &str) -> Result<()> {
        let stage = self.stage;
        self.destination
            .execute(statement)
            .map_err(|e| DataBackError::execution(stage.as_str(), e))
    }
}
