//! One backup cycle.
//!
//! Artifacts for the new version are written as the cycle goes. None of them
//! is reachable until the index is saved, so a failed cycle leaves the
//! previous version intact and is simply retried. Current caches are only
//! overwritten after the index save.

use crate::catalog::{CatalogSource, TableDefinition};
use crate::chain;
use crate::ddl;
use crate::delta;
use crate::error::{DataBackError, Result, SourceError};
use crate::index::{
    base_file_name, delta_file_name, ArtifactKind, CycleRecord, TableArtifact, Version,
    VersionIndex,
};
use crate::store::{self, StoredArtifact};
use crate::value::{Delta, Snapshot};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Where a backup cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    New,
    FetchSchema,
    FetchRows,
    WriteBase,
    ComputeAndWriteDelta,
    PersistIndex,
    Done,
}

impl BackupStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStage::New => "NEW",
            BackupStage::FetchSchema => "FETCH_SCHEMA",
            BackupStage::FetchRows => "FETCH_ROWS",
            BackupStage::WriteBase => "WRITE_BASE",
            BackupStage::ComputeAndWriteDelta => "COMPUTE_AND_WRITE_DELTA",
            BackupStage::PersistIndex => "PERSIST_INDEX",
            BackupStage::Done => "DONE",
        }
    }
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the cycle stored for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChange {
    Base { rows: usize },
    Delta { added: usize, deleted: usize },
}

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub version: Version,
    pub schema_path: PathBuf,
    pub constraints_path: PathBuf,
    pub tables: BTreeMap<String, TableChange>,
    /// Tables whose schema could not be read this cycle.
    pub skipped: Vec<String>,
    /// Known tables missing from the catalog; recorded as emptied.
    pub vanished: Vec<String>,
    pub duration_ms: u64,
}

/// Runs one backup cycle against a catalog source.
pub struct BackupOrchestrator<'a, S: CatalogSource + ?Sized> {
    index: &'a mut VersionIndex,
    source: &'a mut S,
    stage: BackupStage,
}

impl<'a, S: CatalogSource + ?Sized> BackupOrchestrator<'a, S> {
    pub fn new(index: &'a mut VersionIndex, source: &'a mut S) -> Self {
        Self {
            index,
            source,
            stage: BackupStage::New,
        }
    }

    pub fn stage(&self) -> BackupStage {
        self.stage
    }

    fn enter(&mut self, stage: BackupStage) {
        debug!(from = %self.stage, to = %stage, "Backup stage");
        self.stage = stage;
    }

    pub fn run(&mut self) -> Result<BackupReport> {
        let start = Instant::now();
        let version = self.index.next_version();
        let previous = self.index.latest_version();
        let span = info_span!("backup", version = %version);
        let _guard = span.enter();
        info!("Starting backup cycle");

        self.index.ensure_layout()?;

        self.enter(BackupStage::FetchSchema);
        let (definitions, skipped) = self.fetch_schema()?;

        let schema_path = self.index.script_path(ArtifactKind::Schema, version);
        let constraints_path = self.index.script_path(ArtifactKind::Constraints, version);
        store::write_text(&schema_path, &ddl::generate_schema(&definitions))?;
        store::write_text(&constraints_path, &ddl::generate_constraints(&definitions))?;

        let mut artifacts = BTreeMap::new();
        let mut changes = BTreeMap::new();
        let mut staged: Vec<(String, Snapshot)> = Vec::new();

        for definition in &definitions {
            let table = definition.name.as_str();
            let _table_span = info_span!("table", table = %table).entered();

            self.enter(BackupStage::FetchRows);
            let rows = self
                .source
                .fetch_all_rows(table)
                .map_err(|e| DataBackError::catalog_read(table, e))?;
            let fresh = Snapshot::from_payloads(rows);

            let chained = if self.index.table(table).is_some() {
                previous
            } else {
                None
            };
            match chained {
                None => {
                    self.enter(BackupStage::WriteBase);
                    let file = base_file_name(table, version);
                    store::write_json(&self.index.artifact_path(table, &file), &fresh)?;
                    info!(rows = fresh.len(), file = %file, "Wrote base snapshot");

                    changes.insert(table.to_string(), TableChange::Base { rows: fresh.len() });
                    artifacts.insert(table.to_string(), TableArtifact::Base(file));
                    staged.push((table.to_string(), fresh));
                }
                Some(latest) => {
                    self.enter(BackupStage::ComputeAndWriteDelta);
                    let mut state = self.prior_state(table, latest)?;
                    let changeset = delta::drift_check(&state, &fresh);
                    let file = self.write_delta(table, version, &changeset)?;
                    delta::apply(&mut state, &changeset);

                    changes.insert(
                        table.to_string(),
                        TableChange::Delta {
                            added: changeset.added.len(),
                            deleted: changeset.deleted.len(),
                        },
                    );
                    artifacts.insert(table.to_string(), TableArtifact::Delta(file));
                    staged.push((table.to_string(), state));
                }
            }
        }

        let exported: BTreeSet<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        let vanished: Vec<String> = self
            .index
            .known_tables()
            .into_iter()
            .filter(|t| !exported.contains(t.as_str()))
            .collect();

        if let Some(latest) = previous {
            for table in &vanished {
                let _table_span = info_span!("table", table = %table).entered();
                self.enter(BackupStage::ComputeAndWriteDelta);
                let state = self.prior_state(table, latest)?;
                warn!(rows = state.len(), "Table not exported this cycle, recording it as emptied");

                let changeset = Delta {
                    added: Vec::new(),
                    deleted: state.records().iter().map(|r| r.id.clone()).collect(),
                };
                let file = self.write_delta(table, version, &changeset)?;

                changes.insert(
                    table.clone(),
                    TableChange::Delta {
                        added: 0,
                        deleted: changeset.deleted.len(),
                    },
                );
                artifacts.insert(table.clone(), TableArtifact::Delta(file));
                staged.push((table.clone(), Snapshot::default()));
            }
        }

        self.index.record_cycle(CycleRecord {
            version,
            schema_file: ArtifactKind::Schema.file_name(version),
            constraints_file: ArtifactKind::Constraints.file_name(version),
            tables: artifacts,
        })?;

        self.enter(BackupStage::PersistIndex);
        self.index.save()?;

        for (table, snapshot) in &staged {
            let path = self.index.current_path(table);
            if let Err(e) = store::write_json(&path, snapshot) {
                warn!(table = %table, error = %e, "Failed to refresh current cache");
            }
        }

        self.enter(BackupStage::Done);
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            tables = changes.len(),
            skipped = skipped.len(),
            vanished = vanished.len(),
            duration_ms,
            "Backup cycle complete"
        );

        Ok(BackupReport {
            version,
            schema_path,
            constraints_path,
            tables: changes,
            skipped,
            vanished,
            duration_ms,
        })
    }

    /// Read every table's definition. A table whose definition cannot be read
    /// is left out of this cycle; a lost connection aborts it.
    fn fetch_schema(&mut self) -> Result<(Vec<TableDefinition>, Vec<String>)> {
        let names = self
            .source
            .list_tables()
            .map_err(|e| DataBackError::catalog_read("*", e))?;

        let mut definitions = Vec::with_capacity(names.len());
        let mut skipped = Vec::new();
        for name in names {
            let read = match self.source.columns_of(&name) {
                Ok(columns) => self
                    .source
                    .constraints_of(&name)
                    .map(|constraints| TableDefinition {
                        name: name.clone(),
                        columns,
                        constraints,
                    }),
                Err(e) => Err(e),
            };
            match read {
                Ok(definition) => definitions.push(definition),
                Err(SourceError::Connection(message)) => {
                    return Err(DataBackError::Connectivity(message))
                }
                Err(SourceError::Query(message)) => {
                    warn!(table = %name, error = %message, "Skipping table, schema read failed");
                    skipped.push(name);
                }
            }
        }
        info!(tables = definitions.len(), skipped = skipped.len(), "Fetched schema");
        Ok((definitions, skipped))
    }

    /// The table's state at `latest`, replayed from its chain.
    ///
    /// A full snapshot left at the chain tail by older versions is first
    /// rewritten as a delta. The current cache is only compared against the
    /// replayed state; the chain always wins.
    fn prior_state(&mut self, table: &str, latest: Version) -> Result<Snapshot> {
        self.rewrite_snapshot_tail(table, latest)?;
        let state = chain::reconstruct(self.index, table, latest)?.unwrap_or_default();

        let cache_path = self.index.current_path(table);
        match store::read_json::<Snapshot>(&cache_path) {
            Ok(cache) if cache.same_payloads(&state) => {}
            Ok(cache) => warn!(
                cache_rows = cache.len(),
                chain_rows = state.len(),
                "Current cache disagrees with chain, rebuilding from chain"
            ),
            Err(e) => debug!(error = %e, "Current cache unavailable, using chain"),
        }
        Ok(state)
    }

    fn rewrite_snapshot_tail(&mut self, table: &str, latest: Version) -> Result<()> {
        let Some(file) = self.index.delta_file(table, latest).map(str::to_string) else {
            return Ok(());
        };
        let path = self.index.artifact_path(table, &file);
        let StoredArtifact::Full(snapshot) = chain::load(table, &path)? else {
            return Ok(());
        };
        let Some(before) = Version::new(latest.number() - 1) else {
            return Ok(());
        };

        let prior = chain::reconstruct(self.index, table, before)?.unwrap_or_default();
        let changeset = delta::compute(&prior, &snapshot);
        store::write_json(&path, &changeset)?;
        info!(
            file = %file,
            added = changeset.added.len(),
            deleted = changeset.deleted.len(),
            "Rewrote full snapshot in chain as delta"
        );
        Ok(())
    }

    fn write_delta(&self, table: &str, version: Version, changeset: &Delta) -> Result<String> {
        let file = delta_file_name(table, version);
        store::write_json(&self.index.artifact_path(table, &file), changeset)?;
        info!(
            added = changeset.added.len(),
            deleted = changeset.deleted.len(),
            file = %file,
            "Wrote delta"
        );
        Ok(file)
    }
}
