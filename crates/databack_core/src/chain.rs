//! Chain replay: base snapshot plus ordered deltas up to a target version.

use crate::delta;
use crate::error::{DataBackError, Result};
use crate::index::{Version, VersionIndex};
use crate::store::{self, StoredArtifact};
use crate::value::Snapshot;
use std::path::Path;
use tracing::{debug, warn};

/// State of `table` at `target`, applying every delta up to and including it.
///
/// Returns `None` when the table has no chain or was introduced after
/// `target`. A missing or unreadable artifact anywhere in the chain is a
/// [`DataBackError::ChainIntegrity`] error; replay never skips a gap.
pub fn reconstruct(index: &VersionIndex, table: &str, target: Version) -> Result<Option<Snapshot>> {
    let Some(entry) = index.table(table) else {
        return Ok(None);
    };
    if target.number() < entry.introduced {
        debug!(table, %target, introduced = entry.introduced, "Table absent at version");
        return Ok(None);
    }

    let steps = (target.number() - entry.introduced) as usize;
    if steps > entry.incremental.len() {
        return Err(DataBackError::VersionNotFound(format!(
            "{} for table '{}' (chain ends at v{})",
            target,
            table,
            entry.last_version()
        )));
    }

    let base_path = index.artifact_path(table, &entry.base);
    let mut state = match load(table, &base_path)? {
        StoredArtifact::Full(snapshot) => snapshot,
        StoredArtifact::Changes(_) => {
            return Err(DataBackError::chain(
                table,
                format!("base {} holds a delta, not a snapshot", base_path.display()),
            ))
        }
    };

    for file in entry.incremental.iter().take(steps) {
        let path = index.artifact_path(table, file);
        match load(table, &path)? {
            StoredArtifact::Changes(changes) => delta::apply(&mut state, &changes),
            StoredArtifact::Full(snapshot) => {
                warn!(table, file = %file, "Full snapshot found in delta chain");
                state = snapshot;
            }
        }
    }

    debug!(table, %target, rows = state.len(), "Reconstructed table");
    Ok(Some(state))
}

/// Read a chain artifact, reporting any failure as a chain integrity error.
pub(crate) fn load(table: &str, path: &Path) -> Result<StoredArtifact> {
    store::read_artifact(path).map_err(|e| match e {
        DataBackError::Io { source, .. } => {
            DataBackError::chain(table, format!("{}: {}", path.display(), source))
        }
        DataBackError::Serialization { message, .. } => {
            DataBackError::chain(table, format!("{} is corrupt: {}", path.display(), message))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{base_file_name, delta_file_name, ArtifactKind, CycleRecord, TableArtifact};
    use crate::value::{Delta, Payload, RowRecord, Scalar};
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn row(name: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("name".to_string(), Scalar::from(name));
        p
    }

    fn record(index: &mut VersionIndex, v: u32, table: &str, base: bool) {
        let version = Version::new(v).unwrap();
        let artifact = if base {
            TableArtifact::Base(base_file_name(table, version))
        } else {
            TableArtifact::Delta(delta_file_name(table, version))
        };
        index
            .record_cycle(CycleRecord {
                version,
                schema_file: ArtifactKind::Schema.file_name(version),
                constraints_file: ArtifactKind::Constraints.file_name(version),
                tables: BTreeMap::from([(table.to_string(), artifact)]),
            })
            .unwrap();
    }

    fn v(n: u32) -> Version {
        Version::new(n).unwrap()
    }

    /// users: v1 [A], v2 [A, B], v3 [B]
    fn users_chain(temp: &TempDir) -> VersionIndex {
        let mut index = VersionIndex::open(temp.path()).unwrap();
        let v1 = Snapshot::from_payloads(vec![row("A")]);
        let id_a = v1.records()[0].id.clone();

        store::write_json(&index.artifact_path("users", "users_v1.json"), &v1).unwrap();
        record(&mut index, 1, "users", true);

        let d2 = Delta {
            added: vec![RowRecord::new(row("B"))],
            deleted: vec![],
        };
        store::write_json(&index.artifact_path("users", "users_incremental_v2.json"), &d2).unwrap();
        record(&mut index, 2, "users", false);

        let d3 = Delta {
            added: vec![],
            deleted: vec![id_a],
        };
        store::write_json(&index.artifact_path("users", "users_incremental_v3.json"), &d3).unwrap();
        record(&mut index, 3, "users", false);
        index
    }

    #[test]
    fn replay_is_inclusive_of_target() {
        let temp = TempDir::new().unwrap();
        let index = users_chain(&temp);

        let at = |n| reconstruct(&index, "users", v(n)).unwrap().unwrap();
        assert!(at(1).same_payloads(&Snapshot::from_payloads(vec![row("A")])));
        assert!(at(2).same_payloads(&Snapshot::from_payloads(vec![row("A"), row("B")])));
        assert!(at(3).same_payloads(&Snapshot::from_payloads(vec![row("B")])));
    }

    #[test]
    fn replay_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let index = users_chain(&temp);
        let first = reconstruct(&index, "users", v(3)).unwrap();
        let second = reconstruct(&index, "users", v(3)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_delta_is_fatal() {
        let temp = TempDir::new().unwrap();
        let index = users_chain(&temp);
        fs::remove_file(index.artifact_path("users", "users_incremental_v2.json")).unwrap();

        assert!(reconstruct(&index, "users", v(1)).is_ok());
        let err = reconstruct(&index, "users", v(3)).unwrap_err();
        assert!(matches!(err, DataBackError::ChainIntegrity { .. }));
    }

    #[test]
    fn corrupt_base_is_fatal() {
        let temp = TempDir::new().unwrap();
        let index = users_chain(&temp);
        fs::write(index.artifact_path("users", "users_v1.json"), "not json").unwrap();

        let err = reconstruct(&index, "users", v(1)).unwrap_err();
        assert!(matches!(err, DataBackError::ChainIntegrity { .. }));
    }

    #[test]
    fn unknown_or_future_table_is_absent() {
        let temp = TempDir::new().unwrap();
        let index = users_chain(&temp);
        assert!(reconstruct(&index, "orders", v(2)).unwrap().is_none());
    }

    #[test]
    fn legacy_full_snapshot_in_chain_resets_state() {
        let temp = TempDir::new().unwrap();
        let index = users_chain(&temp);
        let full = Snapshot::from_payloads(vec![row("C")]);
        store::write_json(&index.artifact_path("users", "users_incremental_v2.json"), &full).unwrap();

        let at2 = reconstruct(&index, "users", v(2)).unwrap().unwrap();
        assert!(at2.same_payloads(&full));
    }
}
