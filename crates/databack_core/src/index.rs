//! The version index (`metadata.json`).
//!
//! The index is the only record of which files belong to which version. It is
//! loaded once per run, mutated in memory and saved at the end of a backup.

use crate::error::{DataBackError, Result};
use crate::store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub const INDEX_FILE: &str = "metadata.json";
pub const CONSTRAINTS_DIR: &str = "constraints";
pub const SCHEMA_DIR: &str = "tableSchema";
pub const OBJECTS_DIR: &str = "objects";

/// A backup version, externally named `v<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    pub const FIRST: Version = Version(1);

    /// `None` for zero; versions start at 1.
    pub fn new(number: u32) -> Option<Self> {
        (number > 0).then_some(Self(number))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for Version {
    type Err = DataBackError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DataBackError::InvalidVersion(s.to_string());
        let digits = s.strip_prefix('v').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let number: u32 = digits.parse().map_err(|_| invalid())?;
        Version::new(number).ok_or_else(invalid)
    }
}

/// Version-scoped script kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Schema,
    Constraints,
}

impl ArtifactKind {
    pub fn file_name(self, version: Version) -> String {
        match self {
            ArtifactKind::Schema => format!("create_tables_v{}.sql", version.number()),
            ArtifactKind::Constraints => format!("add_constraints_v{}.sql", version.number()),
        }
    }
}

/// File-system form of a table name.
///
/// ASCII letters, digits, `_` and `-` pass through; every other byte becomes
/// `%XX`. The result never contains a separator or a `.`, so it stays one
/// component under `objects/`, and distinct names never collide.
pub fn path_segment(table: &str) -> String {
    let mut out = String::with_capacity(table.len());
    for byte in table.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

pub fn base_file_name(table: &str, version: Version) -> String {
    format!("{}_v{}.json", path_segment(table), version.number())
}

pub fn delta_file_name(table: &str, version: Version) -> String {
    format!("{}_incremental_v{}.json", path_segment(table), version.number())
}

pub fn current_file_name(table: &str) -> String {
    format!("{}_current.json", path_segment(table))
}

/// A single, non-special path component.
fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Chain bookkeeping for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Directory under `objects/`.
    pub path: String,
    #[serde(alias = "basis")]
    pub base: String,
    /// Version the base was written in. Zero in legacy indexes until load fills it in.
    #[serde(default)]
    pub introduced: u32,
    /// One delta file per version after `introduced`, in order.
    #[serde(default)]
    pub incremental: Vec<String>,
    pub current: String,
}

impl TableEntry {
    /// Latest version covered by this table's chain.
    pub fn last_version(&self) -> u32 {
        self.introduced + self.incremental.len() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionList {
    path: String,
    #[serde(default)]
    versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectsSection {
    path: String,
    #[serde(default)]
    tables: BTreeMap<String, TableEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexDocument {
    path: String,
    constraints: VersionList,
    #[serde(rename = "tableSchema")]
    table_schema: VersionList,
    objects: ObjectsSection,
}

impl IndexDocument {
    fn empty(root: &Path) -> Self {
        Self {
            path: root.display().to_string(),
            constraints: VersionList {
                path: CONSTRAINTS_DIR.to_string(),
                versions: Vec::new(),
            },
            table_schema: VersionList {
                path: SCHEMA_DIR.to_string(),
                versions: Vec::new(),
            },
            objects: ObjectsSection {
                path: OBJECTS_DIR.to_string(),
                tables: BTreeMap::new(),
            },
        }
    }
}

/// What one backup cycle wrote for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableArtifact {
    Base(String),
    Delta(String),
}

/// Files produced by one backup cycle, handed to [`VersionIndex::record_cycle`].
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub version: Version,
    pub schema_file: String,
    pub constraints_file: String,
    pub tables: BTreeMap<String, TableArtifact>,
}

/// Handle on a backup directory's index.
#[derive(Debug, Clone)]
pub struct VersionIndex {
    root: PathBuf,
    doc: IndexDocument,
}

impl VersionIndex {
    /// Load the index under `root`, or start an empty one if none exists yet.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let index_path = root.join(INDEX_FILE);
        if !index_path.exists() {
            debug!(root = %root.display(), "No index found, starting empty");
            return Ok(Self {
                doc: IndexDocument::empty(&root),
                root,
            });
        }

        let mut doc: IndexDocument = store::read_json(&index_path)?;
        validate(&mut doc).map_err(|msg| DataBackError::serialization(&index_path, msg))?;
        debug!(
            root = %root.display(),
            versions = doc.table_schema.versions.len(),
            tables = doc.objects.tables.len(),
            "Loaded index"
        );
        Ok(Self { root, doc })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn latest_version(&self) -> Option<Version> {
        Version::new(self.doc.table_schema.versions.len() as u32)
    }

    pub fn next_version(&self) -> Version {
        self.latest_version()
            .map(Version::next)
            .unwrap_or(Version::FIRST)
    }

    /// Every recorded version, oldest first.
    pub fn versions(&self) -> Vec<Version> {
        (1..=self.doc.table_schema.versions.len() as u32)
            .map(Version)
            .collect()
    }

    /// `version`, or the latest one when omitted, checked against the index.
    pub fn resolve_version(&self, version: Option<Version>) -> Result<Version> {
        let latest = self
            .latest_version()
            .ok_or_else(|| DataBackError::VersionNotFound("no backups recorded".to_string()))?;
        match version {
            None => Ok(latest),
            Some(v) if v <= latest => Ok(v),
            Some(v) => Err(DataBackError::VersionNotFound(format!(
                "{} (latest is {})",
                v, latest
            ))),
        }
    }

    /// Path of the schema or constraints script for `version` (latest when omitted).
    pub fn resolve(&self, kind: ArtifactKind, version: Option<Version>) -> Result<PathBuf> {
        let version = self.resolve_version(version)?;
        let list = self.list(kind);
        let position = (version.number() - 1) as usize;
        let file = list
            .versions
            .get(position)
            .ok_or_else(|| DataBackError::VersionNotFound(version.to_string()))?;
        Ok(self.root.join(&list.path).join(file))
    }

    /// Where the script for a version being written goes.
    pub fn script_path(&self, kind: ArtifactKind, version: Version) -> PathBuf {
        self.root.join(&self.list(kind).path).join(kind.file_name(version))
    }

    fn list(&self, kind: ArtifactKind) -> &VersionList {
        match kind {
            ArtifactKind::Schema => &self.doc.table_schema,
            ArtifactKind::Constraints => &self.doc.constraints,
        }
    }

    /// Tables the index has a chain for, sorted by name.
    pub fn known_tables(&self) -> Vec<String> {
        self.doc.objects.tables.keys().cloned().collect()
    }

    /// Tables whose chain exists at `version`.
    pub fn tables_at(&self, version: Version) -> Vec<String> {
        self.doc
            .objects
            .tables
            .iter()
            .filter(|(_, entry)| entry.introduced <= version.number())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn table(&self, name: &str) -> Option<&TableEntry> {
        self.doc.objects.tables.get(name)
    }

    /// Directory holding `table`'s artifacts.
    pub fn table_dir(&self, table: &str) -> PathBuf {
        let objects = self.root.join(&self.doc.objects.path);
        match self.table(table) {
            Some(entry) => objects.join(entry.path.trim_start_matches('/')),
            None => objects.join(path_segment(table)),
        }
    }

    pub fn artifact_path(&self, table: &str, file: &str) -> PathBuf {
        self.table_dir(table).join(file)
    }

    pub fn current_path(&self, table: &str) -> PathBuf {
        let file = self
            .table(table)
            .map(|e| e.current.clone())
            .unwrap_or_else(|| current_file_name(table));
        self.artifact_path(table, &file)
    }

    /// Create the directory skeleton under the root.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.doc.constraints.path,
            &self.doc.table_schema.path,
            &self.doc.objects.path,
        ] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path).map_err(|e| DataBackError::io(&path, e))?;
        }
        Ok(())
    }

    /// Add one backup cycle's files to the in-memory index.
    ///
    /// The cycle must be the next version and must carry an artifact for every
    /// known table, so each chain stays one file per version.
    pub fn record_cycle(&mut self, cycle: CycleRecord) -> Result<()> {
        let expected = self.next_version();
        if cycle.version != expected {
            return Err(DataBackError::serialization(
                self.index_path(),
                format!("cycle {} recorded out of order, expected {}", cycle.version, expected),
            ));
        }
        for name in self.doc.objects.tables.keys() {
            if !matches!(cycle.tables.get(name), Some(TableArtifact::Delta(_))) {
                return Err(DataBackError::chain(
                    name,
                    format!("no delta recorded for {}", cycle.version),
                ));
            }
        }
        for (name, artifact) in &cycle.tables {
            if matches!(artifact, TableArtifact::Delta(_)) && self.table(name).is_none() {
                return Err(DataBackError::chain(name, "delta written for an unknown table"));
            }
        }

        self.doc.table_schema.versions.push(cycle.schema_file);
        self.doc.constraints.versions.push(cycle.constraints_file);

        for (name, artifact) in cycle.tables {
            match artifact {
                TableArtifact::Delta(file) => {
                    if let Some(entry) = self.doc.objects.tables.get_mut(&name) {
                        entry.incremental.push(file);
                    }
                }
                TableArtifact::Base(file) => {
                    self.doc.objects.tables.insert(
                        name.clone(),
                        TableEntry {
                            path: path_segment(&name),
                            base: file,
                            introduced: cycle.version.number(),
                            incremental: Vec::new(),
                            current: current_file_name(&name),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Delta file recorded for `table` at `version`.
    pub(crate) fn delta_file(&self, table: &str, version: Version) -> Option<&str> {
        let entry = self.table(table)?;
        let offset = version.number().checked_sub(entry.introduced + 1)? as usize;
        entry.incremental.get(offset).map(String::as_str)
    }

    /// Persist the index. This is the commit point of a backup cycle.
    pub fn save(&self) -> Result<()> {
        let path = self.index_path();
        store::write_json(&path, &self.doc)?;
        info!(path = %path.display(), latest = ?self.latest_version().map(|v| v.to_string()), "Saved index");
        Ok(())
    }
}

fn validate(doc: &mut IndexDocument) -> std::result::Result<(), String> {
    let schema = &doc.table_schema.versions;
    let constraints = &doc.constraints.versions;
    if schema.len() != constraints.len() {
        return Err(format!(
            "{} schema versions but {} constraint versions",
            schema.len(),
            constraints.len()
        ));
    }
    for (position, (schema_file, constraints_file)) in schema.iter().zip(constraints).enumerate() {
        let version = Version(position as u32 + 1);
        if *schema_file != ArtifactKind::Schema.file_name(version) {
            return Err(format!("schema entry {} is '{}'", version, schema_file));
        }
        if *constraints_file != ArtifactKind::Constraints.file_name(version) {
            return Err(format!("constraints entry {} is '{}'", version, constraints_file));
        }
    }

    let latest = schema.len() as u32;
    for (name, entry) in doc.objects.tables.iter_mut() {
        let mut files = [&entry.base, &entry.current].into_iter().chain(&entry.incremental);
        if !is_plain_component(entry.path.trim_start_matches('/'))
            || files.any(|f| !is_plain_component(f))
        {
            return Err(format!("table '{}' has a path outside its directory", name));
        }
        let deltas = entry.incremental.len() as u32;
        if entry.introduced == 0 {
            entry.introduced = latest.checked_sub(deltas).unwrap_or(0);
        }
        if entry.introduced == 0 || entry.last_version() != latest {
            return Err(format!(
                "table '{}' introduced in v{} with {} deltas does not reach v{}",
                name, entry.introduced, deltas, latest
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cycle(version: u32, tables: &[(&str, bool)]) -> CycleRecord {
        let version = Version(version);
        CycleRecord {
            version,
            schema_file: ArtifactKind::Schema.file_name(version),
            constraints_file: ArtifactKind::Constraints.file_name(version),
            tables: tables
                .iter()
                .map(|(name, base)| {
                    let artifact = if *base {
                        TableArtifact::Base(base_file_name(name, version))
                    } else {
                        TableArtifact::Delta(delta_file_name(name, version))
                    };
                    (name.to_string(), artifact)
                })
                .collect(),
        }
    }

    #[test]
    fn version_parsing_is_strict() {
        assert_eq!("v3".parse::<Version>().unwrap(), Version(3));
        assert_eq!(Version(12).to_string(), "v12");
        for bad in ["3", "v", "v0", "V3", "v-1", "v3a", " v3", "v+3"] {
            let err = bad.parse::<Version>().unwrap_err();
            assert!(matches!(err, DataBackError::InvalidVersion(_)), "{bad}");
        }
    }

    #[test]
    fn empty_index_starts_at_v1() {
        let temp = TempDir::new().unwrap();
        let index = VersionIndex::open(temp.path()).unwrap();
        assert_eq!(index.next_version(), Version::FIRST);
        assert!(index.latest_version().is_none());
        assert!(matches!(
            index.resolve(ArtifactKind::Schema, None),
            Err(DataBackError::VersionNotFound(_))
        ));
    }

    #[test]
    fn record_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let mut index = VersionIndex::open(temp.path()).unwrap();
        index.record_cycle(cycle(1, &[("users", true)])).unwrap();
        index
            .record_cycle(cycle(2, &[("users", false), ("orders", true)]))
            .unwrap();
        index.save().unwrap();

        let reloaded = VersionIndex::open(temp.path()).unwrap();
        assert_eq!(reloaded.latest_version(), Some(Version(2)));
        assert_eq!(reloaded.known_tables(), vec!["orders", "users"]);
        assert_eq!(reloaded.tables_at(Version(1)), vec!["users"]);

        let users = reloaded.table("users").unwrap();
        assert_eq!(users.base, "users_v1.json");
        assert_eq!(users.introduced, 1);
        assert_eq!(users.incremental, vec!["users_incremental_v2.json"]);
        assert_eq!(reloaded.table("orders").unwrap().introduced, 2);

        let v1 = reloaded.resolve(ArtifactKind::Constraints, Some(Version(1))).unwrap();
        assert!(v1.ends_with("constraints/add_constraints_v1.sql"));
        let latest = reloaded.resolve(ArtifactKind::Schema, None).unwrap();
        assert!(latest.ends_with("tableSchema/create_tables_v2.sql"));
        assert!(matches!(
            reloaded.resolve(ArtifactKind::Schema, Some(Version(3))),
            Err(DataBackError::VersionNotFound(_))
        ));
    }

    #[test]
    fn resolve_uses_integer_position_not_substring() {
        let temp = TempDir::new().unwrap();
        let mut index = VersionIndex::open(temp.path()).unwrap();
        for v in 1..=11 {
            index.record_cycle(cycle(v, &[])).unwrap();
        }
        let path = index.resolve(ArtifactKind::Schema, Some(Version(1))).unwrap();
        assert!(path.ends_with("create_tables_v1.sql"));
        let path = index.resolve(ArtifactKind::Schema, Some(Version(11))).unwrap();
        assert!(path.ends_with("create_tables_v11.sql"));
    }

    #[test]
    fn cycle_must_cover_known_tables() {
        let temp = TempDir::new().unwrap();
        let mut index = VersionIndex::open(temp.path()).unwrap();
        index.record_cycle(cycle(1, &[("users", true)])).unwrap();

        let err = index.record_cycle(cycle(2, &[])).unwrap_err();
        assert!(matches!(err, DataBackError::ChainIntegrity { .. }));
        let err = index.record_cycle(cycle(3, &[("users", false)])).unwrap_err();
        assert!(matches!(err, DataBackError::Serialization { .. }));
    }

    #[test]
    fn legacy_index_without_introduced_is_filled_in() {
        let temp = TempDir::new().unwrap();
        let legacy = serde_json::json!({
            "path": "./BackupData",
            "constraints": {"path": "constraints", "versions": ["add_constraints_v1.sql", "add_constraints_v2.sql"]},
            "tableSchema": {"path": "tableSchema", "versions": ["create_tables_v1.sql", "create_tables_v2.sql"]},
            "objects": {"path": "objects", "tables": {
                "users": {"path": "/users", "basis": "users_v1.json",
                          "incremental": ["users_incremental_v2.json"], "current": "users_current.json"}
            }}
        });
        fs::write(temp.path().join(INDEX_FILE), legacy.to_string()).unwrap();

        let index = VersionIndex::open(temp.path()).unwrap();
        let users = index.table("users").unwrap();
        assert_eq!(users.introduced, 1);
        assert_eq!(users.base, "users_v1.json");
        assert!(index.table_dir("users").ends_with("objects/users"));
        assert_eq!(index.delta_file("users", Version(2)), Some("users_incremental_v2.json"));
        assert_eq!(index.delta_file("users", Version(1)), None);
    }

    #[test]
    fn gaps_in_version_lists_are_rejected() {
        let temp = TempDir::new().unwrap();
        let doc = serde_json::json!({
            "path": ".",
            "constraints": {"path": "constraints", "versions": ["add_constraints_v1.sql", "add_constraints_v3.sql"]},
            "tableSchema": {"path": "tableSchema", "versions": ["create_tables_v1.sql", "create_tables_v3.sql"]},
            "objects": {"path": "objects", "tables": {}}
        });
        fs::write(temp.path().join(INDEX_FILE), doc.to_string()).unwrap();

        let err = VersionIndex::open(temp.path()).unwrap_err();
        assert!(matches!(err, DataBackError::Serialization { .. }));
    }

    #[test]
    fn short_chain_is_rejected() {
        let temp = TempDir::new().unwrap();
        let doc = serde_json::json!({
            "path": ".",
            "constraints": {"path": "constraints", "versions": ["add_constraints_v1.sql", "add_constraints_v2.sql"]},
            "tableSchema": {"path": "tableSchema", "versions": ["create_tables_v1.sql", "create_tables_v2.sql"]},
            "objects": {"path": "objects", "tables": {
                "users": {"path": "users", "base": "users_v1.json", "introduced": 1,
                          "incremental": [], "current": "users_current.json"}
            }}
        });
        fs::write(temp.path().join(INDEX_FILE), doc.to_string()).unwrap();

        assert!(VersionIndex::open(temp.path()).is_err());
    }

    #[test]
    fn table_names_become_single_path_components() {
        assert_eq!(path_segment("users"), "users");
        assert_eq!(path_segment("order-items_2"), "order-items_2");
        assert_eq!(path_segment("../../escaped"), "%2E%2E%2F%2E%2E%2Fescaped");
        assert_eq!(path_segment("a b%"), "a%20b%25");
        assert_eq!(path_segment("café"), "caf%C3%A9");
        assert_ne!(path_segment("a.b"), path_segment("a_b"));
        assert_eq!(base_file_name("..", Version(2)), "%2E%2E_v2.json");

        let index = VersionIndex::open("/backups").unwrap();
        assert_eq!(
            index.table_dir("../x"),
            PathBuf::from("/backups/objects/%2E%2E%2Fx")
        );
    }

    #[test]
    fn index_paths_escaping_objects_are_rejected() {
        let temp = TempDir::new().unwrap();
        let doc = serde_json::json!({
            "path": ".",
            "constraints": {"path": "constraints", "versions": ["add_constraints_v1.sql"]},
            "tableSchema": {"path": "tableSchema", "versions": ["create_tables_v1.sql"]},
            "objects": {"path": "objects", "tables": {
                "users": {"path": "../..", "base": "users_v1.json", "introduced": 1,
                          "incremental": [], "current": "users_current.json"}
            }}
        });
        fs::write(temp.path().join(INDEX_FILE), doc.to_string()).unwrap();
        let err = VersionIndex::open(temp.path()).unwrap_err();
        assert!(err.to_string().contains("outside its directory"));

        let doc = serde_json::json!({
            "path": ".",
            "constraints": {"path": "constraints", "versions": ["add_constraints_v1.sql"]},
            "tableSchema": {"path": "tableSchema", "versions": ["create_tables_v1.sql"]},
            "objects": {"path": "objects", "tables": {
                "users": {"path": "users", "base": "../../etc/users_v1.json", "introduced": 1,
                          "incremental": [], "current": "users_current.json"}
            }}
        });
        fs::write(temp.path().join(INDEX_FILE), doc.to_string()).unwrap();
        assert!(VersionIndex::open(temp.path()).is_err());
    }
}
