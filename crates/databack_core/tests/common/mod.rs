//! In-memory database standing in for a live source/destination.

#![allow(dead_code)]

use databack_core::ddl::created_tables;
use databack_core::{
    CatalogSource, ColumnDefinition, ConstraintDefinition, Payload, Scalar, SourceError,
    StatementExecutor,
};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: Vec<ColumnDefinition>,
    pub constraints: Vec<ConstraintDefinition>,
    pub rows: Vec<Payload>,
}

/// Catalog and executor backed by plain maps.
///
/// Executing a schema script creates the named tables with the columns last
/// seen for them; DROP statements remove tables. Everything executed is
/// recorded in `executed`.
#[derive(Debug, Default)]
pub struct FakeDatabase {
    pub tables: BTreeMap<String, FakeTable>,
    pub executed: Vec<String>,
    pub fail_schema_for: HashSet<String>,
    pub fail_rows_for: HashSet<String>,
    pub offline: bool,
    remembered: HashMap<String, Vec<ColumnDefinition>>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(
        &mut self,
        name: &str,
        columns: Vec<ColumnDefinition>,
        constraints: Vec<ConstraintDefinition>,
    ) {
        self.remembered.insert(name.to_string(), columns.clone());
        self.tables.insert(
            name.to_string(),
            FakeTable {
                columns,
                constraints,
                rows: Vec::new(),
            },
        );
    }

    /// Columns to give `name` when a schema script creates it.
    pub fn remember(&mut self, name: &str, columns: Vec<ColumnDefinition>) {
        self.remembered.insert(name.to_string(), columns);
    }

    pub fn set_rows(&mut self, table: &str, rows: Vec<Payload>) {
        self.tables
            .get_mut(table)
            .unwrap_or_else(|| panic!("no table {table}"))
            .rows = rows;
    }

    pub fn drop_table(&mut self, table: &str) {
        self.tables.remove(table);
    }

    /// Executed statements starting with `prefix`.
    pub fn executed_starting_with(&self, prefix: &str) -> Vec<&str> {
        self.executed
            .iter()
            .filter(|s| s.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    pub fn inserts_into(&self, table: &str) -> Vec<&str> {
        self.executed_starting_with(&format!("INSERT INTO \"{}\"", table))
    }

    fn table(&self, name: &str) -> Result<&FakeTable, SourceError> {
        self.tables
            .get(name)
            .ok_or_else(|| SourceError::Query(format!("relation \"{}\" does not exist", name)))
    }

    fn check_online(&self) -> Result<(), SourceError> {
        if self.offline {
            return Err(SourceError::Connection("connection refused".to_string()));
        }
        Ok(())
    }
}

impl CatalogSource for FakeDatabase {
    fn list_tables(&mut self) -> Result<Vec<String>, SourceError> {
        self.check_online()?;
        Ok(self.tables.keys().cloned().collect())
    }

    fn columns_of(&mut self, table: &str) -> Result<Vec<ColumnDefinition>, SourceError> {
        self.check_online()?;
        if self.fail_schema_for.contains(table) {
            return Err(SourceError::Query(format!("permission denied for {}", table)));
        }
        Ok(self.table(table)?.columns.clone())
    }

    fn constraints_of(&mut self, table: &str) -> Result<Vec<ConstraintDefinition>, SourceError> {
        self.check_online()?;
        Ok(self.table(table)?.constraints.clone())
    }

    fn fetch_all_rows(&mut self, table: &str) -> Result<Vec<Payload>, SourceError> {
        self.check_online()?;
        if self.fail_rows_for.contains(table) {
            return Err(SourceError::Query(format!("canceling statement on {}", table)));
        }
        Ok(self.table(table)?.rows.clone())
    }
}

impl StatementExecutor for FakeDatabase {
    fn execute(&mut self, statement: &str) -> Result<(), SourceError> {
        self.check_online()?;
        self.executed.push(statement.to_string());

        if let Some(rest) = statement.strip_prefix("DROP TABLE IF EXISTS ") {
            for name in created_tables(&format!("CREATE TABLE {}", rest)) {
                self.tables.remove(&name);
            }
        } else if statement.starts_with("CREATE TABLE ") {
            for name in created_tables(statement) {
                let columns = self.remembered.get(&name).cloned().unwrap_or_default();
                self.tables.insert(
                    name,
                    FakeTable {
                        columns,
                        ..FakeTable::default()
                    },
                );
            }
        }
        Ok(())
    }
}

pub fn serial_id() -> ColumnDefinition {
    ColumnDefinition::new(
        "id",
        "integer",
        false,
        Some("nextval('users_id_seq'::regclass)".to_string()),
    )
}

pub fn text(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, "text", true, None)
}

/// `{"id": id, "name": name}`
pub fn named(id: i64, name: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("id".to_string(), Scalar::from(id));
    p.insert("name".to_string(), Scalar::from(name));
    p
}
