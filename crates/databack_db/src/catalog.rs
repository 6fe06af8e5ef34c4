//! `information_schema` reads and statement execution for the engine.

use crate::connection::DbConnection;
use crate::error::BackendError;
use databack_core::ddl::quote_ident;
use databack_core::{
    CatalogSource, ColumnDefinition, ConstraintDefinition, Payload, Scalar, SourceError,
    StatementExecutor,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::debug;

const LIST_TABLES_SQL: &str = "\
SELECT table_name::text AS table_name
FROM information_schema.tables
WHERE table_schema = $1 AND table_type = 'BASE TABLE'
ORDER BY table_name";

const COLUMNS_SQL: &str = "\
SELECT column_name::text AS column_name,
       data_type::text AS data_type,
       udt_name::text AS udt_name,
       is_nullable::text AS is_nullable,
       column_default::text AS column_default,
       is_identity::text AS is_identity,
       character_maximum_length::int4 AS char_max_length,
       numeric_precision::int4 AS numeric_precision,
       numeric_scale::int4 AS numeric_scale
FROM information_schema.columns
WHERE table_schema = $1 AND table_name = $2
ORDER BY ordinal_position";

// PRIMARY KEY and UNIQUE, one row per key column in key order.
const KEY_COLUMNS_SQL: &str = "\
SELECT tc.constraint_name::text AS constraint_name,
       kcu.column_name::text AS column_name
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = tc.constraint_schema
 AND kcu.constraint_name = tc.constraint_name
 AND kcu.table_name = tc.table_name
WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = $3
ORDER BY tc.constraint_name, kcu.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "\
SELECT kcu.constraint_name::text AS constraint_name,
       kcu.column_name::text AS column_name,
       rcu.table_name::text AS referenced_table,
       rcu.column_name::text AS referenced_column
FROM information_schema.referential_constraints rc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = rc.constraint_schema
 AND kcu.constraint_name = rc.constraint_name
JOIN information_schema.key_column_usage rcu
  ON rcu.constraint_schema = rc.unique_constraint_schema
 AND rcu.constraint_name = rc.unique_constraint_name
 AND rcu.ordinal_position = kcu.position_in_unique_constraint
WHERE kcu.table_schema = $1 AND kcu.table_name = $2
ORDER BY kcu.constraint_name, kcu.ordinal_position";

const CHECKS_SQL: &str = "\
SELECT tc.constraint_name::text AS constraint_name,
       cc.check_clause::text AS check_clause
FROM information_schema.table_constraints tc
JOIN information_schema.check_constraints cc
  ON cc.constraint_schema = tc.constraint_schema
 AND cc.constraint_name = tc.constraint_name
WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'CHECK'
ORDER BY tc.constraint_name";

impl DbConnection {
    pub fn list_tables(&mut self) -> Result<Vec<String>, BackendError> {
        let schema = self.schema().to_string();
        let schema = schema.as_str();
        let rows = self.query_all(LIST_TABLES_SQL, &[schema])?;
        rows.iter()
            .map(|row| get::<String>(row, "table_name"))
            .collect()
    }

    pub fn columns_of(&mut self, table: &str) -> Result<Vec<ColumnDefinition>, BackendError> {
        let schema = self.schema().to_string();
        let schema = schema.as_str();
        let rows = self.query_all(COLUMNS_SQL, &[schema, table])?;
        rows.iter().map(column_from_row).collect()
    }

    pub fn constraints_of(&mut self, table: &str) -> Result<Vec<ConstraintDefinition>, BackendError> {
        let schema = self.schema().to_string();
        let schema = schema.as_str();
        let mut constraints = Vec::new();

        let rows = self.query_all(KEY_COLUMNS_SQL, &[schema, table, "PRIMARY KEY"])?;
        for (name, columns) in group_columns(&rows)? {
            constraints.push(ConstraintDefinition::primary_key(table, Some(&name), columns));
        }

        let rows = self.query_all(FOREIGN_KEYS_SQL, &[schema, table])?;
        let mut foreign: Vec<(String, Vec<String>, String, Vec<String>)> = Vec::new();
        for row in &rows {
            let name = get::<String>(row, "constraint_name")?;
            let column = get::<String>(row, "column_name")?;
            let referenced_table = get::<String>(row, "referenced_table")?;
            let referenced_column = get::<String>(row, "referenced_column")?;
            match foreign.last_mut() {
                Some((last, columns, _, referenced)) if *last == name => {
                    columns.push(column);
                    referenced.push(referenced_column);
                }
                _ => foreign.push((name, vec![column], referenced_table, vec![referenced_column])),
            }
        }
        for (name, columns, referenced_table, referenced_columns) in foreign {
            constraints.push(ConstraintDefinition::foreign_key(
                table,
                Some(&name),
                columns,
                &referenced_table,
                referenced_columns,
            ));
        }

        let rows = self.query_all(KEY_COLUMNS_SQL, &[schema, table, "UNIQUE"])?;
        for (name, columns) in group_columns(&rows)? {
            constraints.push(ConstraintDefinition::unique(table, Some(&name), columns));
        }

        let rows = self.query_all(CHECKS_SQL, &[schema, table])?;
        for row in &rows {
            let name = get::<String>(row, "constraint_name")?;
            let clause = get::<String>(row, "check_clause")?;
            if is_not_null_check(&name, &clause) {
                continue;
            }
            constraints.push(ConstraintDefinition::check(table, Some(&name), &clause));
        }

        debug!(table, constraints = constraints.len(), "Read constraints");
        Ok(constraints)
    }

    /// Every row of `table`, one JSON object per row.
    pub fn fetch_all_rows(&mut self, table: &str) -> Result<Vec<Payload>, BackendError> {
        let sql = format!(
            "SELECT row_to_json(t)::text AS row FROM {}.{} AS t",
            quote_ident(self.schema()),
            quote_ident(table)
        );
        let rows = self.query_all(&sql, &[])?;
        rows.iter()
            .map(|row| payload_from_json(&get::<String>(row, "row")?))
            .collect()
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, BackendError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    Ok(row.try_get::<T, _>(column)?)
}

fn column_from_row(row: &PgRow) -> Result<ColumnDefinition, BackendError> {
    let name = get::<String>(row, "column_name")?;
    let data_type = get::<String>(row, "data_type")?;
    let udt_name = get::<String>(row, "udt_name")?;
    let nullable = get::<String>(row, "is_nullable")? == "YES";
    let default = get::<Option<String>>(row, "column_default")?;
    let identity = get::<Option<String>>(row, "is_identity")?.as_deref() == Some("YES");
    let char_max_length = get::<Option<i32>>(row, "char_max_length")?;
    let numeric_precision = get::<Option<i32>>(row, "numeric_precision")?;
    let numeric_scale = get::<Option<i32>>(row, "numeric_scale")?;

    let source_type = source_type(&data_type, &udt_name);
    let numeric = matches!(source_type.as_str(), "numeric" | "decimal");

    Ok(ColumnDefinition::new(name, source_type, nullable, default)
        .with_identity(identity)
        .with_char_max_length(char_max_length.and_then(|v| u32::try_from(v).ok()))
        .with_numeric(
            numeric_precision.filter(|_| numeric).and_then(|v| u32::try_from(v).ok()),
            numeric_scale.filter(|_| numeric).and_then(|v| u32::try_from(v).ok()),
        ))
}

/// Type name to carry into DDL: arrays and user-defined types use the
/// underlying type name, everything else the SQL-standard name.
fn source_type(data_type: &str, udt_name: &str) -> String {
    match data_type {
        "ARRAY" => format!("{}[]", udt_name.trim_start_matches('_')),
        "USER-DEFINED" => udt_name.to_string(),
        other => other.to_string(),
    }
}

/// Group `(constraint_name, column_name)` rows by constraint, keeping order.
fn group_columns(rows: &[PgRow]) -> Result<Vec<(String, Vec<String>)>, BackendError> {
    let mut pairs = Vec::with_capacity(rows.len());
    for row in rows {
        pairs.push((
            get::<String>(row, "constraint_name")?,
            get::<String>(row, "column_name")?,
        ));
    }
    Ok(group_pairs(pairs))
}

fn group_pairs(pairs: Vec<(String, String)>) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (name, column) in pairs {
        match grouped.last_mut() {
            Some((last, columns)) if *last == name => columns.push(column),
            _ => grouped.push((name, vec![column])),
        }
    }
    grouped
}

/// Older servers report NOT NULL as CHECK constraints named `..._not_null`.
/// Nullability already comes from the column definitions.
fn is_not_null_check(name: &str, clause: &str) -> bool {
    name.ends_with("_not_null") && clause.trim_end().to_ascii_uppercase().ends_with("IS NOT NULL")
}

fn payload_from_json(text: &str) -> Result<Payload, BackendError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| BackendError::decode("row_to_json", e.to_string()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(column, value)| (column, Scalar::from_json(value)))
            .collect()),
        other => Err(BackendError::decode(
            "row_to_json",
            format!("expected an object, got {}", other),
        )),
    }
}

impl CatalogSource for DbConnection {
    fn list_tables(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(DbConnection::list_tables(self)?)
    }

    fn columns_of(&mut self, table: &str) -> Result<Vec<ColumnDefinition>, SourceError> {
        Ok(DbConnection::columns_of(self, table)?)
    }

    fn constraints_of(&mut self, table: &str) -> Result<Vec<ConstraintDefinition>, SourceError> {
        Ok(DbConnection::constraints_of(self, table)?)
    }

    fn fetch_all_rows(&mut self, table: &str) -> Result<Vec<Payload>, SourceError> {
        Ok(DbConnection::fetch_all_rows(self, table)?)
    }
}

impl StatementExecutor for DbConnection {
    fn execute(&mut self, statement: &str) -> Result<(), SourceError> {
        Ok(self.execute_batch(statement)?)
    }
}
