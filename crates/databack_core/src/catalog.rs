//! Catalog descriptors and the collaborator traits the engine drives.
//!
//! The engine never talks to a database directly. A backup reads through a
//! [`CatalogSource`]; a restore additionally needs a [`StatementExecutor`] on
//! the destination.

use crate::error::SourceError;
use crate::type_map::normalize_type;
use crate::value::Payload;
use serde::{Deserialize, Serialize};

/// One column of a table as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Type name as the catalog reports it, e.g. `character varying`.
    pub source_type: String,
    /// Portable type used in generated DDL, e.g. `VARCHAR(64)`.
    pub normalized_type: String,
    pub nullable: bool,
    /// Default expression text, verbatim.
    pub default: Option<String>,
    /// Value generated by the database (sequence default or identity).
    pub auto_increment: bool,
    pub char_max_length: Option<u32>,
    pub numeric_precision: Option<u32>,
    pub numeric_scale: Option<u32>,
}

impl ColumnDefinition {
    /// Build a column, deriving the normalized type and auto-increment flag.
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        nullable: bool,
        default: Option<String>,
    ) -> Self {
        let source_type = source_type.into();
        let auto_increment = default
            .as_deref()
            .map(is_sequence_default)
            .unwrap_or(false);
        Self {
            name: name.into(),
            normalized_type: normalize_type(&source_type, None, None, None),
            source_type,
            nullable,
            default,
            auto_increment,
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    /// Mark the column as an identity column.
    pub fn with_identity(mut self, identity: bool) -> Self {
        self.auto_increment |= identity;
        self
    }

    pub fn with_char_max_length(mut self, length: Option<u32>) -> Self {
        self.char_max_length = length;
        self.renormalize();
        self
    }

    pub fn with_numeric(mut self, precision: Option<u32>, scale: Option<u32>) -> Self {
        self.numeric_precision = precision;
        self.numeric_scale = scale;
        self.renormalize();
        self
    }

    fn renormalize(&mut self) {
        self.normalized_type = normalize_type(
            &self.source_type,
            self.char_max_length,
            self.numeric_precision,
            self.numeric_scale,
        );
    }

    /// DDL type for a generated column: the serial flavour matching its width.
    pub fn serial_type(&self) -> &'static str {
        match self.source_type.as_str() {
            "bigint" | "int8" => "BIGSERIAL",
            "smallint" | "int2" => "SMALLSERIAL",
            _ => "SERIAL",
        }
    }

    /// True when values for this column are calendar values.
    pub fn is_temporal(&self) -> bool {
        let t = self.source_type.to_ascii_lowercase();
        t == "date" || t.starts_with("timestamp")
    }

    pub fn is_date(&self) -> bool {
        self.source_type.eq_ignore_ascii_case("date")
    }
}

/// Sequence-generator default, e.g. `nextval('users_id_seq'::regclass)`.
pub fn is_sequence_default(default: &str) -> bool {
    default.trim_start().to_ascii_lowercase().starts_with("nextval(")
}

/// Constraint kinds carried in a [`ConstraintDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    NotNull,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::Check => "CHECK",
            ConstraintKind::NotNull => "NOT NULL",
        }
    }
}

/// A table constraint as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDefinition {
    pub kind: ConstraintKind,
    pub table: String,
    pub name: Option<String>,
    /// Constrained columns, in key order.
    pub columns: Vec<String>,
    pub referenced_table: Option<String>,
    pub referenced_columns: Vec<String>,
    /// CHECK expression text, verbatim.
    pub expression: Option<String>,
}

impl ConstraintDefinition {
    fn bare(kind: ConstraintKind, table: &str, name: Option<&str>, columns: Vec<String>) -> Self {
        Self {
            kind,
            table: table.to_string(),
            name: name.map(str::to_string),
            columns,
            referenced_table: None,
            referenced_columns: Vec::new(),
            expression: None,
        }
    }

    pub fn primary_key(table: &str, name: Option<&str>, columns: Vec<String>) -> Self {
        Self::bare(ConstraintKind::PrimaryKey, table, name, columns)
    }

    pub fn unique(table: &str, name: Option<&str>, columns: Vec<String>) -> Self {
        Self::bare(ConstraintKind::Unique, table, name, columns)
    }

    pub fn not_null(table: &str, column: &str) -> Self {
        Self::bare(ConstraintKind::NotNull, table, None, vec![column.to_string()])
    }

    pub fn foreign_key(
        table: &str,
        name: Option<&str>,
        columns: Vec<String>,
        referenced_table: &str,
        referenced_columns: Vec<String>,
    ) -> Self {
        Self {
            referenced_table: Some(referenced_table.to_string()),
            referenced_columns,
            ..Self::bare(ConstraintKind::ForeignKey, table, name, columns)
        }
    }

    pub fn check(table: &str, name: Option<&str>, expression: &str) -> Self {
        Self {
            expression: Some(expression.to_string()),
            ..Self::bare(ConstraintKind::Check, table, name, Vec::new())
        }
    }
}

/// Everything the DDL generator needs to know about one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub constraints: Vec<ConstraintDefinition>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Catalog and row reads against a live database.
pub trait CatalogSource {
    /// Names of all user tables, in a stable order.
    fn list_tables(&mut self) -> Result<Vec<String>, SourceError>;

    /// Columns of `table` in ordinal order.
    fn columns_of(&mut self, table: &str) -> Result<Vec<ColumnDefinition>, SourceError>;

    /// PRIMARY KEY, FOREIGN KEY, UNIQUE and CHECK constraints of `table`.
    ///
    /// NOT NULL is derived from column nullability and need not be reported.
    fn constraints_of(&mut self, table: &str) -> Result<Vec<ConstraintDefinition>, SourceError>;

    /// Every row of `table`.
    fn fetch_all_rows(&mut self, table: &str) -> Result<Vec<Payload>, SourceError>;
}

/// Statement execution against a destination database.
pub trait StatementExecutor {
    /// Execute statement text. The text may hold several `;`-separated statements.
    fn execute(&mut self, statement: &str) -> Result<(), SourceError>;
}
