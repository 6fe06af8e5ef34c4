//! Schema and constraint script generation.
//!
//! Tables are created bare: every constraint, NOT NULL included, is a separate
//! `ALTER TABLE` in the constraints script, which runs after the data load.
//! Creation order therefore never depends on foreign keys. Foreign keys are
//! emitted after every table's keys so the referenced keys already exist:
//! written table by table, PostgreSQL rejects a foreign key whose referenced
//! table comes later in the script, since its primary or unique key has not
//! been added yet.

use crate::catalog::{ColumnDefinition, ConstraintDefinition, ConstraintKind, TableDefinition};
use crate::catalog::is_sequence_default;
use std::fmt::Write as _;

/// `CREATE TABLE` statements for every table, in the given order.
pub fn generate_schema(tables: &[TableDefinition]) -> String {
    let mut script = String::new();
    for table in tables {
        let columns: Vec<String> = table.columns.iter().map(column_clause).collect();
        let _ = write!(
            script,
            "CREATE TABLE {} (\n    {}\n);\n\n",
            quote_ident(&table.name),
            columns.join(",\n    ")
        );
    }
    script
}

fn column_clause(column: &ColumnDefinition) -> String {
    if column.auto_increment {
        return format!("{} {}", quote_ident(&column.name), column.serial_type());
    }
    match column.default.as_deref() {
        Some(default) if !is_sequence_default(default) => format!(
            "{} {} DEFAULT {}",
            quote_ident(&column.name),
            column.normalized_type,
            default
        ),
        _ => format!("{} {}", quote_ident(&column.name), column.normalized_type),
    }
}

/// `ALTER TABLE` statements adding every constraint.
///
/// First pass, per table: NOT NULL for each non-nullable column, the primary
/// key, UNIQUE and CHECK constraints. Second pass, per table: foreign keys.
pub fn generate_constraints(tables: &[TableDefinition]) -> String {
    let mut script = String::new();

    for table in tables {
        let name = quote_ident(&table.name);

        let mut not_null: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| !c.nullable)
            .map(|c| c.name.as_str())
            .collect();
        for constraint in of_kind(table, ConstraintKind::NotNull) {
            for column in &constraint.columns {
                if !not_null.contains(&column.as_str()) {
                    not_null.push(column);
                }
            }
        }
        for column in not_null {
            let _ = writeln!(
                script,
                "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                name,
                quote_ident(column)
            );
        }

        if let Some(pk) = of_kind(table, ConstraintKind::PrimaryKey).next() {
            if !pk.columns.is_empty() {
                let _ = writeln!(
                    script,
                    "ALTER TABLE {} ADD {}PRIMARY KEY ({});",
                    name,
                    constraint_prefix(pk),
                    ident_list(&pk.columns)
                );
            }
        }

        for unique in of_kind(table, ConstraintKind::Unique) {
            let _ = writeln!(
                script,
                "ALTER TABLE {} ADD {}UNIQUE ({});",
                name,
                constraint_prefix(unique),
                ident_list(&unique.columns)
            );
        }

        for check in of_kind(table, ConstraintKind::Check) {
            if let Some(expression) = check.expression.as_deref() {
                let _ = writeln!(
                    script,
                    "ALTER TABLE {} ADD {}CHECK ({});",
                    name,
                    constraint_prefix(check),
                    strip_outer_parens(expression)
                );
            }
        }
    }

    for table in tables {
        for fk in of_kind(table, ConstraintKind::ForeignKey) {
            let Some(referenced) = fk.referenced_table.as_deref() else {
                continue;
            };
            let _ = writeln!(
                script,
                "ALTER TABLE {} ADD {}FOREIGN KEY ({}) REFERENCES {}({});",
                quote_ident(&table.name),
                constraint_prefix(fk),
                ident_list(&fk.columns),
                quote_ident(referenced),
                ident_list(&fk.referenced_columns)
            );
        }
    }

    script
}

/// Names of the tables a schema script creates, in script order.
pub fn created_tables(script: &str) -> Vec<String> {
    script
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("CREATE TABLE "))
        .filter_map(|rest| unquote_leading_ident(rest.trim_start()))
        .collect()
}

fn of_kind(
    table: &TableDefinition,
    kind: ConstraintKind,
) -> impl Iterator<Item = &ConstraintDefinition> {
    table.constraints.iter().filter(move |c| c.kind == kind)
}

fn constraint_prefix(constraint: &ConstraintDefinition) -> String {
    match constraint.name.as_deref() {
        Some(name) => format!("CONSTRAINT {} ", quote_ident(name)),
        None => String::new(),
    }
}

fn ident_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

// Catalogs report CHECK clauses with or without their own parentheses.
fn strip_outer_parens(expression: &str) -> &str {
    let trimmed = expression.trim();
    if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
        return trimmed;
    }
    let mut depth = 0i32;
    for (i, ch) in trimmed.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != trimmed.len() - 1 {
                    return trimmed;
                }
            }
            _ => {}
        }
    }
    &trimmed[1..trimmed.len() - 1]
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

fn unquote_leading_ident(text: &str) -> Option<String> {
    let mut chars = text.strip_prefix('"')?.chars().peekable();
    let mut name = String::new();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                name.push('"');
            } else {
                return Some(name);
            }
        } else {
            name.push(ch);
        }
    }
    None
}
