//! INSERT statement generation for restored rows.

use crate::catalog::ColumnDefinition;
use crate::ddl::quote_ident;
use crate::value::{Payload, Scalar, Snapshot};
use chrono::DateTime;

/// Render one value as a SQL literal.
///
/// Integers bound for DATE or TIMESTAMP columns are epoch milliseconds and
/// render as quoted calendar values; every other number is emitted verbatim.
pub fn sql_literal(value: &Scalar, column: Option<&ColumnDefinition>) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        Scalar::Bool(true) => "TRUE".to_string(),
        Scalar::Bool(false) => "FALSE".to_string(),
        Scalar::String(s) => quote_literal(s),
        Scalar::Number(n) => match (column, n.as_i64()) {
            (Some(col), Some(millis)) if col.is_temporal() => {
                temporal_literal(millis, col).unwrap_or_else(|| n.to_string())
            }
            _ => n.to_string(),
        },
    }
}

fn temporal_literal(millis: i64, column: &ColumnDefinition) -> Option<String> {
    let at = DateTime::from_timestamp_millis(millis)?;
    let text = if column.is_date() {
        at.format("%Y-%m-%d").to_string()
    } else if column.source_type.to_ascii_lowercase().contains("with time zone")
        || column.source_type.eq_ignore_ascii_case("timestamptz")
    {
        at.format("%Y-%m-%d %H:%M:%S%.3f+00").to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    };
    Some(quote_literal(&text))
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// One INSERT for `payload`.
///
/// `columns` are the destination's columns in ordinal order. Auto-increment
/// columns are skipped so the destination generates them. With no column
/// information the payload's own columns are used.
pub fn insert_statement(table: &str, columns: &[ColumnDefinition], payload: &Payload) -> String {
    let mut names = Vec::new();
    let mut values = Vec::new();

    if columns.is_empty() {
        for (name, value) in payload {
            names.push(quote_ident(name));
            values.push(sql_literal(value, None));
        }
    } else {
        for column in columns.iter().filter(|c| !c.auto_increment) {
            if let Some(value) = payload.get(&column.name) {
                names.push(quote_ident(&column.name));
                values.push(sql_literal(value, Some(column)));
            }
        }
    }

    if names.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES;", quote_ident(table));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(table),
        names.join(", "),
        values.join(", ")
    )
}

/// INSERTs for every row of `snapshot`.
pub fn insert_statements(table: &str, columns: &[ColumnDefinition], snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .payloads()
        .map(|payload| insert_statement(table, columns, payload))
        .collect()
}
