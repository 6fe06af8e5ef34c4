//! Catalog type name -> DDL type name.
//!
//! The mapping is total: unknown types pass through unchanged.

/// Map a catalog type to the type written into generated DDL.
///
/// Length and precision modifiers are appended for the character and numeric
/// families when the catalog reports them.
pub fn normalize_type(
    source_type: &str,
    char_max_length: Option<u32>,
    numeric_precision: Option<u32>,
    numeric_scale: Option<u32>,
) -> String {
    let lowered = source_type.trim().to_ascii_lowercase();
    let base = base_type(&lowered).unwrap_or(source_type);

    match lowered.as_str() {
        "character varying" | "varchar" | "character" | "char" | "bpchar" => match char_max_length {
            Some(len) => format!("{}({})", base, len),
            None => base.to_string(),
        },
        "numeric" | "decimal" => match (numeric_precision, numeric_scale) {
            (Some(p), Some(s)) => format!("{}({},{})", base, p, s),
            (Some(p), None) => format!("{}({})", base, p),
            _ => base.to_string(),
        },
        _ => base.to_string(),
    }
}

fn base_type(lowered: &str) -> Option<&'static str> {
    let mapped = match lowered {
        "integer" | "int4" => "INT",
        "bigint" | "int8" => "BIGINT",
        "smallint" | "int2" => "SMALLINT",
        "character varying" | "varchar" => "VARCHAR",
        "character" | "char" | "bpchar" => "CHAR",
        "text" => "TEXT",
        "boolean" | "bool" => "BOOLEAN",
        "numeric" | "decimal" => "NUMERIC",
        "real" | "float4" => "REAL",
        "double precision" | "float8" => "DOUBLE PRECISION",
        "date" => "DATE",
        "timestamp without time zone" | "timestamp" => "TIMESTAMP",
        "timestamp with time zone" | "timestamptz" => "TIMESTAMPTZ",
        "time without time zone" | "time" => "TIME",
        "time with time zone" | "timetz" => "TIMETZ",
        "bytea" => "BYTEA",
        "uuid" => "UUID",
        "json" => "JSON",
        "jsonb" => "JSONB",
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_types() {
        assert_eq!(normalize_type("integer", None, None, None), "INT");
        assert_eq!(
            normalize_type("timestamp without time zone", None, None, None),
            "TIMESTAMP"
        );
        assert_eq!(normalize_type("character varying", None, None, None), "VARCHAR");
    }

    #[test]
    fn unknown_types_pass_through_unchanged() {
        assert_eq!(normalize_type("tsvector", None, None, None), "tsvector");
        assert_eq!(normalize_type("my_enum", None, None, None), "my_enum");
        assert_eq!(normalize_type("int4[]", None, None, None), "int4[]");
    }

    #[test]
    fn modifiers_are_kept() {
        assert_eq!(normalize_type("character varying", Some(255), None, None), "VARCHAR(255)");
        assert_eq!(normalize_type("character", Some(2), None, None), "CHAR(2)");
        assert_eq!(normalize_type("numeric", None, Some(10), Some(2)), "NUMERIC(10,2)");
        assert_eq!(normalize_type("numeric", None, None, None), "NUMERIC");
    }

    #[test]
    fn integer_precision_is_not_appended() {
        assert_eq!(normalize_type("integer", None, Some(32), Some(0)), "INT");
    }
}
