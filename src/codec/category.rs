//! Type name classification.
//!
//! Driver type names and user-facing type names are first normalized to a
//! canonical spelling, then classified into a `TypeCategory` that selects the
//! decoding strategy.

use crate::models::Backend;

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Timestamp,
    TimestampTz,
    Unknown,
}

/// Normalize a database type name to a more consistent format.
///
/// Type modifiers such as `(10,2)` or `(255)` are dropped.
pub fn normalize_type_name(type_name: &str) -> String {
    let base = type_name.split('(').next().unwrap_or(type_name).trim();
    let lower = base.to_lowercase();

    match lower.as_str() {
        // Integers
        "int4" | "integer" | "int" | "serial" | "serial4" => "integer".to_string(),
        "int8" | "bigint" | "bigserial" | "serial8" => "bigint".to_string(),
        "int2" | "smallint" | "smallserial" => "smallint".to_string(),
        "tinyint" | "tiny" => "tinyint".to_string(),
        // Exact numerics
        "numeric" | "decimal" => "decimal".to_string(),
        // Text
        "varchar" | "character varying" | "text" | "string" | "citext" | "name" => {
            "text".to_string()
        }
        "char" | "character" | "bpchar" => "char".to_string(),
        // Boolean
        "bool" | "boolean" => "boolean".to_string(),
        // Float
        "float4" | "real" => "real".to_string(),
        "float8" | "double precision" | "double" | "float" => "double".to_string(),
        // Binary
        "bytea" | "blob" | "binary" | "varbinary" => "binary".to_string(),
        // Date/Time
        "timestamp" | "timestamp without time zone" | "datetime" => "timestamp".to_string(),
        "timestamptz" | "timestamp with time zone" => "timestamptz".to_string(),
        "date" => "date".to_string(),
        "time" | "timetz" => "time".to_string(),
        // JSON
        "json" | "jsonb" => "json".to_string(),
        // UUID
        "uuid" => "uuid".to_string(),
        // Default
        _ => lower,
    }
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, backend: Backend) -> TypeCategory {
    let canonical = normalize_type_name(type_name);

    match canonical.as_str() {
        "integer" | "bigint" | "smallint" | "tinyint" => TypeCategory::Integer,
        // SQLite's NUMERIC affinity stores floats
        "decimal" if backend == Backend::SQLite => TypeCategory::Float,
        "decimal" => TypeCategory::Decimal,
        "boolean" => TypeCategory::Boolean,
        "real" | "double" => TypeCategory::Float,
        "text" | "char" | "time" => TypeCategory::Text,
        "binary" => TypeCategory::Binary,
        "json" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "date" => TypeCategory::Date,
        "timestamp" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        other => categorize_by_affinity(other),
    }
}

/// Fallback for free-form declared types (mostly SQLite column declarations).
fn categorize_by_affinity(lower: &str) -> TypeCategory {
    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }
    if lower.contains("int") {
        return TypeCategory::Integer;
    }
    if lower.contains("char") || lower.contains("text") || lower.contains("clob") {
        return TypeCategory::Text;
    }
    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }
    if lower.contains("float") || lower.contains("double") {
        return TypeCategory::Float;
    }
    TypeCategory::Unknown
}
