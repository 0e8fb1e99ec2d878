//! Row decoding for the sqlx adapters.
//!
//! Adapters hand the facade *raw* values: the closest `SqlValue` the driver
//! can produce without interpreting the column type. Typed conversion is left
//! to the codecs, driven by the column types reported alongside the rows.
//!
//! PostgreSQL statements without bind arguments go through the simple query
//! protocol, so every value arrives in text format and is kept as text.
//! SQLite values carry their storage class and are decoded per category.

use crate::codec::{TypeCategory, categorize_type};
use crate::models::{Backend, ColumnType, ResultSet, SqlValue};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Raw decoding of one driver row.
pub trait RowDecode: Row {
    /// Raw column values, in column order.
    fn raw_values(&self) -> Vec<SqlValue>;

    /// Declared type of each column, when the driver reports one.
    fn column_types(&self) -> Vec<(String, Option<ColumnType>)> {
        self.columns()
            .iter()
            .map(|col| {
                let type_info = col.type_info();
                let column_type = (!type_info.is_null() && !type_info.name().is_empty())
                    .then(|| ColumnType::parse(type_info.name()));
                (col.name().to_string(), column_type)
            })
            .collect()
    }
}

impl RowDecode for PgRow {
    fn raw_values(&self) -> Vec<SqlValue> {
        (0..self.columns().len())
            .map(|idx| postgres::decode_column(self, idx))
            .collect()
    }
}

impl RowDecode for SqliteRow {
    fn raw_values(&self) -> Vec<SqlValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), Backend::SQLite);
                sqlite::decode_column(self, idx, category)
            })
            .collect()
    }
}

/// Build a result set from driver rows. Column metadata comes from the
/// first row, so an empty row list yields a result set without columns.
pub fn result_set<R: RowDecode>(rows: &[R]) -> ResultSet {
    let Some(first) = rows.first() else {
        return ResultSet::default();
    };

    let described = first.column_types();
    let names: Vec<&str> = described.iter().map(|(name, _)| name.as_str()).collect();
    let mut result = ResultSet::new(&names, rows.iter().map(RowDecode::raw_values).collect());
    for (name, column_type) in &described {
        if let Some(column_type) = column_type {
            result.set_column_type(name, column_type.clone());
        }
    }
    result
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return SqlValue::Null,
            Err(_) => return SqlValue::Null,
            Ok(_) => {}
        }
        if let Ok(Some(text)) = row.try_get_unchecked::<Option<String>, _>(idx) {
            return SqlValue::Text(text);
        }
        row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null)
    }
}

mod sqlite {
    use super::*;

    /// Decode by the value's storage class. The declared category only
    /// matters where SQLite stores a logical type as an integer.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> SqlValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return SqlValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(_) => return SqlValue::Null,
        };

        let value = match (storage.as_str(), category) {
            ("INTEGER", TypeCategory::Boolean) => decode_boolean(row, idx),
            ("INTEGER", TypeCategory::Float | TypeCategory::Decimal) => decode_float(row, idx),
            ("INTEGER", _) => decode_integer(row, idx),
            ("REAL", _) => decode_float(row, idx),
            ("BLOB", _) => decode_binary(row, idx),
            _ => decode_text(row, idx),
        };
        value.unwrap_or(SqlValue::Null)
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        row.try_get_unchecked::<i64, _>(idx).ok().map(SqlValue::Int)
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        row.try_get_unchecked::<bool, _>(idx).ok().map(SqlValue::Bool)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        row.try_get_unchecked::<f64, _>(idx).ok().map(SqlValue::Float)
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .ok()
            .map(SqlValue::Bytes)
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        row.try_get_unchecked::<String, _>(idx).ok().map(SqlValue::Text)
    }
}
