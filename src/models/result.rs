//! Query result models.

use crate::models::SqlValue;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Declared type of a result column, used only to pick a codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnType {
    /// Lower-cased element type name (e.g., "int4", "varchar")
    pub name: String,
    pub array: bool,
}

impl ColumnType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            array: false,
        }
    }

    pub fn array_of(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            array: true,
        }
    }

    /// Parse a driver type name. Both `INT4[]` and the catalog form `_int4`
    /// denote arrays.
    pub fn parse(type_name: &str) -> Self {
        let trimmed = type_name.trim();
        if let Some(element) = trimmed.strip_suffix("[]") {
            Self::array_of(element)
        } else if let Some(element) = trimmed.strip_prefix('_').filter(|e| !e.is_empty()) {
            Self::array_of(element)
        } else {
            Self::new(trimmed)
        }
    }
}

/// Rows returned by `select_all`, with the declared type of each column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Arc<[Arc<str>]>,
    rows: Vec<Vec<SqlValue>>,
    column_types: HashMap<Arc<str>, ColumnType>,
}

impl ResultSet {
    pub fn new<S: AsRef<str>>(columns: &[S], rows: Vec<Vec<SqlValue>>) -> Self {
        let columns: Arc<[Arc<str>]> = columns.iter().map(|c| Arc::from(c.as_ref())).collect();
        Self {
            columns,
            rows,
            column_types: HashMap::new(),
        }
    }

    /// Attach a declared type to a column. Names not in the result are ignored.
    pub fn with_column_type(mut self, column: &str, column_type: ColumnType) -> Self {
        self.set_column_type(column, column_type);
        self
    }

    pub fn set_column_type(&mut self, column: &str, column_type: ColumnType) {
        if let Some(name) = self.columns.iter().find(|c| c.as_ref() == column) {
            self.column_types.insert(name.clone(), column_type);
        }
    }

    pub fn columns(&self) -> &[Arc<str>] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Arc<[Arc<str>]> {
        self.columns.clone()
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<SqlValue>> {
        self.rows
    }

    pub fn column_type(&self, column: &str) -> Option<&ColumnType> {
        self.column_types.get(column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&[SqlValue]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Iterate rows as name/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = impl Iterator<Item = (&Arc<str>, &SqlValue)>> {
        self.rows
            .iter()
            .map(move |row| self.columns.iter().zip(row.iter()))
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(
            self.iter()
                .map(|row| {
                    JsonValue::Object(
                        row.map(|(name, value)| (name.to_string(), value.to_json()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }
}

/// One decoded row. Rows of the same result share their column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Arc<str>]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Arc<str>]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Value of the first column with this name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.as_ref() == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn columns(&self) -> &[Arc<str>] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &SqlValue)> {
        self.columns.iter().zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.iter()
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect(),
        )
    }
}

/// Outcome of `execute`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
}
