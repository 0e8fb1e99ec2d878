//! The SQL facade.
//!
//! A [`SqlFacade`] runs raw SQL against the connection of one bound model
//! and decodes results through a [`TypeRegistry`]. Facade subtypes with a
//! process-wide instance and a static call surface are declared with
//! [`sql_facade!`](crate::sql_facade); [`OperationTable`] dispatches the same
//! operations by name.

pub mod binding;
pub mod dispatch;
pub mod singleton;

pub use binding::ModelBinding;
pub use dispatch::{OperationTable, Output, operation_names, parse_argument};

use crate::codec::{Codec, TypeRegistry};
use crate::db::{Connection, Model, ModelDirectory};
use crate::error::{CallerError, CallerResult, DriverError};
use crate::models::{ExecResult, ResultSet, Row, SqlValue};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, trace};

/// Generates the raw passthrough operations: substitute binds (when any
/// are given) through the model's sanitizer, then call the connection
/// primitive of the same name.
macro_rules! raw_passthrough {
    ($($(#[$meta:meta])* $name:ident -> $ret:ty;)+) => {
        $(
            $(#[$meta])*
            pub fn $name(&self, sql: &str, binds: &[SqlValue]) -> CallerResult<$ret> {
                let model = self.model()?;
                let sql = prepare(model.as_ref(), sql, binds)?;
                debug!(
                    facade = %self.label,
                    operation = stringify!($name),
                    sql = %sql,
                    "Running operation"
                );
                model.connection()?.$name(&sql)
            }
        )+
    };
}

/// Runs raw and typed SQL operations against one bound model.
pub struct SqlFacade {
    label: String,
    binding: Option<ModelBinding>,
    types: Arc<TypeRegistry>,
    directory: Arc<ModelDirectory>,
    resolved: OnceLock<Arc<dyn Model>>,
    resolving: Mutex<()>,
}

impl SqlFacade {
    pub fn builder(label: impl Into<String>) -> SqlFacadeBuilder {
        SqlFacadeBuilder {
            label: label.into(),
            binding: None,
            types: None,
            directory: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn binding(&self) -> Option<&ModelBinding> {
        self.binding.as_ref()
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Whether the model binding has been resolved yet.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The bound model, resolving a deferred binding on first use.
    pub fn model(&self) -> CallerResult<Arc<dyn Model>> {
        if let Some(model) = self.resolved.get() {
            return Ok(Arc::clone(model));
        }

        let _resolving = self
            .resolving
            .lock()
            .map_err(|_| DriverError::internal("model resolution lock poisoned"))?;
        if let Some(model) = self.resolved.get() {
            return Ok(Arc::clone(model));
        }

        let binding = self.binding.as_ref().ok_or_else(|| {
            CallerError::configuration(
                &self.label,
                "no model binding configured; set one with `.model(...)`",
            )
        })?;
        let model = binding.resolve(&self.directory)?;
        debug!(facade = %self.label, model = %model.name(), "Resolved model binding");
        Ok(Arc::clone(self.resolved.get_or_init(|| model)))
    }

    /// Live connection of the bound model. Fetched on every call.
    pub fn connection(&self) -> CallerResult<Arc<dyn Connection>> {
        self.model()?.connection()
    }

    raw_passthrough! {
        /// Run a statement and return the driver's execution result.
        execute -> ExecResult;
        /// Run a query and return raw values with per-column types.
        select_all -> ResultSet;
        /// First column of every row.
        select_values -> Vec<SqlValue>;
        select_rows -> Vec<Vec<SqlValue>>;
        /// First column of the first row, `None` when there are no rows.
        select_value -> Option<SqlValue>;
    }

    /// First row of `select_rows`, `None` when there are no rows.
    pub fn select_row(&self, sql: &str, binds: &[SqlValue]) -> CallerResult<Option<Vec<SqlValue>>> {
        Ok(self.select_rows(sql, binds)?.into_iter().next())
    }

    /// Run `select_all` and decode every value through its column's codec.
    /// Columns without a known type keep their raw value.
    pub fn select_all_serialized(&self, sql: &str, binds: &[SqlValue]) -> CallerResult<Vec<Row>> {
        let result = self.select_all(sql, binds)?;
        let codecs = self.column_codecs(&result);
        let columns = result.shared_columns();
        result
            .into_rows()
            .into_iter()
            .map(|row| {
                decode_row(&codecs, row).map(|values| Row::new(Arc::clone(&columns), values))
            })
            .collect()
    }

    /// Decoded first column of the first row.
    ///
    /// # Errors
    ///
    /// `EmptyResult` when the query returns no rows.
    pub fn select_value_serialized(&self, sql: &str, binds: &[SqlValue]) -> CallerResult<SqlValue> {
        let result = self.select_all(sql, binds)?;
        let codecs = self.column_codecs(&result);
        let raw = result
            .into_rows()
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or_else(|| CallerError::empty_result("select_value_serialized"))?;
        match codecs.first() {
            Some(Some(codec)) => codec.deserialize(&raw),
            _ => Ok(raw),
        }
    }

    /// Decoded values of every row, in column order.
    pub fn select_values_serialized(
        &self,
        sql: &str,
        binds: &[SqlValue],
    ) -> CallerResult<Vec<Vec<SqlValue>>> {
        let result = self.select_all(sql, binds)?;
        let codecs = self.column_codecs(&result);
        result
            .into_rows()
            .into_iter()
            .map(|row| decode_row(&codecs, row))
            .collect()
    }

    /// Whether the calling thread has a transaction open on the connection.
    pub fn transaction_open(&self) -> CallerResult<bool> {
        Ok(self.connection()?.transaction_open())
    }

    /// Run `block` in a transaction on the bound connection.
    ///
    /// The transaction commits when `block` returns `Ok` and rolls back when
    /// it returns `Err` or panics; the block's own error is returned after
    /// the rollback. Calls made while a transaction is already open nest
    /// the way the connection nests them.
    ///
    /// # Errors
    ///
    /// `MissingBlock` when the connection closes the scope without running
    /// the block, or asks to run it a second time.
    pub fn transaction<T, E, F>(&self, block: F) -> Result<T, E>
    where
        E: From<CallerError>,
        F: FnOnce() -> Result<T, E>,
    {
        let connection = self.connection()?;
        debug!(facade = %self.label, "Opening transaction");

        let mut block = Some(block);
        let mut output: Option<Result<T, E>> = None;
        let scope = connection.transaction(&mut || {
            let block = block.take().ok_or(CallerError::MissingBlock)?;
            match block() {
                Ok(value) => {
                    output = Some(Ok(value));
                    Ok(())
                }
                Err(err) => {
                    output = Some(Err(err));
                    Err(CallerError::Rollback)
                }
            }
        });

        match (scope, output) {
            (Ok(()), Some(result)) => result,
            (Ok(()), None) => Err(CallerError::MissingBlock.into()),
            (Err(CallerError::Rollback), Some(Err(err))) => Err(err),
            (Err(err), _) => Err(err.into()),
        }
    }

    /// `EXPLAIN ANALYZE` output as text, one plan line per row under a
    /// `QUERY_PLAN` header.
    pub fn explain_analyze(&self, sql: &str) -> CallerResult<String> {
        let plan = self.select_values(&format!("EXPLAIN ANALYZE {sql}"), &[])?;
        let lines: Vec<String> = std::iter::once("QUERY_PLAN".to_string())
            .chain(plan.iter().map(SqlValue::to_string))
            .collect();
        Ok(lines.join("\n"))
    }

    /// Encode `values` as an array literal of `type_name` elements.
    ///
    /// # Errors
    ///
    /// `UnknownType` when `type_name` is not registered.
    pub fn typecast_array(&self, values: &[SqlValue], type_name: &str) -> CallerResult<String> {
        Ok(self
            .types
            .lookup_array(type_name)?
            .serialize_array(values)?
            .encode())
    }

    /// Substitute binds into a `?` template with the model's sanitizer.
    pub fn sanitize_sql_array(&self, sql: &str, binds: &[SqlValue]) -> CallerResult<String> {
        self.model()?.sanitize_sql_array(sql, binds)
    }

    /// Last value of the table's `<table>_id_seq` sequence plus one.
    ///
    /// This only reads the sequence: nothing is reserved, so two calls
    /// without an insert in between return the same value, and concurrent
    /// inserts may take the value first.
    pub fn next_sequence_value(&self, table_name: &str) -> CallerResult<i64> {
        let table = checked_identifier(table_name)?;
        let last = self.select_value(&format!("SELECT last_value FROM {table}_id_seq"), &[])?;
        Ok(integer_value(last, "next_sequence_value")? + 1)
    }

    /// Total on-disk size of the table including indexes and TOAST, in bytes.
    pub fn table_full_size(&self, table_name: &str) -> CallerResult<i64> {
        let size = self.select_value("SELECT pg_total_relation_size(?)", &[table_name.into()])?;
        integer_value(size, "table_full_size")
    }

    /// On-disk size of the table's main data fork, in bytes.
    pub fn table_data_size(&self, table_name: &str) -> CallerResult<i64> {
        let size = self.select_value("SELECT pg_relation_size(?)", &[table_name.into()])?;
        integer_value(size, "table_data_size")
    }

    pub fn current_database_name(&self) -> CallerResult<String> {
        match self.select_value("SELECT current_database();", &[])? {
            Some(SqlValue::Null) | None => Err(CallerError::empty_result("current_database_name")),
            Some(name) => Ok(name.to_string()),
        }
    }

    fn column_codecs(&self, result: &ResultSet) -> Vec<Option<Arc<dyn Codec>>> {
        result
            .columns()
            .iter()
            .map(|column| {
                let column_type = result.column_type(column)?;
                let codec = self.types.lookup_column(column_type);
                if codec.is_none() {
                    trace!(
                        column = %column,
                        column_type = %column_type.name,
                        "No codec for column type; keeping raw values"
                    );
                }
                codec
            })
            .collect()
    }
}

impl fmt::Debug for SqlFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlFacade")
            .field("label", &self.label)
            .field("binding", &self.binding)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Builder for [`SqlFacade`].
#[derive(Debug)]
pub struct SqlFacadeBuilder {
    label: String,
    binding: Option<ModelBinding>,
    types: Option<Arc<TypeRegistry>>,
    directory: Option<Arc<ModelDirectory>>,
}

impl SqlFacadeBuilder {
    /// Bind the facade to a model handle or a model name.
    pub fn model(mut self, binding: impl Into<ModelBinding>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    /// Codec registry used by the serialized readers and `typecast_array`.
    /// Defaults to [`TypeRegistry::global`].
    pub fn types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = Some(types);
        self
    }

    /// Directory resolving a deferred binding. Defaults to [`ModelDirectory::global`].
    pub fn directory(mut self, directory: Arc<ModelDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn build(self) -> SqlFacade {
        SqlFacade {
            label: self.label,
            binding: self.binding,
            types: self.types.unwrap_or_else(TypeRegistry::global),
            directory: self.directory.unwrap_or_else(ModelDirectory::global),
            resolved: OnceLock::new(),
            resolving: Mutex::new(()),
        }
    }
}

fn prepare<'a>(model: &dyn Model, sql: &'a str, binds: &[SqlValue]) -> CallerResult<Cow<'a, str>> {
    if binds.is_empty() {
        Ok(Cow::Borrowed(sql))
    } else {
        model.sanitize_sql_array(sql, binds).map(Cow::Owned)
    }
}

fn decode_row(codecs: &[Option<Arc<dyn Codec>>], row: Vec<SqlValue>) -> CallerResult<Vec<SqlValue>> {
    row.into_iter()
        .zip(codecs)
        .map(|(raw, codec)| match codec {
            Some(codec) => codec.deserialize(&raw),
            None => Ok(raw),
        })
        .collect()
}

fn integer_value(value: Option<SqlValue>, operation: &str) -> CallerResult<i64> {
    match value {
        None | Some(SqlValue::Null) => Err(CallerError::empty_result(operation)),
        Some(value) => value.as_i64().ok_or_else(|| {
            CallerError::decode("bigint", format!("{operation} returned {value}"))
        }),
    }
}

/// Table names are interpolated into SQL, so only plain (optionally
/// schema-qualified) identifiers are accepted.
fn checked_identifier(name: &str) -> CallerResult<&str> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            part.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(name)
    } else {
        Err(CallerError::invalid_input(format!("invalid table name '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_identifier() {
        assert!(checked_identifier("employees").is_ok());
        assert!(checked_identifier("public.employees").is_ok());
        assert!(checked_identifier("_t1").is_ok());
        assert!(checked_identifier("").is_err());
        assert!(checked_identifier("1abc").is_err());
        assert!(checked_identifier("t; drop table x").is_err());
        assert!(checked_identifier("a..b").is_err());
    }

    #[test]
    fn test_integer_value() {
        assert_eq!(integer_value(Some("41".into()), "op").unwrap(), 41);
        assert_eq!(integer_value(Some(SqlValue::Int(8192)), "op").unwrap(), 8192);
        assert!(matches!(
            integer_value(None, "op"),
            Err(CallerError::EmptyResult { .. })
        ));
        assert!(matches!(
            integer_value(Some("x".into()), "op"),
            Err(CallerError::Decode { .. })
        ));
    }

    #[test]
    fn test_unbound_facade_is_a_configuration_error() {
        let facade = SqlFacade::builder("Unbound").build();
        assert!(!facade.is_resolved());
        let err = facade.select_all("select 1", &[]).unwrap_err();
        assert!(matches!(err, CallerError::Configuration { ref facade, .. } if facade == "Unbound"));
        assert_eq!(
            facade.typecast_array(&[1.into(), 2.into(), 3.into()], "integer").unwrap(),
            "{1,2,3}"
        );
    }
}
