//! By-name dispatch over a facade's operations.
//!
//! Arguments are positional [`SqlValue`]s. Operations taking SQL read it
//! from the first argument and treat the rest as binds; `typecast_array`
//! takes the element type then the values; the size and sequence
//! operations take a table name; `transaction` runs each argument as a
//! statement inside one transaction.

use crate::error::{CallerError, CallerResult};
use crate::facade::SqlFacade;
use crate::models::{ExecResult, ResultSet, Row, SqlValue};
use humansize::{BINARY, format_size};
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;

type Operation = fn(&SqlFacade, &[SqlValue]) -> CallerResult<Output>;

const OPERATIONS: &[(&str, Operation)] = &[
    ("execute", |f, args| {
        let (sql, binds) = sql_and_binds("execute", args)?;
        f.execute(&sql, binds).map(Output::Exec)
    }),
    ("select_all", |f, args| {
        let (sql, binds) = sql_and_binds("select_all", args)?;
        f.select_all(&sql, binds).map(Output::ResultSet)
    }),
    ("select_values", |f, args| {
        let (sql, binds) = sql_and_binds("select_values", args)?;
        f.select_values(&sql, binds).map(Output::Values)
    }),
    ("select_rows", |f, args| {
        let (sql, binds) = sql_and_binds("select_rows", args)?;
        f.select_rows(&sql, binds).map(Output::Rows)
    }),
    ("select_value", |f, args| {
        let (sql, binds) = sql_and_binds("select_value", args)?;
        f.select_value(&sql, binds).map(Output::Value)
    }),
    ("select_row", |f, args| {
        let (sql, binds) = sql_and_binds("select_row", args)?;
        f.select_row(&sql, binds).map(Output::Row)
    }),
    ("select_all_serialized", |f, args| {
        let (sql, binds) = sql_and_binds("select_all_serialized", args)?;
        f.select_all_serialized(&sql, binds).map(Output::Records)
    }),
    ("select_value_serialized", |f, args| {
        let (sql, binds) = sql_and_binds("select_value_serialized", args)?;
        f.select_value_serialized(&sql, binds)
            .map(|value| Output::Value(Some(value)))
    }),
    ("select_values_serialized", |f, args| {
        let (sql, binds) = sql_and_binds("select_values_serialized", args)?;
        f.select_values_serialized(&sql, binds).map(Output::Rows)
    }),
    ("transaction_open", |f, args| {
        no_arguments("transaction_open", args)?;
        f.transaction_open().map(Output::Bool)
    }),
    ("transaction", |f, args| {
        if args.is_empty() {
            return Err(CallerError::MissingBlock);
        }
        let statements: Vec<String> = args.iter().map(text_of).collect();
        f.transaction(|| -> CallerResult<Output> {
            let mut rows_affected = 0;
            for sql in &statements {
                rows_affected += f.execute(sql, &[])?.rows_affected;
            }
            Ok(Output::Exec(ExecResult { rows_affected }))
        })
    }),
    ("explain_analyze", |f, args| {
        let sql = single_argument("explain_analyze", args)?;
        f.explain_analyze(&sql).map(Output::Text)
    }),
    ("typecast_array", |f, args| {
        let (type_name, values) = args.split_first().ok_or_else(|| {
            CallerError::invalid_input("typecast_array expects a type name followed by values")
        })?;
        f.typecast_array(values, &text_of(type_name)).map(Output::Text)
    }),
    ("sanitize_sql_array", |f, args| {
        let (sql, binds) = sql_and_binds("sanitize_sql_array", args)?;
        f.sanitize_sql_array(&sql, binds).map(Output::Text)
    }),
    ("next_sequence_value", |f, args| {
        let table = single_argument("next_sequence_value", args)?;
        f.next_sequence_value(&table).map(Output::Integer)
    }),
    ("table_full_size", |f, args| {
        let table = single_argument("table_full_size", args)?;
        f.table_full_size(&table).map(Output::Bytes)
    }),
    ("table_data_size", |f, args| {
        let table = single_argument("table_data_size", args)?;
        f.table_data_size(&table).map(Output::Bytes)
    }),
    ("current_database_name", |f, args| {
        no_arguments("current_database_name", args)?;
        f.current_database_name().map(Output::Text)
    }),
];

/// Names of every operation a table can delegate.
pub fn operation_names() -> impl Iterator<Item = &'static str> {
    OPERATIONS.iter().map(|(name, _)| *name)
}

/// Result of a dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Exec(ExecResult),
    ResultSet(ResultSet),
    Rows(Vec<Vec<SqlValue>>),
    Row(Option<Vec<SqlValue>>),
    Values(Vec<SqlValue>),
    Value(Option<SqlValue>),
    Records(Vec<Row>),
    Bool(bool),
    Text(String),
    Integer(i64),
    /// A size in bytes.
    Bytes(i64),
}

impl Output {
    /// JSON rendering. Byte counts are rendered human-readable unless
    /// `raw_sizes` is set.
    pub fn to_json(&self, raw_sizes: bool) -> JsonValue {
        match self {
            Self::Exec(result) => json!({ "rows_affected": result.rows_affected }),
            Self::ResultSet(result) => result.to_json(),
            Self::Rows(rows) => JsonValue::Array(rows.iter().map(|row| values_json(row)).collect()),
            Self::Row(row) => row.as_deref().map(values_json).unwrap_or(JsonValue::Null),
            Self::Values(values) => values_json(values),
            Self::Value(value) => value.as_ref().map(SqlValue::to_json).unwrap_or(JsonValue::Null),
            Self::Records(rows) => JsonValue::Array(rows.iter().map(Row::to_json).collect()),
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Text(v) => JsonValue::String(v.clone()),
            Self::Integer(v) => json!(v),
            Self::Bytes(v) if raw_sizes => json!(v),
            Self::Bytes(v) => JsonValue::String(format_size(u64::try_from(*v).unwrap_or(0), BINARY)),
        }
    }
}

fn values_json(values: &[SqlValue]) -> JsonValue {
    JsonValue::Array(values.iter().map(SqlValue::to_json).collect())
}

/// Operations of one facade that can be called by name.
///
/// Operations are bound with [`delegate`](Self::delegate). Binding is
/// idempotent: a name listed twice, or delegated again later, stays bound
/// once.
pub struct OperationTable<'f> {
    facade: &'f SqlFacade,
    bound: BTreeMap<&'static str, Operation>,
}

impl<'f> OperationTable<'f> {
    /// An empty table over `facade`.
    pub fn new(facade: &'f SqlFacade) -> Self {
        Self {
            facade,
            bound: BTreeMap::new(),
        }
    }

    /// A table with every operation bound.
    pub fn with_all(facade: &'f SqlFacade) -> Self {
        Self {
            facade,
            bound: OPERATIONS.iter().copied().collect(),
        }
    }

    /// Bind the named operations and return how many were newly bound.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty list or an unknown name; nothing is
    /// bound in that case.
    pub fn delegate<S: AsRef<str>>(&mut self, names: &[S]) -> CallerResult<usize> {
        if names.is_empty() {
            return Err(CallerError::invalid_input("delegate expects at least one operation name"));
        }

        let resolved = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                OPERATIONS
                    .iter()
                    .find(|(known, _)| *known == name)
                    .copied()
                    .ok_or_else(|| CallerError::invalid_input(format!("unknown operation '{name}'")))
            })
            .collect::<CallerResult<Vec<_>>>()?;

        let before = self.bound.len();
        self.bound.extend(resolved);
        Ok(self.bound.len() - before)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bound.contains_key(name)
    }

    /// Bound operation names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.bound.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    pub fn facade(&self) -> &'f SqlFacade {
        self.facade
    }

    /// Call a bound operation.
    pub fn call(&self, name: &str, args: &[SqlValue]) -> CallerResult<Output> {
        let operation = self.bound.get(name).ok_or_else(|| {
            CallerError::invalid_input(format!("operation '{name}' is not delegated"))
        })?;
        operation(self.facade, args)
    }
}

/// Parse a command-line argument into a bind value: `null`, booleans,
/// integers, floats and JSON arrays are recognised, anything else is text.
pub fn parse_argument(raw: &str) -> SqlValue {
    if raw.eq_ignore_ascii_case("null") {
        return SqlValue::Null;
    }
    if raw == "true" || raw == "false" {
        return SqlValue::Bool(raw == "true");
    }
    if let Ok(v) = raw.parse::<i64>() {
        return SqlValue::Int(v);
    }
    if raw.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(v) = raw.parse::<f64>() {
            return SqlValue::Float(v);
        }
    }
    if raw.starts_with('[') {
        if let Ok(JsonValue::Array(items)) = serde_json::from_str::<JsonValue>(raw) {
            return SqlValue::Array(items.into_iter().map(json_argument).collect());
        }
    }
    SqlValue::Text(raw.to_string())
}

fn json_argument(value: JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(v) => SqlValue::Bool(v),
        JsonValue::Number(n) => match n.as_i64() {
            Some(v) => SqlValue::Int(v),
            None => n.as_f64().map(SqlValue::Float).unwrap_or(SqlValue::Null),
        },
        JsonValue::String(s) => SqlValue::Text(s),
        JsonValue::Array(items) => SqlValue::Array(items.into_iter().map(json_argument).collect()),
        other @ JsonValue::Object(_) => SqlValue::Json(other),
    }
}

fn text_of(value: &SqlValue) -> String {
    value.to_string()
}

fn sql_and_binds<'a>(operation: &str, args: &'a [SqlValue]) -> CallerResult<(String, &'a [SqlValue])> {
    let (sql, binds) = args.split_first().ok_or_else(|| {
        CallerError::invalid_input(format!("{operation} expects a SQL statement"))
    })?;
    Ok((text_of(sql), binds))
}

fn single_argument(operation: &str, args: &[SqlValue]) -> CallerResult<String> {
    match args {
        [value] => Ok(text_of(value)),
        _ => Err(CallerError::invalid_input(format!(
            "{operation} expects exactly one argument, got {}",
            args.len()
        ))),
    }
}

fn no_arguments(operation: &str, args: &[SqlValue]) -> CallerResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CallerError::invalid_input(format!("{operation} takes no arguments")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound() -> SqlFacade {
        SqlFacade::builder("Dispatch").build()
    }

    #[test]
    fn test_delegate_collapses_duplicates() {
        let facade = unbound();
        let mut table = OperationTable::new(&facade);
        let added = table
            .delegate(&["select_all", "select_value", "select_all", "select_value"])
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(table.names(), vec!["select_all", "select_value"]);

        assert_eq!(table.delegate(&["select_all"]).unwrap(), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_delegate_rejects_unknown_and_empty() {
        let facade = unbound();
        let mut table = OperationTable::new(&facade);
        assert!(matches!(
            table.delegate(&["select_all", "drop_everything"]),
            Err(CallerError::InvalidInput { .. })
        ));
        assert!(table.is_empty());

        let empty: [&str; 0] = [];
        assert!(table.delegate(&empty).is_err());
    }

    #[test]
    fn test_with_all_binds_every_operation_once() {
        let facade = unbound();
        let table = OperationTable::with_all(&facade);
        assert_eq!(table.len(), operation_names().count());
        assert!(table.contains("select_values_serialized"));
        assert!(table.contains("transaction"));
    }

    #[test]
    fn test_call_checks_binding_and_arguments() {
        let facade = unbound();
        let mut table = OperationTable::new(&facade);
        table.delegate(&["typecast_array", "transaction"]).unwrap();

        assert!(matches!(
            table.call("select_all", &["select 1".into()]),
            Err(CallerError::InvalidInput { .. })
        ));
        assert_eq!(
            table
                .call("typecast_array", &["integer".into(), 1.into(), 2.into()])
                .unwrap(),
            Output::Text("{1,2}".to_string())
        );
        assert!(matches!(
            table.call("transaction", &[]),
            Err(CallerError::MissingBlock)
        ));
    }

    #[test]
    fn test_parse_argument() {
        assert_eq!(parse_argument("NULL"), SqlValue::Null);
        assert_eq!(parse_argument("true"), SqlValue::Bool(true));
        assert_eq!(parse_argument("-12"), SqlValue::Int(-12));
        assert_eq!(parse_argument("1.5"), SqlValue::Float(1.5));
        assert_eq!(parse_argument("inf"), SqlValue::Text("inf".to_string()));
        assert_eq!(
            parse_argument("[1, \"a\", null]"),
            SqlValue::Array(vec![SqlValue::Int(1), "a".into(), SqlValue::Null])
        );
        assert_eq!(
            parse_argument("select 1"),
            SqlValue::Text("select 1".to_string())
        );
    }

    #[test]
    fn test_output_json() {
        assert_eq!(Output::Bytes(8192).to_json(false), json!("8 KiB"));
        assert_eq!(Output::Bytes(8192).to_json(true), json!(8192));
        assert_eq!(
            Output::Exec(ExecResult { rows_affected: 3 }).to_json(false),
            json!({ "rows_affected": 3 })
        );
        assert_eq!(Output::Row(None).to_json(false), JsonValue::Null);
    }
}
