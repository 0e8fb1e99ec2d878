//! Database collaborators of the facade.
//!
//! This module provides:
//! - the `Connection` and `Model` traits the facade delegates to
//! - a process-wide directory resolving model names to models
//! - sqlx-backed adapters for PostgreSQL and SQLite
//! - raw row decoding and per-thread transaction sessions for the adapters

pub mod directory;
pub mod pool;
pub mod postgres;
pub(crate) mod session;
pub mod sqlite;
pub mod types;

pub use directory::ModelDirectory;
pub use postgres::{PgAdapter, PgModel};
pub use sqlite::{SqliteAdapter, SqliteModel};

use crate::config::DatabaseConfig;
use crate::error::CallerResult;
use crate::models::{Backend, ExecResult, ResultSet, SqlValue};
use crate::sanitize;
use std::sync::Arc;

/// A live database connection.
///
/// Only `execute`, `select_all` and the transaction methods are required;
/// the remaining readers are derived from `select_all`.
pub trait Connection: Send + Sync {
    /// Run a statement that returns no rows.
    fn execute(&self, sql: &str) -> CallerResult<ExecResult>;

    /// Run a query and return raw values with per-column type metadata.
    fn select_all(&self, sql: &str) -> CallerResult<ResultSet>;

    fn select_rows(&self, sql: &str) -> CallerResult<Vec<Vec<SqlValue>>> {
        Ok(self.select_all(sql)?.into_rows())
    }

    /// First column of every row.
    fn select_values(&self, sql: &str) -> CallerResult<Vec<SqlValue>> {
        Ok(self
            .select_all(sql)?
            .into_rows()
            .into_iter()
            .map(|row| row.into_iter().next().unwrap_or(SqlValue::Null))
            .collect())
    }

    /// First column of the first row, `None` when there are no rows.
    fn select_value(&self, sql: &str) -> CallerResult<Option<SqlValue>> {
        Ok(self
            .select_all(sql)?
            .into_rows()
            .into_iter()
            .next()
            .map(|row| row.into_iter().next().unwrap_or(SqlValue::Null)))
    }

    /// Run `block` inside a transaction scope: commit when it returns `Ok`,
    /// roll back when it returns `Err` or panics. Scopes opened while one
    /// is already open on the calling thread nest.
    fn transaction(&self, block: &mut dyn FnMut() -> CallerResult<()>) -> CallerResult<()>;

    /// Whether the calling thread has a transaction open on this connection.
    fn transaction_open(&self) -> bool;
}

/// A named database model that can hand out its live connection.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    fn connection(&self) -> CallerResult<Arc<dyn Connection>>;

    /// Substitute positional binds into a `?` template.
    fn sanitize_sql_array(&self, sql: &str, binds: &[SqlValue]) -> CallerResult<String> {
        sanitize::sanitize_sql_array(sql, binds)
    }
}

/// Connect the model described by `config`.
pub fn connect(config: &DatabaseConfig) -> CallerResult<Arc<dyn Model>> {
    let model: Arc<dyn Model> = match config.backend {
        Backend::PostgreSQL => Arc::new(PgModel::connect(config)?),
        Backend::SQLite => Arc::new(SqliteModel::connect(config)?),
    };
    Ok(model)
}
