//! SQLite model backed by an sqlx pool.
//!
//! Parallel to the PostgreSQL adapter. SQLite pools default to a single
//! connection, so a thread holding a transaction makes other threads wait
//! for the pool until the transaction closes.

use crate::config::DatabaseConfig;
use crate::db::session::{
    SessionMap, TransactionScope, begin_statement, commit_statement, lock_session,
    rollback_statement,
};
use crate::db::types::result_set;
use crate::db::{Connection, Model, pool};
use crate::error::{CallerResult, DriverError};
use crate::models::{ExecResult, ResultSet};
use sqlx::Executor;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::time::timeout;
use tracing::debug;

/// Live SQLite connection shared by every caller of a model.
pub struct SqliteAdapter {
    runtime: Arc<Runtime>,
    pool: SqlitePool,
    sessions: SessionMap<PoolConnection<sqlx::Sqlite>>,
    statement_timeout: Option<Duration>,
    acquire_timeout_secs: u64,
}

impl SqliteAdapter {
    pub fn connect(config: &DatabaseConfig) -> CallerResult<Self> {
        let runtime = pool::build_runtime(&config.pool_options)?;
        let pool = pool::connect_sqlite(&runtime, config)?;
        Ok(Self {
            runtime,
            pool,
            sessions: SessionMap::new(),
            statement_timeout: config.pool_options.statement_timeout(),
            acquire_timeout_secs: config.pool_options.acquire_timeout_or_default(),
        })
    }

    fn block_on<T>(
        &self,
        operation: &str,
        future: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> CallerResult<T> {
        let result = match self.statement_timeout {
            Some(limit) => self
                .runtime
                .block_on(async move { timeout(limit, future).await })
                .map_err(|_| DriverError::timeout(operation, limit.as_secs()))?,
            None => self.runtime.block_on(future),
        };
        result.map_err(|err| DriverError::from_sqlx(err, self.acquire_timeout_secs).into())
    }

    fn fetch(&self, sql: &str) -> CallerResult<Vec<SqliteRow>> {
        match self.sessions.current()? {
            Some(session) => {
                let mut session = lock_session(&session)?;
                let conn: &mut sqlx::SqliteConnection = &mut session.conn;
                self.block_on("query execution", conn.fetch_all(sql))
            }
            None => self.block_on("query execution", (&self.pool).fetch_all(sql)),
        }
    }

    fn exec(&self, operation: &str, sql: &str) -> CallerResult<u64> {
        let result = match self.sessions.current()? {
            Some(session) => {
                let mut session = lock_session(&session)?;
                let conn: &mut sqlx::SqliteConnection = &mut session.conn;
                self.block_on(operation, conn.execute(sql))?
            }
            None => self.block_on(operation, (&self.pool).execute(sql))?,
        };
        Ok(result.rows_affected())
    }

    fn close_scope(&self, level: usize, statement: String, operation: &str) -> CallerResult<()> {
        let _rt = self.runtime.enter();
        let Some(session) = self.sessions.current()? else {
            return Err(DriverError::internal("no transaction open on this thread").into());
        };
        let result = {
            let mut session = lock_session(&session)?;
            let conn: &mut sqlx::SqliteConnection = &mut session.conn;
            let result = self.block_on(operation, conn.execute(statement.as_str()));
            session.depth = level - 1;
            result
        };
        if level == 1 {
            self.sessions.release()?;
        }
        result.map(|_| ())
    }
}

impl TransactionScope for SqliteAdapter {
    fn begin(&self) -> CallerResult<usize> {
        let _rt = self.runtime.enter();
        let session = match self.sessions.current()? {
            Some(session) => session,
            None => {
                let conn = self.block_on("connection acquire", self.pool.acquire())?;
                self.sessions.pin(conn)?
            }
        };

        let mut pinned = lock_session(&session)?;
        let statement = begin_statement(pinned.depth);
        let conn: &mut sqlx::SqliteConnection = &mut pinned.conn;
        if let Err(err) = self.block_on("transaction begin", conn.execute(statement.as_str())) {
            if pinned.depth == 0 {
                drop(pinned);
                self.sessions.release()?;
            }
            return Err(err);
        }
        pinned.depth += 1;
        Ok(pinned.depth)
    }

    fn commit(&self, level: usize) -> CallerResult<()> {
        self.close_scope(level, commit_statement(level), "transaction commit")
    }

    fn rollback(&self, level: usize) -> CallerResult<()> {
        self.close_scope(level, rollback_statement(level), "transaction rollback")
    }
}

impl Connection for SqliteAdapter {
    fn execute(&self, sql: &str) -> CallerResult<ExecResult> {
        let start = Instant::now();
        debug!(sql = %sql, "Executing statement");
        let rows_affected = self.exec("statement execution", sql)?;
        debug!(
            rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(ExecResult { rows_affected })
    }

    fn select_all(&self, sql: &str) -> CallerResult<ResultSet> {
        let start = Instant::now();
        debug!(sql = %sql, "Executing query");
        let rows = self.fetch(sql)?;
        debug!(
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(result_set(&rows))
    }

    fn transaction(&self, block: &mut dyn FnMut() -> CallerResult<()>) -> CallerResult<()> {
        self.run_transaction(block)
    }

    fn transaction_open(&self) -> bool {
        self.sessions.is_pinned()
    }
}

/// SQLite model: a name plus its live adapter.
pub struct SqliteModel {
    name: String,
    adapter: Arc<SqliteAdapter>,
}

impl SqliteModel {
    pub fn connect(config: &DatabaseConfig) -> CallerResult<Self> {
        Ok(Self::new(
            config.id.clone(),
            Arc::new(SqliteAdapter::connect(config)?),
        ))
    }

    pub fn new(name: impl Into<String>, adapter: Arc<SqliteAdapter>) -> Self {
        Self {
            name: name.into(),
            adapter,
        }
    }
}

impl Model for SqliteModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection(&self) -> CallerResult<Arc<dyn Connection>> {
        Ok(self.adapter.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallerError;
    use crate::models::{ColumnType, SqlValue};
    use tempfile::TempDir;

    fn adapter(dir: &TempDir) -> SqliteAdapter {
        let path = dir.path().join("adapter.db");
        let config = DatabaseConfig::parse(&format!("sqlite:{}", path.display())).unwrap();
        SqliteAdapter::connect(&config).unwrap()
    }

    #[test]
    fn test_select_all_reports_raw_values_and_types() {
        let dir = TempDir::new().unwrap();
        let conn = adapter(&dir);
        conn.execute("CREATE TABLE items (id INTEGER, label TEXT, active BOOLEAN, price REAL)")
            .unwrap();
        conn.execute("INSERT INTO items VALUES (1, 'one', 1, 2.5), (2, NULL, 0, 3)")
            .unwrap();

        let result = conn
            .select_all("SELECT id, label, active, price FROM items ORDER BY id")
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.rows()[0],
            vec![
                SqlValue::Int(1),
                SqlValue::Text("one".to_string()),
                SqlValue::Bool(true),
                SqlValue::Float(2.5),
            ]
        );
        assert_eq!(result.rows()[1][1], SqlValue::Null);
        assert_eq!(result.rows()[1][3], SqlValue::Float(3.0));
        assert_eq!(result.column_type("id"), Some(&ColumnType::new("integer")));
    }

    #[test]
    fn test_failed_block_rolls_back() {
        let dir = TempDir::new().unwrap();
        let conn = adapter(&dir);
        conn.execute("CREATE TABLE t (v INTEGER)").unwrap();

        let result = conn.transaction(&mut || {
            conn.execute("INSERT INTO t VALUES (1)")?;
            assert!(conn.transaction_open());
            Err(CallerError::Rollback)
        });
        assert!(matches!(result, Err(CallerError::Rollback)));
        assert!(!conn.transaction_open());
        assert_eq!(
            conn.select_value("SELECT count(*) FROM t").unwrap(),
            Some(SqlValue::Int(0))
        );
    }

    #[test]
    fn test_nested_scope_keeps_outer_work() {
        let dir = TempDir::new().unwrap();
        let conn = adapter(&dir);
        conn.execute("CREATE TABLE t (v INTEGER)").unwrap();

        conn.transaction(&mut || {
            conn.execute("INSERT INTO t VALUES (1)")?;
            let inner = conn.transaction(&mut || {
                conn.execute("INSERT INTO t VALUES (2)")?;
                Err(CallerError::Rollback)
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

        assert_eq!(
            conn.select_values("SELECT v FROM t").unwrap(),
            vec![SqlValue::Int(1)]
        );
    }

    #[test]
    fn test_pool_exhaustion_reports_configured_acquire_timeout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("busy.db");
        let config =
            DatabaseConfig::parse(&format!("sqlite:{}?acquire_timeout=1", path.display())).unwrap();
        let conn = SqliteAdapter::connect(&config).unwrap();

        conn.transaction(&mut || {
            let other = std::thread::scope(|scope| {
                scope.spawn(|| conn.select_all("SELECT 1")).join().unwrap()
            });
            assert!(matches!(
                other,
                Err(CallerError::Driver(DriverError::Timeout { elapsed_secs: 1, .. }))
            ));
            Ok(())
        })
        .unwrap();
    }
}
