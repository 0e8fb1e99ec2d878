//! PostgreSQL model backed by an sqlx pool.

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
use sqlx::postgres::{PgPool, PgRow};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::time::timeout;
use tracing::debug;

/// Live PostgreSQL connection shared by every caller of a model.
pub struct PgAdapter {
    runtime: Arc<Runtime>,
    pool: PgPool,
    sessions: SessionMap<PoolConnection<sqlx::Postgres>>,
    statement_timeout: Option<Duration>,
    acquire_timeout_secs: u64,
}

impl PgAdapter {
    pub fn connect(config: &DatabaseConfig) -> CallerResult<Self> {
        let runtime = pool::build_runtime(&config.pool_options)?;
        let pool = pool::connect_postgres(&runtime, config)?;
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

    fn fetch(&self, sql: &str) -> CallerResult<Vec<PgRow>> {
        match self.sessions.current()? {
            Some(session) => {
                let mut session = lock_session(&session)?;
                let conn: &mut sqlx::PgConnection = &mut session.conn;
                self.block_on("query execution", conn.fetch_all(sql))
            }
            None => self.block_on("query execution", (&self.pool).fetch_all(sql)),
        }
    }

    fn exec(&self, operation: &str, sql: &str) -> CallerResult<u64> {
        let result = match self.sessions.current()? {
            Some(session) => {
                let mut session = lock_session(&session)?;
                let conn: &mut sqlx::PgConnection = &mut session.conn;
                self.block_on(operation, conn.execute(sql))?
            }
            None => self.block_on(operation, (&self.pool).execute(sql))?,
        };
        Ok(result.rows_affected())
    }

    /// Close the scope at `level` with `statement` and unpin the session
    /// once the outermost scope is gone.
    fn close_scope(&self, level: usize, statement: String, operation: &str) -> CallerResult<()> {
        // Pooled connections return to the pool on drop, which needs the runtime context
        let _rt = self.runtime.enter();
        let Some(session) = self.sessions.current()? else {
            return Err(DriverError::internal("no transaction open on this thread").into());
        };
        let result = {
            let mut session = lock_session(&session)?;
            let conn: &mut sqlx::PgConnection = &mut session.conn;
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

impl TransactionScope for PgAdapter {
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
        let conn: &mut sqlx::PgConnection = &mut pinned.conn;
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

impl Connection for PgAdapter {
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

/// PostgreSQL model: a name plus its live adapter.
pub struct PgModel {
    name: String,
    adapter: Arc<PgAdapter>,
}

impl PgModel {
    pub fn connect(config: &DatabaseConfig) -> CallerResult<Self> {
        Ok(Self::new(config.id.clone(), Arc::new(PgAdapter::connect(config)?)))
    }

    pub fn new(name: impl Into<String>, adapter: Arc<PgAdapter>) -> Self {
        Self {
            name: name.into(),
            adapter,
        }
    }
}

impl Model for PgModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection(&self) -> CallerResult<Arc<dyn Connection>> {
        Ok(self.adapter.clone())
    }
}
