//! Thread-affine transaction sessions shared by the sqlx adapters.
//!
//! Outside a transaction every statement runs on whatever pooled connection
//! the pool hands out. Opening a transaction pins one pooled connection to
//! the calling thread until the outermost scope closes, so statements
//! issued from inside the block see the transaction. Nested scopes map to
//! savepoints on the pinned connection.

use crate::error::{CallerResult, DriverError};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

const SAVEPOINT_PREFIX: &str = "sql_caller_sp_";

/// Statement opening a scope when `depth` scopes are already open.
pub(crate) fn begin_statement(depth: usize) -> String {
    if depth == 0 {
        "BEGIN".to_string()
    } else {
        format!("SAVEPOINT {SAVEPOINT_PREFIX}{depth}")
    }
}

/// Statement committing the scope at 1-based `level`.
pub(crate) fn commit_statement(level: usize) -> String {
    if level <= 1 {
        "COMMIT".to_string()
    } else {
        format!("RELEASE SAVEPOINT {SAVEPOINT_PREFIX}{}", level - 1)
    }
}

/// Statement rolling back the scope at 1-based `level`.
pub(crate) fn rollback_statement(level: usize) -> String {
    if level <= 1 {
        "ROLLBACK".to_string()
    } else {
        format!("ROLLBACK TO SAVEPOINT {SAVEPOINT_PREFIX}{}", level - 1)
    }
}

/// A pooled connection pinned to one thread for an open transaction.
pub(crate) struct PinnedSession<C> {
    pub conn: C,
    pub depth: usize,
}

pub(crate) type SharedSession<C> = Arc<Mutex<PinnedSession<C>>>;

/// Pinned sessions keyed by owning thread.
pub(crate) struct SessionMap<C> {
    sessions: Mutex<HashMap<ThreadId, SharedSession<C>>>,
}

impl<C> SessionMap<C> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Session of the calling thread, if it has a transaction open.
    pub fn current(&self) -> CallerResult<Option<SharedSession<C>>> {
        Ok(self.lock()?.get(&thread::current().id()).cloned())
    }

    /// Pin `conn` to the calling thread.
    pub fn pin(&self, conn: C) -> CallerResult<SharedSession<C>> {
        let session = Arc::new(Mutex::new(PinnedSession { conn, depth: 0 }));
        self.lock()?
            .insert(thread::current().id(), Arc::clone(&session));
        Ok(session)
    }

    /// Unpin the calling thread's session, returning its connection to the pool on drop.
    pub fn release(&self) -> CallerResult<()> {
        self.lock()?.remove(&thread::current().id());
        Ok(())
    }

    pub fn is_pinned(&self) -> bool {
        self.lock()
            .map(|sessions| sessions.contains_key(&thread::current().id()))
            .unwrap_or(false)
    }

    fn lock(&self) -> CallerResult<MutexGuard<'_, HashMap<ThreadId, SharedSession<C>>>> {
        self.sessions
            .lock()
            .map_err(|_| DriverError::internal("session map lock poisoned").into())
    }
}

pub(crate) fn lock_session<C>(
    session: &SharedSession<C>,
) -> CallerResult<MutexGuard<'_, PinnedSession<C>>> {
    session
        .lock()
        .map_err(|_| DriverError::internal("session lock poisoned").into())
}

/// Scope boundaries of an adapter. `run_transaction` drives one scope
/// around a block: commit on success, roll back on error or panic.
pub(crate) trait TransactionScope {
    /// Open a scope and return its 1-based level.
    fn begin(&self) -> CallerResult<usize>;

    fn commit(&self, level: usize) -> CallerResult<()>;

    fn rollback(&self, level: usize) -> CallerResult<()>;

    fn run_transaction(&self, block: &mut dyn FnMut() -> CallerResult<()>) -> CallerResult<()> {
        let level = self.begin()?;
        debug!(level, "Transaction scope opened");

        match panic::catch_unwind(AssertUnwindSafe(|| block())) {
            Ok(Ok(())) => {
                self.commit(level)?;
                debug!(level, "Transaction scope committed");
                Ok(())
            }
            Ok(Err(err)) => {
                self.rollback_after_failure(level);
                Err(err)
            }
            Err(payload) => {
                self.rollback_after_failure(level);
                panic::resume_unwind(payload)
            }
        }
    }

    fn rollback_after_failure(&self, level: usize) {
        match self.rollback(level) {
            Ok(()) => debug!(level, "Transaction scope rolled back"),
            Err(err) => warn!(level, error = %err, "Failed to roll back transaction scope"),
        }
    }
}
