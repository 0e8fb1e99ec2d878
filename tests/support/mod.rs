//! In-memory database collaborator for facade tests.
//!
//! `FakeConnection` answers queries from scripted result sets and keeps a
//! journal of every statement it receives. Statements executed inside a
//! transaction scope are buffered and only reach `committed()` when the
//! outermost scope commits.

#![allow(dead_code)]

use pg_sql_caller::db::{Connection, Model};
use pg_sql_caller::error::CallerResult;
use pg_sql_caller::models::{ExecResult, ResultSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FakeConnection {
    results: Mutex<HashMap<String, ResultSet>>,
    journal: Mutex<Vec<String>>,
    committed: Mutex<Vec<String>>,
    scopes: Mutex<Vec<Vec<String>>>,
    skip_blocks: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `sql` with `result` from now on.
    pub fn script(&self, sql: &str, result: ResultSet) {
        self.results
            .lock()
            .unwrap()
            .insert(sql.to_string(), result);
    }

    /// Every statement received, in order.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Statements executed outside a transaction or in a committed one.
    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }

    /// Close transaction scopes without running their block.
    pub fn skip_blocks(&self) {
        self.skip_blocks.store(true, Ordering::SeqCst);
    }

    /// Open a scope outside the facade, as an enclosing caller would.
    pub fn open_ambient_scope(&self) {
        self.scopes.lock().unwrap().push(Vec::new());
    }

    pub fn close_ambient_scope(&self) {
        let scope = self.scopes.lock().unwrap().pop().unwrap_or_default();
        self.settle(scope);
    }

    fn settle(&self, scope: Vec<String>) {
        let mut scopes = self.scopes.lock().unwrap();
        match scopes.last_mut() {
            Some(outer) => outer.extend(scope),
            None => self.committed.lock().unwrap().extend(scope),
        }
    }
}

impl Connection for FakeConnection {
    fn execute(&self, sql: &str) -> CallerResult<ExecResult> {
        self.journal.lock().unwrap().push(sql.to_string());
        let mut scopes = self.scopes.lock().unwrap();
        match scopes.last_mut() {
            Some(scope) => scope.push(sql.to_string()),
            None => self.committed.lock().unwrap().push(sql.to_string()),
        }
        Ok(ExecResult { rows_affected: 1 })
    }

    fn select_all(&self, sql: &str) -> CallerResult<ResultSet> {
        self.journal.lock().unwrap().push(sql.to_string());
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or_default())
    }

    fn transaction(&self, block: &mut dyn FnMut() -> CallerResult<()>) -> CallerResult<()> {
        if self.skip_blocks.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.scopes.lock().unwrap().push(Vec::new());
        let outcome = block();
        let scope = self.scopes.lock().unwrap().pop().unwrap_or_default();
        match outcome {
            Ok(()) => {
                self.settle(scope);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn transaction_open(&self) -> bool {
        !self.scopes.lock().unwrap().is_empty()
    }
}

pub struct FakeModel {
    name: String,
    connection: Arc<FakeConnection>,
    connection_calls: AtomicUsize,
}

impl FakeModel {
    pub fn new(name: &str, connection: Arc<FakeConnection>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            connection,
            connection_calls: AtomicUsize::new(0),
        })
    }

    pub fn fake(&self) -> &Arc<FakeConnection> {
        &self.connection
    }

    /// How many times a connection was requested.
    pub fn connection_calls(&self) -> usize {
        self.connection_calls.load(Ordering::SeqCst)
    }
}

impl Model for FakeModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection(&self) -> CallerResult<Arc<dyn Connection>> {
        self.connection_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.connection.clone())
    }
}
