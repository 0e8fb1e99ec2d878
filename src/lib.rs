//! PostgreSQL-oriented SQL facade.
//!
//! This library runs raw SQL through a process-wide facade bound to a
//! database model, decodes results into typed values using per-column type
//! metadata, and encodes typed arrays into PostgreSQL array literals.

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod models;
pub mod sanitize;

pub use codec::{Codec, TypeRegistry};
pub use config::{Config, DatabaseConfig};
pub use db::{Connection, Model, ModelDirectory};
pub use error::{CallerError, CallerResult, DriverError};
pub use facade::{ModelBinding, OperationTable, Output, SqlFacade};
pub use models::{ColumnType, ExecResult, ResultSet, Row, SqlValue};
