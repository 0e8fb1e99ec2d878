//! Error types for the SQL caller.
//!
//! `CallerError` covers the failures raised by the facade itself. Anything
//! raised by the database collaborator travels as [`DriverError`] and is
//! never retried or reinterpreted on the way out.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallerError {
    #[error("Model binding not defined for {facade}: {message}")]
    Configuration { facade: String, message: String },

    #[error("Transaction requires a block to run")]
    MissingBlock,

    #[error("Unknown type: {type_name}")]
    UnknownType { type_name: String },

    #[error("Empty result: {operation} returned no rows")]
    EmptyResult { operation: String },

    #[error("Cannot decode value as {type_name}: {message}")]
    Decode { type_name: String, message: String },

    #[error("wrong number of bind variables ({given} for {expected})")]
    BindArity { expected: usize, given: usize },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Returned to the collaborator when a transaction block failed, so the
    /// scope is rolled back. The block's own error reaches the caller.
    #[error("Transaction block failed; scope rolled back")]
    Rollback,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl CallerError {
    /// Create a configuration error for the named facade.
    pub fn configuration(facade: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            facade: facade.into(),
            message: message.into(),
        }
    }

    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    pub fn empty_result(operation: impl Into<String>) -> Self {
        Self::EmptyResult {
            operation: operation.into(),
        }
    }

    pub fn decode(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// The driver error behind this error, if the collaborator raised it.
    pub fn driver(&self) -> Option<&DriverError> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

/// Failures raised by the database collaborator.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DriverError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQLSTATE reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Map a driver error from an adapter whose pool waits
    /// `acquire_timeout_secs` for a connection.
    pub fn from_sqlx(err: sqlx::Error, acquire_timeout_secs: u64) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                Self::timeout("connection pool acquire", acquire_timeout_secs)
            }
            other => other.into(),
        }
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DriverError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DriverError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DriverError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DriverError::connection(
                "Timed out waiting for a pooled connection",
                "Raise acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                DriverError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DriverError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DriverError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DriverError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DriverError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                DriverError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => DriverError::internal("Database worker crashed"),
            _ => DriverError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<sqlx::Error> for CallerError {
    fn from(err: sqlx::Error) -> Self {
        CallerError::Driver(err.into())
    }
}

/// Result type alias for facade operations.
pub type CallerResult<T> = Result<T, CallerError>;
