//! sql-caller - run facade operations from the command line.

use clap::Parser;
use pg_sql_caller::config::Config;
use pg_sql_caller::db::{self, ModelDirectory};
use pg_sql_caller::facade::{OperationTable, SqlFacade, parse_argument};
use pg_sql_caller::models::SqlValue;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let db_config = config.database_config()?;
    info!(
        id = %db_config.id,
        backend = %db_config.backend,
        "Starting sql-caller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let directory = ModelDirectory::global();
    directory.register(db::connect(&db_config)?)?;

    let facade = SqlFacade::builder("sql-caller")
        .model(db_config.id.as_str())
        .directory(directory)
        .build();
    let table = OperationTable::with_all(&facade);

    let args: Vec<SqlValue> = config.args.iter().map(|arg| parse_argument(arg)).collect();
    debug!(operation = %config.operation, args = args.len(), "Dispatching operation");

    match table.call(&config.operation, &args) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output.to_json(config.raw_sizes))?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(operation = %config.operation, error = %e, "Operation failed");
            if let Some(suggestion) = e.driver().and_then(|d| d.suggestion()) {
                eprintln!("Hint: {suggestion}");
            }
            // Already reported above
            Ok(ExitCode::FAILURE)
        }
    }
}
