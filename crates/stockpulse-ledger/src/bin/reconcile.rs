//! Reconciliation job.
//!
//! ```text
//! reconcile [--config PATH] [--db PATH]
//! ```
//!
//! Prints the report as JSON and exits with status 2 when any product has
//! drifted.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use stockpulse_db::Database;
use stockpulse_ledger::{init_tracing, LedgerConfig, LedgerResult, Reconciler};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!(error = %e, "Reconciliation failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the ledger is clean.
async fn run() -> LedgerResult<bool> {
    let mut config_path = None;
    let mut db_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            "--db" => db_path = args.next().map(PathBuf::from),
            other => eprintln!("ignoring unknown argument: {other}"),
        }
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    info!(path = %config.database.path.display(), "Reconciling ledger");
    let db = Database::new(config.to_db_config()).await?;
    let report = Reconciler::new(db.clone()).run().await?;
    db.close().await;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "Failed to render report"),
    }

    Ok(report.is_clean())
}
