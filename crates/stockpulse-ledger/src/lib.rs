//! # stockpulse-ledger: Settlement Engine for the StockPulse Ledger
//!
//! Sales, purchases and stock adjustments as atomic units of work over the
//! catalog, movement ledger, document sequencer and payment log.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    StockPulse Settlement Data Flow                      │
//! │                                                                         │
//! │  Counter / back office (settle_sale, settle_purchase, adjust)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                stockpulse-ledger (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐   ┌──────────────┐   ┌─────────────────┐  │   │
//! │  │   │SettlementEngine│   │  Reconciler  │   │  LedgerConfig   │  │   │
//! │  │   │  (engine.rs)   │   │(reconcile.rs)│   │  (config.rs)    │  │   │
//! │  │   │ plan → commit  │   │ drift report │   │ toml + env      │  │   │
//! │  │   └───────┬────────┘   └──────┬───────┘   └─────────────────┘  │   │
//! │  └───────────┼───────────────────┼─────────────────────────────────┘   │
//! │              ▼                   ▼                                      │
//! │     stockpulse-core        stockpulse-db                               │
//! │     (plan_settlement)      (repositories, one transaction per unit)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Settlement, adjustments, catalog and ledger queries
//! - [`reconcile`] - Ledger-versus-stock drift detection
//! - [`config`] - Layered configuration
//! - [`error`] - Ledger error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockpulse_core::{DocumentRequest, LineRequest};
//! use stockpulse_ledger::{LedgerConfig, SettlementEngine};
//!
//! let config = LedgerConfig::load(None)?;
//! let engine = SettlementEngine::from_config(&config).await?;
//!
//! let request = DocumentRequest::new("cashier-7", vec![LineRequest::new(&product_id, 2)]);
//! let settled = engine.settle_sale(&request).await?;
//! println!("{}", settled.document.document_no); // INV-20261019-0001
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod reconcile;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, DatabaseSettings, LedgerConfig, SettlementSettings};
pub use engine::{Settlement, SettlementEngine};
pub use error::{LedgerError, LedgerResult};
pub use reconcile::{Reconciler, ReconciliationReport, StockDrift};

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber for the ledger binaries.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockpulse=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
