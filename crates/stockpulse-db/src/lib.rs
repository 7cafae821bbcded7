//! # stockpulse-db: Database Layer for the StockPulse Ledger
//!
//! This crate provides database access for the ledger. It uses SQLite with
//! sqlx for async operations, and owns every SQL statement the system runs.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      StockPulse Data Flow                               │
//! │                                                                         │
//! │  SettlementEngine::settle_sale                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockpulse-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ products      │    │ 001 catalog  │  │   │
//! │  │   │ SqlitePool    │◄───│ movements     │    │ 002 docs     │  │   │
//! │  │   │ begin()       │    │ sequences     │    │ 003 jobs     │  │   │
//! │  │   │               │    │ documents ... │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockpulse_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/stockpulse.db")).await?;
//! let low = db.products().list_low_stock().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

/// Connection type the `*_in` repository methods write through; a
/// transaction from [`Database::begin`] derefs to it.
pub use sqlx::SqliteConnection;

pub use repository::document::{DocumentFilter, DocumentRepository};
pub use repository::movement::{LedgerBalance, MovementRepository};
pub use repository::payment::PaymentRepository;
pub use repository::product::{generate_product_id, ProductRepository, StockChange};
pub use repository::sequence::SequenceRepository;
pub use repository::service_job::ServiceJobRepository;
