//! # stockpulse-core: Pure Business Logic for the StockPulse Ledger
//!
//! This crate holds the inventory and settlement rules as pure functions with
//! zero I/O dependencies. The database crate persists what this crate decides;
//! the ledger crate sequences the two inside one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     StockPulse Ledger Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              stockpulse-ledger (SettlementEngine)               │   │
//! │  │      settle_sale, settle_purchase, adjust_product_stock         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockpulse-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ numbering │  │settlement │  │   │
//! │  │   │  Product  │  │   Money   │  │ INV-...   │  │   plans   │  │   │
//! │  │   │ Movement  │  │           │  │ PUR-...   │  │  totals   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                stockpulse-db (Database Layer)                   │   │
//! │  │      catalog, movement ledger, sequencer, documents, payments   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, MovementEntry, Document, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`numbering`] - `{PREFIX}-{YYYYMMDD}-{NNNN}` document numbers
//! - [`settlement`] - Direction-parameterised settlement planning
//!
//! ## Example Usage
//!
//! ```rust
//! use stockpulse_core::numbering::DocumentNumber;
//! use stockpulse_core::DocumentKind;
//! use chrono::NaiveDate;
//!
//! let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
//! let number = DocumentNumber::new(DocumentKind::Sale, day, 1);
//! assert_eq!(number.to_string(), "INV-20261019-0001");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod numbering;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use numbering::DocumentNumber;
pub use settlement::{
    plan_settlement, DiscountPolicy, DocumentRequest, LineRequest, PlannedLine, PlanningOptions,
    SettlementDirection, SettlementPlan, SettlementWarning,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed on a single document.
pub const MAX_DOCUMENT_LINES: usize = 200;

/// Maximum quantity on a single document line.
///
/// ## Business Reason
/// Catches typing 10000 instead of 10 at the counter.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// Largest price, discount, tax or cost accepted, in minor units
/// (10 billion major units).
///
/// With the line and quantity caps a document total stays below `2 * 10^18`,
/// inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Reason recorded on ledger entries written by sale settlement.
pub const SALE_REASON: &str = "Sale";

/// Reason recorded on ledger entries written by purchase settlement.
pub const PURCHASE_REASON: &str = "Purchase";

/// Reason recorded when a product is registered with opening stock.
pub const INITIAL_STOCK_REASON: &str = "Initial stock";

/// Reason recorded when a product edit sets a new stock value.
pub const STOCK_UPDATE_REASON: &str = "Stock update";
