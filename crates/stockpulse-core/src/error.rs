//! # Error Types
//!
//! Domain-specific error types for stockpulse-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockpulse-core errors (this file)                                    │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockpulse-db errors                                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  stockpulse-ledger errors                                              │
//! │  └── LedgerError      - What settlement callers see                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant here is terminal for the request that produced it: nothing
//! was applied, and the caller decides whether to correct and resubmit.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Product does not exist or has been deactivated.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested quantity exceeds current stock.
    ///
    /// ## User Workflow
    /// ```text
    /// settle_sale({X, qty: 5})
    ///      │
    ///      ▼
    /// stock of X = 3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: X, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Counter shows: "Only 3 in stock", cashier edits the line and resubmits
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// A stock change would leave the product below zero.
    #[error("Stock for {product_id} would go negative: current {current}, change {delta}")]
    NegativeStock {
        product_id: String,
        current: i64,
        delta: i64,
    },

    /// Document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Service job not found.
    #[error("Service job not found: {0}")]
    ServiceJobNotFound(String),

    /// Service job cannot move to the requested status.
    #[error("Service job {job_id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any read or write happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// A unique business key is already taken (SKU, barcode).
    #[error("{field} '{value}' already exists")]
    AlreadyExists { field: String, value: String },

    /// Invalid format (e.g., malformed document number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A line discount is larger than the line it applies to.
    #[error("Line {line} discount {discount} exceeds line amount {gross}")]
    LineDiscountExceedsAmount { line: usize, discount: i64, gross: i64 },

    /// The document discount would make the final amount negative.
    #[error("Discount {discount} exceeds document total {total}")]
    DiscountExceedsTotal { discount: i64, total: i64 },

    /// An amount computed from valid inputs does not fit in `i64` cents.
    #[error("{field} is too large")]
    AmountOverflow { field: String },

    /// Document has no lines.
    #[error("At least one line is required")]
    EmptyDocument,

    /// Document has too many lines.
    #[error("A document cannot have more than {max} lines")]
    TooManyLines { max: usize },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
