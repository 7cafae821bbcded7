//! # Validation Module
//!
//! Input validation for everything that enters the ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure, before any read)                           │
//! │  ├── Field formats, lengths, signs                                      │
//! │  └── Line quantity bounds                                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Settlement planning (after catalog reads)                     │
//! │  ├── Unknown / inactive products                                        │
//! │  ├── Stock sufficiency                                                  │
//! │  └── Discount vs. total                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK (quantity > 0), UNIQUE (document_no, sku)                    │
//! │  └── Conditional stock update                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockpulse_core::validation::{validate_sku, validate_line_quantity};
//!
//! validate_sku("CHG-25W").unwrap();
//! validate_line_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::{NewProduct, NewServiceJob, ProductUpdate};
use crate::{MAX_AMOUNT_CENTS, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use stockpulse_core::validation::validate_sku;
///
/// assert!(validate_sku("CHG-25W").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a barcode: 4 to 64 printable ASCII characters, no spaces.
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.len() < 4 || barcode.len() > 64 {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must be between 4 and 64 characters".to_string(),
        });
    }

    if !barcode.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must be printable ASCII without spaces".to_string(),
        });
    }

    Ok(())
}

/// Validates a required free-text field with a maximum length.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a product name (1 to 200 characters).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 200)
}

/// Validates the reason attached to a manual adjustment.
///
/// Adjustments are the only ledger entries whose cause is typed by a person,
/// so an empty reason would leave the audit trail unexplained.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    validate_text("reason", reason, 200)
}

/// Validates an actor id supplied by the identity provider.
pub fn validate_actor_id(actor_id: &str) -> ValidationResult<()> {
    validate_text("actor_id", actor_id, 128)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a document line quantity.
///
/// ## User Workflow
/// ```text
/// Counter: add line "Charger 25W" x 3
///      │
///      ▼
/// validate_line_quantity(3) ← THIS FUNCTION
///      │
///      ├── qty <= 0?    → "quantity must be positive"
///      ├── qty > 9999?  → "quantity must be between 1 and 9999"
///      │
///      └── OK → settlement planning
/// ```
pub fn validate_line_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount in minor units (prices, discount, tax).
///
/// ## Rules
/// - Must not be negative
/// - At most [`MAX_AMOUNT_CENTS`]
///
/// ## Example
/// ```rust
/// use stockpulse_core::validation::validate_amount_cents;
///
/// assert!(validate_amount_cents("discount", 0).is_ok());
/// assert!(validate_amount_cents("tax", -1).is_err());
/// assert!(validate_amount_cents("unit_price", i64::MAX / 2).is_err());
/// ```
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Validates an absolute stock target for an adjustment.
///
/// Negative targets are a stock-floor question, not a format one, so only
/// absurd magnitudes are refused here.
pub fn validate_stock_target(target: i64) -> ValidationResult<()> {
    const LIMIT: i64 = 1_000_000_000;
    if !(-LIMIT..=LIMIT).contains(&target) {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: -LIMIT,
            max: LIMIT,
        });
    }

    Ok(())
}

/// Validates a page size.
pub fn validate_page_limit(limit: i64) -> ValidationResult<()> {
    if !(1..=500).contains(&limit) {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

/// Validates a product registration request.
pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_sku(&product.sku)?;
    validate_product_name(&product.name)?;
    if let Some(barcode) = &product.barcode {
        validate_barcode(barcode)?;
    }
    validate_amount_cents("buy_price", product.buy_price_cents)?;
    validate_amount_cents("sell_price", product.sell_price_cents)?;
    if let Some(mrp) = product.mrp_cents {
        validate_amount_cents("mrp", mrp)?;
    }
    if product.opening_stock < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "opening_stock".to_string(),
        });
    }
    if product.min_stock < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "min_stock".to_string(),
        });
    }
    Ok(())
}

/// Validates a product edit. Only the fields present are checked.
pub fn validate_product_update(update: &ProductUpdate) -> ValidationResult<()> {
    if let Some(sku) = &update.sku {
        validate_sku(sku)?;
    }
    if let Some(name) = &update.name {
        validate_product_name(name)?;
    }
    if let Some(barcode) = &update.barcode {
        validate_barcode(barcode)?;
    }
    if let Some(buy) = update.buy_price_cents {
        validate_amount_cents("buy_price", buy)?;
    }
    if let Some(sell) = update.sell_price_cents {
        validate_amount_cents("sell_price", sell)?;
    }
    if let Some(mrp) = update.mrp_cents {
        validate_amount_cents("mrp", mrp)?;
    }
    if update.min_stock.is_some_and(|m| m < 0) {
        return Err(ValidationError::MustNotBeNegative {
            field: "min_stock".to_string(),
        });
    }
    if let Some(stock) = update.stock {
        validate_stock_target(stock)?;
    }
    Ok(())
}

/// Validates a service job intake.
pub fn validate_new_service_job(job: &NewServiceJob) -> ValidationResult<()> {
    validate_text("device_name", &job.device_name, 200)?;
    validate_text("issue", &job.issue, 2000)?;
    if let Some(cost) = job.estimated_cost_cents {
        validate_amount_cents("estimated_cost", cost)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product() -> NewProduct {
        NewProduct {
            sku: "CBL-USBC".to_string(),
            barcode: Some("8901234567890".to_string()),
            name: "USB-C Cable".to_string(),
            buy_price_cents: 120,
            sell_price_cents: 250,
            mrp_cents: Some(299),
            opening_stock: 10,
            min_stock: 5,
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("ABC-123").is_ok());
        assert!(validate_sku("abc_123").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("ABC 123").is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("8901234567890").is_ok());
        assert!(validate_barcode("12").is_err());
        assert!(validate_barcode("1234 5678").is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("Damaged in transit").is_ok());
        assert_eq!(validate_reason("  "), Err(ValidationError::required("reason")));
    }

    #[test]
    fn test_validate_line_quantity() {
        assert!(validate_line_quantity(1).is_ok());
        assert!(validate_line_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(validate_line_quantity(0).is_err());
        assert!(validate_line_quantity(-3).is_err());
        assert!(validate_line_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_amount_bounds() {
        assert!(validate_amount_cents("unit_price", 0).is_ok());
        assert!(validate_amount_cents("unit_price", MAX_AMOUNT_CENTS).is_ok());
        assert_eq!(
            validate_amount_cents("unit_price", MAX_AMOUNT_CENTS + 1),
            Err(ValidationError::OutOfRange {
                field: "unit_price".to_string(),
                min: 0,
                max: MAX_AMOUNT_CENTS,
            })
        );
    }

    #[test]
    fn test_validate_page_limit() {
        assert!(validate_page_limit(50).is_ok());
        assert!(validate_page_limit(0).is_err());
        assert!(validate_page_limit(501).is_err());
    }

    #[test]
    fn test_validate_new_product() {
        assert!(validate_new_product(&new_product()).is_ok());

        let mut p = new_product();
        p.opening_stock = -1;
        assert!(matches!(
            validate_new_product(&p),
            Err(ValidationError::MustNotBeNegative { .. })
        ));

        let mut p = new_product();
        p.sell_price_cents = -5;
        assert!(validate_new_product(&p).is_err());

        let mut p = new_product();
        p.buy_price_cents = i64::MAX;
        assert!(matches!(
            validate_new_product(&p),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_product_update() {
        assert!(validate_product_update(&ProductUpdate::default()).is_ok());

        let update = ProductUpdate {
            name: Some("USB-C Cable 2m".to_string()),
            min_stock: Some(8),
            sell_price_cents: Some(275),
            ..ProductUpdate::default()
        };
        assert!(validate_product_update(&update).is_ok());
        assert!(update.changes_details());

        let stock_only = ProductUpdate {
            stock: Some(12),
            ..ProductUpdate::default()
        };
        assert!(!stock_only.changes_details());

        let blank_name = ProductUpdate {
            name: Some("  ".to_string()),
            ..ProductUpdate::default()
        };
        assert_eq!(
            validate_product_update(&blank_name),
            Err(ValidationError::required("name"))
        );

        let negative_min = ProductUpdate {
            min_stock: Some(-1),
            ..ProductUpdate::default()
        };
        assert!(validate_product_update(&negative_min).is_err());
    }

    #[test]
    fn test_validate_new_service_job() {
        let job = NewServiceJob {
            customer_id: None,
            device_name: "Pixel 7".to_string(),
            device_model: None,
            issue: "Cracked screen".to_string(),
            estimated_cost_cents: Some(4500),
        };
        assert!(validate_new_service_job(&job).is_ok());

        let job = NewServiceJob {
            issue: String::new(),
            ..job
        };
        assert!(validate_new_service_job(&job).is_err());
    }
}
