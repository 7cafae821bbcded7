//! # Settlement Planning
//!
//! Turns a document request plus a catalog snapshot into a fully priced,
//! validated plan. The database layer executes the plan; nothing here reads
//! or writes state.
//!
//! ## One Engine, Two Directions
//! ```text
//! ┌──────────────────────┬─────────────────────┬─────────────────────────┐
//! │                      │ Consuming (sale)    │ Replenishing (purchase) │
//! ├──────────────────────┼─────────────────────┼─────────────────────────┤
//! │ document kind        │ Sale   (INV)        │ Purchase (PUR)          │
//! │ movement             │ out, "Sale"         │ in, "Purchase"          │
//! │ stock delta per line │ -quantity           │ +quantity               │
//! │ sufficiency check    │ yes                 │ no                      │
//! │ unit price fallback  │ sell price          │ buy price               │
//! │ counterparty         │ optional customer   │ required supplier       │
//! │ payment type         │ SALE                │ PURCHASE                │
//! └──────────────────────┴─────────────────────┴─────────────────────────┘
//! ```
//!
//! ## Totals
//! ```text
//! line.total     = quantity * unit_price - line_discount
//! total_amount   = Σ quantity * unit_price
//! final_amount   = total_amount - discount + tax
//! ```
//! Line discounts are recorded per line and do not reduce `total_amount`.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{
    DocumentKind, MovementKind, PaymentMode, PaymentStatus, Product, StockDirection, StockFloor,
    TransactionType,
};
use crate::validation::{
    validate_actor_id, validate_amount_cents, validate_line_quantity, ValidationResult,
};
use crate::{MAX_DOCUMENT_LINES, PURCHASE_REASON, SALE_REASON};

// =============================================================================
// Direction
// =============================================================================

/// Which way a settlement moves stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SettlementDirection {
    /// Stock leaves the shop (sale).
    Consuming,
    /// Stock enters the shop (purchase).
    Replenishing,
}

impl SettlementDirection {
    pub const fn document_kind(&self) -> DocumentKind {
        match self {
            SettlementDirection::Consuming => DocumentKind::Sale,
            SettlementDirection::Replenishing => DocumentKind::Purchase,
        }
    }

    pub const fn movement_kind(&self) -> MovementKind {
        match self {
            SettlementDirection::Consuming => MovementKind::Out,
            SettlementDirection::Replenishing => MovementKind::In,
        }
    }

    pub const fn stock_direction(&self) -> StockDirection {
        match self {
            SettlementDirection::Consuming => StockDirection::Decrease,
            SettlementDirection::Replenishing => StockDirection::Increase,
        }
    }

    /// Reason written on every movement this settlement appends.
    pub const fn reason(&self) -> &'static str {
        match self {
            SettlementDirection::Consuming => SALE_REASON,
            SettlementDirection::Replenishing => PURCHASE_REASON,
        }
    }

    pub const fn transaction_type(&self) -> TransactionType {
        match self {
            SettlementDirection::Consuming => TransactionType::Sale,
            SettlementDirection::Replenishing => TransactionType::Purchase,
        }
    }

    /// Stock floor for the conditional update. Incoming stock never makes a
    /// negative balance worse, so it is always accepted.
    pub const fn stock_floor(&self) -> StockFloor {
        match self {
            SettlementDirection::Consuming => StockFloor::NonNegative,
            SettlementDirection::Replenishing => StockFloor::AllowNegative,
        }
    }

    /// Only outgoing stock can be oversold.
    pub const fn checks_sufficiency(&self) -> bool {
        matches!(self, SettlementDirection::Consuming)
    }

    pub const fn requires_counterparty(&self) -> bool {
        matches!(self, SettlementDirection::Replenishing)
    }

    /// Unit price used when a line does not name one.
    pub fn fallback_price_cents(&self, product: &Product) -> i64 {
        match self {
            SettlementDirection::Consuming => product.sell_price_cents,
            SettlementDirection::Replenishing => product.buy_price_cents,
        }
    }

    /// Signed stock change for a line of `quantity`.
    pub const fn stock_delta(&self, quantity: i64) -> i64 {
        match self {
            SettlementDirection::Consuming => -quantity,
            SettlementDirection::Replenishing => quantity,
        }
    }
}

/// What to do with a document discount larger than the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum DiscountPolicy {
    /// Refuse the document with `DiscountExceedsTotal`.
    #[default]
    Reject,
    /// Cap the discount at the total and attach a warning.
    Clamp,
}

// =============================================================================
// Requests
// =============================================================================

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Falls back to the product's sell (sale) or buy (purchase) price.
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub line_discount_cents: i64,
}

impl LineRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: None,
            line_discount_cents: 0,
        }
    }

    pub fn at_price(mut self, unit_price_cents: i64) -> Self {
        self.unit_price_cents = Some(unit_price_cents);
        self
    }

    pub fn with_discount(mut self, line_discount_cents: i64) -> Self {
        self.line_discount_cents = line_discount_cents;
        self
    }
}

/// A sale or purchase as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    /// Customer (sale, optional) or supplier (purchase, required).
    pub counterparty_id: Option<String>,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default = "default_payment_status")]
    pub payment_status: PaymentStatus,
    /// Cash for sales, the configured mode for purchases.
    pub payment_mode: Option<PaymentMode>,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub actor_id: String,
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Paid
}

impl DocumentRequest {
    /// A paid request with no discount or tax.
    pub fn new(actor_id: impl Into<String>, lines: Vec<LineRequest>) -> Self {
        Self {
            counterparty_id: None,
            lines,
            discount_cents: 0,
            tax_cents: 0,
            payment_status: PaymentStatus::Paid,
            payment_mode: None,
            due_date: None,
            notes: None,
            actor_id: actor_id.into(),
        }
    }

    /// Shape checks that need no catalog access.
    pub fn validate(&self, direction: SettlementDirection) -> ValidationResult<()> {
        validate_actor_id(&self.actor_id)?;

        if direction.requires_counterparty()
            && self
                .counterparty_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(ValidationError::required("supplier_id"));
        }

        if self.lines.is_empty() {
            return Err(ValidationError::EmptyDocument);
        }
        if self.lines.len() > MAX_DOCUMENT_LINES {
            return Err(ValidationError::TooManyLines {
                max: MAX_DOCUMENT_LINES,
            });
        }

        for line in &self.lines {
            if line.product_id.trim().is_empty() {
                return Err(ValidationError::required("product_id"));
            }
            validate_line_quantity(line.quantity)?;
            if let Some(price) = line.unit_price_cents {
                validate_amount_cents("unit_price", price)?;
            }
            validate_amount_cents("line_discount", line.line_discount_cents)?;
        }

        validate_amount_cents("discount", self.discount_cents)?;
        validate_amount_cents("tax", self.tax_cents)?;
        Ok(())
    }

    /// Distinct product ids in first-seen order.
    pub fn product_ids(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if !seen.contains(&line.product_id) {
                seen.push(line.product_id.clone());
            }
        }
        seen
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Non-fatal conditions attached to a settled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementWarning {
    /// The same product appears on several lines; each stays a separate row.
    DuplicateProductLines { product_id: String, lines: Vec<i64> },
    /// The document discount was reduced to the total.
    DiscountClamped { requested_cents: i64, applied_cents: i64 },
    /// A product sits at or below its reorder threshold after settlement.
    LowStock {
        product_id: String,
        stock: i64,
        min_stock: i64,
    },
}

/// A priced line ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLine {
    /// 1-based position.
    pub line_no: i64,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_discount_cents: i64,
    pub total_cents: i64,
    /// Signed change this line applies to the product's stock.
    pub stock_delta: i64,
}

/// Everything the commit phase needs, computed before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub direction: SettlementDirection,
    pub counterparty_id: Option<String>,
    pub lines: Vec<PlannedLine>,
    pub total_amount_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub final_amount_cents: i64,
    pub payment_status: PaymentStatus,
    pub payment_mode: PaymentMode,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub actor_id: String,
    pub warnings: Vec<SettlementWarning>,
}

impl SettlementPlan {
    /// Amount to record as a payment, if the status records one.
    ///
    /// Partial payments record the full final amount; balances are tracked
    /// outside the ledger.
    pub fn payment_amount_cents(&self) -> Option<i64> {
        self.payment_status
            .records_payment()
            .then_some(self.final_amount_cents)
    }

    pub fn final_amount(&self) -> Money {
        Money::from_cents(self.final_amount_cents)
    }
}

/// Settings that shape planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanningOptions {
    pub discount_policy: DiscountPolicy,
    /// Used when a purchase request names no payment mode.
    pub purchase_payment_mode: PaymentMode,
}

impl Default for PlanningOptions {
    fn default() -> Self {
        Self {
            discount_policy: DiscountPolicy::Reject,
            purchase_payment_mode: PaymentMode::BankTransfer,
        }
    }
}

/// Builds a settlement plan from a request and a catalog snapshot.
///
/// `catalog` must hold every product the request names that exists; missing
/// or inactive entries fail with `ProductNotFound`. For consuming settlements
/// the summed quantity per product is checked against the snapshot stock.
/// The commit phase re-checks with a conditional update, so a stale snapshot
/// can only make this check too lenient, never let an oversell through.
pub fn plan_settlement(
    direction: SettlementDirection,
    request: &DocumentRequest,
    catalog: &HashMap<String, Product>,
    options: PlanningOptions,
) -> CoreResult<SettlementPlan> {
    request.validate(direction)?;

    let mut warnings = Vec::new();
    let mut lines = Vec::with_capacity(request.lines.len());
    let mut gross_amounts = Vec::with_capacity(request.lines.len());
    let mut requested: BTreeMap<&str, (i64, Vec<i64>)> = BTreeMap::new();

    for (idx, line) in request.lines.iter().enumerate() {
        let line_no = idx as i64 + 1;
        let product = catalog
            .get(&line.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

        let unit_price = line
            .unit_price_cents
            .unwrap_or_else(|| direction.fallback_price_cents(product));
        let gross = Money::from_cents(unit_price)
            .checked_multiply_quantity(line.quantity)
            .ok_or_else(|| overflow("line_amount"))?;

        if line.line_discount_cents > gross.cents() {
            return Err(ValidationError::LineDiscountExceedsAmount {
                line: line_no as usize,
                discount: line.line_discount_cents,
                gross: gross.cents(),
            }
            .into());
        }

        gross_amounts.push(gross);

        let entry = requested
            .entry(product.id.as_str())
            .or_insert_with(|| (0, Vec::new()));
        entry.0 += line.quantity;
        entry.1.push(line_no);

        lines.push(PlannedLine {
            line_no,
            product_id: product.id.clone(),
            quantity: line.quantity,
            unit_price_cents: unit_price,
            line_discount_cents: line.line_discount_cents,
            total_cents: gross.cents() - line.line_discount_cents,
            stock_delta: direction.stock_delta(line.quantity),
        });
    }

    for (product_id, (quantity, line_nos)) in &requested {
        if direction.checks_sufficiency() {
            // Presence was checked while pricing the lines.
            if let Some(product) = catalog.get(*product_id) {
                if product.stock < *quantity {
                    return Err(CoreError::InsufficientStock {
                        product_id: product.id.clone(),
                        available: product.stock,
                        requested: *quantity,
                    });
                }
            }
        }
        if line_nos.len() > 1 {
            warnings.push(SettlementWarning::DuplicateProductLines {
                product_id: product_id.to_string(),
                lines: line_nos.clone(),
            });
        }
    }

    let total = Money::checked_sum(gross_amounts).ok_or_else(|| overflow("total_amount"))?;

    let mut discount = Money::from_cents(request.discount_cents);
    if discount > total {
        match options.discount_policy {
            DiscountPolicy::Reject => {
                return Err(ValidationError::DiscountExceedsTotal {
                    discount: discount.cents(),
                    total: total.cents(),
                }
                .into());
            }
            DiscountPolicy::Clamp => {
                let applied = discount.capped_at(total);
                warnings.push(SettlementWarning::DiscountClamped {
                    requested_cents: discount.cents(),
                    applied_cents: applied.cents(),
                });
                discount = applied;
            }
        }
    }

    let tax = Money::from_cents(request.tax_cents);
    let final_amount = total
        .checked_sub(discount)
        .and_then(|net| net.checked_add(tax))
        .ok_or_else(|| overflow("final_amount"))?;

    let payment_mode = request.payment_mode.unwrap_or(match direction {
        SettlementDirection::Consuming => PaymentMode::Cash,
        SettlementDirection::Replenishing => options.purchase_payment_mode,
    });

    Ok(SettlementPlan {
        direction,
        counterparty_id: request
            .counterparty_id
            .clone()
            .filter(|id| !id.trim().is_empty()),
        lines,
        total_amount_cents: total.cents(),
        discount_cents: discount.cents(),
        tax_cents: tax.cents(),
        final_amount_cents: final_amount.cents(),
        payment_status: request.payment_status,
        payment_mode,
        due_date: request.due_date,
        notes: request.notes.clone(),
        actor_id: request.actor_id.clone(),
        warnings,
    })
}

fn overflow(field: &str) -> CoreError {
    ValidationError::AmountOverflow {
        field: field.to_string(),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================
