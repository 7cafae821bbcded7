//! # Domain Types
//!
//! Records owned by the catalog, the movement ledger, the settlement engine
//! and the payment recorder.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │ MovementEntry   │   │    Document     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  product_id     │   │  id (UUID)      │       │
//! │  │  sku            │   │  kind/direction │──►│  document_no    │       │
//! │  │  stock          │   │  quantity (>0)  │   │  lines[]        │       │
//! │  │  min_stock      │   │  reference_id   │   │  final_amount   │       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │                                                       │                 │
//! │                                              ┌────────▼────────┐        │
//! │                                              │PaymentTransaction│       │
//! │                                              │  type SALE/PUR. │        │
//! │                                              └─────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//! - `Product` is owned by the catalog; only settlement mutates `stock`.
//! - `MovementEntry`, `Document`, `DocumentLine` and `PaymentTransaction` are
//!   written once by settlement and never updated.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Product
// =============================================================================

/// A product held in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// Display name.
    pub name: String,

    /// Cost price in minor units.
    pub buy_price_cents: i64,

    /// Default selling price in minor units.
    pub sell_price_cents: i64,

    /// Printed maximum retail price, if any.
    pub mrp_cents: Option<i64>,

    /// Current on-hand quantity.
    pub stock: i64,

    /// Reorder threshold.
    pub min_stock: i64,

    /// Stock the product carried before its first ledger entry.
    ///
    /// Products registered through the catalog start at zero and receive an
    /// "Initial stock" movement instead, so this is non-zero only for rows
    /// imported from elsewhere.
    pub opening_stock: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// True when stock is at or below the reorder threshold.
    ///
    /// Computed on every read, never stored.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

/// Input for registering a product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub buy_price_cents: i64,
    pub sell_price_cents: i64,
    pub mrp_cents: Option<i64>,
    /// Quantity on hand at registration; recorded as an "Initial stock" movement.
    #[serde(default)]
    pub opening_stock: i64,
    #[serde(default = "default_min_stock")]
    pub min_stock: i64,
}

fn default_min_stock() -> i64 {
    5
}

/// Edits to a registered product. `None` leaves a field as it is.
///
/// Details are written in place. A `stock` value is not: it is applied as an
/// adjustment movement so the ledger still explains every unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub name: Option<String>,
    pub buy_price_cents: Option<i64>,
    pub sell_price_cents: Option<i64>,
    pub mrp_cents: Option<i64>,
    pub min_stock: Option<i64>,
    /// New absolute stock, recorded with reason "Stock update".
    pub stock: Option<i64>,
}

impl ProductUpdate {
    /// Whether any column other than `stock` changes.
    pub fn changes_details(&self) -> bool {
        self.sku.is_some()
            || self.barcode.is_some()
            || self.name.is_some()
            || self.buy_price_cents.is_some()
            || self.sell_price_cents.is_some()
            || self.mrp_cents.is_some()
            || self.min_stock.is_some()
    }
}

// =============================================================================
// Movement Ledger
// =============================================================================

/// Why a ledger entry exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Stock received (purchase, opening stock).
    In,
    /// Stock consumed (sale).
    Out,
    /// Manual correction, either direction.
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjustment => "adjustment",
        }
    }
}

/// Which way a ledger entry moved stock.
///
/// `In` is always `Increase` and `Out` is always `Decrease`; only
/// adjustments use both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum StockDirection {
    Increase,
    Decrease,
}

impl StockDirection {
    /// Direction of a signed delta. Zero has no direction.
    pub fn of(delta: i64) -> Option<Self> {
        match delta {
            d if d > 0 => Some(StockDirection::Increase),
            d if d < 0 => Some(StockDirection::Decrease),
            _ => None,
        }
    }
}

/// An immutable entry in the movement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MovementEntry {
    pub id: String,
    /// Insertion order; the ledger's total order and paging cursor.
    pub seq: i64,
    pub product_id: String,
    pub kind: MovementKind,
    pub direction: StockDirection,
    /// Unsigned magnitude (always > 0).
    pub quantity: i64,
    pub reason: String,
    /// Id of the document that caused this movement, if any.
    pub reference_id: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl MovementEntry {
    /// The entry's contribution to stock: `+quantity` or `-quantity`.
    #[inline]
    pub fn signed_delta(&self) -> i64 {
        match self.direction {
            StockDirection::Increase => self.quantity,
            StockDirection::Decrease => -self.quantity,
        }
    }
}

/// A ledger entry that has not been appended yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub product_id: String,
    pub kind: MovementKind,
    pub direction: StockDirection,
    pub quantity: i64,
    pub reason: String,
    pub reference_id: Option<String>,
    pub actor_id: String,
}

impl NewMovement {
    #[inline]
    pub fn signed_delta(&self) -> i64 {
        match self.direction {
            StockDirection::Increase => self.quantity,
            StockDirection::Decrease => -self.quantity,
        }
    }
}

/// Opaque position in a product's movement history.
///
/// Pages are read newest first; a cursor means "entries older than this".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementCursor(pub i64);

/// One page of movement history.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementPage {
    pub entries: Vec<MovementEntry>,
    /// Present when older entries may exist.
    pub next_cursor: Option<MovementCursor>,
}

/// Whether a stock change may leave the product below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockFloor {
    /// Reject any change that ends below zero.
    #[default]
    NonNegative,
    /// Accept negative stock; only for flagged corrections.
    AllowNegative,
}

// =============================================================================
// Documents
// =============================================================================

/// Kind of numbered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Sale,
    Purchase,
    ServiceJob,
}

impl DocumentKind {
    /// Prefix used in the human-readable number.
    pub const fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "INV",
            DocumentKind::Purchase => "PUR",
            DocumentKind::ServiceJob => "JOB",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "INV" => Some(DocumentKind::Sale),
            "PUR" => Some(DocumentKind::Purchase),
            "JOB" => Some(DocumentKind::ServiceJob),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "sale",
            DocumentKind::Purchase => "purchase",
            DocumentKind::ServiceJob => "service_job",
        }
    }
}

/// Payment state of a settled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Whether settlement appends a payment transaction.
    #[inline]
    pub fn records_payment(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Partial)
    }
}

/// How money changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    #[default]
    Cash,
    Upi,
    Card,
    BankTransfer,
}

impl std::str::FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CASH" => Ok(PaymentMode::Cash),
            "UPI" => Ok(PaymentMode::Upi),
            "CARD" => Ok(PaymentMode::Card),
            "BANK_TRANSFER" => Ok(PaymentMode::BankTransfer),
            other => Err(format!("unknown payment mode: {}", other)),
        }
    }
}

/// A settled sale or purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Document {
    pub id: String,
    pub kind: DocumentKind,
    /// `INV-20261019-0001` style number, unique across all documents.
    pub document_no: String,
    /// Customer for sales (None for walk-ins), supplier for purchases.
    pub counterparty_id: Option<String>,
    pub total_amount_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub final_amount_cents: i64,
    pub payment_status: PaymentStatus,
    pub payment_mode: PaymentMode,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub lines: Vec<DocumentLine>,
}

/// A line on a settled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DocumentLine {
    pub id: String,
    pub document_id: String,
    /// Position on the document, starting at 1.
    pub line_no: i64,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_discount_cents: i64,
    /// `quantity * unit_price - line_discount`.
    pub total_cents: i64,
}

/// Which kind of document a payment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Sale,
    Purchase,
}

/// Money recorded against a settled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentTransaction {
    pub id: String,
    pub transaction_type: TransactionType,
    pub document_id: String,
    pub counterparty_id: Option<String>,
    pub amount_cents: i64,
    pub payment_mode: PaymentMode,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Service Jobs
// =============================================================================

/// Repair job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Delivered,
    Cancelled,
}

impl ServiceStatus {
    /// Jobs only move forward; any job that has not been delivered can be
    /// cancelled.
    pub fn can_transition_to(&self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (Completed, Delivered)
                | (Pending, Cancelled)
                | (InProgress, Cancelled)
                | (Completed, Cancelled)
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::InProgress => "in_progress",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Delivered => "delivered",
            ServiceStatus::Cancelled => "cancelled",
        }
    }
}

/// A device brought in for repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceJob {
    pub id: String,
    /// `JOB-20261019-0001` style number.
    pub job_no: String,
    pub customer_id: Option<String>,
    pub device_name: String,
    pub device_model: Option<String>,
    pub issue: String,
    pub estimated_cost_cents: Option<i64>,
    pub status: ServiceStatus,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Input for opening a service job.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceJob {
    pub customer_id: Option<String>,
    pub device_name: String,
    pub device_model: Option<String>,
    pub issue: String,
    pub estimated_cost_cents: Option<i64>,
}

// =============================================================================
// Reports
// =============================================================================

/// Stock report totals over active products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockSummary {
    pub total_products: i64,
    pub stock_value_cents: i64,
    pub low_stock_count: i64,
}

/// Period width of a sales report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ReportGrouping {
    /// `2026-10-19`
    #[default]
    Day,
    /// ISO week, `2026-W42`
    Week,
    /// `2026-10`
    Month,
}

/// Sales figures for one period of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SalesPeriod {
    /// Period key in business-day time, format set by the grouping.
    pub period: String,
    pub sale_count: i64,
    /// Sum of `final_amount_cents`.
    pub revenue_cents: i64,
    /// Revenue less the current buy price of every unit sold.
    pub profit_cents: i64,
}

/// Totals across every period of a sales report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_sales: i64,
    pub total_revenue_cents: i64,
    pub total_profit_cents: i64,
    /// Revenue over sale count, rounded toward zero. Zero with no sales.
    pub average_order_value_cents: i64,
}

/// Sale count, revenue and profit over a date range, per period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub grouping: ReportGrouping,
    pub summary: SalesSummary,
    /// Oldest period first.
    pub periods: Vec<SalesPeriod>,
}

impl SalesReport {
    /// Totals `periods` into a report. `None` if a total leaves `i64`.
    pub fn from_periods(grouping: ReportGrouping, periods: Vec<SalesPeriod>) -> Option<Self> {
        let mut summary = SalesSummary::default();
        for period in &periods {
            summary.total_sales = summary.total_sales.checked_add(period.sale_count)?;
            summary.total_revenue_cents =
                summary.total_revenue_cents.checked_add(period.revenue_cents)?;
            summary.total_profit_cents =
                summary.total_profit_cents.checked_add(period.profit_cents)?;
        }
        if summary.total_sales > 0 {
            summary.average_order_value_cents = summary.total_revenue_cents / summary.total_sales;
        }
        Some(SalesReport {
            grouping,
            summary,
            periods,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
