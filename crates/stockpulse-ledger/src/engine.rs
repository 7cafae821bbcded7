//! # Settlement Engine
//!
//! The only writer of stock. Every operation here is one unit of work: it
//! either commits completely or leaves no trace.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     settle_sale / settle_purchase                       │
//! │                                                                         │
//! │  Validating                                                            │
//! │  ──────────                                                            │
//! │  request.validate() ──► catalog snapshot ──► plan_settlement()         │
//! │       │ (any failure: Rejected, nothing written)                       │
//! │       ▼                                                                 │
//! │  Reserving (one transaction)                                           │
//! │  ─────────                                                             │
//! │  mint INV/PUR number ──► insert document + lines                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  per line: conditional stock update ──► movement entry                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  payment transaction (paid / partial)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Committed ──► Settlement { document, warnings }                       │
//! │                                                                         │
//! │  Busy store: the whole transaction is retried with backoff, up to      │
//! │  max_commit_attempts, then CommitFailure.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## No Oversell
//! The catalog snapshot used for planning may be stale by the time the
//! transaction runs. The stock update itself only applies while the result
//! stays at or above zero, so two sales racing for the last unit cannot both
//! commit; the loser is rolled back with `InsufficientStock`.

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures_util::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use stockpulse_core::validation::{
    validate_actor_id, validate_new_product, validate_new_service_job, validate_page_limit,
    validate_product_update, validate_reason, validate_stock_target,
};
use stockpulse_core::{
    plan_settlement, CoreError, Document, DocumentKind, DocumentLine, DocumentNumber,
    DocumentRequest, MovementCursor, MovementEntry, MovementKind, MovementPage, NewMovement,
    NewProduct, NewServiceJob, PaymentTransaction, Product, ProductUpdate, ReportGrouping,
    SalesReport, ServiceJob, ServiceStatus, SettlementDirection, SettlementPlan,
    SettlementWarning, StockDirection, StockFloor, StockSummary, ValidationError,
    INITIAL_STOCK_REASON, STOCK_UPDATE_REASON,
};
use stockpulse_db::{
    generate_product_id, Database, DbError, DocumentFilter, SqliteConnection, StockChange,
};

use crate::config::{LedgerConfig, SettlementSettings};
use crate::error::{LedgerError, LedgerResult};

/// Times a freshly minted number may collide with an existing document
/// before the collision is reported.
const MAX_SEQUENCE_COLLISIONS: u32 = 5;

/// A committed document and the non-fatal conditions noticed on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub document: Document,
    pub warnings: Vec<SettlementWarning>,
}

/// Outcome of one transaction attempt.
#[derive(Debug)]
enum AttemptError {
    /// Business rule; retrying cannot help.
    Rejected(CoreError),
    Db(DbError),
}

impl From<DbError> for AttemptError {
    fn from(err: DbError) -> Self {
        AttemptError::Db(err)
    }
}

impl From<CoreError> for AttemptError {
    fn from(err: CoreError) -> Self {
        AttemptError::Rejected(err)
    }
}

impl From<ValidationError> for AttemptError {
    fn from(err: ValidationError) -> Self {
        AttemptError::Rejected(CoreError::Validation(err))
    }
}

/// What a committed settlement transaction leaves behind.
struct Committed {
    document: Document,
    /// Stock after the last line touching each product.
    stock_after: HashMap<String, i64>,
}

/// Where an adjustment takes a product's stock, and on whose authority.
struct StockTarget<'a> {
    stock: i64,
    reason: &'a str,
    actor_id: &'a str,
    floor: StockFloor,
}

/// Settles sales and purchases, adjusts stock, and answers catalog and ledger
/// queries.
///
/// Cheap to clone; clones share the database pool.
#[derive(Debug, Clone)]
pub struct SettlementEngine {
    db: Database,
    settings: SettlementSettings,
}

impl SettlementEngine {
    pub fn new(db: Database, settings: SettlementSettings) -> Self {
        SettlementEngine { db, settings }
    }

    /// Opens the configured database and builds an engine on it.
    pub async fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        let db = Database::new(config.to_db_config()).await?;
        Ok(Self::new(db, config.settlement.clone()))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettlementSettings {
        &self.settings
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Settles a sale: stock leaves, an `INV-` document is minted.
    ///
    /// ## Errors
    /// * `ProductNotFound` - unknown or inactive product on any line
    /// * `InsufficientStock` - a product's summed quantity exceeds its stock
    /// * `Validation` - empty document, bad quantities, discount over total
    pub async fn settle_sale(&self, request: &DocumentRequest) -> LedgerResult<Settlement> {
        self.settle_document(SettlementDirection::Consuming, request)
            .await
    }

    /// Settles a purchase: stock arrives, a `PUR-` document is minted.
    ///
    /// Requires a supplier in `counterparty_id`. There is no sufficiency check.
    pub async fn settle_purchase(&self, request: &DocumentRequest) -> LedgerResult<Settlement> {
        self.settle_document(SettlementDirection::Replenishing, request)
            .await
    }

    /// Settles a document in either direction.
    pub async fn settle_document(
        &self,
        direction: SettlementDirection,
        request: &DocumentRequest,
    ) -> LedgerResult<Settlement> {
        let span = info_span!(
            "settle",
            kind = direction.document_kind().as_str(),
            actor_id = %request.actor_id,
        );

        self.run_settlement(direction, request)
            .instrument(span)
            .await
    }

    async fn run_settlement(
        &self,
        direction: SettlementDirection,
        request: &DocumentRequest,
    ) -> LedgerResult<Settlement> {
        request.validate(direction)?;

        let catalog: HashMap<String, Product> = self
            .db
            .products()
            .get_many(&request.product_ids())
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let plan = plan_settlement(
            direction,
            request,
            &catalog,
            self.settings.planning_options(),
        )?;

        let committed = self
            .with_commit_retry("settle", || self.commit_settlement(&plan))
            .await?;

        let mut warnings = plan.warnings.clone();
        if direction == SettlementDirection::Consuming {
            warnings.extend(low_stock_warnings(&plan, &catalog, &committed.stock_after));
        }
        for warning in &warnings {
            warn!(document_no = %committed.document.document_no, ?warning, "Settlement warning");
        }

        info!(
            document_no = %committed.document.document_no,
            lines = committed.document.lines.len(),
            final_amount = %plan.final_amount(),
            "Settlement committed"
        );

        Ok(Settlement {
            document: committed.document,
            warnings,
        })
    }

    /// One transaction attempt for a planned settlement.
    async fn commit_settlement(&self, plan: &SettlementPlan) -> Result<Committed, AttemptError> {
        let mut tx = self.db.begin().await?;

        // Stamped under the write lock so timestamps follow commit order.
        let now = Utc::now();
        let day = self.settings.business_day(now);
        let direction = plan.direction;
        let kind = direction.document_kind();

        let mut document = build_document(plan, now);

        let documents = self.db.documents();
        let sequences = self.db.sequences();
        let mut collisions = 0;
        loop {
            let number = sequences.mint_in(&mut tx, kind, day).await?;
            document.document_no = number.to_string();

            match documents.insert_in(&mut tx, &document).await {
                Ok(()) => break,
                Err(e)
                    if e.is_unique_violation_on("document_no")
                        && collisions < MAX_SEQUENCE_COLLISIONS =>
                {
                    collisions += 1;
                    warn!(document_no = %document.document_no, collisions, "Document number taken, minting another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let products = self.db.products();
        let movements = self.db.movements();
        let mut stock_after: HashMap<String, i64> = HashMap::new();
        let mut applied: HashMap<&str, i64> = HashMap::new();

        for line in &plan.lines {
            match products
                .apply_stock_delta(
                    &mut tx,
                    &line.product_id,
                    line.stock_delta,
                    direction.stock_floor(),
                    now,
                )
                .await?
            {
                StockChange::Applied { new_stock } => {
                    stock_after.insert(line.product_id.clone(), new_stock);
                    *applied.entry(line.product_id.as_str()).or_default() += line.quantity;
                }
                StockChange::Rejected { current } => {
                    let already = applied.get(line.product_id.as_str()).copied().unwrap_or(0);
                    let requested: i64 = plan
                        .lines
                        .iter()
                        .filter(|l| l.product_id == line.product_id)
                        .map(|l| l.quantity)
                        .sum();
                    return Err(CoreError::InsufficientStock {
                        product_id: line.product_id.clone(),
                        available: current + already,
                        requested,
                    }
                    .into());
                }
                StockChange::Missing => {
                    return Err(CoreError::ProductNotFound(line.product_id.clone()).into());
                }
            }

            movements
                .append_in(
                    &mut tx,
                    &NewMovement {
                        product_id: line.product_id.clone(),
                        kind: direction.movement_kind(),
                        direction: direction.stock_direction(),
                        quantity: line.quantity,
                        reason: direction.reason().to_string(),
                        reference_id: Some(document.id.clone()),
                        actor_id: plan.actor_id.clone(),
                    },
                    now,
                )
                .await?;
        }

        if let Some(amount_cents) = plan.payment_amount_cents() {
            let payment = PaymentTransaction {
                id: Uuid::new_v4().to_string(),
                transaction_type: direction.transaction_type(),
                document_id: document.id.clone(),
                counterparty_id: plan.counterparty_id.clone(),
                amount_cents,
                payment_mode: plan.payment_mode,
                actor_id: plan.actor_id.clone(),
                created_at: now,
            };
            self.db.payments().record_in(&mut tx, &payment).await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        Ok(Committed {
            document,
            stock_after,
        })
    }

    /// Runs `attempt` until it commits, is rejected, or runs out of tries.
    ///
    /// Only transient store errors (busy, pool timeout) are retried. Each
    /// attempt is a fresh transaction, so a failed one leaves nothing behind.
    async fn with_commit_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.settings.max_commit_attempts.max(1);
        let mut tries = 0;

        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Rejected(err)) => {
                    debug!(operation, error = %err, "Rejected");
                    return Err(LedgerError::Rejected(err));
                }
                Err(AttemptError::Db(err)) if err.is_transient() => {
                    if tries >= max_attempts {
                        error!(operation, attempts = tries, error = %err, "Commit failed");
                        return Err(LedgerError::CommitFailure {
                            attempts: tries,
                            source: err,
                        });
                    }
                    let delay = self.settings.retry_delay(tries);
                    warn!(
                        operation,
                        attempt = tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Store busy, retrying..."
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Db(err)) => return Err(LedgerError::Database(err)),
            }
        }
    }

    // =========================================================================
    // Stock Adjustment
    // =========================================================================

    /// Sets a product's stock to `new_stock`, recording the difference as an
    /// adjustment movement.
    ///
    /// Setting the current value is a no-op with no movement. A target below
    /// zero is refused with `NegativeStock` unless `floor` is
    /// `StockFloor::AllowNegative` (a deliberate correction).
    pub async fn adjust_product_stock(
        &self,
        product_id: &str,
        new_stock: i64,
        reason: &str,
        actor_id: &str,
        floor: StockFloor,
    ) -> LedgerResult<Product> {
        validate_reason(reason)?;
        validate_actor_id(actor_id)?;
        validate_stock_target(new_stock)?;

        let span = info_span!("adjust_stock", product_id = %product_id, actor_id = %actor_id);
        let product = self
            .with_commit_retry("adjust_stock", || {
                self.commit_adjustment(product_id, new_stock, reason, actor_id, floor)
            })
            .instrument(span)
            .await?;

        info!(product_id = %product_id, stock = product.stock, "Stock adjusted");
        Ok(product)
    }

    async fn commit_adjustment(
        &self,
        product_id: &str,
        new_stock: i64,
        reason: &str,
        actor_id: &str,
        floor: StockFloor,
    ) -> Result<Product, AttemptError> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();

        let product = self
            .db
            .products()
            .get_by_id_in(&mut tx, product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        if product.stock == new_stock {
            debug!("Stock already at target");
            return Ok(product);
        }

        let target = StockTarget {
            stock: new_stock,
            reason,
            actor_id,
            floor,
        };
        let product = self.adjust_in(&mut tx, product, &target, now).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(product)
    }

    /// Moves `product` to `target.stock` inside the caller's transaction and
    /// appends the adjustment movement. Already at target: no writes.
    async fn adjust_in(
        &self,
        conn: &mut SqliteConnection,
        mut product: Product,
        target: &StockTarget<'_>,
        now: DateTime<Utc>,
    ) -> Result<Product, AttemptError> {
        let delta = target.stock - product.stock;
        let Some(direction) = StockDirection::of(delta) else {
            return Ok(product);
        };

        match self
            .db
            .products()
            .apply_stock_delta(&mut *conn, &product.id, delta, target.floor, now)
            .await?
        {
            StockChange::Applied { new_stock } => {
                product.stock = new_stock;
                product.updated_at = now;
            }
            StockChange::Rejected { current } => {
                return Err(CoreError::NegativeStock {
                    product_id: product.id.clone(),
                    current,
                    delta,
                }
                .into());
            }
            StockChange::Missing => {
                return Err(CoreError::ProductNotFound(product.id.clone()).into());
            }
        }

        self.db
            .movements()
            .append_in(
                &mut *conn,
                &NewMovement {
                    product_id: product.id.clone(),
                    kind: MovementKind::Adjustment,
                    direction,
                    quantity: delta.abs(),
                    reason: target.reason.trim().to_string(),
                    reference_id: None,
                    actor_id: target.actor_id.to_string(),
                },
                now,
            )
            .await?;

        Ok(product)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Registers a product. Any opening quantity arrives through an
    /// "Initial stock" movement in the same transaction, so the ledger
    /// explains the product's stock from its first moment.
    ///
    /// ## Errors
    /// * `Validation(AlreadyExists)` - the SKU or barcode is taken
    pub async fn register_product(
        &self,
        new_product: &NewProduct,
        actor_id: &str,
    ) -> LedgerResult<Product> {
        validate_new_product(new_product)?;
        validate_actor_id(actor_id)?;

        let product = self
            .with_commit_retry("register_product", || {
                self.commit_registration(new_product, actor_id)
            })
            .await?;

        info!(sku = %product.sku, stock = product.stock, "Product registered");
        Ok(product)
    }

    async fn commit_registration(
        &self,
        new_product: &NewProduct,
        actor_id: &str,
    ) -> Result<Product, AttemptError> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();
        let mut product = Product {
            id: generate_product_id(),
            sku: new_product.sku.trim().to_string(),
            barcode: new_product
                .barcode
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string),
            name: new_product.name.trim().to_string(),
            buy_price_cents: new_product.buy_price_cents,
            sell_price_cents: new_product.sell_price_cents,
            mrp_cents: new_product.mrp_cents,
            stock: 0,
            min_stock: new_product.min_stock,
            opening_stock: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let products = self.db.products();

        if let Err(err) = products.insert_in(&mut tx, &product).await {
            return Err(catalog_conflict(
                err,
                Some(&product.sku),
                product.barcode.as_deref(),
            ));
        }

        if new_product.opening_stock > 0 {
            let change = products
                .apply_stock_delta(
                    &mut tx,
                    &product.id,
                    new_product.opening_stock,
                    StockFloor::NonNegative,
                    now,
                )
                .await?;
            if let StockChange::Applied { new_stock } = change {
                product.stock = new_stock;
            }

            self.db
                .movements()
                .append_in(
                    &mut tx,
                    &NewMovement {
                        product_id: product.id.clone(),
                        kind: MovementKind::In,
                        direction: StockDirection::Increase,
                        quantity: new_product.opening_stock,
                        reason: INITIAL_STOCK_REASON.to_string(),
                        reference_id: None,
                        actor_id: actor_id.to_string(),
                    },
                    now,
                )
                .await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(product)
    }

    /// Edits a product's catalog details. A `stock` value is applied as an
    /// adjustment with reason "Stock update" in the same transaction, so the
    /// ledger still explains every unit.
    ///
    /// ## Errors
    /// * `ProductNotFound` - unknown or deactivated product
    /// * `Validation(AlreadyExists)` - the new SKU or barcode is taken
    /// * `NegativeStock` - `stock` below zero
    pub async fn update_product(
        &self,
        product_id: &str,
        update: &ProductUpdate,
        actor_id: &str,
    ) -> LedgerResult<Product> {
        validate_product_update(update)?;
        validate_actor_id(actor_id)?;

        let span = info_span!("update_product", product_id = %product_id, actor_id = %actor_id);
        let product = self
            .with_commit_retry("update_product", || {
                self.commit_product_update(product_id, update, actor_id)
            })
            .instrument(span)
            .await?;

        info!(product_id = %product_id, sku = %product.sku, "Product updated");
        Ok(product)
    }

    async fn commit_product_update(
        &self,
        product_id: &str,
        update: &ProductUpdate,
        actor_id: &str,
    ) -> Result<Product, AttemptError> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();
        let products = self.db.products();

        let product = if update.changes_details() {
            products
                .update_details_in(&mut tx, product_id, update, now)
                .await
                .map_err(|err| {
                    catalog_conflict(err, update.sku.as_deref(), update.barcode.as_deref())
                })?
        } else {
            products
                .get_by_id_in(&mut tx, product_id)
                .await?
                .filter(|p| p.is_active)
        }
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let product = match update.stock {
            Some(stock) => {
                let target = StockTarget {
                    stock,
                    reason: STOCK_UPDATE_REASON,
                    actor_id,
                    floor: StockFloor::NonNegative,
                };
                self.adjust_in(&mut tx, product, &target, now).await?
            }
            None => product,
        };

        tx.commit().await.map_err(DbError::from)?;
        Ok(product)
    }

    /// Soft-deletes a product. Its history stays; new settlements treat it as
    /// unknown.
    pub async fn deactivate_product(&self, product_id: &str) -> LedgerResult<()> {
        match self.db.products().deactivate(product_id).await {
            Ok(()) => {
                info!(product_id = %product_id, "Product deactivated");
                Ok(())
            }
            Err(DbError::NotFound { .. }) => {
                Err(CoreError::ProductNotFound(product_id.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// An active product by id.
    pub async fn get_product(&self, product_id: &str) -> LedgerResult<Product> {
        self.db
            .products()
            .get_by_id(product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }

    /// Maps a scanned SKU or barcode to an active product.
    pub async fn resolve_code(&self, code: &str) -> LedgerResult<Product> {
        self.db
            .products()
            .resolve_code(code)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(code.trim().to_string()).into())
    }

    pub async fn list_products(&self, limit: i64, offset: i64) -> LedgerResult<Vec<Product>> {
        validate_page_limit(limit)?;
        Ok(self.db.products().list_active(limit, offset.max(0)).await?)
    }

    /// Active products at or below their reorder threshold.
    pub async fn low_stock(&self) -> LedgerResult<Vec<Product>> {
        Ok(self.db.products().list_low_stock().await?)
    }

    pub async fn stock_summary(&self) -> LedgerResult<StockSummary> {
        Ok(self.db.products().summary().await?)
    }

    // =========================================================================
    // Movement Ledger
    // =========================================================================

    /// One page of a product's movement history, newest first.
    ///
    /// Pass the returned `next_cursor` back to continue; `None` means the
    /// oldest entry has been reached. Deactivated products keep their history.
    pub async fn list_movements(
        &self,
        product_id: &str,
        limit: i64,
        cursor: Option<MovementCursor>,
    ) -> LedgerResult<MovementPage> {
        validate_page_limit(limit)?;

        if self.db.products().get_by_id(product_id).await?.is_none() {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }

        Ok(self
            .db
            .movements()
            .list_for(product_id, limit, cursor)
            .await?)
    }

    /// The whole history of a product as a lazy stream, newest first.
    pub fn movement_stream(
        &self,
        product_id: &str,
        page_size: i64,
    ) -> impl Stream<Item = LedgerResult<MovementEntry>> + Send + 'static {
        self.db
            .movements()
            .stream_for(product_id, page_size.clamp(1, 500), None)
            .map_err(LedgerError::from)
    }

    /// Movements caused by one document.
    pub async fn movements_for_document(&self, document_id: &str) -> LedgerResult<Vec<MovementEntry>> {
        Ok(self.db.movements().list_by_reference(document_id).await?)
    }

    // =========================================================================
    // Documents & Payments
    // =========================================================================

    pub async fn get_document(&self, document_id: &str) -> LedgerResult<Document> {
        self.db
            .documents()
            .get_by_id(document_id)
            .await?
            .ok_or_else(|| CoreError::DocumentNotFound(document_id.to_string()).into())
    }

    /// Looks a document up by its printed number, e.g. `INV-20261019-0001`.
    pub async fn get_document_by_number(&self, document_no: &str) -> LedgerResult<Document> {
        let number: DocumentNumber = document_no.trim().parse()?;
        self.db
            .documents()
            .get_by_number(&number.to_string())
            .await?
            .ok_or_else(|| CoreError::DocumentNotFound(number.to_string()).into())
    }

    /// Documents newest first.
    pub async fn list_documents(
        &self,
        filter: &DocumentFilter,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<Vec<Document>> {
        validate_page_limit(limit)?;
        Ok(self.db.documents().list(filter, limit, offset.max(0)).await?)
    }

    pub async fn payments_for(&self, document_id: &str) -> LedgerResult<Vec<PaymentTransaction>> {
        Ok(self.db.payments().list_for_document(document_id).await?)
    }

    /// Sale count, revenue and profit for sales created in `[from, to]`,
    /// cut into business-day periods by `grouping`.
    ///
    /// Profit is priced at each product's current buy price.
    pub async fn sales_report(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        grouping: ReportGrouping,
    ) -> LedgerResult<SalesReport> {
        let periods = self
            .db
            .documents()
            .sales_report(from, to, grouping, self.settings.utc_offset_minutes)
            .await?;

        let report = SalesReport::from_periods(grouping, periods).ok_or_else(|| {
            CoreError::from(ValidationError::AmountOverflow {
                field: "total_revenue".to_string(),
            })
        })?;
        debug!(
            sales = report.summary.total_sales,
            periods = report.periods.len(),
            "Sales report built"
        );
        Ok(report)
    }

    // =========================================================================
    // Service Jobs
    // =========================================================================

    /// Opens a repair job with a `JOB-` number. Jobs never move stock.
    pub async fn open_service_job(
        &self,
        new_job: &NewServiceJob,
        actor_id: &str,
    ) -> LedgerResult<ServiceJob> {
        validate_new_service_job(new_job)?;
        validate_actor_id(actor_id)?;

        let job = self
            .with_commit_retry("open_service_job", || self.commit_service_job(new_job, actor_id))
            .await?;

        info!(job_no = %job.job_no, "Service job opened");
        Ok(job)
    }

    async fn commit_service_job(
        &self,
        new_job: &NewServiceJob,
        actor_id: &str,
    ) -> Result<ServiceJob, AttemptError> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();
        let day = self.settings.business_day(now);
        let mut job = ServiceJob {
            id: Uuid::new_v4().to_string(),
            job_no: String::new(),
            customer_id: new_job.customer_id.clone(),
            device_name: new_job.device_name.trim().to_string(),
            device_model: new_job.device_model.clone(),
            issue: new_job.issue.trim().to_string(),
            estimated_cost_cents: new_job.estimated_cost_cents,
            status: ServiceStatus::Pending,
            actor_id: actor_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        let jobs = self.db.service_jobs();
        let sequences = self.db.sequences();
        let mut collisions = 0;
        loop {
            job.job_no = sequences
                .mint_in(&mut tx, DocumentKind::ServiceJob, day)
                .await?
                .to_string();

            match jobs.insert_in(&mut tx, &job).await {
                Ok(()) => break,
                Err(e) if e.is_unique_violation_on("job_no") && collisions < MAX_SEQUENCE_COLLISIONS => {
                    collisions += 1;
                    warn!(job_no = %job.job_no, collisions, "Job number taken, minting another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(job)
    }

    /// Moves a job to `next`.
    ///
    /// ## Errors
    /// * `ServiceJobNotFound`
    /// * `InvalidStatusTransition` - `next` is not reachable from the job's
    ///   current status, including when another caller moved it first
    pub async fn update_service_status(
        &self,
        job_id: &str,
        next: ServiceStatus,
    ) -> LedgerResult<ServiceJob> {
        let jobs = self.db.service_jobs();
        let current = jobs
            .get_by_id(job_id)
            .await?
            .ok_or_else(|| CoreError::ServiceJobNotFound(job_id.to_string()))?;

        let invalid = |from: ServiceStatus| CoreError::InvalidStatusTransition {
            job_id: job_id.to_string(),
            from: from.as_str().to_string(),
            to: next.as_str().to_string(),
        };

        if !current.status.can_transition_to(next) {
            return Err(invalid(current.status).into());
        }

        match jobs.transition(job_id, current.status, next, Utc::now()).await? {
            Some(job) => {
                info!(job_no = %job.job_no, status = next.as_str(), "Service job updated");
                Ok(job)
            }
            None => {
                let moved = jobs
                    .get_by_id(job_id)
                    .await?
                    .ok_or_else(|| CoreError::ServiceJobNotFound(job_id.to_string()))?;
                Err(invalid(moved.status).into())
            }
        }
    }

    pub async fn list_service_jobs(
        &self,
        status: Option<ServiceStatus>,
        limit: i64,
        offset: i64,
    ) -> LedgerResult<Vec<ServiceJob>> {
        validate_page_limit(limit)?;
        Ok(self.db.service_jobs().list(status, limit, offset.max(0)).await?)
    }
}

/// Document rows for a plan; the number is filled in once minted.
/// Turns a unique violation on `products` into `AlreadyExists` for the
/// offending column.
fn catalog_conflict(err: DbError, sku: Option<&str>, barcode: Option<&str>) -> AttemptError {
    let field = if err.is_unique_violation_on("sku") {
        "sku"
    } else if err.is_unique_violation_on("barcode") {
        "barcode"
    } else {
        return err.into();
    };
    let value = if field == "sku" { sku } else { barcode };
    ValidationError::AlreadyExists {
        field: field.to_string(),
        value: value.map(str::trim).unwrap_or_default().to_string(),
    }
    .into()
}

fn build_document(plan: &SettlementPlan, now: DateTime<Utc>) -> Document {
    let id = Uuid::new_v4().to_string();
    let lines = plan
        .lines
        .iter()
        .map(|line| DocumentLine {
            id: Uuid::new_v4().to_string(),
            document_id: id.clone(),
            line_no: line.line_no,
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            line_discount_cents: line.line_discount_cents,
            total_cents: line.total_cents,
        })
        .collect();

    Document {
        id,
        kind: plan.direction.document_kind(),
        document_no: String::new(),
        counterparty_id: plan.counterparty_id.clone(),
        total_amount_cents: plan.total_amount_cents,
        discount_cents: plan.discount_cents,
        tax_cents: plan.tax_cents,
        final_amount_cents: plan.final_amount_cents,
        payment_status: plan.payment_status,
        payment_mode: plan.payment_mode,
        due_date: plan.due_date,
        notes: plan.notes.clone(),
        actor_id: plan.actor_id.clone(),
        created_at: now,
        lines,
    }
}

/// Products left at or below their reorder threshold, in line order.
fn low_stock_warnings(
    plan: &SettlementPlan,
    catalog: &HashMap<String, Product>,
    stock_after: &HashMap<String, i64>,
) -> Vec<SettlementWarning> {
    let mut warnings = Vec::new();
    for line in &plan.lines {
        let (Some(product), Some(&stock)) = (
            catalog.get(&line.product_id),
            stock_after.get(&line.product_id),
        ) else {
            continue;
        };
        let already = warnings.iter().any(|w| {
            matches!(w, SettlementWarning::LowStock { product_id, .. } if *product_id == product.id)
        });
        if stock <= product.min_stock && !already {
            warnings.push(SettlementWarning::LowStock {
                product_id: product.id.clone(),
                stock,
                min_stock: product.min_stock,
            });
        }
    }
    warnings
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use std::time::Duration;

    use futures_util::StreamExt;
    use stockpulse_core::{DiscountPolicy, LineRequest, PaymentMode, PaymentStatus, TransactionType};
    use stockpulse_db::DbConfig;

    use crate::reconcile::Reconciler;

    const ACTOR: &str = "user-1";

    async fn engine() -> SettlementEngine {
        engine_with(SettlementSettings::default()).await
    }

    async fn engine_with(settings: SettlementSettings) -> SettlementEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        SettlementEngine::new(db, settings)
    }

    async fn product(engine: &SettlementEngine, sku: &str, stock: i64, min_stock: i64) -> Product {
        engine
            .register_product(
                &NewProduct {
                    sku: sku.to_string(),
                    barcode: None,
                    name: format!("Product {sku}"),
                    buy_price_cents: 700,
                    sell_price_cents: 1000,
                    mrp_cents: None,
                    opening_stock: stock,
                    min_stock,
                },
                ACTOR,
            )
            .await
            .unwrap()
    }

    fn sale(lines: Vec<LineRequest>) -> DocumentRequest {
        DocumentRequest::new(ACTOR, lines)
    }

    fn purchase(lines: Vec<LineRequest>) -> DocumentRequest {
        let mut request = DocumentRequest::new(ACTOR, lines);
        request.counterparty_id = Some("supplier-1".to_string());
        request
    }

    fn today(engine: &SettlementEngine) -> String {
        engine
            .settings()
            .business_day(Utc::now())
            .format("%Y%m%d")
            .to_string()
    }

    #[tokio::test]
    async fn test_sale_to_zero_stays_low_stock() {
        let engine = engine().await;
        let p = product(&engine, "CHG-25W", 5, 5).await;
        assert!(engine.get_product(&p.id).await.unwrap().is_low_stock());

        let settled = engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 5)]))
            .await
            .unwrap();

        let after = engine.get_product(&p.id).await.unwrap();
        assert_eq!(after.stock, 0);
        assert!(after.is_low_stock());

        let movements = engine
            .movements_for_document(&settled.document.id)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, MovementKind::Out);
        assert_eq!(movements[0].quantity, 5);
        assert_eq!(movements[0].reason, "Sale");

        assert!(settled.warnings.contains(&SettlementWarning::LowStock {
            product_id: p.id.clone(),
            stock: 0,
            min_stock: 5,
        }));
    }

    #[tokio::test]
    async fn test_sale_on_empty_stock_is_rejected() {
        let engine = engine().await;
        let p = product(&engine, "CBL-USBC", 0, 2).await;

        let err = engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_core(),
            Some(CoreError::InsufficientStock { available: 0, requested: 1, .. })
        ));
        assert_eq!(engine.database().movements().count_for(&p.id).await.unwrap(), 0);
        assert_eq!(
            engine
                .database()
                .documents()
                .count(&DocumentFilter::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_same_day_sales_are_numbered_in_order() {
        let engine = engine().await;
        let p = product(&engine, "EAR-01", 10, 1).await;

        let first = engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 1)]))
            .await
            .unwrap();
        let second = engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 1)]))
            .await
            .unwrap();

        let day = today(&engine);
        assert_eq!(first.document.document_no, format!("INV-{day}-0001"));
        assert_eq!(second.document.document_no, format!("INV-{day}-0002"));
    }

    #[tokio::test]
    async fn test_purchase_adds_stock() {
        let engine = engine().await;
        let p = product(&engine, "LED-9W", 3, 1).await;

        let settled = engine
            .settle_purchase(&purchase(vec![LineRequest::new(&p.id, 10)]))
            .await
            .unwrap();

        assert_eq!(engine.get_product(&p.id).await.unwrap().stock, 13);
        assert!(settled.document.document_no.starts_with("PUR-"));
        assert_eq!(settled.document.lines[0].unit_price_cents, 700);

        let movements = engine
            .movements_for_document(&settled.document.id)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, MovementKind::In);
        assert_eq!(movements[0].quantity, 10);
        assert_eq!(movements[0].reason, "Purchase");

        let payments = engine.payments_for(&settled.document.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].transaction_type, TransactionType::Purchase);
        assert_eq!(payments[0].payment_mode, PaymentMode::BankTransfer);
    }

    #[tokio::test]
    async fn test_purchase_requires_supplier() {
        let engine = engine().await;
        let p = product(&engine, "LED-12W", 3, 1).await;

        let err = engine
            .settle_purchase(&sale(vec![LineRequest::new(&p.id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_adjust_to_current_stock_is_noop() {
        let engine = engine().await;
        let p = product(&engine, "BAT-AA", 7, 2).await;
        let before = engine.database().movements().count_for(&p.id).await.unwrap();

        let adjusted = engine
            .adjust_product_stock(&p.id, 7, "Stock count", ACTOR, StockFloor::NonNegative)
            .await
            .unwrap();

        assert_eq!(adjusted.stock, 7);
        assert_eq!(engine.database().movements().count_for(&p.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_adjustment_records_direction_and_magnitude() {
        let engine = engine().await;
        let p = product(&engine, "BAT-AAA", 7, 2).await;

        let adjusted = engine
            .adjust_product_stock(&p.id, 4, "Damaged", ACTOR, StockFloor::NonNegative)
            .await
            .unwrap();
        assert_eq!(adjusted.stock, 4);

        let page = engine.list_movements(&p.id, 10, None).await.unwrap();
        let latest = &page.entries[0];
        assert_eq!(latest.kind, MovementKind::Adjustment);
        assert_eq!(latest.direction, StockDirection::Decrease);
        assert_eq!(latest.quantity, 3);
        assert_eq!(latest.reason, "Damaged");
    }

    #[tokio::test]
    async fn test_negative_adjustment_needs_correction_floor() {
        let engine = engine().await;
        let p = product(&engine, "SIM-TRAY", 2, 0).await;

        let err = engine
            .adjust_product_stock(&p.id, -1, "Miscount", ACTOR, StockFloor::NonNegative)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::NegativeStock { current: 2, delta: -3, .. })
        ));
        assert_eq!(engine.get_product(&p.id).await.unwrap().stock, 2);

        let corrected = engine
            .adjust_product_stock(&p.id, -1, "Miscount", ACTOR, StockFloor::AllowNegative)
            .await
            .unwrap();
        assert_eq!(corrected.stock, -1);
    }

    #[tokio::test]
    async fn test_adjustment_requires_reason() {
        let engine = engine().await;
        let p = product(&engine, "PWR-BNK", 2, 0).await;

        let err = engine
            .adjust_product_stock(&p.id, 5, "  ", ACTOR, StockFloor::NonNegative)
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_failed_validation_leaves_no_trace() {
        let engine = engine().await;
        let p = product(&engine, "CASE-X1", 3, 1).await;
        let movements_before = engine.database().movements().count().await.unwrap();

        let err = engine
            .settle_sale(&sale(vec![
                LineRequest::new(&p.id, 2),
                LineRequest::new("missing-product", 1),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ProductNotFound(_))));

        assert_eq!(engine.get_product(&p.id).await.unwrap().stock, 3);
        assert_eq!(
            engine.database().movements().count().await.unwrap(),
            movements_before
        );
        assert_eq!(engine.database().payments().count().await.unwrap(), 0);
        assert_eq!(
            engine
                .database()
                .sequences()
                .current(DocumentKind::Sale, engine.settings().business_day(Utc::now()))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_summed_and_flagged() {
        let engine = engine().await;
        let p = product(&engine, "GLS-PRO", 3, 0).await;

        let err = engine
            .settle_sale(&sale(vec![
                LineRequest::new(&p.id, 2),
                LineRequest::new(&p.id, 2),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));

        let settled = engine
            .settle_sale(&sale(vec![
                LineRequest::new(&p.id, 1),
                LineRequest::new(&p.id, 2),
            ]))
            .await
            .unwrap();
        assert_eq!(settled.document.lines.len(), 2);
        assert!(settled.warnings.contains(&SettlementWarning::DuplicateProductLines {
            product_id: p.id.clone(),
            lines: vec![1, 2],
        }));
        assert_eq!(engine.get_product(&p.id).await.unwrap().stock, 0);
        assert_eq!(
            engine
                .movements_for_document(&settled.document.id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_discount_policy() {
        let p_engine = engine().await;
        let p = product(&p_engine, "SPK-BT", 5, 0).await;

        let mut request = sale(vec![LineRequest::new(&p.id, 1)]);
        request.discount_cents = 1500;
        let err = p_engine.settle_sale(&request).await.unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::Validation(ValidationError::DiscountExceedsTotal { .. }))
        ));

        let clamping = SettlementEngine::new(
            p_engine.database().clone(),
            SettlementSettings {
                discount_policy: DiscountPolicy::Clamp,
                ..SettlementSettings::default()
            },
        );
        let settled = clamping.settle_sale(&request).await.unwrap();
        assert_eq!(settled.document.discount_cents, 1000);
        assert_eq!(settled.document.final_amount_cents, 0);
        assert!(settled.warnings.contains(&SettlementWarning::DiscountClamped {
            requested_cents: 1500,
            applied_cents: 1000,
        }));
    }

    #[tokio::test]
    async fn test_payment_recorded_only_when_paid() {
        let engine = engine().await;
        let p = product(&engine, "MIC-LAV", 10, 0).await;

        let mut paid = sale(vec![LineRequest::new(&p.id, 2).at_price(900)]);
        paid.tax_cents = 150;
        paid.discount_cents = 100;
        paid.payment_mode = Some(PaymentMode::Upi);
        let settled = engine.settle_sale(&paid).await.unwrap();
        assert_eq!(settled.document.total_amount_cents, 1800);
        assert_eq!(settled.document.final_amount_cents, 1850);

        let payments = engine.payments_for(&settled.document.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount_cents, 1850);
        assert_eq!(payments[0].payment_mode, PaymentMode::Upi);
        assert_eq!(payments[0].transaction_type, TransactionType::Sale);
        assert_eq!(
            engine
                .database()
                .payments()
                .total_for_document(&settled.document.id)
                .await
                .unwrap(),
            1850
        );

        let mut pending = sale(vec![LineRequest::new(&p.id, 1)]);
        pending.payment_status = PaymentStatus::Pending;
        let settled = engine.settle_sale(&pending).await.unwrap();
        assert!(engine
            .payments_for(&settled.document.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sales_never_oversell() {
        let engine = engine().await;
        let p = product(&engine, "HOT-ITEM", 5, 0).await;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let engine = engine.clone();
            let id = p.id.clone();
            handles.push(tokio::spawn(async move {
                engine.settle_sale(&sale(vec![LineRequest::new(&id, 1)])).await
            }));
        }

        let mut committed = Vec::new();
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(settlement) => committed.push(settlement.document.document_no),
                Err(err) => {
                    assert!(matches!(
                        err.as_core(),
                        Some(CoreError::InsufficientStock { .. })
                    ));
                    rejected += 1;
                }
            }
        }

        assert_eq!(committed.len(), 5);
        assert_eq!(rejected, 7);
        assert_eq!(engine.get_product(&p.id).await.unwrap().stock, 0);

        // Numbers are contiguous from 0001 with no gaps or repeats.
        committed.sort();
        let day = today(&engine);
        let expected: Vec<String> = (1..=5).map(|n| format!("INV-{day}-{n:04}")).collect();
        assert_eq!(committed, expected);
    }

    #[tokio::test]
    async fn test_registration_records_initial_stock() {
        let engine = engine().await;
        let p = product(&engine, "KBD-MINI", 8, 2).await;
        assert_eq!(p.stock, 8);
        assert_eq!(p.opening_stock, 0);

        let page = engine.list_movements(&p.id, 10, None).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].reason, "Initial stock");
        assert_eq!(page.entries[0].kind, MovementKind::In);

        let dup = engine
            .register_product(
                &NewProduct {
                    sku: "KBD-MINI".to_string(),
                    barcode: None,
                    name: "Another keyboard".to_string(),
                    buy_price_cents: 1,
                    sell_price_cents: 2,
                    mrp_cents: None,
                    opening_stock: 0,
                    min_stock: 0,
                },
                ACTOR,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            dup.as_core(),
            Some(CoreError::Validation(ValidationError::AlreadyExists { .. }))
        ));
    }

    #[tokio::test]
    async fn test_deactivated_product_is_not_found() {
        let engine = engine().await;
        let p = product(&engine, "OLD-1", 4, 0).await;

        engine.deactivate_product(&p.id).await.unwrap();

        let err = engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::ProductNotFound(_))));
        assert!(engine.get_product(&p.id).await.is_err());
        assert!(engine.deactivate_product(&p.id).await.is_err());

        // History survives.
        assert_eq!(engine.list_movements(&p.id, 5, None).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_movement_history_pages_and_streams() {
        let engine = engine().await;
        let p = product(&engine, "PAGE-1", 20, 0).await;
        for _ in 0..4 {
            engine
                .settle_sale(&sale(vec![LineRequest::new(&p.id, 1)]))
                .await
                .unwrap();
        }

        let first = engine.list_movements(&p.id, 3, None).await.unwrap();
        assert_eq!(first.entries.len(), 3);
        let second = engine
            .list_movements(&p.id, 3, first.next_cursor)
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 2);
        assert!(second.next_cursor.is_none());
        assert_eq!(second.entries.last().unwrap().reason, "Initial stock");

        let streamed: Vec<MovementEntry> = engine
            .movement_stream(&p.id, 2)
            .take(5)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(streamed.len(), 5);
        assert!(streamed.windows(2).all(|w| w[0].seq > w[1].seq));

        assert!(engine.list_movements("nope", 3, None).await.is_err());
    }

    #[tokio::test]
    async fn test_document_lookup_by_number() {
        let engine = engine().await;
        let p = product(&engine, "LOOK-1", 3, 0).await;
        let settled = engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 1)]))
            .await
            .unwrap();

        let found = engine
            .get_document_by_number(&settled.document.document_no)
            .await
            .unwrap();
        assert_eq!(found.id, settled.document.id);
        assert_eq!(found.lines.len(), 1);

        assert!(matches!(
            engine.get_document_by_number("INV-20000101-0001").await.unwrap_err().as_core(),
            Some(CoreError::DocumentNotFound(_))
        ));
        assert!(matches!(
            engine.get_document_by_number("garbage").await.unwrap_err().as_core(),
            Some(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_service_job_lifecycle() {
        let engine = engine().await;
        let job = engine
            .open_service_job(
                &NewServiceJob {
                    customer_id: Some("cust-9".to_string()),
                    device_name: "Phone".to_string(),
                    device_model: Some("X200".to_string()),
                    issue: "Cracked screen".to_string(),
                    estimated_cost_cents: Some(4500),
                },
                ACTOR,
            )
            .await
            .unwrap();
        assert_eq!(job.status, ServiceStatus::Pending);
        assert_eq!(job.job_no, format!("JOB-{}-0001", today(&engine)));

        let job = engine
            .update_service_status(&job.id, ServiceStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(job.status, ServiceStatus::InProgress);

        let err = engine
            .update_service_status(&job.id, ServiceStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::InvalidStatusTransition { .. })
        ));

        assert!(matches!(
            engine
                .update_service_status("missing", ServiceStatus::Completed)
                .await
                .unwrap_err()
                .as_core(),
            Some(CoreError::ServiceJobNotFound(_))
        ));
        assert_eq!(engine.database().movements().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_only_transient_errors() {
        let engine = engine_with(SettlementSettings {
            retry_base_delay_ms: 1,
            ..SettlementSettings::default()
        })
        .await;

        let calls = Arc::new(AtomicU32::new(0));
        let result = engine
            .with_commit_retry("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AttemptError::Db(DbError::Busy("database is locked".into())))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = Arc::new(AtomicU32::new(0));
        let err = engine
            .with_commit_retry::<(), _, _>("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::Db(DbError::PoolExhausted)) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::CommitFailure { attempts: 3, .. }));
        assert!(err.is_retryable());

        let calls = Arc::new(AtomicU32::new(0));
        let err = engine
            .with_commit_retry::<(), _, _>("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::Rejected(CoreError::ProductNotFound("x".into()))) }
            })
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stock_summary_and_low_stock() {
        let engine = engine().await;
        let low = product(&engine, "SUM-LOW", 1, 3).await;
        product(&engine, "SUM-OK", 10, 3).await;

        let summary = engine.stock_summary().await.unwrap();
        assert_eq!(summary.total_products, 2);
        assert_eq!(summary.low_stock_count, 1);
        assert_eq!(summary.stock_value_cents, 11 * 700);

        let lows = engine.low_stock().await.unwrap();
        assert_eq!(lows.len(), 1);
        assert_eq!(lows[0].id, low.id);

        assert_eq!(engine.resolve_code("SUM-OK").await.unwrap().sku, "SUM-OK");
        assert!(engine.resolve_code("nothing").await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_price_is_rejected_without_writes() {
        let engine = engine().await;
        let p = product(&engine, "BIG-TICKET", 5, 0).await;
        let movements_before = engine.database().movements().count().await.unwrap();

        let err = engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 3).at_price(i64::MAX / 2)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert!(!err.is_retryable());

        assert_eq!(engine.get_product(&p.id).await.unwrap().stock, 5);
        assert_eq!(
            engine.database().movements().count().await.unwrap(),
            movements_before
        );
        assert_eq!(
            engine
                .database()
                .documents()
                .count(&DocumentFilter::default())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_update_product_records_stock_through_the_ledger() {
        let engine = engine().await;
        let p = product(&engine, "CBL-C", 5, 1).await;
        product(&engine, "CBL-L", 2, 0).await;

        let updated = engine
            .update_product(
                &p.id,
                &ProductUpdate {
                    name: Some("  USB-C cable 2m ".to_string()),
                    sell_price_cents: Some(1500),
                    min_stock: Some(8),
                    stock: Some(9),
                    ..ProductUpdate::default()
                },
                ACTOR,
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "USB-C cable 2m");
        assert_eq!(updated.sell_price_cents, 1500);
        assert_eq!(updated.stock, 9);
        assert!(!updated.is_low_stock());

        let latest = &engine.list_movements(&p.id, 10, None).await.unwrap().entries[0];
        assert_eq!(latest.kind, MovementKind::Adjustment);
        assert_eq!(latest.direction, StockDirection::Increase);
        assert_eq!(latest.quantity, 4);
        assert_eq!(latest.reason, "Stock update");

        // Threshold only: no movement, low-stock flag follows immediately.
        let before = engine.database().movements().count_for(&p.id).await.unwrap();
        let raised = engine
            .update_product(
                &p.id,
                &ProductUpdate {
                    min_stock: Some(9),
                    ..ProductUpdate::default()
                },
                ACTOR,
            )
            .await
            .unwrap();
        assert!(raised.is_low_stock());
        assert_eq!(raised.stock, 9);
        assert_eq!(engine.database().movements().count_for(&p.id).await.unwrap(), before);
        let lows = engine.low_stock().await.unwrap();
        assert_eq!(lows.len(), 1);
        assert_eq!(lows[0].id, p.id);

        // A refused stock value rolls back the details sent with it.
        let err = engine
            .update_product(
                &p.id,
                &ProductUpdate {
                    name: Some("Renamed".to_string()),
                    stock: Some(-1),
                    ..ProductUpdate::default()
                },
                ACTOR,
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::NegativeStock { .. })));
        assert_eq!(engine.get_product(&p.id).await.unwrap().name, "USB-C cable 2m");

        let dup = engine
            .update_product(
                &p.id,
                &ProductUpdate {
                    sku: Some("CBL-L".to_string()),
                    ..ProductUpdate::default()
                },
                ACTOR,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            dup.as_core(),
            Some(CoreError::Validation(ValidationError::AlreadyExists { field, .. })) if field == "sku"
        ));

        let missing = engine
            .update_product("nope", &ProductUpdate::default(), ACTOR)
            .await
            .unwrap_err();
        assert!(matches!(missing.as_core(), Some(CoreError::ProductNotFound(_))));

        let report = Reconciler::new(engine.database().clone()).run().await.unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_sales_report_counts_revenue_and_profit() {
        let engine = engine().await;
        let p = product(&engine, "RPT-1", 10, 0).await;

        // Bought at 7.00, sold at 10.00.
        engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 2)]))
            .await
            .unwrap();
        engine
            .settle_sale(&sale(vec![LineRequest::new(&p.id, 1)]))
            .await
            .unwrap();
        engine
            .settle_purchase(&purchase(vec![LineRequest::new(&p.id, 5)]))
            .await
            .unwrap();

        let report = engine
            .sales_report(None, None, ReportGrouping::Day)
            .await
            .unwrap();
        assert_eq!(report.grouping, ReportGrouping::Day);
        assert_eq!(report.summary.total_sales, 2);
        assert_eq!(report.summary.total_revenue_cents, 3000);
        assert_eq!(report.summary.total_profit_cents, 900);
        assert_eq!(report.summary.average_order_value_cents, 1500);
        assert_eq!(
            report.periods.iter().map(|period| period.sale_count).sum::<i64>(),
            2
        );

        // Profit is priced at the current buy price.
        engine
            .update_product(
                &p.id,
                &ProductUpdate {
                    buy_price_cents: Some(800),
                    ..ProductUpdate::default()
                },
                ACTOR,
            )
            .await
            .unwrap();
        let repriced = engine
            .sales_report(None, None, ReportGrouping::Month)
            .await
            .unwrap();
        assert_eq!(repriced.summary.total_profit_cents, 600);

        let later = engine
            .sales_report(Some(Utc::now() + chrono::Duration::hours(1)), None, ReportGrouping::Week)
            .await
            .unwrap();
        assert!(later.periods.is_empty());
        assert_eq!(later.summary.average_order_value_cents, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_database_mixed_writers_never_oversell() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("ledger.db")).max_connections(8))
            .await
            .unwrap();
        let engine = SettlementEngine::new(
            db,
            SettlementSettings {
                max_commit_attempts: 10,
                retry_base_delay_ms: 2,
                ..SettlementSettings::default()
            },
        );
        let cables = product(&engine, "MIX-CBL", 6, 0).await;
        let cases = product(&engine, "MIX-CASE", 4, 0).await;

        let mut handles = Vec::new();
        for i in 0..24 {
            let engine = engine.clone();
            let (cables, cases) = (cables.id.clone(), cases.id.clone());
            handles.push(tokio::spawn(async move {
                if i % 6 == 5 {
                    engine
                        .adjust_product_stock(&cables, 3, "Shelf count", ACTOR, StockFloor::NonNegative)
                        .await
                        .map(|_| false)
                } else {
                    engine
                        .settle_sale(&sale(vec![
                            LineRequest::new(&cables, 1),
                            LineRequest::new(&cases, 1),
                        ]))
                        .await
                        .map(|_| true)
                }
            }));
        }

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(true) => sold += 1,
                Ok(false) => {}
                Err(err) => assert!(
                    matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })),
                    "{err:?}"
                ),
            }
        }

        // Cases are never restocked, so at most four sales can commit.
        let cases_left = engine.get_product(&cases.id).await.unwrap().stock;
        assert!(sold <= 4);
        assert_eq!(cases_left, 4 - sold);
        assert!(engine.get_product(&cables.id).await.unwrap().stock >= 0);
        assert_eq!(
            engine
                .database()
                .documents()
                .count(&DocumentFilter::default())
                .await
                .unwrap(),
            sold
        );

        let report = Reconciler::new(engine.database().clone()).run().await.unwrap();
        assert_eq!(report.checked, 2);
        assert!(report.is_clean(), "{:?}", report.drifts);

        engine.database().close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_settlement_is_stamped_after_the_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("ledger.db")).max_connections(2))
            .await
            .unwrap();
        let engine = SettlementEngine::new(db, SettlementSettings::default());
        let p = product(&engine, "LOCK-1", 3, 0).await;

        let holder = engine.database().begin().await.unwrap();
        let waiting = {
            let engine = engine.clone();
            let id = p.id.clone();
            tokio::spawn(async move { engine.settle_sale(&sale(vec![LineRequest::new(&id, 1)])).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let released_at = Utc::now();
        holder.rollback().await.unwrap();

        let settled = waiting.await.unwrap().unwrap();
        assert!(settled.document.created_at >= released_at);

        // The ledger as of the release still shows the stock before the sale.
        let reconciler = Reconciler::new(engine.database().clone());
        assert_eq!(reconciler.stock_at(&p.id, released_at).await.unwrap(), 3);
        assert_eq!(
            reconciler.stock_at(&p.id, settled.document.created_at).await.unwrap(),
            2
        );

        engine.database().close().await;
    }
}
