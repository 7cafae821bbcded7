//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Key Operations
//! - Lookups by id, SKU, barcode and scanned code
//! - Registration and detail edits (inside the caller's transaction)
//! - Conditional stock updates
//! - Low-stock listing and stock summary
//!
//! ## Conditional Stock Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    No Check-Then-Act                                    │
//! │                                                                         │
//! │  ❌ WRONG: read stock, compare in Rust, write new value                 │
//! │     Two sales read stock=1, both pass, both write 0 → oversold         │
//! │                                                                         │
//! │  ✅ CORRECT: one statement decides and applies                          │
//! │     UPDATE products SET stock = stock + :delta                          │
//! │     WHERE id = :id AND is_active = 1                                    │
//! │       AND (:allow_negative OR stock + :delta >= 0)                      │
//! │     RETURNING stock                                                     │
//! │                                                                         │
//! │  No row back → re-read to tell "missing" from "would go negative"      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockpulse_core::{Product, ProductUpdate, StockFloor, StockSummary};

const PRODUCT_COLUMNS: &str = "id, sku, barcode, name, buy_price_cents, sell_price_cents, \
     mrp_cents, stock, min_stock, opening_stock, is_active, created_at, updated_at";

/// Outcome of a conditional stock update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// The delta was applied.
    Applied { new_stock: i64 },
    /// The product exists but the delta would cross the stock floor.
    Rejected { current: i64 },
    /// No active product with that id.
    Missing,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let product = repo.get_by_id("uuid-here").await?;
/// let scanned = repo.resolve_code("8901234567890").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID, active or not.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by ID inside the caller's transaction.
    pub async fn get_by_id_in(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(product)
    }

    /// Gets several products in one query. Unknown ids are simply absent.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = ids.len(), "Fetching products");

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ("));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let products = builder
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Resolves a scanned code (SKU or barcode) to an active product.
    ///
    /// A SKU match wins over a barcode match when both exist.
    pub async fn resolve_code(&self, code: &str) -> DbResult<Option<Product>> {
        let code = code.trim();
        debug!(code = %code, "Resolving scanned code");

        if code.is_empty() {
            return Ok(None);
        }

        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND (sku = ?1 OR barcode = ?1) \
             ORDER BY (sku = ?1) DESC \
             LIMIT 1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Inserts a new product inside the caller's transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU or barcode already exists
    pub async fn insert_in(&self, conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name,
                buy_price_cents, sell_price_cents, mrp_cents,
                stock, min_stock, opening_stock,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.buy_price_cents)
        .bind(product.sell_price_cents)
        .bind(product.mrp_cents)
        .bind(product.stock)
        .bind(product.min_stock)
        .bind(product.opening_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Writes the present fields of `update` to an active product.
    ///
    /// Never touches `stock`; stock changes go through
    /// [`apply_stock_delta`](Self::apply_stock_delta) with a movement.
    ///
    /// ## Returns
    /// * `Ok(None)` - no active product with that id
    /// * `Err(DbError::UniqueViolation)` - the new SKU or barcode is taken
    pub async fn update_details_in(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        update: &ProductUpdate,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Product>> {
        debug!(id = %id, "Updating product details");

        let product = sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET \
                 sku = COALESCE(?2, sku), \
                 barcode = COALESCE(?3, barcode), \
                 name = COALESCE(?4, name), \
                 buy_price_cents = COALESCE(?5, buy_price_cents), \
                 sell_price_cents = COALESCE(?6, sell_price_cents), \
                 mrp_cents = COALESCE(?7, mrp_cents), \
                 min_stock = COALESCE(?8, min_stock), \
                 updated_at = ?9 \
             WHERE id = ?1 AND is_active = 1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(update.sku.as_deref().map(str::trim))
        .bind(update.barcode.as_deref().map(str::trim))
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.buy_price_cents)
        .bind(update.sell_price_cents)
        .bind(update.mrp_cents)
        .bind(update.min_stock)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(product)
    }

    /// Applies a signed delta to a product's stock, in one statement.
    ///
    /// Must run inside the transaction that also appends the matching
    /// movement entry.
    pub async fn apply_stock_delta(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        delta: i64,
        floor: StockFloor,
        now: DateTime<Utc>,
    ) -> DbResult<StockChange> {
        debug!(id = %id, delta = %delta, ?floor, "Applying stock delta");

        let allow_negative = matches!(floor, StockFloor::AllowNegative);

        let new_stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + ?2, updated_at = ?3
            WHERE id = ?1
              AND is_active = 1
              AND (?4 OR stock + ?2 >= 0)
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .bind(allow_negative)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(new_stock) = new_stock {
            return Ok(StockChange::Applied { new_stock });
        }

        let current: Option<(i64, bool)> =
            sqlx::query_as("SELECT stock, is_active FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(match current {
            Some((stock, true)) => StockChange::Rejected { current: stock },
            _ => StockChange::Missing,
        })
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Settled documents and ledger entries keep referencing it.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1 AND is_active = 1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Lists active products by name.
    pub async fn list_active(&self, limit: i64, offset: i64) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 \
             ORDER BY name LIMIT ?1 OFFSET ?2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Lists every product, including inactive ones (for reconciliation).
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Lists active products at or below their reorder threshold,
    /// lowest stock first.
    pub async fn list_low_stock(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND stock <= min_stock \
             ORDER BY stock, name"
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Low stock products");
        Ok(products)
    }

    /// Stock report totals over active products.
    pub async fn summary(&self) -> DbResult<StockSummary> {
        let (total_products, stock_value_cents, low_stock_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(stock * buy_price_cents), 0),
                COALESCE(SUM(CASE WHEN stock <= min_stock THEN 1 ELSE 0 END), 0)
            FROM products
            WHERE is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StockSummary {
            total_products,
            stock_value_cents,
            low_stock_count,
        })
    }

    /// Counts active products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}
