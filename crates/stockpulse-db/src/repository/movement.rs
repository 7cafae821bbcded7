//! # Movement Repository
//!
//! The append-only stock movement ledger.
//!
//! Rows are written once, inside the same transaction as the stock change
//! they explain, and never updated or deleted (the schema has triggers that
//! abort both). The ledger never computes current stock; it only answers
//! "what happened" and "what does it add up to".
//!
//! ## Paging
//! ```text
//! seq:   41  40  39  38  37  36  35 ...      (newest first)
//!        └──── page 1 ────┘  └──── page 2 ...
//!                        ▲
//!                  next_cursor = 38  →  WHERE seq < 38
//! ```
//! A cursor is the `seq` of the last entry handed out, so a reader can stop
//! and resume later without skipping or repeating entries, even while new
//! movements are appended at the head.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, TryStreamExt};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockpulse_core::{MovementCursor, MovementEntry, MovementPage, NewMovement};

const MOVEMENT_COLUMNS: &str =
    "id, seq, product_id, kind, direction, quantity, reason, reference_id, actor_id, created_at";

/// Signed contribution of one row.
const SIGNED_QUANTITY: &str =
    "CASE direction WHEN 'increase' THEN quantity ELSE -quantity END";

/// A product's recorded stock next to what its ledger adds up to.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LedgerBalance {
    pub product_id: String,
    pub sku: String,
    pub recorded_stock: i64,
    pub ledger_stock: i64,
}

/// Repository for the movement ledger.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    /// Appends one entry inside the caller's transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::CheckViolation)` - quantity not positive, or a kind
    ///   and direction that disagree (`in` must increase, `out` decrease)
    pub async fn append_in(
        &self,
        conn: &mut SqliteConnection,
        movement: &NewMovement,
        now: DateTime<Utc>,
    ) -> DbResult<MovementEntry> {
        let id = Uuid::new_v4().to_string();

        debug!(
            product_id = %movement.product_id,
            kind = movement.kind.as_str(),
            quantity = movement.quantity,
            "Appending movement"
        );

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_movements (
                id, product_id, kind, direction, quantity,
                reason, reference_id, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING seq
            "#,
        )
        .bind(&id)
        .bind(&movement.product_id)
        .bind(movement.kind)
        .bind(movement.direction)
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(&movement.reference_id)
        .bind(&movement.actor_id)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(MovementEntry {
            id,
            seq,
            product_id: movement.product_id.clone(),
            kind: movement.kind,
            direction: movement.direction,
            quantity: movement.quantity,
            reason: movement.reason.clone(),
            reference_id: movement.reference_id.clone(),
            actor_id: movement.actor_id.clone(),
            created_at: now,
        })
    }

    /// One page of a product's history, newest first.
    ///
    /// `before` is the cursor from a previous page; `None` starts at the
    /// newest entry.
    pub async fn list_for(
        &self,
        product_id: &str,
        limit: i64,
        before: Option<MovementCursor>,
    ) -> DbResult<MovementPage> {
        debug!(product_id = %product_id, limit, ?before, "Listing movements");

        let mut entries = sqlx::query_as::<_, MovementEntry>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE product_id = ?1 AND (?2 IS NULL OR seq < ?2) \
             ORDER BY seq DESC \
             LIMIT ?3"
        ))
        .bind(product_id)
        .bind(before.map(|c| c.0))
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = entries.len() as i64 > limit;
        entries.truncate(limit.max(0) as usize);

        let next_cursor = if has_more {
            entries.last().map(|e| MovementCursor(e.seq))
        } else {
            None
        };

        Ok(MovementPage {
            entries,
            next_cursor,
        })
    }

    /// Lazily walks a product's history newest first, fetching
    /// `page_size` rows at a time.
    ///
    /// Nothing is read until the stream is polled; dropping it stops the walk.
    pub fn stream_for(
        &self,
        product_id: &str,
        page_size: i64,
        start: Option<MovementCursor>,
    ) -> impl Stream<Item = DbResult<MovementEntry>> + Send + 'static {
        struct Walk {
            repo: MovementRepository,
            product_id: String,
            cursor: Option<MovementCursor>,
            done: bool,
        }

        let walk = Walk {
            repo: self.clone(),
            product_id: product_id.to_string(),
            cursor: start,
            done: false,
        };

        stream::try_unfold(walk, move |mut walk| async move {
            if walk.done {
                return Ok::<_, DbError>(None);
            }
            let page = walk
                .repo
                .list_for(&walk.product_id, page_size, walk.cursor)
                .await?;
            walk.cursor = page.next_cursor;
            walk.done = page.next_cursor.is_none();
            Ok(Some((page.entries, walk)))
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok::<_, DbError>)))
        .try_flatten()
    }

    /// Every entry caused by one document, in insertion order.
    pub async fn list_by_reference(&self, reference_id: &str) -> DbResult<Vec<MovementEntry>> {
        let entries = sqlx::query_as::<_, MovementEntry>(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE reference_id = ?1 ORDER BY seq"
        ))
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Signed sum of a product's entries created at or before `until`
    /// (all entries when `None`).
    pub async fn signed_sum(
        &self,
        product_id: &str,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<i64> {
        let sum: i64 = sqlx::query_scalar(&format!(
            "SELECT COALESCE(SUM({SIGNED_QUANTITY}), 0) FROM stock_movements \
             WHERE product_id = ?1 AND (?2 IS NULL OR created_at <= ?2)"
        ))
        .bind(product_id)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Recorded stock next to `opening_stock + Σ signed movements` for every
    /// product, read in one statement so both sides come from one snapshot.
    pub async fn balances(&self) -> DbResult<Vec<LedgerBalance>> {
        let balances = sqlx::query_as::<_, LedgerBalance>(&format!(
            "SELECT p.id AS product_id, p.sku, p.stock AS recorded_stock, \
                    p.opening_stock + COALESCE(SUM({SIGNED_QUANTITY}), 0) AS ledger_stock \
             FROM products p \
             LEFT JOIN stock_movements m ON m.product_id = p.id \
             GROUP BY p.id \
             ORDER BY p.sku"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(balances)
    }

    /// Number of entries for a product.
    pub async fn count_for(&self, product_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE product_id = ?1")
                .bind(product_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Number of entries in the whole ledger.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::generate_product_id;
    use crate::{Database, DbConfig};
    use futures_util::StreamExt;
    use stockpulse_core::{MovementKind, Product, StockDirection};

    async fn db_with_product() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: "LED-9W".to_string(),
            barcode: None,
            name: "LED Bulb 9W".to_string(),
            buy_price_cents: 60,
            sell_price_cents: 110,
            mrp_cents: None,
            stock: 0,
            min_stock: 5,
            opening_stock: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let mut tx = db.begin().await.unwrap();
        db.products().insert_in(&mut tx, &product).await.unwrap();
        tx.commit().await.unwrap();
        (db, product.id)
    }

    fn movement(product_id: &str, kind: MovementKind, direction: StockDirection, qty: i64) -> NewMovement {
        NewMovement {
            product_id: product_id.to_string(),
            kind,
            direction,
            quantity: qty,
            reason: "test".to_string(),
            reference_id: None,
            actor_id: "u-1".to_string(),
        }
    }

    async fn append_all(db: &Database, entries: &[NewMovement]) {
        let mut tx = db.begin().await.unwrap();
        for m in entries {
            db.movements().append_in(&mut tx, m, Utc::now()).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_append_and_signed_sum() {
        let (db, pid) = db_with_product().await;
        append_all(
            &db,
            &[
                movement(&pid, MovementKind::In, StockDirection::Increase, 10),
                movement(&pid, MovementKind::Out, StockDirection::Decrease, 3),
                movement(&pid, MovementKind::Adjustment, StockDirection::Decrease, 2),
                movement(&pid, MovementKind::Adjustment, StockDirection::Increase, 1),
            ],
        )
        .await;

        let repo = db.movements();
        assert_eq!(repo.signed_sum(&pid, None).await.unwrap(), 6);
        assert_eq!(repo.count_for(&pid).await.unwrap(), 4);

        let balances = repo.balances().await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].product_id, pid);
        assert_eq!(balances[0].ledger_stock, 6);
        // The fixture product was inserted with stock 0 and never adjusted.
        assert_eq!(balances[0].recorded_stock, 0);

        let before_any = Utc::now() - chrono::Duration::days(1);
        assert_eq!(repo.signed_sum(&pid, Some(before_any)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_schema_rejects_bad_entries() {
        let (db, pid) = db_with_product().await;
        let repo = db.movements();
        let mut tx = db.begin().await.unwrap();

        let zero = movement(&pid, MovementKind::In, StockDirection::Increase, 0);
        assert!(matches!(
            repo.append_in(&mut tx, &zero, Utc::now()).await,
            Err(DbError::CheckViolation { .. })
        ));

        let mismatched = movement(&pid, MovementKind::Out, StockDirection::Increase, 1);
        assert!(matches!(
            repo.append_in(&mut tx, &mismatched, Utc::now()).await,
            Err(DbError::CheckViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_ledger_is_append_only() {
        let (db, pid) = db_with_product().await;
        append_all(&db, &[movement(&pid, MovementKind::In, StockDirection::Increase, 1)]).await;

        assert!(sqlx::query("UPDATE stock_movements SET quantity = 5")
            .execute(db.pool())
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM stock_movements")
            .execute(db.pool())
            .await
            .is_err());
        assert_eq!(db.movements().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pages_are_reverse_chronological_and_restartable() {
        let (db, pid) = db_with_product().await;
        let entries: Vec<NewMovement> = (1..=5)
            .map(|q| movement(&pid, MovementKind::In, StockDirection::Increase, q))
            .collect();
        append_all(&db, &entries).await;

        let repo = db.movements();
        let first = repo.list_for(&pid, 2, None).await.unwrap();
        assert_eq!(
            first.entries.iter().map(|e| e.quantity).collect::<Vec<_>>(),
            vec![5, 4]
        );
        let cursor = first.next_cursor.unwrap();

        let second = repo.list_for(&pid, 2, Some(cursor)).await.unwrap();
        assert_eq!(
            second.entries.iter().map(|e| e.quantity).collect::<Vec<_>>(),
            vec![3, 2]
        );

        // Same cursor, same page.
        let again = repo.list_for(&pid, 2, Some(cursor)).await.unwrap();
        assert_eq!(again.entries, second.entries);

        let last = repo
            .list_for(&pid, 2, second.next_cursor)
            .await
            .unwrap();
        assert_eq!(last.entries.len(), 1);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_stream_walks_whole_history() {
        let (db, pid) = db_with_product().await;
        let entries: Vec<NewMovement> = (1..=7)
            .map(|q| movement(&pid, MovementKind::In, StockDirection::Increase, q))
            .collect();
        append_all(&db, &entries).await;

        let quantities: Vec<i64> = db
            .movements()
            .stream_for(&pid, 3, None)
            .map(|e| e.unwrap().quantity)
            .collect()
            .await;
        assert_eq!(quantities, vec![7, 6, 5, 4, 3, 2, 1]);

        let first_two: Vec<MovementEntry> = db
            .movements()
            .stream_for(&pid, 3, None)
            .take(2)
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(first_two.len(), 2);
    }
}
