//! # Document Repository
//!
//! Settled sales and purchases with their lines.
//!
//! Documents and lines are written once by settlement, in the same
//! transaction as the stock changes they cause, and read back here for
//! receipts and reports.
//!
//! Sales reports aggregate in SQL. Periods are cut in business-day time by
//! shifting `created_at` with a `+N minutes` modifier before `strftime`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockpulse_core::{Document, DocumentKind, DocumentLine, ReportGrouping, SalesPeriod};

const DOCUMENT_COLUMNS: &str = "id, kind, document_no, counterparty_id, total_amount_cents, \
     discount_cents, tax_cents, final_amount_cents, payment_status, payment_mode, due_date, \
     notes, actor_id, created_at";

const LINE_COLUMNS: &str = "id, document_id, line_no, product_id, quantity, unit_price_cents, \
     line_discount_cents, total_cents";

/// Filter for listing documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub kind: Option<DocumentKind>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    pub counterparty_id: Option<String>,
}

/// Repository for settled documents.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    /// Inserts a document and all of its lines inside the caller's transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` on `documents.document_no` when the
    ///   number was already taken
    pub async fn insert_in(&self, conn: &mut SqliteConnection, document: &Document) -> DbResult<()> {
        debug!(
            document_no = %document.document_no,
            lines = document.lines.len(),
            "Inserting document"
        );

        sqlx::query(
            r#"
            INSERT INTO documents (
                id, kind, document_no, counterparty_id,
                total_amount_cents, discount_cents, tax_cents, final_amount_cents,
                payment_status, payment_mode, due_date, notes, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&document.id)
        .bind(document.kind)
        .bind(&document.document_no)
        .bind(&document.counterparty_id)
        .bind(document.total_amount_cents)
        .bind(document.discount_cents)
        .bind(document.tax_cents)
        .bind(document.final_amount_cents)
        .bind(document.payment_status)
        .bind(document.payment_mode)
        .bind(document.due_date)
        .bind(&document.notes)
        .bind(&document.actor_id)
        .bind(document.created_at)
        .execute(&mut *conn)
        .await?;

        for line in &document.lines {
            sqlx::query(
                r#"
                INSERT INTO document_lines (
                    id, document_id, line_no, product_id, quantity,
                    unit_price_cents, line_discount_cents, total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&line.id)
            .bind(&line.document_id)
            .bind(line.line_no)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(line.line_discount_cents)
            .bind(line.total_cents)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Gets a document with its lines by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.with_lines(document).await
    }

    /// Gets a document with its lines by its number (e.g. `INV-20261019-0001`).
    pub async fn get_by_number(&self, document_no: &str) -> DbResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_no = ?1"
        ))
        .bind(document_no.trim())
        .fetch_optional(&self.pool)
        .await?;

        self.with_lines(document).await
    }

    /// Lines of a document in line order.
    pub async fn get_lines(&self, document_id: &str) -> DbResult<Vec<DocumentLine>> {
        let lines = sqlx::query_as::<_, DocumentLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM document_lines WHERE document_id = ?1 ORDER BY line_no"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Lists documents newest first, with lines.
    pub async fn list(
        &self,
        filter: &DocumentFilter,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Document>> {
        debug!(?filter, limit, offset, "Listing documents");

        let documents = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE (?1 IS NULL OR kind = ?1) \
               AND (?2 IS NULL OR created_at >= ?2) \
               AND (?3 IS NULL OR created_at <= ?3) \
               AND (?4 IS NULL OR counterparty_id = ?4) \
             ORDER BY created_at DESC, document_no DESC \
             LIMIT ?5 OFFSET ?6"
        ))
        .bind(filter.kind)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.counterparty_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut with_lines = Vec::with_capacity(documents.len());
        for mut document in documents {
            document.lines = self.get_lines(&document.id).await?;
            with_lines.push(document);
        }
        Ok(with_lines)
    }

    /// Counts documents matching a filter (for pagination).
    pub async fn count(&self, filter: &DocumentFilter) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents \
             WHERE (?1 IS NULL OR kind = ?1) \
               AND (?2 IS NULL OR created_at >= ?2) \
               AND (?3 IS NULL OR created_at <= ?3) \
               AND (?4 IS NULL OR counterparty_id = ?4)",
        )
        .bind(filter.kind)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.counterparty_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Sale count, revenue and profit per period for sales created in
    /// `[from, to]` (either bound optional), oldest period first.
    ///
    /// Profit subtracts each line's quantity times the product's current buy
    /// price. `utc_offset_minutes` moves the period boundaries off UTC.
    pub async fn sales_report(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        grouping: ReportGrouping,
        utc_offset_minutes: i32,
    ) -> DbResult<Vec<SalesPeriod>> {
        debug!(?from, ?to, ?grouping, "Aggregating sales report");

        let periods = sqlx::query_as::<_, SalesPeriod>(
            r#"
            WITH sale AS (
                SELECT
                    d.created_at,
                    d.final_amount_cents,
                    COALESCE((
                        SELECT SUM(l.quantity * p.buy_price_cents)
                        FROM document_lines l
                        JOIN products p ON p.id = l.product_id
                        WHERE l.document_id = d.id
                    ), 0) AS cost_cents
                FROM documents d
                WHERE d.kind = ?1
                  AND (?2 IS NULL OR d.created_at >= ?2)
                  AND (?3 IS NULL OR d.created_at <= ?3)
            )
            SELECT
                strftime(?4, created_at, ?5) AS period,
                COUNT(*) AS sale_count,
                SUM(final_amount_cents) AS revenue_cents,
                SUM(final_amount_cents - cost_cents) AS profit_cents
            FROM sale
            GROUP BY period
            ORDER BY period
            "#,
        )
        .bind(DocumentKind::Sale)
        .bind(from)
        .bind(to)
        .bind(period_format(grouping))
        .bind(format!("{utc_offset_minutes:+} minutes"))
        .fetch_all(&self.pool)
        .await?;

        Ok(periods)
    }

    async fn with_lines(&self, document: Option<Document>) -> DbResult<Option<Document>> {
        match document {
            Some(mut document) => {
                document.lines = self.get_lines(&document.id).await?;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }
}

/// `strftime` pattern for a report period. `%G-W%V` is the ISO week.
fn period_format(grouping: ReportGrouping) -> &'static str {
    match grouping {
        ReportGrouping::Day => "%Y-%m-%d",
        ReportGrouping::Week => "%G-W%V",
        ReportGrouping::Month => "%Y-%m",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::generate_product_id;
    use crate::{Database, DbConfig};
    use stockpulse_core::{PaymentMode, PaymentStatus, Product};
    use uuid::Uuid;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: "EAR-01".to_string(),
            barcode: None,
            name: "Earphones".to_string(),
            buy_price_cents: 300,
            sell_price_cents: 500,
            mrp_cents: Some(599),
            stock: 10,
            min_stock: 2,
            opening_stock: 10,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let mut tx = db.begin().await.unwrap();
        db.products().insert_in(&mut tx, &product).await.unwrap();
        tx.commit().await.unwrap();
        (db, product.id)
    }

    fn document(kind: DocumentKind, no: &str, product_id: &str) -> Document {
        let id = Uuid::new_v4().to_string();
        Document {
            id: id.clone(),
            kind,
            document_no: no.to_string(),
            counterparty_id: None,
            total_amount_cents: 1000,
            discount_cents: 0,
            tax_cents: 0,
            final_amount_cents: 1000,
            payment_status: PaymentStatus::Paid,
            payment_mode: PaymentMode::Upi,
            due_date: None,
            notes: None,
            actor_id: "u-1".to_string(),
            created_at: Utc::now(),
            lines: vec![DocumentLine {
                id: Uuid::new_v4().to_string(),
                document_id: id,
                line_no: 1,
                product_id: product_id.to_string(),
                quantity: 2,
                unit_price_cents: 500,
                line_discount_cents: 0,
                total_cents: 1000,
            }],
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_with_lines() {
        let (db, pid) = setup().await;
        let repo = db.documents();
        let doc = document(DocumentKind::Sale, "INV-20261019-0001", &pid);

        let mut tx = db.begin().await.unwrap();
        repo.insert_in(&mut tx, &doc).await.unwrap();
        tx.commit().await.unwrap();

        let by_id = repo.get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(by_id.lines.len(), 1);
        assert_eq!(by_id.payment_mode, PaymentMode::Upi);
        assert_eq!(by_id.document_no, doc.document_no);

        let by_no = repo.get_by_number("INV-20261019-0001").await.unwrap().unwrap();
        assert_eq!(by_no.id, doc.id);
        assert!(repo.get_by_number("INV-20261019-0002").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_number_is_unique() {
        let (db, pid) = setup().await;
        let repo = db.documents();

        let mut tx = db.begin().await.unwrap();
        repo.insert_in(&mut tx, &document(DocumentKind::Sale, "INV-20261019-0001", &pid))
            .await
            .unwrap();
        let err = repo
            .insert_in(&mut tx, &document(DocumentKind::Sale, "INV-20261019-0001", &pid))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("document_no"));
    }

    #[tokio::test]
    async fn test_list_filters_by_kind() {
        let (db, pid) = setup().await;
        let repo = db.documents();

        let mut tx = db.begin().await.unwrap();
        for (kind, no) in [
            (DocumentKind::Sale, "INV-20261019-0001"),
            (DocumentKind::Sale, "INV-20261019-0002"),
            (DocumentKind::Purchase, "PUR-20261019-0001"),
        ] {
            repo.insert_in(&mut tx, &document(kind, no, &pid)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let sales = DocumentFilter {
            kind: Some(DocumentKind::Sale),
            ..DocumentFilter::default()
        };
        let listed = repo.list(&sales, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|d| d.kind == DocumentKind::Sale));
        assert!(listed.iter().all(|d| d.lines.len() == 1));
        assert_eq!(repo.count(&sales).await.unwrap(), 2);
        assert_eq!(repo.count(&DocumentFilter::default()).await.unwrap(), 3);

        let future = DocumentFilter {
            from: Some(Utc::now() + chrono::Duration::hours(1)),
            ..DocumentFilter::default()
        };
        assert!(repo.list(&future, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sales_report_groups_by_period() {
        let (db, pid) = setup().await;
        let repo = db.documents();
        let at = |rfc3339: &str| {
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc)
        };

        let mut tx = db.begin().await.unwrap();
        for (kind, no, created_at) in [
            (DocumentKind::Sale, "INV-20261018-0001", "2026-10-18T10:00:00Z"),
            (DocumentKind::Sale, "INV-20261019-0001", "2026-10-19T09:00:00Z"),
            (DocumentKind::Sale, "INV-20261019-0002", "2026-10-19T20:00:00Z"),
            (DocumentKind::Purchase, "PUR-20261019-0001", "2026-10-19T10:00:00Z"),
            (DocumentKind::Sale, "INV-20270101-0001", "2027-01-01T12:00:00Z"),
        ] {
            let mut doc = document(kind, no, &pid);
            doc.created_at = at(created_at);
            repo.insert_in(&mut tx, &doc).await.unwrap();
        }
        tx.commit().await.unwrap();

        // Each sale: 1000 revenue, 2 units at a buy price of 300.
        let period = |key: &str, n: i64| SalesPeriod {
            period: key.to_string(),
            sale_count: n,
            revenue_cents: 1000 * n,
            profit_cents: 400 * n,
        };

        let daily = repo
            .sales_report(None, None, ReportGrouping::Day, 0)
            .await
            .unwrap();
        assert_eq!(
            daily,
            vec![
                period("2026-10-18", 1),
                period("2026-10-19", 2),
                period("2027-01-01", 1),
            ]
        );

        // 20:00 UTC is already the next business day at UTC+05:30.
        let shifted = repo
            .sales_report(None, None, ReportGrouping::Day, 330)
            .await
            .unwrap();
        assert_eq!(shifted[1], period("2026-10-19", 1));
        assert_eq!(shifted[2], period("2026-10-20", 1));

        // Sunday closes ISO week 42; 1 January 2027 belongs to 2026-W53.
        let weekly = repo
            .sales_report(None, None, ReportGrouping::Week, 0)
            .await
            .unwrap();
        assert_eq!(
            weekly,
            vec![period("2026-W42", 1), period("2026-W43", 2), period("2026-W53", 1)]
        );

        let monthly = repo
            .sales_report(
                Some(at("2026-10-19T00:00:00Z")),
                Some(at("2026-12-31T23:59:59Z")),
                ReportGrouping::Month,
                0,
            )
            .await
            .unwrap();
        assert_eq!(monthly, vec![period("2026-10", 2)]);
    }
}
