//! # Payment Repository
//!
//! Append-only record of money received for sales and paid for purchases.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockpulse_core::PaymentTransaction;

const PAYMENT_COLUMNS: &str = "id, transaction_type, document_id, counterparty_id, amount_cents, \
     payment_mode, actor_id, created_at";

/// Repository for payment transactions.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Appends a payment inside the caller's transaction.
    pub async fn record_in(
        &self,
        conn: &mut SqliteConnection,
        payment: &PaymentTransaction,
    ) -> DbResult<()> {
        debug!(
            document_id = %payment.document_id,
            amount_cents = payment.amount_cents,
            "Recording payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, transaction_type, document_id, counterparty_id,
                amount_cents, payment_mode, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(payment.transaction_type)
        .bind(&payment.document_id)
        .bind(&payment.counterparty_id)
        .bind(payment.amount_cents)
        .bind(payment.payment_mode)
        .bind(&payment.actor_id)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Payments recorded against a document, oldest first.
    pub async fn list_for_document(&self, document_id: &str) -> DbResult<Vec<PaymentTransaction>> {
        let payments = sqlx::query_as::<_, PaymentTransaction>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_transactions \
             WHERE document_id = ?1 ORDER BY created_at, id"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Sum of payments recorded against a document.
    pub async fn total_for_document(&self, document_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payment_transactions WHERE document_id = ?1",
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Number of payment transactions recorded.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_transactions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
