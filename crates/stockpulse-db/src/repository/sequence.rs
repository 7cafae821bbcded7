//! # Sequence Repository
//!
//! Durable per-(kind, business day) document counters.
//!
//! ```text
//! document_counters
//! ┌─────────────┬────────────┬────────────┐
//! │ kind        │ day        │ last_value │
//! ├─────────────┼────────────┼────────────┤
//! │ sale        │ 2026-10-19 │ 42         │ → next INV-20261019-0043
//! │ purchase    │ 2026-10-19 │ 3          │
//! │ service_job │ 2026-10-18 │ 7          │
//! └─────────────┴────────────┴────────────┘
//! ```
//!
//! The increment is a single UPSERT executed inside the settlement
//! transaction. It takes SQLite's write lock, so two settlements can never
//! read the same `last_value`, and a rolled-back settlement gives its value
//! back. Counting existing documents to find the next number is never done.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockpulse_core::{DocumentKind, DocumentNumber};

/// Repository for document counters.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    /// Creates a new SequenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Atomically takes the next value for `(kind, day)`, starting at 1.
    pub async fn next_in(
        &self,
        conn: &mut SqliteConnection,
        kind: DocumentKind,
        day: NaiveDate,
    ) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_counters (kind, day, last_value)
            VALUES (?1, ?2, 1)
            ON CONFLICT (kind, day) DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(kind)
        .bind(day)
        .fetch_one(&mut *conn)
        .await?;

        debug!(kind = kind.as_str(), %day, value, "Sequence advanced");
        Ok(value)
    }

    /// Takes the next value and formats it as a document number.
    pub async fn mint_in(
        &self,
        conn: &mut SqliteConnection,
        kind: DocumentKind,
        day: NaiveDate,
    ) -> DbResult<DocumentNumber> {
        let sequence = self.next_in(conn, kind, day).await?;
        Ok(DocumentNumber::new(kind, day, sequence))
    }

    /// Last value handed out for `(kind, day)`, if any.
    pub async fn current(&self, kind: DocumentKind, day: NaiveDate) -> DbResult<Option<i64>> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT last_value FROM document_counters WHERE kind = ?1 AND day = ?2",
        )
        .bind(kind)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }
}
