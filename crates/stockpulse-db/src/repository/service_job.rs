//! # Service Job Repository
//!
//! Repair intake records. Jobs share the document counters (`JOB-` numbers)
//! but have no stock effect.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockpulse_core::{ServiceJob, ServiceStatus};

const JOB_COLUMNS: &str = "id, job_no, customer_id, device_name, device_model, issue, \
     estimated_cost_cents, status, actor_id, created_at, updated_at";

/// Repository for service jobs.
#[derive(Debug, Clone)]
pub struct ServiceJobRepository {
    pool: SqlitePool,
}

impl ServiceJobRepository {
    /// Creates a new ServiceJobRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ServiceJobRepository { pool }
    }

    /// Inserts a job inside the caller's transaction.
    pub async fn insert_in(&self, conn: &mut SqliteConnection, job: &ServiceJob) -> DbResult<()> {
        debug!(job_no = %job.job_no, "Inserting service job");

        sqlx::query(
            r#"
            INSERT INTO service_jobs (
                id, job_no, customer_id, device_name, device_model, issue,
                estimated_cost_cents, status, actor_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&job.id)
        .bind(&job.job_no)
        .bind(&job.customer_id)
        .bind(&job.device_name)
        .bind(&job.device_model)
        .bind(&job.issue)
        .bind(job.estimated_cost_cents)
        .bind(job.status)
        .bind(&job.actor_id)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets a job by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ServiceJob>> {
        let job = sqlx::query_as::<_, ServiceJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM service_jobs WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Moves a job from `from` to `to`.
    ///
    /// The update only matches while the job is still in `from`, so two
    /// concurrent transitions cannot both apply. Returns the updated job, or
    /// `None` when the job is missing or has already moved on.
    pub async fn transition(
        &self,
        id: &str,
        from: ServiceStatus,
        to: ServiceStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Option<ServiceJob>> {
        debug!(id = %id, from = from.as_str(), to = to.as_str(), "Service job transition");

        let job = sqlx::query_as::<_, ServiceJob>(&format!(
            "UPDATE service_jobs SET status = ?3, updated_at = ?4 \
             WHERE id = ?1 AND status = ?2 \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Lists jobs newest first, optionally by status.
    pub async fn list(
        &self,
        status: Option<ServiceStatus>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<ServiceJob>> {
        let jobs = sqlx::query_as::<_, ServiceJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM service_jobs \
             WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC, job_no DESC \
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}
