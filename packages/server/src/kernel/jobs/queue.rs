//! PostgreSQL-backed ingestion job queue.
//!
//! Jobs move `pending → processing → {completed | pending (retry) | failed}`.
//! The claim is the only mutual-exclusion point: a CTE picks one eligible row
//! with `FOR UPDATE SKIP LOCKED` and a conditional update flips it to
//! `processing`, so concurrent claimers never receive the same job.
//!
//! Each claim stamps a fresh `claim_token`. Completion, failure and heartbeats
//! only apply while the row still carries the caller's token, so a processor
//! whose job was recovered cannot finish it.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{
    FailureOutcome, IngestionJob, JobPriority, JobStatus, RecoveredJob, STALE_JOB_ERROR,
};
use crate::common::{IngestionJobId, WebsiteId};
use crate::kernel::clock::{Clock, SystemClock};

/// Result type for enqueue operations that handles idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// A new job was inserted
    Created(IngestionJobId),
    /// The website already had a pending job; its ID is returned
    Duplicate(IngestionJobId),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> IngestionJobId {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// Durable store of ingestion jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for a website.
    ///
    /// If the website already has a `pending` job, returns
    /// [`EnqueueResult::Duplicate`] with that job's ID instead of inserting.
    async fn enqueue(
        &self,
        website_id: WebsiteId,
        url: &str,
        priority: JobPriority,
    ) -> Result<EnqueueResult>;

    /// Manual reset for a re-scrape.
    ///
    /// A pending job for the website gets `attempts = 0`, becomes eligible
    /// immediately and loses its error; otherwise a fresh job is inserted.
    async fn requeue(
        &self,
        website_id: WebsiteId,
        url: &str,
        priority: JobPriority,
    ) -> Result<IngestionJobId>;

    /// Claim the oldest highest-priority eligible job and mark it `processing`.
    ///
    /// Skips websites that already have a job in `processing`.
    async fn claim_next(&self) -> Result<Option<IngestionJob>>;

    /// Mark a claimed job as `completed`.
    ///
    /// Fails unless the job is still `processing` under `job`'s claim.
    async fn mark_completed(&self, job: &IngestionJob) -> Result<()>;

    /// Record a failed attempt on a claimed job.
    ///
    /// Increments `attempts`. At `max_attempts` the job becomes `failed` for
    /// good; otherwise it returns to `pending` with
    /// `next_retry_at = now + 2^attempts minutes`.
    async fn mark_failed_with_backoff(
        &self,
        job: &IngestionJob,
        error: &str,
    ) -> Result<FailureOutcome>;

    /// Refresh `updated_at` on a claimed job so recovery leaves it alone.
    ///
    /// Returns `false` when the claim has been lost.
    async fn heartbeat(&self, job: &IngestionJob) -> Result<bool>;

    /// Take back jobs whose `processing` row has not been touched for longer
    /// than `older_than`. Each recovery counts as a failed attempt, with the
    /// same backoff and exhaustion rules as [`JobQueue::mark_failed_with_backoff`].
    async fn recover_stale(&self, older_than: Duration) -> Result<Vec<RecoveredJob>>;

    async fn find_by_id(&self, job_id: IngestionJobId) -> Result<Option<IngestionJob>>;

    async fn latest_for_website(&self, website_id: WebsiteId) -> Result<Option<IngestionJob>>;
}

/// PostgreSQL-backed job queue implementation.
pub struct PostgresJobQueue {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresJobQueue {
    /// Create a new PostgreSQL job queue on the system clock.
    pub fn new(db: PgPool) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    /// Find the pending job for a website, if any.
    pub async fn find_pending_for_website(
        &self,
        website_id: WebsiteId,
    ) -> Result<Option<IngestionJob>> {
        let job = sqlx::query_as::<_, IngestionJob>(
            r#"
            SELECT * FROM ingestion_jobs
            WHERE website_id = $1 AND status = 'pending'
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(website_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(job)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Apply one failed attempt to a locked `processing` row and release its claim.
async fn record_failure(
    tx: &mut Transaction<'_, Postgres>,
    job: &IngestionJob,
    error: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<FailureOutcome> {
    let outcome = FailureOutcome::after_failure(job.attempts, job.max_attempts, now);
    let next_retry_at = match outcome {
        FailureOutcome::RetryScheduled { next_retry_at, .. } => next_retry_at,
        FailureOutcome::Exhausted { .. } => job.next_retry_at,
    };

    sqlx::query(
        r#"
        UPDATE ingestion_jobs
        SET attempts = $2,
            status = $3,
            next_retry_at = $4,
            error_message = $5,
            claim_token = NULL,
            updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(job.id)
    .bind(outcome.attempts())
    .bind(outcome.status())
    .bind(next_retry_at)
    .bind(error)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("Failed to record ingestion job failure")?;

    Ok(outcome)
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        website_id: WebsiteId,
        url: &str,
        priority: JobPriority,
    ) -> Result<EnqueueResult> {
        if let Some(existing) = self.find_pending_for_website(website_id).await? {
            debug!(
                job_id = %existing.id,
                website_id = %website_id,
                "Website already has a pending ingestion job"
            );
            return Ok(EnqueueResult::Duplicate(existing.id));
        }

        let job = IngestionJob::new(website_id, url, priority, self.clock.now());
        let inserted = job.insert(&self.db).await?;

        info!(
            job_id = %inserted.id,
            website_id = %website_id,
            priority = ?priority,
            "Enqueued ingestion job"
        );

        Ok(EnqueueResult::Created(inserted.id))
    }

    async fn requeue(
        &self,
        website_id: WebsiteId,
        url: &str,
        priority: JobPriority,
    ) -> Result<IngestionJobId> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let reset: Option<IngestionJobId> = sqlx::query_scalar(
            r#"
            UPDATE ingestion_jobs
            SET attempts = 0,
                next_retry_at = $3,
                error_message = NULL,
                priority = $4,
                url = $2,
                updated_at = $3
            WHERE id = (
                SELECT id FROM ingestion_jobs
                WHERE website_id = $1 AND status = 'pending'
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE
            )
            RETURNING id
            "#,
        )
        .bind(website_id)
        .bind(url)
        .bind(now)
        .bind(priority)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to reset pending ingestion job")?;

        let job_id = match reset {
            Some(id) => id,
            None => {
                IngestionJob::new(website_id, url, priority, now)
                    .insert(&mut *tx)
                    .await?
                    .id
            }
        };

        tx.commit().await?;

        info!(job_id = %job_id, website_id = %website_id, "Requeued ingestion job");
        Ok(job_id)
    }

    async fn claim_next(&self) -> Result<Option<IngestionJob>> {
        let result = sqlx::query_as::<_, IngestionJob>(
            r#"
            WITH next_job AS (
                SELECT j.id
                FROM ingestion_jobs j
                WHERE j.status = 'pending'
                  AND j.next_retry_at <= $1
                  AND NOT EXISTS (
                      SELECT 1 FROM ingestion_jobs p
                      WHERE p.website_id = j.website_id
                        AND p.status = 'processing'
                  )
                ORDER BY j.priority, j.created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE ingestion_jobs
            SET status = 'processing',
                claim_token = $2,
                updated_at = $1
            WHERE id IN (SELECT id FROM next_job)
              AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(self.clock.now())
        .bind(Uuid::new_v4())
        .fetch_optional(&self.db)
        .await;

        match result {
            Ok(job) => Ok(job),
            // Another claimer took a sibling job for the same website first;
            // the single-flight index rejected ours.
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e).context("Failed to claim ingestion job"),
        }
    }

    async fn mark_completed(&self, job: &IngestionJob) -> Result<()> {
        let token = job.claim()?;
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = 'completed',
                error_message = NULL,
                claim_token = NULL,
                updated_at = $3
            WHERE id = $1 AND status = 'processing' AND claim_token = $2
            "#,
        )
        .bind(job.id)
        .bind(token)
        .bind(self.clock.now())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            bail!("ingestion job {} is no longer claimed by this processor", job.id);
        }

        Ok(())
    }

    async fn mark_failed_with_backoff(
        &self,
        job: &IngestionJob,
        error: &str,
    ) -> Result<FailureOutcome> {
        let token = job.claim()?;
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, IngestionJob>(
            "SELECT * FROM ingestion_jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job.id)
        .fetch_optional(&mut *tx)
        .await?
        .with_context(|| format!("ingestion job {} not found", job.id))?;

        if current.status != JobStatus::Processing || current.claim_token != Some(token) {
            bail!(
                "ingestion job {} is no longer claimed by this processor (status {:?})",
                job.id,
                current.status
            );
        }

        let outcome = record_failure(&mut tx, &current, error, self.clock.now()).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn heartbeat(&self, job: &IngestionJob) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET updated_at = $3
            WHERE id = $1 AND status = 'processing' AND claim_token = $2
            "#,
        )
        .bind(job.id)
        .bind(job.claim()?)
        .bind(self.clock.now())
        .execute(&self.db)
        .await
        .context("Failed to heartbeat ingestion job")?;

        Ok(result.rows_affected() > 0)
    }

    async fn recover_stale(&self, older_than: Duration) -> Result<Vec<RecoveredJob>> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let stale = sqlx::query_as::<_, IngestionJob>(
            r#"
            SELECT * FROM ingestion_jobs
            WHERE status = 'processing'
              AND updated_at < $1
            ORDER BY updated_at
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now - older_than)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to load stale ingestion jobs")?;

        let mut recovered = Vec::with_capacity(stale.len());
        for job in stale {
            let outcome = record_failure(&mut tx, &job, STALE_JOB_ERROR, now).await?;
            warn!(
                job_id = %job.id,
                website_id = %job.website_id,
                attempts = outcome.attempts(),
                "recovered stale ingestion job"
            );
            recovered.push(RecoveredJob { job, outcome });
        }

        tx.commit().await?;
        Ok(recovered)
    }

    async fn find_by_id(&self, job_id: IngestionJobId) -> Result<Option<IngestionJob>> {
        IngestionJob::find_by_id(job_id, &self.db).await
    }

    async fn latest_for_website(&self, website_id: WebsiteId) -> Result<Option<IngestionJob>> {
        IngestionJob::latest_for_website(website_id, &self.db).await
    }
}
