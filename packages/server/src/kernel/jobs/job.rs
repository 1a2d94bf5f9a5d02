//! Ingestion job model.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{IngestionJobId, WebsiteId};

/// Attempts allowed before a job is permanently failed.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Error recorded on a job whose processor stopped heartbeating.
pub const STALE_JOB_ERROR: &str = "ingestion job abandoned: no heartbeat within the stale timeout";

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "ingestion_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Claim order follows declaration order: `High` first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
    Default,
)]
#[sqlx(type_name = "ingestion_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

// ============================================================================
// Backoff
// ============================================================================

/// Delay before the next attempt: `2^attempts` minutes.
pub fn backoff_delay(attempts: i32) -> Duration {
    let exponent = attempts.clamp(0, 20) as u32;
    Duration::minutes(2i64.pow(exponent))
}

/// What recording a failed attempt did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `pending`, eligible again at `next_retry_at`.
    RetryScheduled {
        attempts: i32,
        next_retry_at: DateTime<Utc>,
    },
    /// `attempts` reached `max_attempts`; the job is now `failed`.
    Exhausted { attempts: i32 },
}

impl FailureOutcome {
    /// Decide the outcome of one more failed attempt.
    pub fn after_failure(attempts_so_far: i32, max_attempts: i32, now: DateTime<Utc>) -> Self {
        let attempts = (attempts_so_far + 1).min(max_attempts);
        if attempts >= max_attempts {
            FailureOutcome::Exhausted { attempts }
        } else {
            FailureOutcome::RetryScheduled {
                attempts,
                next_retry_at: now + backoff_delay(attempts),
            }
        }
    }

    pub fn attempts(&self) -> i32 {
        match self {
            FailureOutcome::RetryScheduled { attempts, .. }
            | FailureOutcome::Exhausted { attempts } => *attempts,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, FailureOutcome::Exhausted { .. })
    }

    pub fn status(&self) -> JobStatus {
        if self.is_exhausted() {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        }
    }
}

/// A `processing` job taken back from a processor that stopped heartbeating.
#[derive(Debug, Clone)]
pub struct RecoveredJob {
    pub job: IngestionJob,
    pub outcome: FailureOutcome,
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct IngestionJob {
    #[builder(default = IngestionJobId::new())]
    pub id: IngestionJobId,

    pub website_id: WebsiteId,
    pub url: String,

    #[builder(default)]
    pub priority: JobPriority,

    // Retry accounting
    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: i32,

    #[builder(default)]
    pub status: JobStatus,
    pub next_retry_at: DateTime<Utc>,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    /// Identifies the current claim while `processing`.
    #[builder(default, setter(strip_option))]
    pub claim_token: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionJob {
    /// A fresh pending job, eligible immediately.
    pub fn new(
        website_id: WebsiteId,
        url: impl Into<String>,
        priority: JobPriority,
        now: DateTime<Utc>,
    ) -> Self {
        Self::builder()
            .website_id(website_id)
            .url(url)
            .priority(priority)
            .next_retry_at(now)
            .created_at(now)
            .updated_at(now)
            .build()
    }

    /// Pending and past its retry time.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.next_retry_at <= now
    }

    /// Token of the claim this copy was handed by `claim_next`.
    pub fn claim(&self) -> Result<Uuid> {
        self.claim_token
            .with_context(|| format!("ingestion job {} was not claimed", self.id))
    }

    // =========================================================================
    // SQL Queries
    // =========================================================================

    pub async fn find_by_id(id: IngestionJobId, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, IngestionJob>("SELECT * FROM ingestion_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to load ingestion job")?;
        Ok(job)
    }

    pub async fn latest_for_website(website_id: WebsiteId, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, IngestionJob>(
            r#"
            SELECT * FROM ingestion_jobs
            WHERE website_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(website_id)
        .fetch_optional(pool)
        .await
        .context("Failed to load latest ingestion job")?;
        Ok(job)
    }

    pub async fn insert<'e, E>(&self, executor: E) -> Result<Self>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let job = sqlx::query_as::<_, IngestionJob>(
            r#"
            INSERT INTO ingestion_jobs (
                id, website_id, url, priority, attempts, max_attempts,
                status, next_retry_at, error_message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.website_id)
        .bind(&self.url)
        .bind(self.priority)
        .bind(self.attempts)
        .bind(self.max_attempts)
        .bind(self.status)
        .bind(self.next_retry_at)
        .bind(&self.error_message)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(executor)
        .await
        .context("Failed to insert ingestion job")?;

        Ok(job)
    }
}
