use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crawl_client::CombinedDocument;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{IngestionJobId, WebsiteId};
use crate::kernel::jobs::{IngestionJob, JobStatus};

/// Website - a site registered for ingestion. Owned by the surrounding app;
/// ingestion only drives `status`, `scraped_content` and `error_message`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Website {
    pub id: WebsiteId,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,

    pub status: WebsiteStatus,
    pub scraped_content: Option<Json<CombinedDocument>>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Website ingestion status.
///
/// `scraping` and `processing` are sub-phases of one job's `processing`
/// state, surfaced for UI granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "website_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WebsiteStatus {
    #[default]
    Pending,
    Scraping,
    Processing,
    Ready,
    Error,
}

impl WebsiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebsiteStatus::Pending => "pending",
            WebsiteStatus::Scraping => "scraping",
            WebsiteStatus::Processing => "processing",
            WebsiteStatus::Ready => "ready",
            WebsiteStatus::Error => "error",
        }
    }

    /// Whether `self → next` is an allowed move.
    ///
    /// Happy path `pending → scraping → processing → ready`; `scraping` and
    /// `processing` may fail to `error`; a retried job re-enters `scraping`
    /// from `processing`; a manual re-scrape returns any state to `pending`.
    pub fn can_transition_to(&self, next: WebsiteStatus) -> bool {
        use WebsiteStatus::*;

        matches!(
            (self, next),
            (Pending, Scraping)
                | (Scraping, Processing)
                | (Processing, Ready)
                | (Scraping, Error)
                | (Processing, Error)
                | (Scraping, Scraping)
                | (Processing, Scraping)
                | (_, Pending)
        )
    }

}

impl std::fmt::Display for WebsiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebsiteStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(WebsiteStatus::Pending),
            "scraping" => Ok(WebsiteStatus::Scraping),
            "processing" => Ok(WebsiteStatus::Processing),
            "ready" => Ok(WebsiteStatus::Ready),
            "error" => Ok(WebsiteStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid website status: {}", s)),
        }
    }
}

/// Point-read projection of a website's ingestion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub website_id: WebsiteId,
    pub status: WebsiteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_content: Option<CombinedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Retry progress of the website's most recent ingestion job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_job: Option<LatestJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestJob {
    pub job_id: IngestionJobId,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&IngestionJob> for LatestJob {
    fn from(job: &IngestionJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            next_retry_at: job.next_retry_at,
            error_message: job.error_message.clone(),
        }
    }
}

impl Website {
    pub fn new(
        url: impl Into<String>,
        title: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WebsiteId::new(),
            url: url.into(),
            title,
            description,
            status: WebsiteStatus::Pending,
            scraped_content: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn content(&self) -> Option<&CombinedDocument> {
        self.scraped_content.as_ref().map(|json| &json.0)
    }

    /// Stored content with at least one page.
    pub fn has_content(&self) -> bool {
        self.content().is_some_and(|doc| doc.total_pages > 0)
    }

    pub fn status_view(&self) -> StatusView {
        StatusView {
            website_id: self.id,
            status: self.status,
            scraped_content: self.content().cloned(),
            error_message: self.error_message.clone(),
            updated_at: self.updated_at,
            latest_job: None,
        }
    }

    // =========================================================================
    // SQL Queries - ALL queries must be in models/
    // =========================================================================

    pub async fn find_by_id(id: WebsiteId, pool: &PgPool) -> Result<Option<Self>> {
        let website = sqlx::query_as::<_, Website>("SELECT * FROM websites WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to load website")?;
        Ok(website)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        let website = sqlx::query_as::<_, Website>(
            r#"
            INSERT INTO websites (
                id, url, title, description, status, scraped_content,
                error_message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.url)
        .bind(&self.title)
        .bind(&self.description)
        .bind(self.status)
        .bind(&self.scraped_content)
        .bind(&self.error_message)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await
        .context("Failed to insert website")?;

        Ok(website)
    }
}
