//! Website persistence.
//!
//! Status writes are compare-and-set on the current status, so a writer that
//! read a stale row never overwrites a newer transition.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crawl_client::CombinedDocument;
use sqlx::types::Json;
use sqlx::PgPool;

use super::models::{Website, WebsiteStatus};
use crate::common::WebsiteId;

/// Edit to a nullable column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> FieldChange<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldChange::Keep)
    }

    /// Value to write when the column is touched.
    fn into_value(self) -> Option<T> {
        match self {
            FieldChange::Set(value) => Some(value),
            FieldChange::Keep | FieldChange::Clear => None,
        }
    }

    fn apply(self, current: &mut Option<T>) {
        match self {
            FieldChange::Keep => {}
            FieldChange::Set(value) => *current = Some(value),
            FieldChange::Clear => *current = None,
        }
    }
}

/// One status write.
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Status the row must still hold for the write to apply.
    pub expected: WebsiteStatus,
    pub status: WebsiteStatus,
    pub scraped_content: FieldChange<CombinedDocument>,
    pub error_message: FieldChange<String>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait WebsiteStore: Send + Sync {
    async fn insert(&self, website: &Website) -> Result<Website>;

    async fn find_by_id(&self, id: WebsiteId) -> Result<Option<Website>>;

    /// Apply `change` if the row is still in `change.expected`.
    ///
    /// Returns the updated row, or `None` when the website is missing or its
    /// status moved on.
    async fn update_status(&self, id: WebsiteId, change: StatusChange) -> Result<Option<Website>>;
}

// =============================================================================
// PostgreSQL
// =============================================================================

pub struct PostgresWebsiteStore {
    db: PgPool,
}

impl PostgresWebsiteStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WebsiteStore for PostgresWebsiteStore {
    async fn insert(&self, website: &Website) -> Result<Website> {
        website.insert(&self.db).await
    }

    async fn find_by_id(&self, id: WebsiteId) -> Result<Option<Website>> {
        Website::find_by_id(id, &self.db).await
    }

    async fn update_status(&self, id: WebsiteId, change: StatusChange) -> Result<Option<Website>> {
        let touch_content = !change.scraped_content.is_keep();
        let touch_error = !change.error_message.is_keep();

        let website = sqlx::query_as::<_, Website>(
            r#"
            UPDATE websites
            SET status = $3,
                scraped_content = CASE WHEN $4 THEN $5 ELSE scraped_content END,
                error_message = CASE WHEN $6 THEN $7 ELSE error_message END,
                updated_at = $8
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(change.expected)
        .bind(change.status)
        .bind(touch_content)
        .bind(change.scraped_content.into_value().map(Json))
        .bind(touch_error)
        .bind(change.error_message.into_value())
        .bind(change.at)
        .fetch_optional(&self.db)
        .await
        .context("Failed to update website status")?;

        Ok(website)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory website store for tests and local development.
#[derive(Default)]
pub struct InMemoryWebsiteStore {
    websites: Mutex<HashMap<WebsiteId, Website>>,
}

impl InMemoryWebsiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn websites(&self) -> MutexGuard<'_, HashMap<WebsiteId, Website>> {
        self.websites.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every stored website, oldest first.
    pub fn all(&self) -> Vec<Website> {
        let mut websites: Vec<_> = self.websites().values().cloned().collect();
        websites.sort_by_key(|w| (w.created_at, w.id));
        websites
    }
}

#[async_trait]
impl WebsiteStore for InMemoryWebsiteStore {
    async fn insert(&self, website: &Website) -> Result<Website> {
        let mut websites = self.websites();
        if websites.contains_key(&website.id) {
            anyhow::bail!("website {} already exists", website.id);
        }
        websites.insert(website.id, website.clone());
        Ok(website.clone())
    }

    async fn find_by_id(&self, id: WebsiteId) -> Result<Option<Website>> {
        Ok(self.websites().get(&id).cloned())
    }

    async fn update_status(&self, id: WebsiteId, change: StatusChange) -> Result<Option<Website>> {
        let mut websites = self.websites();
        let Some(website) = websites.get_mut(&id) else {
            return Ok(None);
        };
        if website.status != change.expected {
            return Ok(None);
        }

        let mut content = website.scraped_content.take().map(|json| json.0);
        change.scraped_content.apply(&mut content);
        website.scraped_content = content.map(Json);
        change.error_message.apply(&mut website.error_message);
        website.status = change.status;
        website.updated_at = change.at;

        Ok(Some(website.clone()))
    }
}
