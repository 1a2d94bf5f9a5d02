//! Website status register.
//!
//! The single writer of `websites.status`. Every write is checked against
//! [`WebsiteStatus::can_transition_to`], applied compare-and-set, and then
//! published to the event sink so subscribers see each transition.

use std::sync::Arc;

use crawl_client::CombinedDocument;
use tracing::{debug, warn};

use super::errors::{WebsiteError, WebsiteResult};
use super::events::WebsiteStatusChanged;
use super::models::{StatusView, Website, WebsiteStatus};
use super::store::{FieldChange, StatusChange, WebsiteStore};
use crate::common::WebsiteId;
use crate::kernel::clock::Clock;
use crate::kernel::BaseWebsiteEventSink;

pub struct WebsiteStatusRegister {
    store: Arc<dyn WebsiteStore>,
    events: Arc<dyn BaseWebsiteEventSink>,
    clock: Arc<dyn Clock>,
}

impl WebsiteStatusRegister {
    pub fn new(
        store: Arc<dyn WebsiteStore>,
        events: Arc<dyn BaseWebsiteEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            events,
            clock,
        }
    }

    /// Insert a new website in `pending`.
    pub async fn create(
        &self,
        url: impl Into<String>,
        title: Option<String>,
        description: Option<String>,
    ) -> WebsiteResult<Website> {
        let website = Website::new(url, title, description, self.clock.now());
        let inserted = self.store.insert(&website).await?;
        self.publish(&inserted).await;
        Ok(inserted)
    }

    pub async fn get(&self, id: WebsiteId) -> WebsiteResult<Website> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(WebsiteError::NotFound(id))
    }

    /// Point read for observers.
    pub async fn get_status(&self, id: WebsiteId) -> WebsiteResult<Option<StatusView>> {
        Ok(self.store.find_by_id(id).await?.map(|w| w.status_view()))
    }

    /// A job for the website was claimed.
    pub async fn begin_scraping(&self, id: WebsiteId) -> WebsiteResult<Website> {
        self.transition(
            id,
            WebsiteStatus::Scraping,
            FieldChange::Keep,
            FieldChange::Keep,
        )
        .await
    }

    /// Crawl succeeded; store the combined document.
    pub async fn begin_processing(
        &self,
        id: WebsiteId,
        content: CombinedDocument,
    ) -> WebsiteResult<Website> {
        if content.is_empty() {
            return Err(WebsiteError::MissingContent(id));
        }

        self.transition(
            id,
            WebsiteStatus::Processing,
            FieldChange::Set(content),
            FieldChange::Keep,
        )
        .await
    }

    /// Ingestion finished. Requires stored content with at least one page.
    pub async fn mark_ready(&self, id: WebsiteId) -> WebsiteResult<Website> {
        let current = self.get(id).await?;
        if !current.has_content() {
            return Err(WebsiteError::MissingContent(id));
        }

        self.apply(
            current,
            WebsiteStatus::Ready,
            FieldChange::Keep,
            FieldChange::Clear,
        )
        .await
    }

    /// Retries are exhausted.
    pub async fn mark_error(&self, id: WebsiteId, message: &str) -> WebsiteResult<Website> {
        self.transition(
            id,
            WebsiteStatus::Error,
            FieldChange::Keep,
            FieldChange::Set(message.to_string()),
        )
        .await
    }

    /// Manual re-scrape: back to `pending` with content and error cleared.
    pub async fn reset_for_rescrape(&self, id: WebsiteId) -> WebsiteResult<Website> {
        self.transition(
            id,
            WebsiteStatus::Pending,
            FieldChange::Clear,
            FieldChange::Clear,
        )
        .await
    }

    async fn transition(
        &self,
        id: WebsiteId,
        to: WebsiteStatus,
        scraped_content: FieldChange<CombinedDocument>,
        error_message: FieldChange<String>,
    ) -> WebsiteResult<Website> {
        let current = self.get(id).await?;
        self.apply(current, to, scraped_content, error_message)
            .await
    }

    async fn apply(
        &self,
        current: Website,
        to: WebsiteStatus,
        scraped_content: FieldChange<CombinedDocument>,
        error_message: FieldChange<String>,
    ) -> WebsiteResult<Website> {
        if !current.status.can_transition_to(to) {
            return Err(WebsiteError::InvalidTransition {
                website_id: current.id,
                from: current.status,
                to,
            });
        }

        let change = StatusChange {
            expected: current.status,
            status: to,
            scraped_content,
            error_message,
            at: self.clock.now(),
        };

        let updated = self
            .store
            .update_status(current.id, change)
            .await?
            .ok_or(WebsiteError::Conflict(current.id))?;

        debug!(
            website_id = %updated.id,
            from = %current.status,
            to = %updated.status,
            "website status changed"
        );

        self.publish(&updated).await;
        Ok(updated)
    }

    async fn publish(&self, website: &Website) {
        let event = WebsiteStatusChanged {
            website_id: website.id,
            status: website.status,
        };
        if let Err(e) = self.events.publish(&event).await {
            warn!(website_id = %website.id, error = %e, "failed to publish website status");
        }
    }
}
