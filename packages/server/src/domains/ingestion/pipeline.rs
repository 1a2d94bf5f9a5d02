//! The ingestion job handler.
//!
//! One claimed job runs crawl → normalize → store → prompt → ready. A job is
//! done only when the whole chain succeeds; any step failing is a failed
//! attempt, and the website shows `error` only once attempts run out.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::orchestrator::CrawlOrchestrator;
use crate::domains::website::{WebsiteStatus, WebsiteStatusRegister};
use crate::kernel::clock::Clock;
use crate::kernel::jobs::{FailureOutcome, IngestionJob, JobHandler};
use crate::kernel::BasePromptGenerator;

pub struct IngestionPipeline {
    websites: Arc<WebsiteStatusRegister>,
    orchestrator: Arc<CrawlOrchestrator>,
    prompts: Arc<dyn BasePromptGenerator>,
    clock: Arc<dyn Clock>,
}

impl IngestionPipeline {
    pub fn new(
        websites: Arc<WebsiteStatusRegister>,
        orchestrator: Arc<CrawlOrchestrator>,
        prompts: Arc<dyn BasePromptGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            websites,
            orchestrator,
            prompts,
            clock,
        }
    }
}

#[async_trait]
impl JobHandler for IngestionPipeline {
    async fn handle(&self, job: &IngestionJob) -> Result<()> {
        let website_id = job.website_id;

        let website = self.websites.get(website_id).await?;
        if website.status == WebsiteStatus::Ready {
            // Reclaimed after the website was already marked ready.
            info!(job_id = %job.id, website_id = %website_id, "website already ready");
            return Ok(());
        }

        self.websites.begin_scraping(website_id).await?;

        let outcome = self.orchestrator.ingest(&job.url).await?;
        let method = outcome.method;
        let document = outcome.into_document(self.clock.now());
        let total_pages = document.total_pages;

        self.websites
            .begin_processing(website_id, document)
            .await?;

        let chatbot_id = self
            .prompts
            .generate_prompt(website_id)
            .await
            .context("prompt generation failed")?;

        self.websites.mark_ready(website_id).await?;

        info!(
            job_id = %job.id,
            website_id = %website_id,
            total_pages,
            method = %method,
            chatbot_id = ?chatbot_id,
            "website ingested"
        );

        Ok(())
    }

    async fn on_failure(
        &self,
        job: &IngestionJob,
        outcome: &FailureOutcome,
        error: &str,
    ) -> Result<()> {
        if outcome.is_exhausted() {
            self.websites.mark_error(job.website_id, error).await?;
        }
        Ok(())
    }
}
