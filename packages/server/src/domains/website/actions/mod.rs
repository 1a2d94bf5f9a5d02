//! Website domain actions - business logic functions
//!
//! HTTP handlers call these directly. Each action works against
//! [`ServerDeps`] so tests can run it on in-memory stores.

use tracing::{error, info};
use url::Url;

use crate::common::{IngestionJobId, WebsiteId};
use crate::domains::website::errors::{WebsiteError, WebsiteResult};
use crate::domains::website::models::{LatestJob, StatusView, Website};
use crate::kernel::jobs::JobPriority;
use crate::kernel::ServerDeps;

/// Input for registering a website.
#[derive(Debug, Clone)]
pub struct RegisterWebsite {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: JobPriority,
}

#[derive(Debug, Clone)]
pub struct RegisteredWebsite {
    pub website: Website,
    pub job_id: IngestionJobId,
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> WebsiteResult<String> {
    let parsed = Url::parse(raw.trim()).map_err(|e| WebsiteError::InvalidUrl(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(WebsiteError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(WebsiteError::InvalidUrl("missing host".into()));
    }

    Ok(parsed.to_string())
}

/// Create a website in `pending` and enqueue its first ingestion job.
///
/// When the insert succeeds but the enqueue does not, the website stays in
/// `pending` and [`WebsiteError::JobNotQueued`] tells the caller to retry with
/// [`request_rescrape`].
pub async fn register_website(
    input: RegisterWebsite,
    deps: &ServerDeps,
) -> WebsiteResult<RegisteredWebsite> {
    let url = validate_url(&input.url)?;

    let website = deps
        .websites
        .create(url, input.title, input.description)
        .await?;

    let enqueued = deps
        .job_queue
        .enqueue(website.id, &website.url, input.priority)
        .await
        .map_err(|e| {
            error!(
                website_id = %website.id,
                error = %format!("{:#}", e),
                "Failed to queue ingestion job"
            );
            WebsiteError::JobNotQueued(website.id)
        })?;

    info!(
        website_id = %website.id,
        job_id = %enqueued.job_id(),
        url = %website.url,
        "Registered website for ingestion"
    );

    Ok(RegisteredWebsite {
        website,
        job_id: enqueued.job_id(),
    })
}

/// Reset a website to `pending` and queue a fresh ingestion attempt.
pub async fn request_rescrape(
    website_id: WebsiteId,
    priority: JobPriority,
    deps: &ServerDeps,
) -> WebsiteResult<IngestionJobId> {
    let website = deps.websites.reset_for_rescrape(website_id).await?;

    let job_id = deps
        .job_queue
        .requeue(website.id, &website.url, priority)
        .await
        .map_err(|e| {
            error!(
                website_id = %website.id,
                error = %format!("{:#}", e),
                "Failed to requeue ingestion job"
            );
            WebsiteError::JobNotQueued(website.id)
        })?;

    info!(website_id = %website_id, job_id = %job_id, "Re-scrape requested");
    Ok(job_id)
}

/// The website's status alongside its most recent ingestion job.
pub async fn get_status(website_id: WebsiteId, deps: &ServerDeps) -> WebsiteResult<StatusView> {
    let mut view = deps
        .websites
        .get_status(website_id)
        .await?
        .ok_or(WebsiteError::NotFound(website_id))?;

    view.latest_job = deps
        .job_queue
        .latest_for_website(website_id)
        .await?
        .as_ref()
        .map(LatestJob::from);

    Ok(view)
}
