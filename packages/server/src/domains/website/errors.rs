use thiserror::Error;

use crate::common::WebsiteId;
use crate::domains::website::models::WebsiteStatus;

#[derive(Debug, Error)]
pub enum WebsiteError {
    #[error("website {0} not found")]
    NotFound(WebsiteId),

    #[error("invalid website url: {0}")]
    InvalidUrl(String),

    #[error("website {website_id} cannot move from {from} to {to}")]
    InvalidTransition {
        website_id: WebsiteId,
        from: WebsiteStatus,
        to: WebsiteStatus,
    },

    #[error("website {0} has no scraped content")]
    MissingContent(WebsiteId),

    #[error("website {0} changed status concurrently")]
    Conflict(WebsiteId),

    #[error("website {0} was saved but its ingestion job was not queued; request a re-scrape to retry")]
    JobNotQueued(WebsiteId),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type WebsiteResult<T> = std::result::Result<T, WebsiteError>;
