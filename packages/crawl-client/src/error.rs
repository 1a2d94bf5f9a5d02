//! Typed errors for the crawl client.
//!
//! Every provider call fails with a [`CrawlClientError`] whose
//! [`kind`](CrawlClientError::kind) is one of a small, closed set so callers
//! can decide between falling back, retrying, or giving up.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to the crawl provider.
#[derive(Debug, Error)]
pub enum CrawlClientError {
    /// No API credential configured. Raised before any network call.
    #[error("crawl provider API key is not configured")]
    MissingCredential,

    /// Provider base URL could not be parsed
    #[error("invalid crawl provider URL: {0}")]
    InvalidBaseUrl(String),

    /// Provider returned 429
    #[error("crawl provider rate limit exceeded")]
    RateLimited,

    /// Provider rejected the credential (401)
    #[error("crawl provider rejected the API key")]
    Unauthorized,

    /// Provider refused the request (403)
    #[error("crawl provider refused the request")]
    Forbidden,

    /// Any other non-success response, including `success: false` bodies
    #[error("crawl provider error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Connection, TLS or timeout failure before a response arrived
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Response body could not be decoded
    #[error("invalid provider response: {0}")]
    Decode(String),
}

/// Coarse classification of a [`CrawlClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlErrorKind {
    Configuration,
    RateLimited,
    Unauthorized,
    Forbidden,
    UpstreamError,
    TransportError,
}

impl CrawlErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlErrorKind::Configuration => "configuration",
            CrawlErrorKind::RateLimited => "rate_limited",
            CrawlErrorKind::Unauthorized => "unauthorized",
            CrawlErrorKind::Forbidden => "forbidden",
            CrawlErrorKind::UpstreamError => "upstream_error",
            CrawlErrorKind::TransportError => "transport_error",
        }
    }
}

impl std::fmt::Display for CrawlErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CrawlClientError {
    /// Classify this error.
    ///
    /// Decode failures count as upstream errors: the provider answered, just
    /// not with something usable.
    pub fn kind(&self) -> CrawlErrorKind {
        match self {
            CrawlClientError::MissingCredential | CrawlClientError::InvalidBaseUrl(_) => {
                CrawlErrorKind::Configuration
            }
            CrawlClientError::RateLimited => CrawlErrorKind::RateLimited,
            CrawlClientError::Unauthorized => CrawlErrorKind::Unauthorized,
            CrawlClientError::Forbidden => CrawlErrorKind::Forbidden,
            CrawlClientError::Upstream { .. } | CrawlClientError::Decode(_) => {
                CrawlErrorKind::UpstreamError
            }
            CrawlClientError::Transport(_) => CrawlErrorKind::TransportError,
        }
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => CrawlClientError::RateLimited,
            StatusCode::UNAUTHORIZED => CrawlClientError::Unauthorized,
            StatusCode::FORBIDDEN => CrawlClientError::Forbidden,
            other => CrawlClientError::Upstream {
                status: other.as_u16(),
                message: body.into(),
            },
        }
    }

    /// True for configuration problems that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), CrawlErrorKind::Configuration)
    }
}

/// Result type alias for crawl client operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlClientError>;
