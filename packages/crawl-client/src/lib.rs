//! Crawl provider client and content normalizer.
//!
//! Wraps an external crawling provider behind the [`CrawlProvider`] trait and
//! turns the provider's raw page records into canonical [`ScrapedPage`]s and
//! an aggregate [`CombinedDocument`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use crawl_client::{content, CrawlProvider, CrawlStart, FirecrawlClient};
//!
//! let client = FirecrawlClient::new(api_key)?;
//! match client.start_crawl("https://example.com").await? {
//!     CrawlStart::Inline(raw) => {
//!         let pages = content::normalize_pages(&raw, "https://example.com");
//!     }
//!     CrawlStart::Job(job_id) => {
//!         let status = client.poll_crawl(&job_id).await?;
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`provider`] - The provider trait and its start/poll result types
//! - [`firecrawl`] - Firecrawl HTTP implementation
//! - [`content`] - Pure normalization and aggregation
//! - [`types`] - Raw and canonical page types
//! - [`credentials`] - Redacting wrapper for the API credential

pub mod content;
pub mod credentials;
pub mod error;
pub mod firecrawl;
pub mod provider;
pub mod types;

pub use content::{aggregate, normalize_pages, MIN_CONTENT_CHARS, UNTITLED_PAGE};
pub use credentials::SecretString;
pub use error::{CrawlClientError, CrawlErrorKind, CrawlResult};
pub use firecrawl::{FirecrawlClient, DEFAULT_FIRECRAWL_API_URL};
pub use provider::{CrawlProvider, CrawlStart, CrawlStatus};
pub use types::{CombinedDocument, Keywords, RawMetadata, RawPage, ScrapeMethod, ScrapedPage};
