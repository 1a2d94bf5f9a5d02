//! Crawl provider abstraction.

use async_trait::async_trait;

use crate::error::CrawlResult;
use crate::types::RawPage;

/// Outcome of starting a multi-page crawl.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlStart {
    /// The provider accepted an asynchronous job; poll it by id.
    Job(String),
    /// The provider answered synchronously with the pages.
    Inline(Vec<RawPage>),
}

/// State of an asynchronous crawl job.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlStatus {
    Running,
    Completed(Vec<RawPage>),
    Failed(Option<String>),
}

/// A crawling provider with an async multi-page crawl and a synchronous
/// single-page scrape.
#[async_trait]
pub trait CrawlProvider: Send + Sync {
    /// Start a multi-page crawl rooted at `url`.
    async fn start_crawl(&self, url: &str) -> CrawlResult<CrawlStart>;

    /// Check on a crawl started with [`start_crawl`](Self::start_crawl).
    async fn poll_crawl(&self, job_id: &str) -> CrawlResult<CrawlStatus>;

    /// Fetch exactly one page.
    async fn scrape_single_page(&self, url: &str) -> CrawlResult<RawPage>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
