//! Crawl orchestrator: drives one ingestion attempt against a crawl provider.
//!
//! ```text
//! start_crawl(url)
//!     ├─► Err / non-success ─────────────► scrape_single_page(url)
//!     ├─► Inline(pages) ─────────────────► normalize
//!     └─► Job(id) ─► poll every 10s (≤30)
//!             ├─► Completed(pages) ──────► normalize
//!             └─► Failed / exhausted / poll error ─► scrape_single_page(url)
//! ```
//!
//! Whichever path is taken, an empty normalized page list is
//! [`IngestError::NoContentExtracted`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crawl_client::{
    aggregate, normalize_pages, CombinedDocument, CrawlClientError, CrawlProvider, CrawlStart,
    CrawlStatus, RawPage, ScrapeMethod, ScrapedPage,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::poll_policy::{PollOutcome, PollPolicy, PollStep};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no content extracted from {url}")]
    NoContentExtracted { url: String },

    #[error("crawl provider failed: {0}")]
    Provider(#[from] CrawlClientError),
}

/// Pages produced by one ingestion attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub pages: Vec<ScrapedPage>,
    pub method: ScrapeMethod,
}

impl IngestOutcome {
    pub fn into_document(self, scraped_at: DateTime<Utc>) -> CombinedDocument {
        aggregate(self.pages, self.method, scraped_at)
    }
}

pub struct CrawlOrchestrator {
    provider: Arc<dyn CrawlProvider>,
    poll: PollPolicy,
}

impl CrawlOrchestrator {
    pub fn new(provider: Arc<dyn CrawlProvider>) -> Self {
        Self::with_poll_policy(provider, PollPolicy::default())
    }

    pub fn with_poll_policy(provider: Arc<dyn CrawlProvider>, poll: PollPolicy) -> Self {
        Self { provider, poll }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Crawl `url`, falling back to a single-page scrape when the
    /// multi-page crawl cannot deliver.
    pub async fn ingest(&self, url: &str) -> Result<IngestOutcome, IngestError> {
        let provider = self.provider.name();

        let raw = match self.provider.start_crawl(url).await {
            Ok(CrawlStart::Inline(raw)) => {
                debug!(url, provider, pages = raw.len(), "crawl returned inline results");
                raw
            }
            Ok(CrawlStart::Job(job_id)) => {
                info!(url, provider, crawl_job_id = %job_id, "crawl started, polling");
                match self.await_crawl(url, &job_id).await {
                    Some(raw) => raw,
                    None => return self.fallback(url).await,
                }
            }
            Err(e) => {
                warn!(
                    url,
                    provider,
                    kind = %e.kind(),
                    error = %e,
                    "crawl start failed, falling back to single-page scrape"
                );
                return self.fallback(url).await;
            }
        };

        Self::finish(url, &raw, ScrapeMethod::MultiPageCrawl)
    }

    /// Poll a started crawl. `None` means the caller should fall back.
    async fn await_crawl(&self, url: &str, job_id: &str) -> Option<Vec<RawPage>> {
        let provider = &self.provider;

        let outcome = self
            .poll
            .run(|_| async move {
                let status = provider.poll_crawl(job_id).await?;
                Ok::<_, CrawlClientError>(match status {
                    CrawlStatus::Running => PollStep::Pending,
                    finished => PollStep::Ready(finished),
                })
            })
            .await;

        match outcome {
            PollOutcome::Ready {
                value: CrawlStatus::Completed(raw),
                attempts,
            } => {
                info!(url, crawl_job_id = job_id, attempts, pages = raw.len(), "crawl completed");
                Some(raw)
            }
            PollOutcome::Ready {
                value: CrawlStatus::Failed(reason),
                attempts,
            } => {
                warn!(
                    url,
                    crawl_job_id = job_id,
                    attempts,
                    reason = reason.as_deref().unwrap_or("unknown"),
                    "crawl failed, falling back to single-page scrape"
                );
                None
            }
            PollOutcome::Ready {
                value: CrawlStatus::Running,
                ..
            } => None,
            PollOutcome::Exhausted { attempts } => {
                warn!(
                    url,
                    crawl_job_id = job_id,
                    attempts,
                    "crawl did not finish in time, falling back to single-page scrape"
                );
                None
            }
            PollOutcome::Errored { error, attempts } => {
                warn!(
                    url,
                    crawl_job_id = job_id,
                    attempts,
                    kind = %error.kind(),
                    error = %error,
                    "crawl status check failed, falling back to single-page scrape"
                );
                None
            }
        }
    }

    async fn fallback(&self, url: &str) -> Result<IngestOutcome, IngestError> {
        let page = self.provider.scrape_single_page(url).await?;
        Self::finish(url, std::slice::from_ref(&page), ScrapeMethod::SinglePageFallback)
    }

    fn finish(url: &str, raw: &[RawPage], method: ScrapeMethod) -> Result<IngestOutcome, IngestError> {
        let pages = normalize_pages(raw, url);
        if pages.is_empty() {
            return Err(IngestError::NoContentExtracted {
                url: url.to_string(),
            });
        }

        debug!(url, method = %method, kept = pages.len(), received = raw.len(), "pages normalized");
        Ok(IngestOutcome { pages, method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{raw_page, transport_error, MockCrawlProvider};

    const URL: &str = "https://example.org";

    fn long(label: &str) -> String {
        format!("{} {}", label, "content that clears the floor ".repeat(3))
    }

    fn orchestrator(provider: &Arc<MockCrawlProvider>) -> CrawlOrchestrator {
        CrawlOrchestrator::new(provider.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn inline_results_are_normalized_without_polling() {
        let provider = Arc::new(MockCrawlProvider::new().with_start(Ok(CrawlStart::Inline(vec![
            raw_page("https://example.org/a", &long("a")),
            raw_page("https://example.org/b", &long("b")),
            raw_page("https://example.org/c", &long("c")),
        ]))));

        let outcome = orchestrator(&provider).ingest(URL).await.unwrap();

        assert_eq!(outcome.pages.len(), 3);
        assert_eq!(outcome.method, ScrapeMethod::MultiPageCrawl);
        assert_eq!(provider.poll_count(), 0);
        assert_eq!(provider.scrape_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_exactly_three_polls() {
        let provider = Arc::new(
            MockCrawlProvider::new()
                .with_start(Ok(CrawlStart::Job("crawl-1".into())))
                .with_poll(Ok(CrawlStatus::Running))
                .with_poll(Ok(CrawlStatus::Running))
                .with_poll(Ok(CrawlStatus::Completed(vec![
                    raw_page("https://example.org/a", &long("a")),
                    raw_page("https://example.org/b", &long("b")),
                ]))),
        );

        let outcome = orchestrator(&provider).ingest(URL).await.unwrap();

        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.method, ScrapeMethod::MultiPageCrawl);
        assert_eq!(provider.poll_count(), 3);
        assert_eq!(provider.poll_calls(), vec!["crawl-1"; 3]);
        assert_eq!(provider.scrape_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_on_start_falls_back_once() {
        let provider = Arc::new(
            MockCrawlProvider::new()
                .with_start(Err(transport_error()))
                .with_scrape(Ok(raw_page(URL, &long("home")))),
        );

        let outcome = orchestrator(&provider).ingest(URL).await.unwrap();

        assert_eq!(outcome.method, ScrapeMethod::SinglePageFallback);
        assert_eq!(outcome.method.as_str(), "single-page-fallback");
        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.pages[0].url, URL);
        assert_eq!(provider.scrape_count(), 1);
        assert_eq!(provider.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_crawl_falls_back() {
        let provider = Arc::new(
            MockCrawlProvider::new()
                .with_start(Ok(CrawlStart::Job("crawl-1".into())))
                .with_poll(Ok(CrawlStatus::Failed(Some("blocked".into()))))
                .with_scrape(Ok(raw_page(URL, &long("home")))),
        );

        let outcome = orchestrator(&provider).ingest(URL).await.unwrap();

        assert_eq!(outcome.method, ScrapeMethod::SinglePageFallback);
        assert_eq!(provider.poll_count(), 1);
        assert_eq!(provider.scrape_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_error_falls_back_without_retrying_the_check() {
        let provider = Arc::new(
            MockCrawlProvider::new()
                .with_start(Ok(CrawlStart::Job("crawl-1".into())))
                .with_poll(Ok(CrawlStatus::Running))
                .with_poll(Err(CrawlClientError::RateLimited))
                .with_poll(Ok(CrawlStatus::Completed(vec![raw_page(URL, &long("never"))])))
                .with_scrape(Ok(raw_page(URL, &long("home")))),
        );

        let outcome = orchestrator(&provider).ingest(URL).await.unwrap();

        assert_eq!(outcome.method, ScrapeMethod::SinglePageFallback);
        assert_eq!(provider.poll_count(), 2);
        assert_eq!(provider.scrape_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_polling_falls_back() {
        let provider = Arc::new(
            MockCrawlProvider::new()
                .with_start(Ok(CrawlStart::Job("crawl-1".into())))
                .with_scrape(Ok(raw_page(URL, &long("home")))),
        );
        let orchestrator = CrawlOrchestrator::with_poll_policy(
            provider.clone(),
            PollPolicy::new(std::time::Duration::from_secs(10), 4),
        );

        // Unscripted polls report `Running`.
        let outcome = orchestrator.ingest(URL).await.unwrap();

        assert_eq!(outcome.method, ScrapeMethod::SinglePageFallback);
        assert_eq!(provider.poll_count(), 4);
        assert_eq!(provider.scrape_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pages_under_floor_are_no_content() {
        let provider = Arc::new(MockCrawlProvider::new().with_start(Ok(CrawlStart::Inline(vec![
            raw_page("https://example.org/a", "too short"),
            raw_page("https://example.org/b", "also short"),
        ]))));

        let err = orchestrator(&provider).ingest(URL).await.unwrap_err();

        assert!(matches!(err, IngestError::NoContentExtracted { ref url } if url == URL));
        assert_eq!(provider.scrape_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_failure_propagates_provider_error() {
        let provider = Arc::new(
            MockCrawlProvider::new()
                .with_start(Err(CrawlClientError::RateLimited))
                .with_scrape(Err(CrawlClientError::Forbidden)),
        );

        let err = orchestrator(&provider).ingest(URL).await.unwrap_err();

        match err {
            IngestError::Provider(e) => assert_eq!(e.kind().as_str(), "forbidden"),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn thin_fallback_page_is_no_content() {
        let provider = Arc::new(
            MockCrawlProvider::new()
                .with_start(Err(transport_error()))
                .with_scrape(Ok(raw_page(URL, "tiny"))),
        );

        let err = orchestrator(&provider).ingest(URL).await.unwrap_err();
        assert!(matches!(err, IngestError::NoContentExtracted { .. }));
    }

    #[test]
    fn outcome_aggregates_into_document() {
        let outcome = IngestOutcome {
            pages: vec![ScrapedPage {
                url: URL.into(),
                title: "Home".into(),
                content: long("home"),
                description: None,
                keywords: Some(vec!["a".into(), "b".into()]),
            }],
            method: ScrapeMethod::SinglePageFallback,
        };

        let document = outcome.into_document(Utc::now());
        assert_eq!(document.total_pages, 1);
        assert_eq!(document.titles, vec!["Home"]);
        assert_eq!(document.method, ScrapeMethod::SinglePageFallback);
    }
}
