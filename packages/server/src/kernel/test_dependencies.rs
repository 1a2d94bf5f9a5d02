// TestDependencies - mock implementations for testing
//
// Scripted crawl provider, prompt generator and event sink, plus a bundle
// that wires them to in-memory stores and a manual clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use crawl_client::{
    CrawlClientError, CrawlProvider, CrawlResult, CrawlStart, CrawlStatus, RawMetadata, RawPage,
};

use super::clock::ManualClock;
use super::jobs::{InMemoryJobQueue, QueueProcessor};
use super::{BasePromptGenerator, BaseWebsiteEventSink, ServerDeps, StreamHub};
use crate::common::{ChatbotId, WebsiteId};
use crate::domains::ingestion::{CrawlOrchestrator, IngestionPipeline};
use crate::domains::website::{
    InMemoryWebsiteStore, Website, WebsiteStatus, WebsiteStatusChanged, WebsiteStatusRegister,
};

// =============================================================================
// Fixtures
// =============================================================================

/// A provider page with markdown content and a source URL.
pub fn raw_page(url: &str, markdown: &str) -> RawPage {
    RawPage {
        content: None,
        markdown: Some(markdown.to_string()),
        metadata: Some(RawMetadata {
            title: Some(format!("Page: {}", url)),
            source_url: Some(url.to_string()),
            ..Default::default()
        }),
    }
}

/// A transport-level failure, as if the provider were unreachable.
pub fn transport_error() -> CrawlClientError {
    match reqwest::Client::new().get("http://").build() {
        Err(e) => CrawlClientError::Transport(e),
        Ok(_) => CrawlClientError::Decode("expected an unbuildable request".into()),
    }
}

// =============================================================================
// Mock Crawl Provider
// =============================================================================

/// Crawl provider that replays scripted responses in order.
///
/// Unscripted calls: `start_crawl` and `scrape_single_page` fail with a 503,
/// `poll_crawl` reports `Running`.
#[derive(Default)]
pub struct MockCrawlProvider {
    starts: Mutex<VecDeque<CrawlResult<CrawlStart>>>,
    polls: Mutex<VecDeque<CrawlResult<CrawlStatus>>>,
    scrapes: Mutex<VecDeque<CrawlResult<RawPage>>>,
    start_calls: Mutex<Vec<String>>,
    poll_calls: Mutex<Vec<String>>,
    scrape_calls: Mutex<Vec<String>>,
}

impl MockCrawlProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(self, response: CrawlResult<CrawlStart>) -> Self {
        self.starts.lock().unwrap().push_back(response);
        self
    }

    pub fn with_poll(self, response: CrawlResult<CrawlStatus>) -> Self {
        self.polls.lock().unwrap().push_back(response);
        self
    }

    pub fn with_scrape(self, response: CrawlResult<RawPage>) -> Self {
        self.scrapes.lock().unwrap().push_back(response);
        self
    }

    pub fn start_calls(&self) -> Vec<String> {
        self.start_calls.lock().unwrap().clone()
    }

    pub fn poll_calls(&self) -> Vec<String> {
        self.poll_calls.lock().unwrap().clone()
    }

    pub fn scrape_calls(&self) -> Vec<String> {
        self.scrape_calls.lock().unwrap().clone()
    }

    pub fn start_count(&self) -> usize {
        self.start_calls.lock().unwrap().len()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_calls.lock().unwrap().len()
    }

    pub fn scrape_count(&self) -> usize {
        self.scrape_calls.lock().unwrap().len()
    }

    fn unscripted(call: &str) -> CrawlClientError {
        CrawlClientError::Upstream {
            status: 503,
            message: format!("no scripted response for {}", call),
        }
    }
}

#[async_trait]
impl CrawlProvider for MockCrawlProvider {
    async fn start_crawl(&self, url: &str) -> CrawlResult<CrawlStart> {
        self.start_calls.lock().unwrap().push(url.to_string());
        self.starts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("start_crawl")))
    }

    async fn poll_crawl(&self, job_id: &str) -> CrawlResult<CrawlStatus> {
        self.poll_calls.lock().unwrap().push(job_id.to_string());
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(CrawlStatus::Running))
    }

    async fn scrape_single_page(&self, url: &str) -> CrawlResult<RawPage> {
        self.scrape_calls.lock().unwrap().push(url.to_string());
        self.scrapes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("scrape_single_page")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Mock Prompt Generator
// =============================================================================

enum PromptFailure {
    Never,
    Always(String),
    Once(String),
}

pub struct MockPromptGenerator {
    failure: Mutex<PromptFailure>,
    calls: Mutex<Vec<WebsiteId>>,
}

impl MockPromptGenerator {
    pub fn new() -> Self {
        Self {
            failure: Mutex::new(PromptFailure::Never),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Mutex::new(PromptFailure::Always(message.into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The first call fails with `message`, later calls succeed.
    pub fn failing_once(message: impl Into<String>) -> Self {
        Self {
            failure: Mutex::new(PromptFailure::Once(message.into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<WebsiteId> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockPromptGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePromptGenerator for MockPromptGenerator {
    async fn generate_prompt(&self, website_id: WebsiteId) -> Result<Option<ChatbotId>> {
        self.calls.lock().unwrap().push(website_id);

        let mut failure = self.failure.lock().unwrap();
        match std::mem::replace(&mut *failure, PromptFailure::Never) {
            PromptFailure::Never => Ok(Some(ChatbotId::new())),
            PromptFailure::Once(message) => Err(anyhow::anyhow!(message)),
            PromptFailure::Always(message) => {
                *failure = PromptFailure::Always(message.clone());
                Err(anyhow::anyhow!(message))
            }
        }
    }
}

// =============================================================================
// Recording Event Sink
// =============================================================================

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<WebsiteStatusChanged>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WebsiteStatusChanged> {
        self.events.lock().unwrap().clone()
    }

    /// Statuses published for one website, in order.
    pub fn statuses_for(&self, website_id: WebsiteId) -> Vec<WebsiteStatus> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.website_id == website_id)
            .map(|e| e.status)
            .collect()
    }
}

#[async_trait]
impl BaseWebsiteEventSink for RecordingEventSink {
    async fn publish(&self, event: &WebsiteStatusChanged) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// In-memory wiring of the whole ingestion core.
pub struct TestDependencies {
    pub clock: ManualClock,
    pub job_queue: Arc<InMemoryJobQueue>,
    pub website_store: Arc<InMemoryWebsiteStore>,
    pub events: Arc<RecordingEventSink>,
    pub crawl: Arc<MockCrawlProvider>,
    pub prompts: Arc<MockPromptGenerator>,
    pub stream_hub: StreamHub,
}

impl TestDependencies {
    pub fn new() -> Self {
        let clock = ManualClock::default();
        Self {
            job_queue: Arc::new(InMemoryJobQueue::with_clock(Arc::new(clock.clone()))),
            website_store: Arc::new(InMemoryWebsiteStore::new()),
            events: Arc::new(RecordingEventSink::new()),
            crawl: Arc::new(MockCrawlProvider::new()),
            prompts: Arc::new(MockPromptGenerator::new()),
            stream_hub: StreamHub::new(),
            clock,
        }
    }

    pub fn with_crawl(mut self, provider: MockCrawlProvider) -> Self {
        self.crawl = Arc::new(provider);
        self
    }

    pub fn failing_prompts(mut self, message: &str) -> Self {
        self.prompts = Arc::new(MockPromptGenerator::failing(message));
        self
    }

    pub fn failing_prompts_once(mut self, message: &str) -> Self {
        self.prompts = Arc::new(MockPromptGenerator::failing_once(message));
        self
    }

    pub fn register(&self) -> Arc<WebsiteStatusRegister> {
        Arc::new(WebsiteStatusRegister::new(
            self.website_store.clone(),
            self.events.clone(),
            Arc::new(self.clock.clone()),
        ))
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(self.register(), self.job_queue.clone(), self.stream_hub.clone())
    }

    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(
            self.register(),
            Arc::new(CrawlOrchestrator::new(self.crawl.clone())),
            self.prompts.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    pub fn processor(&self) -> QueueProcessor {
        QueueProcessor::new(self.job_queue.clone(), Arc::new(self.pipeline()))
    }

    /// The single registered website. Panics if there isn't exactly one.
    pub async fn only_website(&self) -> Website {
        let mut websites = self.website_store.all();
        assert_eq!(websites.len(), 1, "expected exactly one website");
        websites.remove(0)
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
