//! End-to-end ingestion over Postgres with a scripted crawl provider.

mod common;

use std::sync::Arc;
use std::time::Duration;

use crawl_client::{CrawlStart, CrawlStatus, ScrapeMethod};
use server_core::domains::ingestion::{CrawlOrchestrator, IngestionPipeline, PollPolicy};
use server_core::domains::website::actions::{get_status, register_website, RegisterWebsite};
use server_core::domains::website::{PostgresWebsiteStore, WebsiteStatus, WebsiteStatusRegister};
use server_core::kernel::jobs::{
    JobPriority, JobQueue, JobStatus, PostgresJobQueue, QueueProcessor, TickOutcome,
};
use server_core::kernel::test_dependencies::{
    raw_page, transport_error, MockCrawlProvider, MockPromptGenerator, RecordingEventSink,
};
use server_core::kernel::{ServerDeps, StreamHub};
use test_context::test_context;

use crate::common::{db_clock, TestHarness};

const BODY: &str = "A community organization page with more than enough words to keep.";

struct Wiring {
    deps: ServerDeps,
    processor: QueueProcessor,
    job_queue: Arc<PostgresJobQueue>,
    prompts: Arc<MockPromptGenerator>,
}

fn wire(ctx: &TestHarness, crawl: MockCrawlProvider) -> Wiring {
    let clock = Arc::new(db_clock());
    let websites = Arc::new(WebsiteStatusRegister::new(
        Arc::new(PostgresWebsiteStore::new(ctx.db_pool.clone())),
        Arc::new(RecordingEventSink::new()),
        clock.clone(),
    ));
    let job_queue = Arc::new(PostgresJobQueue::with_clock(ctx.db_pool.clone(), clock.clone()));
    let prompts = Arc::new(MockPromptGenerator::new());

    let pipeline = IngestionPipeline::new(
        websites.clone(),
        Arc::new(CrawlOrchestrator::with_poll_policy(
            Arc::new(crawl),
            PollPolicy::new(Duration::from_millis(10), 5),
        )),
        prompts.clone(),
        clock,
    );

    Wiring {
        deps: ServerDeps::new(websites, job_queue.clone(), StreamHub::new()),
        processor: QueueProcessor::new(job_queue.clone(), Arc::new(pipeline)),
        job_queue,
        prompts,
    }
}

fn input() -> RegisterWebsite {
    RegisterWebsite {
        url: "https://example.org".into(),
        title: Some("Example".into()),
        description: None,
        priority: JobPriority::Normal,
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn polled_crawl_ingests_website(ctx: &TestHarness) {
    let wiring = wire(
        ctx,
        MockCrawlProvider::new()
            .with_start(Ok(CrawlStart::Job("crawl-1".into())))
            .with_poll(Ok(CrawlStatus::Running))
            .with_poll(Ok(CrawlStatus::Completed(vec![
                raw_page("https://example.org/", BODY),
                raw_page("https://example.org/about", BODY),
            ]))),
    );

    let registered = register_website(input(), &wiring.deps).await.unwrap();
    let tick = wiring.processor.tick().await.unwrap();
    assert_eq!(tick, TickOutcome::Completed(registered.job_id));

    let view = get_status(registered.website.id, &wiring.deps).await.unwrap();
    assert_eq!(view.status, WebsiteStatus::Ready);
    let content = view.scraped_content.unwrap();
    assert_eq!(content.total_pages, 2);
    assert_eq!(content.method, ScrapeMethod::MultiPageCrawl);

    let job = wiring.job_queue.find_by_id(registered.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(wiring.prompts.calls(), vec![registered.website.id]);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unreachable_provider_falls_back_to_single_page(ctx: &TestHarness) {
    let wiring = wire(
        ctx,
        MockCrawlProvider::new()
            .with_start(Err(transport_error()))
            .with_scrape(Ok(raw_page("https://example.org/", BODY))),
    );

    let registered = register_website(input(), &wiring.deps).await.unwrap();
    wiring.processor.tick().await.unwrap();

    let view = get_status(registered.website.id, &wiring.deps).await.unwrap();
    assert_eq!(view.status, WebsiteStatus::Ready);
    assert_eq!(
        view.scraped_content.unwrap().method,
        ScrapeMethod::SinglePageFallback
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn failed_attempt_keeps_website_in_flight(ctx: &TestHarness) {
    let wiring = wire(
        ctx,
        MockCrawlProvider::new().with_start(Ok(CrawlStart::Inline(vec![raw_page(
            "https://example.org/",
            "too short",
        )]))),
    );

    let registered = register_website(input(), &wiring.deps).await.unwrap();
    let tick = wiring.processor.tick().await.unwrap();
    assert!(matches!(tick, TickOutcome::Failed { .. }));

    let job = wiring.job_queue.find_by_id(registered.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);

    let view = get_status(registered.website.id, &wiring.deps).await.unwrap();
    assert_eq!(view.status, WebsiteStatus::Scraping);
    assert!(view.error_message.is_none());
}
