//! Ingestion domain - crawl a website and turn it into a combined document

pub mod orchestrator;
pub mod pipeline;
pub mod poll_policy;

pub use orchestrator::{CrawlOrchestrator, IngestError, IngestOutcome};
pub use pipeline::IngestionPipeline;
pub use poll_policy::{PollOutcome, PollPolicy, PollStep};
