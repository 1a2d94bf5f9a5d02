//! Ingestion job infrastructure.
//!
//! - [`IngestionJob`] - Job model with SQL queries
//! - [`JobQueue`] - Durable queue contract, with [`PostgresJobQueue`] and
//!   [`InMemoryJobQueue`] implementations
//! - [`QueueProcessor`] - Loop that claims one job per tick and runs a
//!   [`JobHandler`]
//!
//! The pipeline work itself lives in the ingestion domain; this module only
//! provides the scheduling machinery.

mod job;
mod memory;
mod queue;
mod worker;

pub use job::{
    backoff_delay, FailureOutcome, IngestionJob, JobPriority, JobStatus, RecoveredJob,
    DEFAULT_MAX_ATTEMPTS, STALE_JOB_ERROR,
};
pub use memory::InMemoryJobQueue;
pub use queue::{EnqueueResult, JobQueue, PostgresJobQueue};
pub use worker::{JobHandler, ProcessorHandle, QueueProcessor, QueueProcessorConfig, TickOutcome};
