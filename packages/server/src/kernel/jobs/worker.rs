//! Queue processor: the long-running loop that drains the ingestion queue.
//!
//! The processor:
//! - Recovers stale `processing` jobs before each claim, as failed attempts
//! - Claims at most one job per tick
//! - Hands the job to a [`JobHandler`], heartbeating the claim meanwhile
//! - Records completion, or a failed attempt with backoff
//!
//! # Architecture
//!
//! ```text
//! QueueProcessor (tick every N seconds, immediate first tick)
//!     │
//!     ├─► JobQueue.recover_stale()     → JobHandler.on_failure(job, outcome)
//!     ├─► JobQueue.claim_next()
//!     ├─► JobHandler.handle(job)       (panics caught, JobQueue.heartbeat() alongside)
//!     │
//!     ├─► Ok  → JobQueue.mark_completed()
//!     └─► Err → JobQueue.mark_failed_with_backoff()
//!                 └─► JobHandler.on_failure(job, outcome)
//! ```
//!
//! A processor has at most one job in flight.
//!
//! # Example
//!
//! ```ignore
//! let processor = QueueProcessor::new(queue, Arc::new(IngestionPipeline::new(..)));
//! let handle = processor.spawn();
//! // ...
//! handle.shutdown().await?;
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job::{FailureOutcome, IngestionJob, STALE_JOB_ERROR};
use super::queue::JobQueue;
use crate::common::IngestionJobId;

/// Floor for the tick and heartbeat periods; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Configuration for the queue processor.
#[derive(Debug, Clone)]
pub struct QueueProcessorConfig {
    /// Time between ticks. The first tick runs immediately.
    pub tick_interval: Duration,
    /// `processing` jobs untouched for longer than this are reclaimed.
    pub stale_after: Duration,
}

impl QueueProcessorConfig {
    /// A running job refreshes its claim three times per stale window.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.stale_after / 3).max(MIN_PERIOD)
    }
}

impl Default for QueueProcessorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(15 * 60),
        }
    }
}

/// Work performed for one claimed job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job end to end. Any error counts as a failed attempt.
    async fn handle(&self, job: &IngestionJob) -> Result<()>;

    /// Called after a failed attempt has been recorded.
    async fn on_failure(
        &self,
        job: &IngestionJob,
        outcome: &FailureOutcome,
        error: &str,
    ) -> Result<()> {
        let _ = (job, outcome, error);
        Ok(())
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No eligible job.
    Idle,
    Completed(IngestionJobId),
    /// The job was recovered by another processor mid-run and abandoned here.
    ClaimLost(IngestionJobId),
    Failed {
        job_id: IngestionJobId,
        outcome: FailureOutcome,
        error: String,
    },
}

pub struct QueueProcessor {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: QueueProcessorConfig,
}

impl QueueProcessor {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>) -> Self {
        Self::with_config(queue, handler, QueueProcessorConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        mut config: QueueProcessorConfig,
    ) -> Self {
        if config.tick_interval < MIN_PERIOD {
            warn!(
                tick_interval_ms = config.tick_interval.as_millis() as u64,
                "queue tick interval too small, using {}ms",
                MIN_PERIOD.as_millis()
            );
            config.tick_interval = MIN_PERIOD;
        }

        Self {
            queue,
            handler,
            config,
        }
    }

    /// Claim and process at most one job.
    ///
    /// Errors from the handler are recorded on the job and reported in the
    /// returned [`TickOutcome`]; only queue-store failures surface as `Err`.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .context("stale job timeout out of range")?;
        for recovered in self.queue.recover_stale(stale_after).await? {
            if let Err(e) = self
                .handler
                .on_failure(&recovered.job, &recovered.outcome, STALE_JOB_ERROR)
                .await
            {
                error!(job_id = %recovered.job.id, error = %e, "failure handler errored");
            }
        }

        let Some(job) = self.queue.claim_next().await? else {
            return Ok(TickOutcome::Idle);
        };

        info!(
            job_id = %job.id,
            website_id = %job.website_id,
            attempt = job.attempts + 1,
            max_attempts = job.max_attempts,
            "claimed ingestion job"
        );

        let Some(result) = self.handle_with_heartbeat(&job).await else {
            warn!(
                job_id = %job.id,
                website_id = %job.website_id,
                "ingestion job claim lost, abandoning"
            );
            return Ok(TickOutcome::ClaimLost(job.id));
        };

        match result {
            Ok(()) => {
                self.queue.mark_completed(&job).await?;
                info!(job_id = %job.id, website_id = %job.website_id, "ingestion job completed");
                Ok(TickOutcome::Completed(job.id))
            }
            Err(e) => {
                let error_msg = format!("{:#}", e);
                let outcome = self
                    .queue
                    .mark_failed_with_backoff(&job, &error_msg)
                    .await?;

                match outcome {
                    FailureOutcome::RetryScheduled {
                        attempts,
                        next_retry_at,
                    } => warn!(
                        job_id = %job.id,
                        attempts,
                        next_retry_at = %next_retry_at,
                        error = %error_msg,
                        "ingestion job failed, retry scheduled"
                    ),
                    FailureOutcome::Exhausted { attempts } => error!(
                        job_id = %job.id,
                        attempts,
                        error = %error_msg,
                        "ingestion job failed permanently"
                    ),
                }

                if let Err(e) = self.handler.on_failure(&job, &outcome, &error_msg).await {
                    error!(job_id = %job.id, error = %e, "failure handler errored");
                }

                Ok(TickOutcome::Failed {
                    job_id: job.id,
                    outcome,
                    error: error_msg,
                })
            }
        }
    }

    /// Run the handler with panics caught, refreshing the claim until it
    /// returns. `None` when the claim was lost and the handler dropped.
    async fn handle_with_heartbeat(&self, job: &IngestionJob) -> Option<Result<()>> {
        let handled = AssertUnwindSafe(self.handler.handle(job))
            .catch_unwind()
            .map(|caught| {
                caught.unwrap_or_else(|panic| {
                    Err(anyhow::anyhow!("job panicked: {}", panic_message(&*panic)))
                })
            });
        tokio::pin!(handled);

        let period = self.config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = &mut handled => return Some(result),
                _ = heartbeat.tick() => {
                    match self.queue.heartbeat(job).await {
                        Ok(true) => debug!(job_id = %job.id, "ingestion job heartbeat"),
                        Ok(false) => return None,
                        Err(e) => warn!(job_id = %job.id, error = %e, "ingestion job heartbeat failed"),
                    }
                }
            }
        }
    }

    /// Run until `shutdown` is cancelled. A tick in progress finishes first.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_interval_secs = self.config.tick_interval.as_secs(),
            "queue processor starting"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(TickOutcome::Idle) => debug!("no eligible ingestion jobs"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "queue processor tick failed"),
            }
        }

        info!("queue processor stopped");
    }

    /// Run on a background task owned by the returned handle.
    pub fn spawn(self) -> ProcessorHandle {
        let token = CancellationToken::new();
        let join = tokio::spawn(self.run(token.clone()));
        ProcessorHandle { token, join }
    }
}

/// Owner of a spawned processor loop.
pub struct ProcessorHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.token.cancel();
        self.join.await.context("queue processor task failed")
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::WebsiteId;
    use crate::kernel::clock::ManualClock;
    use crate::kernel::jobs::{InMemoryJobQueue, JobPriority, JobStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        WaitFor(Arc<Notify>),
    }

    struct ScriptedHandler {
        behavior: Behavior,
        calls: AtomicUsize,
        exhausted: AtomicUsize,
    }

    impl ScriptedHandler {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                exhausted: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, _job: &IngestionJob) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => anyhow::bail!("crawl went sideways"),
                Behavior::Panic => panic!("handler exploded"),
                Behavior::WaitFor(ref release) => {
                    release.notified().await;
                    Ok(())
                }
            }
        }

        async fn on_failure(
            &self,
            _job: &IngestionJob,
            outcome: &FailureOutcome,
            _error: &str,
        ) -> Result<()> {
            if outcome.is_exhausted() {
                self.exhausted.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    fn setup(
        behavior: Behavior,
    ) -> (
        Arc<InMemoryJobQueue>,
        Arc<ScriptedHandler>,
        QueueProcessor,
        ManualClock,
    ) {
        let clock = ManualClock::default();
        let queue = Arc::new(InMemoryJobQueue::with_clock(Arc::new(clock.clone())));
        let handler = ScriptedHandler::new(behavior);
        let processor = QueueProcessor::new(queue.clone(), handler.clone());
        (queue, handler, processor, clock)
    }

    #[test]
    fn test_config_defaults() {
        let config = QueueProcessorConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(30));
        assert_eq!(config.stale_after, Duration::from_secs(900));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn idle_tick_when_queue_is_empty() {
        let (_, handler, processor, _) = setup(Behavior::Succeed);
        assert_eq!(processor.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_job_is_completed() {
        let (queue, _, processor, _) = setup(Behavior::Succeed);
        let id = queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap()
            .job_id();

        assert_eq!(processor.tick().await.unwrap(), TickOutcome::Completed(id));
        let job = queue.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn one_job_per_tick() {
        let (queue, handler, processor, _) = setup(Behavior::Succeed);
        for _ in 0..3 {
            queue
                .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
                .await
                .unwrap();
        }

        processor.tick().await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_retry_with_backoff_until_exhausted() {
        let (queue, handler, processor, clock) = setup(Behavior::Fail);
        let id = queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap()
            .job_id();

        let first = processor.tick().await.unwrap();
        assert!(matches!(
            first,
            TickOutcome::Failed { outcome: FailureOutcome::RetryScheduled { attempts: 1, .. }, .. }
        ));
        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 0);

        // Still backing off.
        assert_eq!(processor.tick().await.unwrap(), TickOutcome::Idle);

        clock.advance(chrono::Duration::minutes(2));
        processor.tick().await.unwrap();
        clock.advance(chrono::Duration::minutes(4));
        let last = processor.tick().await.unwrap();

        assert!(matches!(
            last,
            TickOutcome::Failed { outcome: FailureOutcome::Exhausted { attempts: 3 }, .. }
        ));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 1);

        let job = queue.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("crawl went sideways"));
    }

    #[tokio::test]
    async fn panicking_job_is_recorded_as_failed_attempt() {
        let (queue, _, processor, _) = setup(Behavior::Panic);
        let id = queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap()
            .job_id();

        let outcome = processor.tick().await.unwrap();
        match outcome {
            TickOutcome::Failed { job_id, error, .. } => {
                assert_eq!(job_id, id);
                assert!(error.contains("handler exploded"));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let job = queue.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_processor_runs_immediately_and_shuts_down() {
        let (queue, handler, processor, _) = setup(Behavior::Succeed);
        let id = queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap()
            .job_id();

        let handle = processor.spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let job = queue.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_interval_does_not_kill_the_loop() {
        let clock = ManualClock::default();
        let queue = Arc::new(InMemoryJobQueue::with_clock(Arc::new(clock)));
        let handler = ScriptedHandler::new(Behavior::Succeed);
        let processor = QueueProcessor::with_config(
            queue.clone(),
            handler.clone(),
            QueueProcessorConfig {
                tick_interval: Duration::ZERO,
                stale_after: Duration::ZERO,
            },
        );

        let handle = processor.spawn();
        queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn second_processor_leaves_a_heartbeating_job_alone() {
        let clock = ManualClock::default();
        let queue = Arc::new(InMemoryJobQueue::with_clock(Arc::new(clock.clone())));
        let config = QueueProcessorConfig {
            tick_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(15 * 60),
        };
        let release = Arc::new(Notify::new());
        let slow = ScriptedHandler::new(Behavior::WaitFor(release.clone()));
        let other = ScriptedHandler::new(Behavior::Succeed);
        let first = QueueProcessor::with_config(queue.clone(), slow.clone(), config.clone());
        let second = QueueProcessor::with_config(queue.clone(), other.clone(), config);

        let id = queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap()
            .job_id();
        let running = tokio::spawn(async move { first.tick().await });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);

        // Twenty minutes of crawling, well past the stale timeout.
        for _ in 0..4 {
            clock.advance(chrono::Duration::minutes(5));
            tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        }

        assert_eq!(second.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(other.calls.load(Ordering::SeqCst), 0);
        let job = queue.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 0);

        release.notify_one();
        assert_eq!(running.await.unwrap().unwrap(), TickOutcome::Completed(id));
    }

    #[tokio::test]
    async fn abandoned_job_runs_failure_handler_once_exhausted() {
        let (queue, handler, processor, clock) = setup(Behavior::Succeed);
        let id = queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap()
            .job_id();

        // A processor died holding the job on its last attempt.
        let mut stuck = queue.claim_next().await.unwrap().unwrap();
        stuck.attempts = 2;
        queue.put(stuck);
        clock.advance(chrono::Duration::minutes(16));

        assert_eq!(processor.tick().await.unwrap(), TickOutcome::Idle);

        assert_eq!(handler.exhausted.load(Ordering::SeqCst), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        let job = queue.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(STALE_JOB_ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn processor_abandons_job_once_its_claim_is_lost() {
        let clock = ManualClock::default();
        let queue = Arc::new(InMemoryJobQueue::with_clock(Arc::new(clock.clone())));
        let release = Arc::new(Notify::new());
        let slow = ScriptedHandler::new(Behavior::WaitFor(release));
        let processor = QueueProcessor::with_config(
            queue.clone(),
            slow.clone(),
            QueueProcessorConfig {
                tick_interval: Duration::from_secs(30),
                stale_after: Duration::from_secs(15 * 60),
            },
        );

        let id = queue
            .enqueue(WebsiteId::new(), "https://a.org", JobPriority::Normal)
            .await
            .unwrap()
            .job_id();
        let running = tokio::spawn(async move { processor.tick().await });
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Another processor recovered the job before the first heartbeat.
        clock.advance(chrono::Duration::minutes(16));
        assert_eq!(
            queue.recover_stale(chrono::Duration::minutes(15)).await.unwrap().len(),
            1
        );

        assert_eq!(running.await.unwrap().unwrap(), TickOutcome::ClaimLost(id));
        let job = queue.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
    }
}
