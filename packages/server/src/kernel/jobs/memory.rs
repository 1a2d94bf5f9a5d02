//! In-memory job queue for tests and local development.
//!
//! Same contract as [`PostgresJobQueue`](super::PostgresJobQueue). A single
//! mutex guards every operation, so a claim is atomic with respect to other
//! claims.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::job::{
    FailureOutcome, IngestionJob, JobPriority, JobStatus, RecoveredJob, STALE_JOB_ERROR,
};
use super::queue::{EnqueueResult, JobQueue};
use crate::common::{IngestionJobId, WebsiteId};
use crate::kernel::clock::{Clock, SystemClock};

pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<IngestionJobId, IngestionJob>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<IngestionJobId, IngestionJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every stored job, oldest first.
    pub fn all(&self) -> Vec<IngestionJob> {
        let mut jobs: Vec<_> = self.jobs().values().cloned().collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Overwrite a stored job. Lets tests stage states such as a stuck
    /// `processing` row.
    pub fn put(&self, job: IngestionJob) {
        self.jobs().insert(job.id, job);
    }

    fn pending_for(
        jobs: &HashMap<IngestionJobId, IngestionJob>,
        website_id: WebsiteId,
    ) -> Option<IngestionJobId> {
        jobs.values()
            .filter(|j| j.website_id == website_id && j.status == JobStatus::Pending)
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id)
    }

    /// The stored job, if it is still `processing` under `job`'s claim.
    fn claimed<'a>(
        jobs: &'a mut HashMap<IngestionJobId, IngestionJob>,
        job: &IngestionJob,
    ) -> Result<Option<&'a mut IngestionJob>> {
        let token = job.claim()?;
        Ok(jobs
            .get_mut(&job.id)
            .filter(|j| j.status == JobStatus::Processing && j.claim_token == Some(token)))
    }

    fn record_failure(job: &mut IngestionJob, error: &str, now: DateTime<Utc>) -> FailureOutcome {
        let outcome = FailureOutcome::after_failure(job.attempts, job.max_attempts, now);
        job.attempts = outcome.attempts();
        job.status = outcome.status();
        if let FailureOutcome::RetryScheduled { next_retry_at, .. } = outcome {
            job.next_retry_at = next_retry_at;
        }
        job.error_message = Some(error.to_string());
        job.claim_token = None;
        job.updated_at = now;
        outcome
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        website_id: WebsiteId,
        url: &str,
        priority: JobPriority,
    ) -> Result<EnqueueResult> {
        let mut jobs = self.jobs();
        if let Some(existing) = Self::pending_for(&jobs, website_id) {
            return Ok(EnqueueResult::Duplicate(existing));
        }

        let job = IngestionJob::new(website_id, url, priority, self.clock.now());
        let id = job.id;
        jobs.insert(id, job);
        Ok(EnqueueResult::Created(id))
    }

    async fn requeue(
        &self,
        website_id: WebsiteId,
        url: &str,
        priority: JobPriority,
    ) -> Result<IngestionJobId> {
        let now = self.clock.now();
        let mut jobs = self.jobs();

        if let Some(id) = Self::pending_for(&jobs, website_id) {
            if let Some(job) = jobs.get_mut(&id) {
                job.attempts = 0;
                job.next_retry_at = now;
                job.error_message = None;
                job.priority = priority;
                job.url = url.to_string();
                job.updated_at = now;
            }
            return Ok(id);
        }

        let job = IngestionJob::new(website_id, url, priority, now);
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<IngestionJob>> {
        let now = self.clock.now();
        let mut jobs = self.jobs();

        let busy: Vec<WebsiteId> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .map(|j| j.website_id)
            .collect();

        let next = jobs
            .values()
            .filter(|j| j.is_claimable(now) && !busy.contains(&j.website_id))
            .min_by_key(|j| (j.priority, j.created_at, j.id))
            .map(|j| j.id);

        let Some(id) = next else {
            return Ok(None);
        };

        Ok(jobs.get_mut(&id).map(|job| {
            job.status = JobStatus::Processing;
            job.claim_token = Some(Uuid::new_v4());
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn mark_completed(&self, job: &IngestionJob) -> Result<()> {
        let now = self.clock.now();
        let mut jobs = self.jobs();

        let Some(stored) = Self::claimed(&mut jobs, job)? else {
            bail!("ingestion job {} is no longer claimed by this processor", job.id);
        };
        stored.status = JobStatus::Completed;
        stored.error_message = None;
        stored.claim_token = None;
        stored.updated_at = now;
        Ok(())
    }

    async fn mark_failed_with_backoff(
        &self,
        job: &IngestionJob,
        error: &str,
    ) -> Result<FailureOutcome> {
        let now = self.clock.now();
        let mut jobs = self.jobs();

        let Some(stored) = Self::claimed(&mut jobs, job)? else {
            bail!("ingestion job {} is no longer claimed by this processor", job.id);
        };
        Ok(Self::record_failure(stored, error, now))
    }

    async fn heartbeat(&self, job: &IngestionJob) -> Result<bool> {
        let now = self.clock.now();
        let mut jobs = self.jobs();

        Ok(match Self::claimed(&mut jobs, job)? {
            Some(stored) => {
                stored.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn recover_stale(&self, older_than: Duration) -> Result<Vec<RecoveredJob>> {
        let now = self.clock.now();
        let cutoff = now - older_than;

        let mut recovered = Vec::new();
        for job in self.jobs().values_mut() {
            if job.status == JobStatus::Processing && job.updated_at < cutoff {
                let stale = job.clone();
                let outcome = Self::record_failure(job, STALE_JOB_ERROR, now);
                recovered.push(RecoveredJob { job: stale, outcome });
            }
        }

        Ok(recovered)
    }

    async fn find_by_id(&self, job_id: IngestionJobId) -> Result<Option<IngestionJob>> {
        Ok(self.jobs().get(&job_id).cloned())
    }

    async fn latest_for_website(&self, website_id: WebsiteId) -> Result<Option<IngestionJob>> {
        Ok(self
            .jobs()
            .values()
            .filter(|j| j.website_id == website_id)
            .max_by_key(|j| (j.created_at, j.id))
            .cloned())
    }
}
