use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Property, RecommendationError, RecommendationRequest, RecommendationResult, RankingStrategy,
    run_id,
};

const INTERNAL_ERROR_CODE: &str = "internal_error";
const INTERNAL_ERROR_MARKER: &str = "error: internal error";

/// Job lifecycle. Wire values match what existing pollers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Started,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Started => "STARTED",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

/// Either the ranked list or the legacy error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Recommendations(Vec<RecommendationResult>),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationJob {
    pub id: String,
    pub user_id: String,
    pub property_id: i64,
    pub strategy: RankingStrategy,
    #[serde(skip)]
    pub catalog_snapshot: Vec<Property>,
    pub status: JobStatus,
    pub locked_by: Option<String>,
    pub result: Option<JobResult>,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RecommendationJob {
    pub fn new(
        user_id: &str,
        property_id: i64,
        strategy: RankingStrategy,
        catalog_snapshot: Vec<Property>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: run_id::generate(),
            user_id: user_id.to_string(),
            property_id,
            strategy,
            catalog_snapshot,
            status: JobStatus::Pending,
            locked_by: None,
            result: None,
            error_code: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            task_id: self.id.clone(),
            ready: self.status.is_ready(),
            status: self.status,
            result: self.result.clone(),
            error_code: self.error_code.clone(),
        }
    }
}

/// Returned to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub task_id: String,
    pub status: JobStatus,
}

/// Returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub task_id: String,
    pub ready: bool,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// A job taken by a worker. The snapshot has moved out of the queue.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: String,
    pub worker_id: String,
    pub request: RecommendationRequest,
}

/// How long finished jobs stay pollable.
///
/// A finished job is dropped once it is older than `ttl` or once more than
/// `max_finished` finished jobs are held, oldest first. Pending and started
/// jobs are never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRetention {
    pub max_finished: usize,
    pub ttl: TimeDelta,
}

impl Default for JobRetention {
    fn default() -> Self {
        Self {
            max_finished: 10_000,
            ttl: TimeDelta::hours(1),
        }
    }
}

/// In-memory FIFO of recommendation jobs.
///
/// A job is claimed at most once: `claim_next` moves it to `STARTED` and only
/// a `STARTED` job can be finished. Failures are terminal.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: HashMap<String, RecommendationJob>,
    pending: VecDeque<String>,
    // Completion order, so the front is always the oldest finished job.
    finished: VecDeque<String>,
    retention: JobRetention,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: JobRetention) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, id: &str) -> Option<&RecommendationJob> {
        self.jobs.get(id)
    }

    pub fn enqueue(&mut self, job: RecommendationJob) -> JobHandle {
        self.evict_finished(Utc::now());

        let handle = JobHandle {
            task_id: job.id.clone(),
            status: job.status,
        };
        self.pending.push_back(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
        debug!(task_id = %handle.task_id, "job enqueued");
        handle
    }

    /// Marks the oldest pending job `STARTED` and hands its request to `worker_id`.
    pub fn claim_next(&mut self, worker_id: &str) -> Option<ClaimedJob> {
        let now = Utc::now();
        self.evict_finished(now);

        while let Some(id) = self.pending.pop_front() {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }

            job.status = JobStatus::Started;
            job.locked_by = Some(worker_id.to_string());
            job.started_at = Some(now);
            job.updated_at = now;

            return Some(ClaimedJob {
                job_id: id,
                worker_id: worker_id.to_string(),
                request: RecommendationRequest {
                    user_id: job.user_id.clone(),
                    target_property_id: job.property_id,
                    catalog_snapshot: std::mem::take(&mut job.catalog_snapshot),
                    strategy: job.strategy,
                },
            });
        }
        None
    }

    /// Records the outcome of a started job. Returns `None` when the job is
    /// unknown or was not in `STARTED`.
    pub fn finish(
        &mut self,
        id: &str,
        outcome: Result<Vec<RecommendationResult>, RecommendationError>,
    ) -> Option<JobStatus> {
        let job = self.jobs.get_mut(id)?;

        if job.status != JobStatus::Started {
            warn!(
                task_id = id,
                status = job.status.as_str(),
                "ignoring finish for job not in STARTED"
            );
            return None;
        }

        match outcome {
            Ok(results) => {
                job.status = JobStatus::Success;
                job.result = Some(JobResult::Recommendations(results));
                job.error_code = None;
            }
            Err(err) => {
                job.status = JobStatus::Failure;
                job.result = Some(JobResult::Error(err.wire_marker().to_string()));
                job.error_code = Some(err.code().to_string());
            }
        }

        let status = job.status;
        self.close(id);
        Some(status)
    }

    /// Fails a started job whose computation never produced an outcome.
    pub fn abort(&mut self, id: &str) -> Option<JobStatus> {
        let job = self.jobs.get_mut(id)?;
        if job.status != JobStatus::Started {
            return None;
        }

        job.status = JobStatus::Failure;
        job.result = Some(JobResult::Error(INTERNAL_ERROR_MARKER.to_string()));
        job.error_code = Some(INTERNAL_ERROR_CODE.to_string());
        self.close(id);
        Some(JobStatus::Failure)
    }

    fn close(&mut self, id: &str) {
        let finished_at = Utc::now();
        if let Some(job) = self.jobs.get_mut(id) {
            job.completed_at = Some(finished_at);
            job.updated_at = finished_at;
            job.locked_by = None;
            job.catalog_snapshot = Vec::new();
        }

        self.finished.push_back(id.to_string());
        self.evict_finished(finished_at);
    }

    /// Drop finished jobs past the retention window or over the cap.
    fn evict_finished(&mut self, now: DateTime<Utc>) {
        let mut evicted = 0usize;
        while let Some(id) = self.finished.front() {
            let over_cap = self.finished.len() > self.retention.max_finished;
            let expired = self
                .jobs
                .get(id)
                .and_then(|job| job.completed_at)
                .is_none_or(|completed_at| now - completed_at >= self.retention.ttl);
            if !over_cap && !expired {
                break;
            }

            if let Some(id) = self.finished.pop_front() {
                self.jobs.remove(&id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(evicted, retained = self.finished.len(), "evicted finished jobs");
        }
    }

    pub fn completed_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.jobs.get(id).and_then(|job| job.completed_at)
    }

    pub fn process_next<F>(&mut self, handler: F) -> Option<JobStatus>
    where
        F: FnOnce(&RecommendationRequest) -> Result<Vec<RecommendationResult>, RecommendationError>,
    {
        self.process_next_with_worker("worker_inline", handler)
    }

    /// Claim, run `handler` and finish in one step.
    pub fn process_next_with_worker<F>(&mut self, worker_id: &str, handler: F) -> Option<JobStatus>
    where
        F: FnOnce(&RecommendationRequest) -> Result<Vec<RecommendationResult>, RecommendationError>,
    {
        let claimed = self.claim_next(worker_id)?;
        let outcome = handler(&claimed.request);
        self.finish(&claimed.job_id, outcome)
    }

    pub fn status(&self, id: &str) -> Option<JobStatusView> {
        self.get(id).map(RecommendationJob::view)
    }
}

/// `JobQueue` behind a mutex, cloned into handlers and workers.
#[derive(Debug, Clone, Default)]
pub struct SharedJobQueue {
    inner: Arc<Mutex<JobQueue>>,
}

impl SharedJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: JobRetention) -> Self {
        Self {
            inner: Arc::new(Mutex::new(JobQueue::with_retention(retention))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobQueue> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, job: RecommendationJob) -> JobHandle {
        self.lock().enqueue(job)
    }

    pub fn claim_next(&self, worker_id: &str) -> Option<ClaimedJob> {
        self.lock().claim_next(worker_id)
    }

    pub fn finish(
        &self,
        id: &str,
        outcome: Result<Vec<RecommendationResult>, RecommendationError>,
    ) -> Option<JobStatus> {
        self.lock().finish(id, outcome)
    }

    pub fn abort(&self, id: &str) -> Option<JobStatus> {
        self.lock().abort(id)
    }

    pub fn status(&self, id: &str) -> Option<JobStatusView> {
        self.lock().status(id)
    }

    pub fn completed_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock().completed_at(id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending_count()
    }
}
