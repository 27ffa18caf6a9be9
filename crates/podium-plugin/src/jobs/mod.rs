//! In-process job queue for plugin-initiated background work.
//!
//! Plugins create and read jobs through [`crate::capabilities::JobsCapability`];
//! only the [`worker::JobWorker`] moves a job past `pending`.

pub mod ai_review;
pub mod worker;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::error::PluginError;

pub use ai_review::{AiReviewHandler, AiReviewResult, AI_REVIEW_JOB_TYPE};
pub use worker::{JobHandler, JobWorker};

const MAX_JOB_TYPE_LEN: usize = 64;

/// Finished jobs kept in memory when no retention is configured.
pub const DEFAULT_MAX_FINISHED_JOBS: usize = 1000;
pub const DEFAULT_FINISHED_JOB_TTL: Duration = Duration::from_secs(3600);

// ─── Job records ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginJob {
    pub id: Uuid,
    pub plugin_name: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a plugin submits to `enqueue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub job_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: Option<usize>,
}

// ─── Queue ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct QueueState {
    jobs: HashMap<Uuid, PluginJob>,
    pending: VecDeque<Uuid>,
    /// Terminal jobs in the order they finished.
    finished: VecDeque<Uuid>,
}

impl QueueState {
    fn finish(&mut self, id: Uuid) {
        self.finished.push_back(id);
    }

    /// Drop finished jobs beyond `max_finished` or older than `ttl`.
    fn prune(&mut self, max_finished: usize, ttl: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
        let mut removed = 0;
        while let Some(&id) = self.finished.front() {
            let expired = match (self.jobs.get(&id).and_then(|j| j.completed_at), cutoff) {
                (Some(done), Some(cutoff)) => done <= cutoff,
                (None, _) => true,
                (Some(_), None) => false,
            };
            if !expired && self.finished.len() <= max_finished {
                break;
            }
            self.finished.pop_front();
            if self.jobs.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

/// Single-process FIFO job queue.
///
/// Completed, failed and cancelled jobs stay readable until they are pruned
/// by count or age. Pruning runs on `enqueue` and `claim_next`.
#[derive(Debug)]
pub struct JobQueue {
    state: RwLock<QueueState>,
    notify: Notify,
    max_payload_bytes: usize,
    max_finished: usize,
    finished_ttl: Duration,
}

impl JobQueue {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            notify: Notify::new(),
            max_payload_bytes,
            max_finished: DEFAULT_MAX_FINISHED_JOBS,
            finished_ttl: DEFAULT_FINISHED_JOB_TTL,
        }
    }

    pub fn with_retention(mut self, max_finished: usize, finished_ttl: Duration) -> Self {
        self.max_finished = max_finished;
        self.finished_ttl = finished_ttl;
        self
    }

    fn prune(&self, state: &mut QueueState) {
        let removed = state.prune(self.max_finished, self.finished_ttl);
        if removed > 0 {
            tracing::debug!(removed, "pruned finished jobs");
        }
    }

    /// Validate and store a job for `plugin_name`, waking the worker.
    pub async fn enqueue(&self, plugin_name: &str, job: NewJob) -> Result<Uuid, PluginError> {
        let job_type = job.job_type.trim();
        if job_type.is_empty() {
            return Err(PluginError::InvalidJob("job type must not be empty".into()));
        }
        if job_type.len() > MAX_JOB_TYPE_LEN {
            return Err(PluginError::InvalidJob(format!(
                "job type must be at most {MAX_JOB_TYPE_LEN} characters"
            )));
        }
        let size = serde_json::to_vec(&job.payload)?.len();
        if size > self.max_payload_bytes {
            return Err(PluginError::InvalidJob(format!(
                "payload is {size} bytes, limit is {}",
                self.max_payload_bytes
            )));
        }

        let id = Uuid::new_v4();
        let record = PluginJob {
            id,
            plugin_name: plugin_name.to_string(),
            job_type: job_type.to_string(),
            payload: job.payload,
            status: JobStatus::Pending,
            attempts: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        {
            let mut state = self.state.write().await;
            self.prune(&mut state);
            state.jobs.insert(id, record);
            state.pending.push_back(id);
        }
        self.notify.notify_one();

        tracing::debug!(plugin = %plugin_name, job_id = %id, job_type = %job_type, "job enqueued");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<PluginJob> {
        self.state.read().await.jobs.get(&id).cloned()
    }

    /// Cancel a job that has not started. Returns false for any other state.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let mut state = self.state.write().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        state.pending.retain(|pending| *pending != id);
        state.finish(id);
        true
    }

    /// Pending jobs, optionally only those owned by `plugin_name`.
    pub async fn pending_count(&self, plugin_name: Option<&str>) -> usize {
        let state = self.state.read().await;
        state
            .pending
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| plugin_name.map_or(true, |p| job.plugin_name == p))
            .count()
    }

    /// Matching jobs, newest first.
    pub async fn list(&self, plugin_name: Option<&str>, filter: &JobFilter) -> Vec<PluginJob> {
        let state = self.state.read().await;
        let mut jobs: Vec<PluginJob> = state
            .jobs
            .values()
            .filter(|job| plugin_name.map_or(true, |p| job.plugin_name == p))
            .filter(|job| filter.status.map_or(true, |s| job.status == s))
            .filter(|job| {
                filter
                    .job_type
                    .as_deref()
                    .map_or(true, |t| job.job_type == t)
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        jobs
    }

    // ── Worker transitions ──────────────────────────────────────────

    /// Take the oldest pending job and mark it running.
    pub(crate) async fn claim_next(&self) -> Option<PluginJob> {
        let mut state = self.state.write().await;
        self.prune(&mut state);
        while let Some(id) = state.pending.pop_front() {
            let Some(job) = state.jobs.get_mut(&id) else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            job.status = JobStatus::Running;
            job.attempts += 1;
            job.started_at = Some(Utc::now());
            return Some(job.clone());
        }
        None
    }

    pub(crate) async fn complete(&self, id: Uuid, result: serde_json::Value) {
        let mut state = self.state.write().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            job.status = JobStatus::Completed;
            job.result = Some(result);
            job.error = None;
            job.completed_at = Some(Utc::now());
            state.finish(id);
        }
    }

    /// Record a failure. With `retry` the job goes back to the end of the queue.
    pub(crate) async fn fail(&self, id: Uuid, error: String, retry: bool) {
        let mut state = self.state.write().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };
        job.error = Some(error);
        if retry {
            job.status = JobStatus::Pending;
            state.pending.push_back(id);
            drop(state);
            self.notify.notify_one();
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            state.finish(id);
        }
    }

    /// Resolves when a job is enqueued or re-queued.
    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }
}
