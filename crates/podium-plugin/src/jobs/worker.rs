//! Background executor for queued plugin jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{JobQueue, PluginJob};
use crate::error::PluginError;
use crate::settings::RuntimeConfig;

/// Executes jobs of one type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &str;

    /// Run the job and return its result document.
    async fn run(&self, job: &PluginJob) -> Result<serde_json::Value, PluginError>;
}

/// Pulls pending jobs off a [`JobQueue`] and runs the matching handler.
pub struct JobWorker {
    queue: Arc<JobQueue>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    job_timeout: Duration,
    poll_interval: Duration,
    max_attempts: u32,
}

impl JobWorker {
    pub fn new(queue: Arc<JobQueue>, settings: &RuntimeConfig) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            job_timeout: settings.job_timeout(),
            poll_interval: settings.job_poll_interval(),
            max_attempts: settings.job_max_attempts.max(1),
        }
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        if self.handlers.insert(job_type.clone(), handler).is_some() {
            tracing::warn!(job_type = %job_type, "replacing job handler");
        }
    }

    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Run the loop on the current runtime until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            handlers = self.handlers.len(),
            max_attempts = self.max_attempts,
            "plugin job worker started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if self.run_once().await {
                continue;
            }

            // Idle until woken or cancelled.
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.queue.notified() => {},
                _ = tokio::time::sleep(self.poll_interval) => {},
            }
        }

        tracing::info!("plugin job worker stopped");
    }

    /// Process at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> bool {
        let Some(job) = self.queue.claim_next().await else {
            return false;
        };
        self.execute(job).await;
        true
    }

    async fn execute(&self, job: PluginJob) {
        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            tracing::warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                plugin = %job.plugin_name,
                "no handler for job type"
            );
            self.queue
                .fail(
                    job.id,
                    format!("no handler registered for job type '{}'", job.job_type),
                    false,
                )
                .await;
            return;
        };

        let id = job.id;
        let attempt = job.attempts;
        let timeout = self.job_timeout;
        let started = Instant::now();

        // Run in its own task so a panicking handler cannot take the worker down.
        let outcome = tokio::spawn(async move {
            match tokio::time::timeout(timeout, handler.run(&job)).await {
                Ok(result) => result,
                Err(_) => Err(PluginError::Timeout(format!(
                    "job exceeded {}s",
                    timeout.as_secs()
                ))),
            }
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                tracing::info!(job_id = %id, attempt, elapsed_ms, "job completed");
                self.queue.complete(id, result).await;
            }
            Ok(Err(e)) => {
                let retry = e.is_retryable() && attempt < self.max_attempts;
                if retry {
                    tracing::warn!(job_id = %id, attempt, elapsed_ms, "job failed, will retry: {e}");
                } else {
                    tracing::error!(job_id = %id, attempt, elapsed_ms, "job failed: {e}");
                }
                self.queue.fail(id, e.to_string(), retry).await;
            }
            Err(join_err) => {
                tracing::error!(job_id = %id, attempt, "job handler panicked: {join_err}");
                self.queue
                    .fail(id, "job handler panicked".to_string(), false)
                    .await;
            }
        }
    }
}
