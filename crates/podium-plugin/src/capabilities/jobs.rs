use std::sync::Arc;

use uuid::Uuid;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::jobs::{JobFilter, JobQueue, NewJob, PluginJob};
use crate::permissions::Permission;

/// Job queue access scoped to the calling plugin's own jobs.
///
/// Another plugin's job id behaves exactly like an unknown one.
pub struct JobsCapability {
    scope: Arc<CapabilityScope>,
    queue: Arc<JobQueue>,
}

impl JobsCapability {
    pub fn new(scope: Arc<CapabilityScope>, queue: Arc<JobQueue>) -> Self {
        Self { scope, queue }
    }

    async fn owned(&self, id: Uuid) -> Option<PluginJob> {
        self.queue
            .get(id)
            .await
            .filter(|job| job.plugin_name == self.scope.plugin_name())
    }

    pub async fn enqueue(&self, job: NewJob) -> Result<Uuid, PluginError> {
        self.scope.require(Permission::JobsWrite)?;
        let job_type = job.job_type.clone();
        let id = self.queue.enqueue(self.scope.plugin_name(), job).await?;
        self.scope.audit(&format!("job.enqueue:{job_type}"), &id.to_string());
        Ok(id)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<PluginJob>, PluginError> {
        self.scope.require(Permission::JobsRead)?;
        Ok(self.owned(id).await)
    }

    /// Cancel a pending job. Running, finished and foreign jobs return false.
    pub async fn cancel_job(&self, id: Uuid) -> Result<bool, PluginError> {
        self.scope.require(Permission::JobsWrite)?;
        if self.owned(id).await.is_none() {
            return Ok(false);
        }
        let cancelled = self.queue.cancel(id).await;
        if cancelled {
            self.scope.audit("job.cancel", &id.to_string());
        }
        Ok(cancelled)
    }

    pub async fn get_pending_count(&self) -> Result<usize, PluginError> {
        self.scope.require(Permission::JobsRead)?;
        Ok(self.queue.pending_count(Some(self.scope.plugin_name())).await)
    }

    pub async fn get_jobs(&self, filter: JobFilter) -> Result<Vec<PluginJob>, PluginError> {
        self.scope.require(Permission::JobsRead)?;
        Ok(self.queue.list(Some(self.scope.plugin_name()), &filter).await)
    }
}
