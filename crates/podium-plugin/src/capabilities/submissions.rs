use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::permissions::Permission;
use crate::store::{
    FindMany, NewSubmission, Submission, SubmissionFilter, SubmissionStatus, SubmissionStore,
    SubmissionUpdate,
};

/// Submissions: read with `submissions:read`, edit with `submissions:write`,
/// change status with `submissions:manage`.
pub struct SubmissionsCapability {
    scope: Arc<CapabilityScope>,
    store: Arc<SubmissionStore>,
}

impl std::fmt::Debug for SubmissionsCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionsCapability")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl SubmissionsCapability {
    pub fn new(scope: Arc<CapabilityScope>, store: Arc<SubmissionStore>) -> Self {
        Self { scope, store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Submission>, PluginError> {
        self.scope.require(Permission::SubmissionsRead)?;
        self.store.find_unique(&id).await
    }

    /// Newest first.
    pub async fn list(&self, filter: SubmissionFilter) -> Result<Vec<Submission>, PluginError> {
        self.scope.require(Permission::SubmissionsRead)?;
        self.store.find_many(FindMany::new(filter)).await
    }

    pub async fn create(&self, data: NewSubmission) -> Result<Submission, PluginError> {
        self.scope.require(Permission::SubmissionsWrite)?;
        let created = self.store.create(data).await?;
        self.scope.audit("submission.create", &created.id.to_string());
        Ok(created)
    }

    /// Edit content fields. Status fields in `data` are ignored; use
    /// [`update_status`](Self::update_status).
    pub async fn update(
        &self,
        id: Uuid,
        mut data: SubmissionUpdate,
    ) -> Result<Option<Submission>, PluginError> {
        self.scope.require(Permission::SubmissionsWrite)?;
        data.status = None;
        data.status_changed_at = None;
        let updated = self.store.update(&id, data).await?;
        if updated.is_some() {
            self.scope.audit("submission.update", &id.to_string());
        }
        Ok(updated)
    }

    /// Move a submission to `status`, stamping the change time.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
    ) -> Result<Option<Submission>, PluginError> {
        self.scope.require(Permission::SubmissionsManage)?;
        let data = SubmissionUpdate {
            status: Some(status),
            status_changed_at: Some(Utc::now()),
            ..Default::default()
        };
        let updated = self.store.update(&id, data).await?;
        if updated.is_some() {
            self.scope
                .audit(&format!("submission.status:{status}"), &id.to_string());
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::memory::MemoryServices;

    fn capability(memory: &MemoryServices, perms: &[Permission]) -> SubmissionsCapability {
        SubmissionsCapability::new(scope(perms), memory.host_services().submissions)
    }

    fn new_submission(event_id: Uuid) -> NewSubmission {
        NewSubmission {
            event_id,
            speaker_id: Uuid::new_v4(),
            track_id: None,
            title: "Borrow checker by example".into(),
            abstract_text: "Lifetimes, visualised".into(),
            outline: None,
            talk_format: None,
        }
    }

    #[tokio::test]
    async fn test_empty_grant_denies_everything() {
        let memory = services();
        let cap = capability(&memory, &[]);
        let id = Uuid::new_v4();
        assert!(cap.get(id).await.unwrap_err().is_permission_denied());
        assert!(cap
            .list(SubmissionFilter::default())
            .await
            .unwrap_err()
            .is_permission_denied());
        assert!(cap
            .create(new_submission(Uuid::new_v4()))
            .await
            .unwrap_err()
            .is_permission_denied());
        assert!(cap
            .update(id, SubmissionUpdate::default())
            .await
            .unwrap_err()
            .is_permission_denied());
        assert!(cap
            .update_status(id, SubmissionStatus::Accepted)
            .await
            .unwrap_err()
            .is_permission_denied());
    }

    #[tokio::test]
    async fn test_read_only_grant() {
        let memory = services();
        let writer = capability(&memory, &[Permission::SubmissionsWrite]);
        let created = writer.create(new_submission(Uuid::new_v4())).await.unwrap();

        let reader = capability(&memory, &[Permission::SubmissionsRead]);
        assert_eq!(reader.get(created.id).await.unwrap().unwrap().id, created.id);
        assert_eq!(reader.list(SubmissionFilter::default()).await.unwrap().len(), 1);
        assert!(reader
            .create(new_submission(Uuid::new_v4()))
            .await
            .unwrap_err()
            .is_permission_denied());
    }

    #[tokio::test]
    async fn test_update_status_requires_manage_and_stamps_time() {
        let memory = services();
        let writer = capability(
            &memory,
            &[Permission::SubmissionsRead, Permission::SubmissionsWrite],
        );
        let created = writer.create(new_submission(Uuid::new_v4())).await.unwrap();

        let err = writer
            .update_status(created.id, SubmissionStatus::Accepted)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("submissions:manage"));

        let manager = capability(&memory, &[Permission::SubmissionsManage]);
        let updated = manager
            .update_status(created.id, SubmissionStatus::Accepted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, SubmissionStatus::Accepted);
        assert!(updated.status_changed_at.is_some());
    }

    #[tokio::test]
    async fn test_plain_update_cannot_change_status() {
        let memory = services();
        let writer = capability(&memory, &[Permission::SubmissionsWrite]);
        let created = writer.create(new_submission(Uuid::new_v4())).await.unwrap();

        let updated = writer
            .update(
                created.id,
                SubmissionUpdate {
                    title: Some("Renamed".into()),
                    status: Some(SubmissionStatus::Accepted),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.status, SubmissionStatus::Submitted);
        assert!(updated.status_changed_at.is_none());
    }

    #[tokio::test]
    async fn test_list_uses_filter() {
        let memory = services();
        let cap = capability(
            &memory,
            &[Permission::SubmissionsRead, Permission::SubmissionsWrite],
        );
        let event_a = Uuid::new_v4();
        cap.create(new_submission(event_a)).await.unwrap();
        cap.create(new_submission(event_a)).await.unwrap();
        cap.create(new_submission(Uuid::new_v4())).await.unwrap();

        let listed = cap
            .list(SubmissionFilter {
                event_id: Some(event_a),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);
    }
}
