//! Permission-checked façades over host collaborators.
//!
//! Each capability is a narrow, typed API for one domain. Every method
//! checks the caller's grant before touching a collaborator and reports
//! denials both to the caller and to the plugin's log.

mod data;
mod email;
mod events;
mod jobs;
mod reviews;
mod storage;
mod submissions;
mod users;

use std::sync::Arc;

use uuid::Uuid;

use crate::context::PluginLogger;
use crate::error::PluginError;
use crate::jobs::JobQueue;
use crate::permissions::{CapabilityDomain, Permission, PermissionSet};
use crate::store::HostServices;

pub use data::DataCapability;
pub use email::EmailCapability;
pub use events::EventsCapability;
pub use jobs::JobsCapability;
pub use reviews::ReviewsCapability;
pub use storage::StorageCapability;
pub use submissions::SubmissionsCapability;
pub use users::{UserInfo, UsersCapability};

// ─── Scope ──────────────────────────────────────────────────────────────

/// Identity and grant shared by all of one plugin's capabilities.
#[derive(Debug)]
pub struct CapabilityScope {
    plugin_name: String,
    plugin_id: Uuid,
    permissions: PermissionSet,
    logger: PluginLogger,
}

impl CapabilityScope {
    pub fn new(plugin_name: &str, plugin_id: Uuid, permissions: PermissionSet) -> Arc<Self> {
        Arc::new(Self {
            plugin_name: plugin_name.to_string(),
            plugin_id,
            permissions,
            logger: PluginLogger::new(plugin_name),
        })
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn plugin_id(&self) -> Uuid {
        self.plugin_id
    }

    /// Fail with `PermissionDenied` unless `permission` is granted.
    pub fn require(&self, permission: Permission) -> Result<(), PluginError> {
        if self.permissions.contains(permission) {
            return Ok(());
        }
        self.logger
            .warn(&format!("capability call denied: missing '{permission}' permission"));
        Err(PluginError::permission_denied(&self.plugin_name, permission))
    }

    /// Record a mutation made through a capability.
    pub(crate) fn audit(&self, action: &str, target: &str) {
        tracing::info!(
            target: "podium_plugin::audit",
            plugin = %self.plugin_name,
            action,
            target_id = %target,
            "plugin mutation"
        );
    }
}

// ─── Set ────────────────────────────────────────────────────────────────

/// One optional capability per domain. A domain is present when any of
/// its permissions was granted.
#[derive(Default)]
pub struct CapabilitySet {
    pub submissions: Option<SubmissionsCapability>,
    pub reviews: Option<ReviewsCapability>,
    pub users: Option<UsersCapability>,
    pub events: Option<EventsCapability>,
    pub storage: Option<StorageCapability>,
    pub email: Option<EmailCapability>,
    pub jobs: Option<JobsCapability>,
    pub data: Option<DataCapability>,
}

impl CapabilitySet {
    pub fn build(scope: &Arc<CapabilityScope>, services: &HostServices, queue: &Arc<JobQueue>) -> Self {
        let has = |domain| scope.permissions.has_domain(domain);

        Self {
            submissions: has(CapabilityDomain::Submissions)
                .then(|| SubmissionsCapability::new(scope.clone(), services.submissions.clone())),
            reviews: has(CapabilityDomain::Reviews)
                .then(|| ReviewsCapability::new(scope.clone(), services.reviews.clone())),
            users: has(CapabilityDomain::Users)
                .then(|| UsersCapability::new(scope.clone(), services.users.clone())),
            events: has(CapabilityDomain::Events)
                .then(|| EventsCapability::new(scope.clone(), services.events.clone())),
            storage: has(CapabilityDomain::Storage)
                .then(|| StorageCapability::new(scope.clone(), services.storage.clone())),
            email: has(CapabilityDomain::Email)
                .then(|| EmailCapability::new(scope.clone(), services.email.clone())),
            jobs: has(CapabilityDomain::Jobs)
                .then(|| JobsCapability::new(scope.clone(), queue.clone())),
            data: has(CapabilityDomain::Data)
                .then(|| DataCapability::new(scope.clone(), services.plugin_data.clone())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_require() {
        let s = scope(&[Permission::ReviewsRead]);
        assert!(s.require(Permission::ReviewsRead).is_ok());
        let err = s.require(Permission::ReviewsWrite).unwrap_err();
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("reviews:write"));
        assert!(err.to_string().contains("test-plugin"));
    }

    #[test]
    fn test_build_only_granted_domains() {
        let memory = services();
        let queue = Arc::new(JobQueue::new(1024));
        let set = CapabilitySet::build(
            &scope(&[Permission::SubmissionsRead, Permission::JobsWrite]),
            &memory.host_services(),
            &queue,
        );
        assert!(set.submissions.is_some());
        assert!(set.jobs.is_some());
        assert!(set.reviews.is_none());
        assert!(set.users.is_none());
        assert!(set.events.is_none());
        assert!(set.storage.is_none());
        assert!(set.email.is_none());
        assert!(set.data.is_none());
    }
}
