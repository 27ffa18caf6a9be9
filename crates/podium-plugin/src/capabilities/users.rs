use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::permissions::Permission;
use crate::store::{FindMany, UserFilter, UserRecord, UserRole, UserStore, UserUnique};

/// User information exposed to plugins.
///
/// Never carries credentials: it is built field by field from the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserInfo {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            name: record.name,
            role: record.role,
            avatar_url: record.avatar_url,
            created_at: record.created_at,
        }
    }
}

/// Read-only user directory, `users:read`.
pub struct UsersCapability {
    scope: Arc<CapabilityScope>,
    store: Arc<UserStore>,
}

impl UsersCapability {
    pub fn new(scope: Arc<CapabilityScope>, store: Arc<UserStore>) -> Self {
        Self { scope, store }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<UserInfo>, PluginError> {
        self.scope.require(Permission::UsersRead)?;
        Ok(self
            .store
            .find_unique(&UserUnique::Id(id))
            .await?
            .map(UserInfo::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserInfo>, PluginError> {
        self.scope.require(Permission::UsersRead)?;
        Ok(self
            .store
            .find_unique(&UserUnique::Email(email.to_string()))
            .await?
            .map(UserInfo::from))
    }

    /// `email` matches case-insensitively as a substring.
    pub async fn list(&self, filter: UserFilter) -> Result<Vec<UserInfo>, PluginError> {
        self.scope.require(Permission::UsersRead)?;
        Ok(self
            .store
            .find_many(FindMany::new(filter))
            .await?
            .into_iter()
            .map(UserInfo::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn record(email: &str, role: UserRole) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: email.into(),
            name: "Ferris".into(),
            role,
            password_hash: Some("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into()),
            avatar_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_password_hash_never_exposed() {
        let memory = services();
        let user = record("ferris@podium.dev", UserRole::Speaker);
        memory.users.insert(user.clone()).await;
        let cap = UsersCapability::new(scope(&[Permission::UsersRead]), memory.host_services().users);

        let outputs = vec![
            serde_json::to_value(cap.get(user.id).await.unwrap().unwrap()).unwrap(),
            serde_json::to_value(cap.get_by_email("FERRIS@podium.dev").await.unwrap().unwrap())
                .unwrap(),
            serde_json::to_value(cap.list(UserFilter::default()).await.unwrap()).unwrap(),
        ];
        for out in outputs {
            let text = out.to_string();
            assert!(!text.contains("passwordHash"));
            assert!(!text.contains("password_hash"));
            assert!(!text.contains("argon2"));
        }
    }

    #[tokio::test]
    async fn test_list_filters_email_and_role() {
        let memory = services();
        memory.users.insert(record("alice@podium.dev", UserRole::Reviewer)).await;
        memory.users.insert(record("bob@podium.dev", UserRole::Speaker)).await;
        memory.users.insert(record("carol@elsewhere.org", UserRole::Reviewer)).await;
        let cap = UsersCapability::new(scope(&[Permission::UsersRead]), memory.host_services().users);

        let reviewers_at_podium = cap
            .list(UserFilter {
                email: Some("Podium.DEV".into()),
                role: Some(UserRole::Reviewer),
            })
            .await
            .unwrap();
        assert_eq!(reviewers_at_podium.len(), 1);
        assert_eq!(reviewers_at_podium[0].email, "alice@podium.dev");
    }

    #[tokio::test]
    async fn test_no_grant_is_denied() {
        let memory = services();
        let cap = UsersCapability::new(scope(&[]), memory.host_services().users);
        assert!(cap.get(Uuid::new_v4()).await.unwrap_err().is_permission_denied());
        assert!(cap.get_by_email("x@y.z").await.unwrap_err().is_permission_denied());
        assert!(cap
            .list(UserFilter::default())
            .await
            .unwrap_err()
            .is_permission_denied());
    }
}
