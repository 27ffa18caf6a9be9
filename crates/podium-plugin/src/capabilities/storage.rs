use std::sync::Arc;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::permissions::Permission;
use crate::store::StorageBackend;

const MAX_KEY_LEN: usize = 512;

/// Object storage confined to `plugins/<plugin-name>/`.
pub struct StorageCapability {
    scope: Arc<CapabilityScope>,
    backend: Arc<dyn StorageBackend>,
}

impl StorageCapability {
    pub fn new(scope: Arc<CapabilityScope>, backend: Arc<dyn StorageBackend>) -> Self {
        Self { scope, backend }
    }

    /// Map a plugin-relative key to its namespaced backend key.
    fn scoped_key(&self, key: &str) -> Result<String, PluginError> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(PluginError::Storage(format!(
                "key must be 1-{MAX_KEY_LEN} bytes"
            )));
        }
        if key.starts_with('/') || key.contains('\\') || key.split('/').any(|seg| seg == "..") {
            return Err(PluginError::Storage(format!(
                "key '{key}' escapes the plugin namespace"
            )));
        }
        if key.chars().any(char::is_control) {
            return Err(PluginError::Storage("key contains control characters".into()));
        }
        Ok(format!("plugins/{}/{key}", self.scope.plugin_name()))
    }

    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, PluginError> {
        self.scope.require(Permission::StorageWrite)?;
        let full = self.scoped_key(key)?;
        let size = data.len();
        self.backend.upload(&full, data, content_type).await?;
        self.scope.audit(&format!("storage.upload:{size}B"), &full);
        Ok(full)
    }

    pub async fn download(&self, key: &str) -> Result<Option<Vec<u8>>, PluginError> {
        self.scope.require(Permission::StorageRead)?;
        let full = self.scoped_key(key)?;
        self.backend.download(&full).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, PluginError> {
        self.scope.require(Permission::StorageWrite)?;
        let full = self.scoped_key(key)?;
        let deleted = self.backend.delete(&full).await?;
        if deleted {
            self.scope.audit("storage.delete", &full);
        }
        Ok(deleted)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, PluginError> {
        self.scope.require(Permission::StorageRead)?;
        let full = self.scoped_key(key)?;
        self.backend.exists(&full).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn capability(
        memory: &crate::memory::MemoryServices,
        perms: &[Permission],
    ) -> StorageCapability {
        StorageCapability::new(scope(perms), memory.host_services().storage)
    }

    #[tokio::test]
    async fn test_upload_is_namespaced() {
        let memory = services();
        let cap = capability(&memory, &[Permission::StorageRead, Permission::StorageWrite]);

        let full = cap
            .upload("badges/ferris.png", vec![1, 2, 3], Some("image/png"))
            .await
            .unwrap();
        assert_eq!(full, "plugins/test-plugin/badges/ferris.png");
        assert_eq!(memory.storage.keys().await, vec![full]);

        assert!(cap.exists("badges/ferris.png").await.unwrap());
        assert_eq!(
            cap.download("badges/ferris.png").await.unwrap(),
            Some(vec![1, 2, 3])
        );
        assert!(cap.delete("badges/ferris.png").await.unwrap());
        assert!(!cap.exists("badges/ferris.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_escaping_keys_rejected() {
        let memory = services();
        let cap = capability(&memory, &[Permission::StorageRead, Permission::StorageWrite]);
        for key in ["../other-plugin/secret", "a/../../b", "/etc/passwd", "a\\b", ""] {
            let err = cap.upload(key, vec![0], None).await.unwrap_err();
            assert!(matches!(err, PluginError::Storage(_)), "key {key:?}");
        }
        assert!(memory.storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_grant_denies_everything() {
        let memory = services();
        memory
            .storage
            .upload("plugins/test-plugin/x", vec![1], None)
            .await
            .unwrap();
        let cap = capability(&memory, &[]);

        assert!(cap.upload("y", vec![2], None).await.unwrap_err().is_permission_denied());
        assert!(cap.download("x").await.unwrap_err().is_permission_denied());
        assert!(cap.exists("x").await.unwrap_err().is_permission_denied());
        assert!(cap.delete("x").await.unwrap_err().is_permission_denied());
        assert_eq!(memory.storage.keys().await, vec!["plugins/test-plugin/x"]);
    }

    #[tokio::test]
    async fn test_read_grant_cannot_write() {
        let memory = services();
        let cap = capability(&memory, &[Permission::StorageRead]);
        assert!(!cap.exists("x").await.unwrap());
        assert!(cap.upload("x", vec![], None).await.unwrap_err().is_permission_denied());
        assert!(cap.delete("x").await.unwrap_err().is_permission_denied());
    }
}
