use std::sync::Arc;

use super::CapabilityScope;
use crate::error::PluginError;
use crate::permissions::Permission;
use crate::store::PluginDataStore;

const MAX_KEY_LEN: usize = 255;

/// Key-value storage private to the plugin, keyed by its persistent id.
pub struct DataCapability {
    scope: Arc<CapabilityScope>,
    store: Arc<dyn PluginDataStore>,
}

impl DataCapability {
    pub fn new(scope: Arc<CapabilityScope>, store: Arc<dyn PluginDataStore>) -> Self {
        Self { scope, store }
    }

    fn check_key(key: &str) -> Result<(), PluginError> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(PluginError::Store(format!(
                "data key must be 1-{MAX_KEY_LEN} bytes"
            )));
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, PluginError> {
        self.scope.require(Permission::DataRead)?;
        Self::check_key(key)?;
        self.store.get(self.scope.plugin_id(), key).await
    }

    /// Typed read of a stored value.
    pub async fn get_as<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PluginError> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), PluginError> {
        self.scope.require(Permission::DataWrite)?;
        Self::check_key(key)?;
        self.store.set(self.scope.plugin_id(), key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, PluginError> {
        self.scope.require(Permission::DataWrite)?;
        Self::check_key(key)?;
        self.store.delete(self.scope.plugin_id(), key).await
    }

    pub async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, PluginError> {
        self.scope.require(Permission::DataRead)?;
        self.store.list_keys(self.scope.plugin_id(), prefix).await
    }
}
