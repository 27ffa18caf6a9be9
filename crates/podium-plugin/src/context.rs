//! The object graph a plugin receives: logger, config and capabilities.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::capabilities::{
    CapabilitySet, DataCapability, EmailCapability, EventsCapability, JobsCapability,
    ReviewsCapability, StorageCapability, SubmissionsCapability, UsersCapability,
};
use crate::error::PluginError;
use crate::permissions::{CapabilityDomain, PermissionSet};

/// Maximum log message length for plugin logs.
const MAX_LOG_MESSAGE_LEN: usize = 2048;

/// Strips control characters (except newline/tab), truncates to max length.
fn sanitize_log_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_LOG_MESSAGE_LEN)
        .collect();
    if message.chars().count() > MAX_LOG_MESSAGE_LEN {
        format!("{cleaned}… (truncated)")
    } else {
        cleaned
    }
}

// ─── Logger ─────────────────────────────────────────────────────────────

/// Logger handed to plugins. Every line carries the plugin name.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin: Arc<str>,
}

impl PluginLogger {
    pub fn new(plugin: &str) -> Self {
        Self {
            plugin: Arc::from(plugin),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn debug(&self, message: &str) {
        let msg = sanitize_log_message(message);
        tracing::debug!(plugin = %self.plugin, "{msg}");
    }

    pub fn info(&self, message: &str) {
        let msg = sanitize_log_message(message);
        tracing::info!(plugin = %self.plugin, "{msg}");
    }

    pub fn warn(&self, message: &str) {
        let msg = sanitize_log_message(message);
        tracing::warn!(plugin = %self.plugin, "{msg}");
    }

    pub fn error(&self, message: &str) {
        let msg = sanitize_log_message(message);
        tracing::error!(plugin = %self.plugin, "{msg}");
    }
}

// ─── Context ────────────────────────────────────────────────────────────

/// Everything a plugin may touch. Passed to every lifecycle and hook call.
pub struct PluginContext {
    plugin_name: String,
    db_id: Uuid,
    logger: PluginLogger,
    permissions: PermissionSet,
    config: RwLock<Arc<serde_json::Value>>,
    capabilities: CapabilitySet,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_name", &self.plugin_name)
            .field("db_id", &self.db_id)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    pub fn new(
        plugin_name: &str,
        db_id: Uuid,
        permissions: PermissionSet,
        config: serde_json::Value,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            plugin_name: plugin_name.to_string(),
            db_id,
            logger: PluginLogger::new(plugin_name),
            permissions,
            config: RwLock::new(Arc::new(config)),
            capabilities,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn db_id(&self) -> Uuid {
        self.db_id
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Current decrypted config.
    pub async fn config(&self) -> Arc<serde_json::Value> {
        self.config.read().await.clone()
    }

    /// Current config deserialized into the plugin's own settings type.
    pub async fn config_as<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        let config = self.config().await;
        serde_json::from_value((*config).clone()).map_err(|e| PluginError::InvalidConfig {
            plugin: self.plugin_name.clone(),
            issues: vec![e.to_string()],
        })
    }

    /// Replace the config wholesale.
    pub(crate) async fn replace_config(&self, config: serde_json::Value) {
        *self.config.write().await = Arc::new(config);
    }

    // ── Capabilities ────────────────────────────────────────────────

    fn missing(&self, domain: CapabilityDomain) -> PluginError {
        self.logger
            .warn(&format!("no '{domain}' capability granted to this plugin"));
        PluginError::permission_denied(&self.plugin_name, domain)
    }

    pub fn submissions(&self) -> Result<&SubmissionsCapability, PluginError> {
        self.capabilities
            .submissions
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Submissions))
    }

    pub fn reviews(&self) -> Result<&ReviewsCapability, PluginError> {
        self.capabilities
            .reviews
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Reviews))
    }

    pub fn users(&self) -> Result<&UsersCapability, PluginError> {
        self.capabilities
            .users
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Users))
    }

    pub fn events(&self) -> Result<&EventsCapability, PluginError> {
        self.capabilities
            .events
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Events))
    }

    pub fn storage(&self) -> Result<&StorageCapability, PluginError> {
        self.capabilities
            .storage
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Storage))
    }

    pub fn email(&self) -> Result<&EmailCapability, PluginError> {
        self.capabilities
            .email
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Email))
    }

    pub fn jobs(&self) -> Result<&JobsCapability, PluginError> {
        self.capabilities
            .jobs
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Jobs))
    }

    pub fn data(&self) -> Result<&DataCapability, PluginError> {
        self.capabilities
            .data
            .as_ref()
            .ok_or_else(|| self.missing(CapabilityDomain::Data))
    }
}
