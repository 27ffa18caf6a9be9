//! `RuntimeHost`: the single owner of the plugin runtime's state.
//!
//! Constructed once at process start and shared by reference. Tests build
//! a fresh host per case instead of resetting global state.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config_crypto::{get_password_fields, mask_config_fields, ConfigCipher};
use crate::config_schema::{apply_defaults, validate_config};
use crate::error::PluginError;
use crate::jobs::{AiReviewHandler, JobQueue, JobWorker};
use crate::manifest::{PluginManifest, SidebarSection};
use crate::permissions::PermissionSet;
use crate::plugin::Plugin;
use crate::registry::{LoadedPlugin, PluginRegistration, PluginRegistry};
use crate::settings::RuntimeConfig;
use crate::slots::{SlotRegistration, SlotRegistry};
use crate::store::{HostServices, PluginRecord};

// ─── Dispatch report ────────────────────────────────────────────────────

/// How one handler invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum HandlerOutcome {
    Ok,
    Error(String),
    Timeout,
    Panic,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerReport {
    pub plugin: String,
    pub outcome: HandlerOutcome,
    pub elapsed_ms: u64,
}

/// Result of fanning a hook out to its subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub hook: String,
    /// False when the host was not yet initialized and nothing ran.
    pub dispatched: bool,
    pub handlers: Vec<HandlerReport>,
}

impl DispatchReport {
    fn skipped(hook: &str) -> Self {
        Self {
            hook: hook.to_string(),
            dispatched: false,
            handlers: Vec::new(),
        }
    }

    pub fn invoked(&self) -> usize {
        self.handlers.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &HandlerReport> {
        self.handlers
            .iter()
            .filter(|h| h.outcome != HandlerOutcome::Ok)
    }

    pub fn all_ok(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Sidebar contribution of one enabled plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSidebar {
    pub plugin: String,
    pub sections: Vec<SidebarSection>,
}

// ─── Host ───────────────────────────────────────────────────────────────

pub struct RuntimeHost {
    config: RuntimeConfig,
    services: HostServices,
    cipher: ConfigCipher,
    queue: Arc<JobQueue>,
    slots: Arc<SlotRegistry>,
    registry: PluginRegistry,
}

impl RuntimeHost {
    pub fn new(config: RuntimeConfig, services: HostServices) -> Result<Self, PluginError> {
        let cipher = ConfigCipher::new(&config.config_secret)?;
        let queue = Arc::new(
            JobQueue::new(config.max_job_payload_bytes)
                .with_retention(config.max_finished_jobs, config.finished_job_ttl()),
        );
        let slots = Arc::new(SlotRegistry::new());
        let registry = PluginRegistry::new(services.clone(), queue.clone(), slots.clone());

        Ok(Self {
            config,
            services,
            cipher,
            queue,
            slots,
            registry,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    pub fn cipher(&self) -> &ConfigCipher {
        &self.cipher
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn slots(&self) -> &Arc<SlotRegistry> {
        &self.slots
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// A worker for this host's queue with the built-in handlers registered.
    pub fn job_worker(&self) -> Result<JobWorker, PluginError> {
        let mut worker = JobWorker::new(self.queue.clone(), &self.config);
        worker.register(Arc::new(AiReviewHandler::new(
            self.services.submissions.clone(),
            self.config.provider_timeout(),
        )?));
        Ok(worker)
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register a plugin from its persistent record.
    ///
    /// The stored config is decrypted and completed with schema defaults.
    /// An enabled record is validated and goes through `on_enable`; if that
    /// fails the plugin stays registered but disabled.
    pub async fn register_plugin(
        &self,
        plugin: Arc<dyn Plugin>,
        manifest: PluginManifest,
        record: &PluginRecord,
    ) -> Result<Arc<LoadedPlugin>, PluginError> {
        let name = manifest.name.clone();
        let schema = manifest.config_schema.as_ref();
        let password_fields = get_password_fields(schema);

        let decrypted = self
            .cipher
            .decrypt_config_fields(&record.config, &password_fields)?;
        let config = apply_defaults(schema, &decrypted);
        if record.enabled {
            validate_config(&name, schema, &config)?;
        }

        let permissions = PermissionSet::grant(&manifest.permissions, &record.approved_permissions);
        let components = manifest.components.clone();

        let loaded = self
            .registry
            .register(PluginRegistration {
                plugin,
                manifest,
                db_id: record.id,
                config,
                permissions,
                enabled: false,
            })
            .await;

        for decl in components {
            let accepted = self
                .slots
                .register(SlotRegistration {
                    slot: decl.slot.as_str().to_string(),
                    plugin_name: name.clone(),
                    component: decl.component.clone(),
                    order: decl.order,
                    context: loaded.context.clone(),
                })
                .await;
            if !accepted {
                tracing::warn!(plugin = %name, slot = %decl.slot, "component not registered");
            }
        }

        if record.enabled && !self.registry.enable(&name).await {
            tracing::warn!(plugin = %name, "plugin registered but could not be enabled");
        }
        Ok(loaded)
    }

    pub async fn unregister_plugin(&self, name: &str) -> bool {
        self.registry.unregister(name).await
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Enable a plugin and persist the flag. `Ok(false)` when the plugin is
    /// unknown or its `on_enable` failed. If the flag cannot be persisted
    /// the plugin is disabled again and the store error is returned.
    pub async fn enable_plugin(&self, name: &str) -> Result<bool, PluginError> {
        let Some(loaded) = self.registry.get(name).await else {
            return Ok(false);
        };
        let config = loaded.context.config().await;
        validate_config(name, loaded.manifest.config_schema.as_ref(), &config)?;

        if !self.registry.enable(name).await {
            return Ok(false);
        }
        if let Err(e) = self
            .services
            .plugin_records
            .set_enabled(loaded.db_id, true)
            .await
        {
            tracing::error!(plugin = %name, "failed to persist enabled flag, rolling back: {e}");
            self.registry.disable(name).await;
            return Err(e);
        }
        Ok(true)
    }

    /// Disable a plugin and persist the flag. `Ok(false)` only when unknown.
    ///
    /// The in-memory disable always stands; a store failure is logged.
    pub async fn disable_plugin(&self, name: &str) -> Result<bool, PluginError> {
        let Some(loaded) = self.registry.get(name).await else {
            return Ok(false);
        };
        if !self.registry.disable(name).await {
            return Ok(false);
        }
        if let Err(e) = self
            .services
            .plugin_records
            .set_enabled(loaded.db_id, false)
            .await
        {
            tracing::error!(plugin = %name, "failed to persist disabled flag: {e}");
        }
        Ok(true)
    }

    // ── Config ──────────────────────────────────────────────────────

    /// Apply an admin-submitted config. Returns the stored config masked.
    pub async fn update_plugin_config(
        &self,
        name: &str,
        submitted: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError> {
        let loaded = self.loaded(name).await?;
        let record = self.record(name).await?;
        let schema = loaded.manifest.config_schema.as_ref();
        let password_fields = get_password_fields(schema);

        let stored =
            self.cipher
                .encrypt_config_fields(&submitted, Some(&record.config), &password_fields)?;
        let decrypted = self.cipher.decrypt_config_fields(&stored, &password_fields)?;
        let effective = apply_defaults(schema, &decrypted);
        validate_config(name, schema, &effective)?;

        self.services
            .plugin_records
            .update_config(record.id, stored.clone())
            .await?;
        self.registry.update_config(name, effective).await;

        tracing::info!(plugin = %name, "plugin config updated");
        Ok(mask_config_fields(&stored, &password_fields))
    }

    /// Stored config with every secret replaced by the mask placeholder.
    pub async fn masked_config(&self, name: &str) -> Result<serde_json::Value, PluginError> {
        let loaded = self.loaded(name).await?;
        let record = self.record(name).await?;
        let password_fields = get_password_fields(loaded.manifest.config_schema.as_ref());
        Ok(mask_config_fields(&record.config, &password_fields))
    }

    async fn loaded(&self, name: &str) -> Result<Arc<LoadedPlugin>, PluginError> {
        self.registry
            .get(name)
            .await
            .ok_or_else(|| PluginError::NotFound(format!("plugin '{name}' is not registered")))
    }

    async fn record(&self, name: &str) -> Result<PluginRecord, PluginError> {
        self.services
            .plugin_records
            .find_by_name(name)
            .await?
            .ok_or_else(|| PluginError::NotFound(format!("no stored record for plugin '{name}'")))
    }

    /// Sidebar sections of every enabled plugin, ordered by plugin name.
    pub async fn admin_sidebar(&self) -> Vec<PluginSidebar> {
        self.registry
            .get_enabled_plugins()
            .await
            .into_iter()
            .filter(|p| !p.manifest.sidebar.is_empty())
            .map(|p| PluginSidebar {
                plugin: p.manifest.name.clone(),
                sections: p.manifest.sidebar.clone(),
            })
            .collect()
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Fan `hook` out to every enabled subscriber.
    ///
    /// Each handler runs in its own task bounded by the hook timeout. A
    /// failing, hanging or panicking handler is recorded and the fan-out
    /// moves on.
    pub async fn dispatch(&self, hook: &str, payload: &serde_json::Value) -> DispatchReport {
        if !self.registry.is_initialized() {
            tracing::warn!(hook = %hook, "dispatch before plugins finished loading, skipped");
            return DispatchReport::skipped(hook);
        }

        let subscribers = self.registry.get_plugins_with_hook(hook).await;
        if subscribers.is_empty() {
            tracing::debug!(hook = %hook, "no subscribers");
        }

        let payload = Arc::new(payload.clone());
        let mut handlers = Vec::with_capacity(subscribers.len());

        for loaded in subscribers {
            let name = loaded.name().to_string();
            let started = Instant::now();

            let task_hook = hook.to_string();
            let task_payload = payload.clone();
            let task_plugin = loaded.clone();
            let handle = tokio::spawn(async move {
                task_plugin
                    .plugin
                    .handle_hook(&task_hook, &task_payload, &task_plugin.context)
                    .await
            });
            let abort = handle.abort_handle();

            let outcome = match tokio::time::timeout(self.config.hook_timeout(), handle).await {
                Ok(Ok(Ok(()))) => HandlerOutcome::Ok,
                Ok(Ok(Err(e))) => {
                    tracing::error!(plugin = %name, hook = %hook, "hook handler failed: {e}");
                    HandlerOutcome::Error(e.to_string())
                }
                Ok(Err(join_err)) if join_err.is_panic() => {
                    tracing::error!(plugin = %name, hook = %hook, "hook handler panicked");
                    HandlerOutcome::Panic
                }
                Ok(Err(join_err)) => {
                    tracing::error!(plugin = %name, hook = %hook, "hook handler task failed: {join_err}");
                    HandlerOutcome::Error(join_err.to_string())
                }
                Err(_) => {
                    abort.abort();
                    tracing::error!(
                        plugin = %name,
                        hook = %hook,
                        timeout_secs = self.config.hook_timeout_secs,
                        "hook handler timed out"
                    );
                    HandlerOutcome::Timeout
                }
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(plugin = %name, hook = %hook, elapsed_ms, "hook handled");
            handlers.push(HandlerReport {
                plugin: name,
                outcome,
                elapsed_ms,
            });
        }

        DispatchReport {
            hook: hook.to_string(),
            dispatched: true,
            handlers,
        }
    }
}

impl std::fmt::Debug for RuntimeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHost")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
