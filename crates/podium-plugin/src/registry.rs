//! Plugin registry: loaded plugins, the hook index and lifecycle transitions.
//!
//! The registry owns every `LoadedPlugin` and the `hook → plugin names`
//! index used by dispatch. It never calls hook handlers itself; the host
//! takes a snapshot from [`PluginRegistry::get_plugins_with_hook`] and
//! fans out from there.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::capabilities::{CapabilityScope, CapabilitySet};
use crate::context::PluginContext;
use crate::jobs::JobQueue;
use crate::manifest::PluginManifest;
use crate::permissions::PermissionSet;
use crate::plugin::Plugin;
use crate::slots::SlotRegistry;
use crate::store::HostServices;

// ─── Loaded plugin entry ────────────────────────────────────────────────

/// A registered plugin with its bound context.
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub db_id: Uuid,
    pub plugin: Arc<dyn Plugin>,
    pub context: Arc<PluginContext>,
    enabled: AtomicBool,
}

impl LoadedPlugin {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("db_id", &self.db_id)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

/// Input to [`PluginRegistry::register`].
pub struct PluginRegistration {
    pub plugin: Arc<dyn Plugin>,
    pub manifest: PluginManifest,
    pub db_id: Uuid,
    /// Decrypted config handed to the plugin's context.
    pub config: serde_json::Value,
    /// Permissions actually granted (declared ∩ approved).
    pub permissions: PermissionSet,
    pub enabled: bool,
}

#[derive(Default)]
struct RegistryState {
    plugins: BTreeMap<String, Arc<LoadedPlugin>>,
    /// Hook name → registered plugin names, in registration order.
    hooks: HashMap<String, Vec<String>>,
}

impl RegistryState {
    fn remove_hook_rows(&mut self, name: &str) {
        for names in self.hooks.values_mut() {
            names.retain(|n| n != name);
        }
        self.hooks.retain(|_, names| !names.is_empty());
    }
}

// ─── Registry ───────────────────────────────────────────────────────────

pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    /// Serializes enable/disable so callbacks never interleave.
    lifecycle: Mutex<()>,
    initialized: AtomicBool,
    services: HostServices,
    queue: Arc<JobQueue>,
    slots: Arc<SlotRegistry>,
}

impl PluginRegistry {
    pub fn new(services: HostServices, queue: Arc<JobQueue>, slots: Arc<SlotRegistry>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            lifecycle: Mutex::new(()),
            initialized: AtomicBool::new(false),
            services,
            queue,
            slots,
        }
    }

    /// Build the plugin's context and store it under its manifest name.
    ///
    /// A previous registration with the same name is replaced along with its
    /// hook rows and slot components.
    pub async fn register(&self, registration: PluginRegistration) -> Arc<LoadedPlugin> {
        let PluginRegistration {
            plugin,
            manifest,
            db_id,
            config,
            permissions,
            enabled,
        } = registration;
        let name = manifest.name.clone();

        let scope = CapabilityScope::new(&name, db_id, permissions.clone());
        let capabilities = CapabilitySet::build(&scope, &self.services, &self.queue);
        let context = Arc::new(PluginContext::new(
            &name,
            db_id,
            permissions,
            config,
            capabilities,
        ));

        let loaded = Arc::new(LoadedPlugin {
            manifest,
            db_id,
            plugin,
            context,
            enabled: AtomicBool::new(enabled),
        });

        let replaced = {
            let mut state = self.state.write().await;
            let replaced = state.plugins.insert(name.clone(), loaded.clone()).is_some();
            state.remove_hook_rows(&name);
            for hook in &loaded.manifest.hooks {
                state.hooks.entry(hook.clone()).or_default().push(name.clone());
            }
            // Slots are purged under the registry lock so no reader sees
            // components of the replaced instance.
            if replaced {
                self.slots.unregister_plugin(&name).await;
            }
            replaced
        };

        tracing::info!(
            plugin = %name,
            version = %loaded.manifest.version,
            hooks = loaded.manifest.hooks.len(),
            enabled,
            replaced,
            "plugin registered"
        );
        loaded
    }

    /// Remove a plugin, its hook rows and its slot components.
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.plugins.remove(name).is_some();
            if removed {
                state.remove_hook_rows(name);
                self.slots.unregister_plugin(name).await;
            }
            removed
        };
        if removed {
            tracing::info!(plugin = %name, "plugin unregistered");
        }
        removed
    }

    pub async fn get(&self, name: &str) -> Option<Arc<LoadedPlugin>> {
        self.state.read().await.plugins.get(name).cloned()
    }

    /// All plugins, ordered by name.
    pub async fn get_all(&self) -> Vec<Arc<LoadedPlugin>> {
        self.state.read().await.plugins.values().cloned().collect()
    }

    pub async fn get_enabled_plugins(&self) -> Vec<Arc<LoadedPlugin>> {
        self.state
            .read()
            .await
            .plugins
            .values()
            .filter(|p| p.is_enabled())
            .cloned()
            .collect()
    }

    /// Enabled plugins declaring `hook`, in registration order.
    ///
    /// The returned list is a copy; registry changes during a dispatch do
    /// not affect it.
    pub async fn get_plugins_with_hook(&self, hook: &str) -> Vec<Arc<LoadedPlugin>> {
        let state = self.state.read().await;
        let Some(names) = state.hooks.get(hook) else {
            return Vec::new();
        };
        names
            .iter()
            .filter_map(|name| state.plugins.get(name))
            .filter(|p| p.is_enabled())
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.plugins.len()
    }

    /// Drop every plugin and every slot component.
    pub async fn clear(&self) {
        {
            let mut state = self.state.write().await;
            state.plugins.clear();
            state.hooks.clear();
        }
        self.slots.clear().await;
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Enable a plugin. Returns false when it is unknown or `on_enable`
    /// fails, in which case it stays disabled.
    pub async fn enable(&self, name: &str) -> bool {
        let _guard = self.lifecycle.lock().await;
        let Some(loaded) = self.get(name).await else {
            return false;
        };
        if loaded.is_enabled() {
            return true;
        }

        match loaded.plugin.on_enable(&loaded.context).await {
            Ok(()) => {
                loaded.enabled.store(true, Ordering::SeqCst);
                tracing::info!(plugin = %name, "plugin enabled");
                true
            }
            Err(e) => {
                loaded.enabled.store(false, Ordering::SeqCst);
                tracing::error!(plugin = %name, "on_enable failed, plugin left disabled: {e}");
                false
            }
        }
    }

    /// Disable a plugin. Always completes for a known plugin, even when
    /// `on_disable` fails.
    pub async fn disable(&self, name: &str) -> bool {
        let _guard = self.lifecycle.lock().await;
        let Some(loaded) = self.get(name).await else {
            return false;
        };
        let was_enabled = loaded.enabled.swap(false, Ordering::SeqCst);
        if !was_enabled {
            return true;
        }

        if let Err(e) = loaded.plugin.on_disable(&loaded.context).await {
            tracing::warn!(plugin = %name, "on_disable failed, plugin disabled anyway: {e}");
        }
        tracing::info!(plugin = %name, "plugin disabled");
        true
    }

    /// Replace the plugin's config wholesale.
    pub async fn update_config(&self, name: &str, config: serde_json::Value) -> bool {
        let Some(loaded) = self.get(name).await else {
            return false;
        };
        loaded.context.replace_config(config).await;
        tracing::debug!(plugin = %name, "plugin config replaced");
        true
    }

    // ── Initialization flag ─────────────────────────────────────────

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{REVIEW_CREATED, SUBMISSION_CREATED};
    use crate::memory::MemoryServices;
    use crate::permissions::Permission;
    use crate::plugin::test_plugins::{manifest, ScriptedPlugin};
    use crate::slots::SlotRegistration;
    use serde_json::json;

    fn registry() -> (PluginRegistry, Arc<SlotRegistry>) {
        let slots = Arc::new(SlotRegistry::new());
        let registry = PluginRegistry::new(
            MemoryServices::new().host_services(),
            Arc::new(JobQueue::new(1024)),
            slots.clone(),
        );
        (registry, slots)
    }

    fn registration(
        plugin: Arc<ScriptedPlugin>,
        name: &str,
        hooks: &[&str],
        enabled: bool,
    ) -> PluginRegistration {
        PluginRegistration {
            plugin,
            manifest: manifest(name, hooks, &["submissions:read"]),
            db_id: Uuid::new_v4(),
            config: json!({}),
            permissions: [Permission::SubmissionsRead].into_iter().collect(),
            enabled,
        }
    }

    fn scripted() -> Arc<ScriptedPlugin> {
        Arc::new(ScriptedPlugin::default())
    }

    // ── Registration and index ──────────────────────────────────────

    #[tokio::test]
    async fn test_register_indexes_hooks() {
        let (registry, _) = registry();
        registry
            .register(registration(scripted(), "a", &[SUBMISSION_CREATED], true))
            .await;
        registry
            .register(registration(scripted(), "b", &[SUBMISSION_CREATED, REVIEW_CREATED], true))
            .await;

        let names: Vec<String> = registry
            .get_plugins_with_hook(SUBMISSION_CREATED)
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.get_plugins_with_hook(REVIEW_CREATED).await.len(), 1);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_disabled_plugins_not_in_hook_lookup() {
        let (registry, _) = registry();
        registry
            .register(registration(scripted(), "a", &[SUBMISSION_CREATED], false))
            .await;
        assert!(registry.get_plugins_with_hook(SUBMISSION_CREATED).await.is_empty());
        assert!(registry.get_enabled_plugins().await.is_empty());
        assert_eq!(registry.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reregister_replaces_hook_rows() {
        let (registry, _) = registry();
        registry
            .register(registration(scripted(), "a", &[SUBMISSION_CREATED], true))
            .await;
        registry
            .register(registration(scripted(), "a", &[REVIEW_CREATED], true))
            .await;

        assert_eq!(registry.count().await, 1);
        assert!(registry.get_plugins_with_hook(SUBMISSION_CREATED).await.is_empty());
        assert_eq!(registry.get_plugins_with_hook(REVIEW_CREATED).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reregister_drops_stale_slot_components() {
        let (registry, slots) = registry();
        let first = registry
            .register(registration(scripted(), "a", &[], true))
            .await;
        slots
            .register(SlotRegistration {
                slot: "submission-review-panel".into(),
                plugin_name: "a".into(),
                component: "panel".into(),
                order: 1,
                context: first.context.clone(),
            })
            .await;

        registry
            .register(registration(scripted(), "a", &[], true))
            .await;
        assert_eq!(slots.total_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_removes_every_row() {
        let (registry, slots) = registry();
        let loaded = registry
            .register(registration(scripted(), "a", &[SUBMISSION_CREATED, REVIEW_CREATED], true))
            .await;
        slots
            .register(SlotRegistration {
                slot: "admin-dashboard-widgets".into(),
                plugin_name: "a".into(),
                component: "w".into(),
                order: 1,
                context: loaded.context.clone(),
            })
            .await;

        assert!(registry.unregister("a").await);
        assert!(!registry.unregister("a").await);
        assert!(registry.get("a").await.is_none());
        assert!(registry.get_plugins_with_hook(SUBMISSION_CREATED).await.is_empty());
        assert!(registry.get_plugins_with_hook(REVIEW_CREATED).await.is_empty());
        assert_eq!(slots.total_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unregistered_plugin_never_leaves_components_behind() {
        let (registry, slots) = registry();
        let registry = Arc::new(registry);
        let loaded = registry
            .register(registration(scripted(), "a", &[], true))
            .await;
        slots
            .register(SlotRegistration {
                slot: "admin-dashboard-widgets".into(),
                plugin_name: "a".into(),
                component: "w".into(),
                order: 1,
                context: loaded.context.clone(),
            })
            .await;

        let reader = {
            let registry = registry.clone();
            let slots = slots.clone();
            tokio::spawn(async move {
                loop {
                    if registry.get("a").await.is_none() {
                        assert_eq!(slots.total_count().await, 0);
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        assert!(registry.unregister("a").await);
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_survives_unregister() {
        let (registry, _) = registry();
        registry
            .register(registration(scripted(), "a", &[SUBMISSION_CREATED], true))
            .await;
        let snapshot = registry.get_plugins_with_hook(SUBMISSION_CREATED).await;
        registry.unregister("a").await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name(), "a");
    }

    #[tokio::test]
    async fn test_context_carries_granted_capabilities() {
        let (registry, _) = registry();
        let loaded = registry
            .register(registration(scripted(), "a", &[], true))
            .await;
        assert!(loaded.context.submissions().is_ok());
        assert!(loaded.context.reviews().unwrap_err().is_permission_denied());
        assert_eq!(loaded.context.db_id(), loaded.db_id);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let (registry, slots) = registry();
        let loaded = registry
            .register(registration(scripted(), "a", &[SUBMISSION_CREATED], true))
            .await;
        slots
            .register(SlotRegistration {
                slot: "review-form-extra".into(),
                plugin_name: "a".into(),
                component: "c".into(),
                order: 0,
                context: loaded.context.clone(),
            })
            .await;
        registry.clear().await;
        assert_eq!(registry.count().await, 0);
        assert!(registry.get_plugins_with_hook(SUBMISSION_CREATED).await.is_empty());
        assert_eq!(slots.total_count().await, 0);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_enable_calls_on_enable() {
        let (registry, _) = registry();
        let plugin = scripted();
        registry
            .register(registration(plugin.clone(), "a", &[SUBMISSION_CREATED], false))
            .await;

        assert!(registry.enable("a").await);
        assert!(registry.get("a").await.unwrap().is_enabled());
        assert_eq!(plugin.enable_calls(), 1);

        // Second enable is a no-op.
        assert!(registry.enable("a").await);
        assert_eq!(plugin.enable_calls(), 1);
        assert_eq!(registry.get_plugins_with_hook(SUBMISSION_CREATED).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_enable_stays_disabled() {
        let (registry, _) = registry();
        let plugin = Arc::new(ScriptedPlugin {
            fail_enable: true,
            ..ScriptedPlugin::default()
        });
        registry
            .register(registration(plugin.clone(), "a", &[SUBMISSION_CREATED], false))
            .await;

        assert!(!registry.enable("a").await);
        assert!(!registry.get("a").await.unwrap().is_enabled());
        assert!(registry.get_plugins_with_hook(SUBMISSION_CREATED).await.is_empty());

        // Retrying does not leave it in a worse state.
        assert!(!registry.enable("a").await);
        assert!(!registry.get("a").await.unwrap().is_enabled());
        assert_eq!(plugin.enable_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_disable_still_disables() {
        let (registry, _) = registry();
        let plugin = Arc::new(ScriptedPlugin {
            fail_disable: true,
            ..ScriptedPlugin::default()
        });
        registry
            .register(registration(plugin.clone(), "a", &[SUBMISSION_CREATED], true))
            .await;

        assert!(registry.disable("a").await);
        assert!(!registry.get("a").await.unwrap().is_enabled());
        assert_eq!(plugin.disable_calls(), 1);
        assert!(registry.get_plugins_with_hook(SUBMISSION_CREATED).await.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_on_unknown_name() {
        let (registry, _) = registry();
        assert!(!registry.enable("ghost").await);
        assert!(!registry.disable("ghost").await);
        assert!(!registry.update_config("ghost", json!({})).await);
    }

    // ── Config and initialization ───────────────────────────────────

    #[tokio::test]
    async fn test_update_config_replaces_wholesale() {
        let (registry, _) = registry();
        let mut reg = registration(scripted(), "a", &[], true);
        reg.config = json!({ "model": "gpt-4o", "threshold": 7 });
        let loaded = registry.register(reg).await;

        assert!(registry.update_config("a", json!({ "model": "claude" })).await);
        let config = loaded.context.config().await;
        assert_eq!(config["model"], "claude");
        assert!(config.get("threshold").is_none());
    }

    #[test]
    fn test_initialized_flag() {
        let (registry, _) = registry();
        assert!(!registry.is_initialized());
        registry.set_initialized(true);
        assert!(registry.is_initialized());
        registry.set_initialized(false);
        assert!(!registry.is_initialized());
    }
}
