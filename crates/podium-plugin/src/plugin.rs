//! The trait every compiled-in plugin implements.

use async_trait::async_trait;

use crate::context::PluginContext;
use crate::error::PluginError;

/// Lifecycle and hook callbacks for one plugin.
///
/// Only hooks the manifest declares are ever delivered to `handle_hook`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called when the plugin transitions to enabled. An error keeps it disabled.
    async fn on_enable(&self, _ctx: &PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when the plugin transitions to disabled. Errors are logged only.
    async fn on_disable(&self, _ctx: &PluginContext) -> Result<(), PluginError> {
        Ok(())
    }

    async fn handle_hook(
        &self,
        hook: &str,
        payload: &serde_json::Value,
        ctx: &PluginContext,
    ) -> Result<(), PluginError>;
}

#[cfg(test)]
pub(crate) mod test_plugins {
    //! Scriptable plugin used across the runtime's unit tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub enum HookBehavior {
        #[default]
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
    }

    #[derive(Debug, Default)]
    pub struct ScriptedPlugin {
        pub hook: HookBehavior,
        pub fail_enable: bool,
        pub fail_disable: bool,
        pub hook_calls: AtomicUsize,
        pub enable_calls: AtomicUsize,
        pub disable_calls: AtomicUsize,
    }

    impl ScriptedPlugin {
        pub fn with_hook(hook: HookBehavior) -> Self {
            Self {
                hook,
                ..Self::default()
            }
        }

        pub fn hook_calls(&self) -> usize {
            self.hook_calls.load(Ordering::SeqCst)
        }

        pub fn enable_calls(&self) -> usize {
            self.enable_calls.load(Ordering::SeqCst)
        }

        pub fn disable_calls(&self) -> usize {
            self.disable_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Plugin for ScriptedPlugin {
        async fn on_enable(&self, ctx: &PluginContext) -> Result<(), PluginError> {
            self.enable_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_enable {
                return Err(PluginError::Lifecycle {
                    plugin: ctx.plugin_name().to_string(),
                    message: "startup failed".into(),
                });
            }
            Ok(())
        }

        async fn on_disable(&self, ctx: &PluginContext) -> Result<(), PluginError> {
            self.disable_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_disable {
                return Err(PluginError::Lifecycle {
                    plugin: ctx.plugin_name().to_string(),
                    message: "shutdown failed".into(),
                });
            }
            Ok(())
        }

        async fn handle_hook(
            &self,
            hook: &str,
            _payload: &serde_json::Value,
            _ctx: &PluginContext,
        ) -> Result<(), PluginError> {
            self.hook_calls.fetch_add(1, Ordering::SeqCst);
            match self.hook {
                HookBehavior::Succeed => Ok(()),
                HookBehavior::Fail => Err(PluginError::Handler(format!("cannot handle {hook}"))),
                HookBehavior::Panic => panic!("handler exploded"),
                HookBehavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        }
    }

    /// A valid manifest JSON for `name` declaring `hooks`.
    pub fn manifest(name: &str, hooks: &[&str], permissions: &[&str]) -> crate::manifest::PluginManifest {
        let json = serde_json::json!({
            "name": name,
            "displayName": name,
            "version": "1.0.0",
            "apiVersion": "1.0",
            "permissions": permissions,
            "hooks": hooks,
        });
        match crate::manifest::PluginManifest::from_json_str(&json.to_string()) {
            Ok(manifest) => manifest,
            Err(e) => panic!("test manifest for {name} is invalid: {e}"),
        }
    }
}
