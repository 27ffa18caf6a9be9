//! Podium Plugin Runtime
//!
//! Hosts compiled-in plugins for the Podium conference/CFP application.
//! Each plugin declares a manifest (hooks, permissions, UI components,
//! config schema) and receives a `PluginContext` whose capabilities are
//! limited to what an administrator approved. The `RuntimeHost` owns the
//! plugin and slot registries, dispatches hooks and runs background jobs.

pub mod capabilities;
pub mod config_crypto;
pub mod config_schema;
pub mod context;
pub mod error;
pub mod events;
pub mod host;
pub mod jobs;
pub mod loader;
pub mod manifest;
pub mod memory;
pub mod permissions;
pub mod plugin;
pub mod registry;
pub mod settings;
pub mod slots;
pub mod store;

pub use capabilities::{CapabilityScope, CapabilitySet, UserInfo};
pub use config_crypto::{ConfigCipher, MASK_PLACEHOLDER};
pub use context::{PluginContext, PluginLogger};
pub use error::PluginError;
pub use events::{HookEvent, KNOWN_HOOKS};
pub use host::{DispatchReport, HandlerOutcome, HandlerReport, PluginSidebar, RuntimeHost};
pub use jobs::{JobFilter, JobQueue, JobStatus, JobWorker, NewJob, PluginJob};
pub use loader::{load_plugins, LoadReport, PluginCatalog};
pub use manifest::PluginManifest;
pub use permissions::{CapabilityDomain, Permission, PermissionSet};
pub use plugin::Plugin;
pub use registry::{LoadedPlugin, PluginRegistry};
pub use settings::RuntimeConfig;
pub use slots::{SlotComponent, SlotRegistry, UiSlot};
