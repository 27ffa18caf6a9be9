//! Plugin manifest parsing and validation.
//!
//! Manifests are read as JSON (`plugin.json`) or TOML (`plugin.toml`) into a
//! loosely typed raw form, then validated into a typed [`PluginManifest`].
//! Validation collects every problem it finds so a rejected plugin reports
//! all of them at once.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::events::is_known_hook;
use crate::permissions::{Permission, PermissionSet};
use crate::slots::{UiSlot, DEFAULT_ORDER};

/// Major version of the plugin API this host implements.
pub const PLUGIN_API_MAJOR: u64 = 1;

/// Maximum number of items in one sidebar section.
pub const MAX_SIDEBAR_ITEMS: usize = 50;

const MAX_DISPLAY_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

// ─── Typed manifest ─────────────────────────────────────────────────

/// A validated plugin manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,
    pub display_name: String,
    pub version: semver::Version,
    pub api_version: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub homepage: Option<String>,
    pub permissions: PermissionSet,
    pub hooks: Vec<String>,
    pub components: Vec<ComponentDecl>,
    /// Admin sidebar contributions. Empty when the manifest had none or
    /// when the declared sidebar failed validation.
    pub sidebar: Vec<SidebarSection>,
    pub config_schema: Option<serde_json::Value>,
}

/// A UI component the plugin contributes to a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDecl {
    pub slot: UiSlot,
    pub component: String,
    pub order: i32,
}

/// A section of the admin sidebar contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarSection {
    pub title: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub items: Vec<SidebarItem>,
}

/// A single sidebar link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarItem {
    pub key: String,
    pub label: String,
    pub path: String,
    #[serde(default)]
    pub icon: Option<String>,
}

// ─── Raw (unvalidated) form ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "display_name")]
    display_name: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(default, alias = "api_version")]
    api_version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    hooks: Vec<String>,
    #[serde(default)]
    components: Vec<RawComponent>,
    #[serde(default, alias = "sidebar_items")]
    sidebar_items: Option<serde_json::Value>,
    #[serde(default, alias = "config_schema")]
    config_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    slot: String,
    component: String,
    #[serde(default)]
    order: Option<i32>,
}

// ─── Validation helpers ─────────────────────────────────────────────

/// Validate a plugin name against `^[a-z][a-z0-9-]{1,63}$`.
fn validate_plugin_name(name: &str) -> Result<(), String> {
    let len = name.len();
    if !(2..=64).contains(&len) {
        return Err(format!("name must be 2-64 characters, got {len}"));
    }

    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !first.is_ascii_lowercase() {
            return Err(format!(
                "name must start with a lowercase letter, got '{first}'"
            ));
        }
    }

    for ch in chars {
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' {
            return Err(format!("name contains invalid character '{ch}'"));
        }
    }

    Ok(())
}

/// The API major must match ours. Accepts `"1"`, `"1.0"`, `"1.2.3"`.
fn validate_api_version(value: &str) -> Result<(), String> {
    let major = value
        .split('.')
        .next()
        .and_then(|m| m.trim().parse::<u64>().ok())
        .ok_or_else(|| format!("apiVersion is not a version: '{value}'"))?;
    if major != PLUGIN_API_MAJOR {
        return Err(format!(
            "apiVersion {value} is not supported (host implements {PLUGIN_API_MAJOR}.x)"
        ));
    }
    Ok(())
}

/// Sidebar paths are absolute app routes made of `[a-z0-9/-]`.
fn is_valid_sidebar_path(path: &str) -> bool {
    path.starts_with('/')
        && path
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '/' || c == '-')
}

/// Parse and validate a raw `sidebarItems` value.
///
/// Any problem rejects the whole sidebar; callers drop it rather than keep
/// the sections that happened to be valid.
pub fn parse_sidebar(raw: &serde_json::Value) -> Result<Vec<SidebarSection>, Vec<String>> {
    let sections: Vec<SidebarSection> = serde_json::from_value(raw.clone())
        .map_err(|e| vec![format!("sidebarItems is malformed: {e}")])?;

    let mut issues = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        if section.title.trim().is_empty() {
            issues.push(format!("sidebarItems[{i}].title must not be empty"));
        }
        let count = section.items.len();
        if count == 0 || count > MAX_SIDEBAR_ITEMS {
            issues.push(format!(
                "sidebarItems[{i}] must have 1-{MAX_SIDEBAR_ITEMS} items, got {count}"
            ));
        }
        for (j, item) in section.items.iter().enumerate() {
            if item.key.trim().is_empty() {
                issues.push(format!("sidebarItems[{i}].items[{j}].key must not be empty"));
            }
            if item.label.trim().is_empty() {
                issues.push(format!(
                    "sidebarItems[{i}].items[{j}].label must not be empty"
                ));
            }
            if !is_valid_sidebar_path(&item.path) {
                issues.push(format!(
                    "sidebarItems[{i}].items[{j}].path '{}' must match ^/[a-z0-9/-]*$",
                    item.path
                ));
            }
        }
    }

    if issues.is_empty() {
        Ok(sections)
    } else {
        Err(issues)
    }
}

impl RawManifest {
    fn validate(self) -> Result<PluginManifest, PluginError> {
        let mut issues = Vec::new();

        if let Err(e) = validate_plugin_name(&self.name) {
            issues.push(e);
        }

        let display_name = match self.display_name.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() && d.chars().count() <= MAX_DISPLAY_NAME_LEN => d.to_string(),
            Some(d) if !d.is_empty() => {
                issues.push(format!(
                    "displayName must be at most {MAX_DISPLAY_NAME_LEN} characters"
                ));
                String::new()
            }
            _ => {
                issues.push("displayName is required".to_string());
                String::new()
            }
        };

        let version = match semver::Version::parse(&self.version) {
            Ok(v) => Some(v),
            Err(_) => {
                issues.push(format!("version is not valid semver: '{}'", self.version));
                None
            }
        };

        let api_version = self.api_version.unwrap_or_default();
        if let Err(e) = validate_api_version(&api_version) {
            issues.push(e);
        }

        if let Some(ref desc) = self.description {
            if desc.chars().count() > MAX_DESCRIPTION_LEN {
                issues.push(format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} characters"
                ));
            }
        }

        // ── Permissions ─────────────────────────────────────────────
        let mut permissions = PermissionSet::new();
        for raw in &self.permissions {
            match raw.parse::<Permission>() {
                Ok(p) => {
                    permissions.insert(p);
                }
                Err(e) => issues.push(e),
            }
        }

        // ── Hooks ───────────────────────────────────────────────────
        let mut hooks: Vec<String> = Vec::with_capacity(self.hooks.len());
        for hook in self.hooks {
            if !is_known_hook(&hook) {
                issues.push(format!("unknown hook '{hook}'"));
            } else if hooks.contains(&hook) {
                issues.push(format!("hook '{hook}' is declared twice"));
            } else {
                hooks.push(hook);
            }
        }

        // ── UI components ───────────────────────────────────────────
        let mut components: Vec<ComponentDecl> = Vec::with_capacity(self.components.len());
        for raw in self.components {
            let Some(slot) = UiSlot::parse(&raw.slot) else {
                issues.push(format!(
                    "unknown slot '{}'; valid slots: {}",
                    raw.slot,
                    UiSlot::names().join(", ")
                ));
                continue;
            };
            if raw.component.trim().is_empty() {
                issues.push(format!("component for slot '{slot}' must not be empty"));
                continue;
            }
            if components
                .iter()
                .any(|c| c.slot == slot && c.component == raw.component)
            {
                issues.push(format!(
                    "component '{}' is declared twice for slot '{slot}'",
                    raw.component
                ));
                continue;
            }
            components.push(ComponentDecl {
                slot,
                component: raw.component,
                order: raw.order.unwrap_or(DEFAULT_ORDER),
            });
        }

        if let Some(ref schema) = self.config_schema {
            if !schema.is_object() {
                issues.push("configSchema must be an object".to_string());
            }
        }

        let plugin_label = if self.name.is_empty() {
            "<unnamed>".to_string()
        } else {
            self.name.clone()
        };

        let version = match version {
            Some(v) if issues.is_empty() => v,
            _ => {
                return Err(PluginError::InvalidManifest {
                    plugin: plugin_label,
                    issues,
                })
            }
        };

        // The sidebar is its own unit: a bad one is dropped, the plugin still loads.
        let sidebar = match self.sidebar_items {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(ref raw) => match parse_sidebar(raw) {
                Ok(sections) => sections,
                Err(sidebar_issues) => {
                    tracing::warn!(
                        plugin = %self.name,
                        issues = ?sidebar_issues,
                        "rejecting plugin sidebar"
                    );
                    Vec::new()
                }
            },
        };

        Ok(PluginManifest {
            name: self.name,
            display_name,
            version,
            api_version,
            description: self.description,
            author: self.author,
            homepage: self.homepage,
            permissions,
            hooks,
            components,
            sidebar,
            config_schema: self.config_schema,
        })
    }
}

impl PluginManifest {
    /// Parse and validate a manifest from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, PluginError> {
        let raw: RawManifest = serde_json::from_str(json)?;
        raw.validate()
    }

    /// Parse and validate a manifest from TOML.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, PluginError> {
        let raw: RawManifest = toml::from_str(toml_str)?;
        raw.validate()
    }

    /// Read a manifest file, choosing the format by extension.
    pub async fn load(path: &Path) -> Result<Self, PluginError> {
        let content = tokio::fs::read_to_string(path).await?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn declares_hook(&self, hook: &str) -> bool {
        self.hooks.iter().any(|h| h == hook)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
