//! Boot-time plugin loading.
//!
//! Plugins are compiled into the host; the catalog pairs each
//! implementation with its manifest. Loading is best-effort per plugin: a
//! bad manifest or a stored config that no longer decrypts skips that one
//! plugin and the rest still load.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::PluginError;
use crate::host::RuntimeHost;
use crate::manifest::PluginManifest;
use crate::plugin::Plugin;

/// Manifest file names looked up in each plugin directory, in order.
const MANIFEST_FILES: &[&str] = &["plugin.json", "plugin.toml"];

// ─── Catalog ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ManifestSource {
    Json(String),
    Toml(String),
    Path(PathBuf),
}

impl ManifestSource {
    async fn parse(&self) -> Result<PluginManifest, PluginError> {
        match self {
            Self::Json(json) => PluginManifest::from_json_str(json),
            Self::Toml(toml) => PluginManifest::from_toml_str(toml),
            Self::Path(path) => PluginManifest::load(path).await,
        }
    }
}

/// One compiled-in plugin and where its manifest comes from.
pub struct CatalogEntry {
    pub plugin: Arc<dyn Plugin>,
    pub source: ManifestSource,
    /// Name the manifest must declare, when known up front.
    pub expected_name: Option<String>,
}

impl CatalogEntry {
    fn label(&self, index: usize) -> String {
        match (&self.expected_name, &self.source) {
            (Some(name), _) => name.clone(),
            (None, ManifestSource::Path(path)) => path.display().to_string(),
            (None, _) => format!("catalog entry #{index}"),
        }
    }
}

#[derive(Default)]
pub struct PluginCatalog {
    entries: Vec<CatalogEntry>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: CatalogEntry) {
        self.entries.push(entry);
    }

    pub fn with_json(mut self, plugin: Arc<dyn Plugin>, manifest: impl Into<String>) -> Self {
        self.push(CatalogEntry {
            plugin,
            source: ManifestSource::Json(manifest.into()),
            expected_name: None,
        });
        self
    }

    pub fn with_toml(mut self, plugin: Arc<dyn Plugin>, manifest: impl Into<String>) -> Self {
        self.push(CatalogEntry {
            plugin,
            source: ManifestSource::Toml(manifest.into()),
            expected_name: None,
        });
        self
    }

    pub fn with_path(mut self, plugin: Arc<dyn Plugin>, path: impl Into<PathBuf>) -> Self {
        self.push(CatalogEntry {
            plugin,
            source: ManifestSource::Path(path.into()),
            expected_name: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discover `<dir>/<name>/plugin.{json,toml}` and pair each with the
    /// implementation registered under `<name>`.
    ///
    /// A missing directory yields an empty catalog. Manifests without an
    /// implementation, and implementations without a manifest, are logged
    /// and left out.
    pub async fn scan_dir(
        dir: &Path,
        mut implementations: HashMap<String, Arc<dyn Plugin>>,
    ) -> Result<Self, PluginError> {
        let mut catalog = Self::new();
        if !tokio::fs::try_exists(dir).await? {
            tracing::warn!(dir = %dir.display(), "plugin directory does not exist");
            return Ok(catalog);
        }

        let mut found: Vec<(String, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mut manifest_path = None;
            for file in MANIFEST_FILES {
                let candidate = entry.path().join(file);
                if tokio::fs::try_exists(&candidate).await? {
                    manifest_path = Some(candidate);
                    break;
                }
            }
            match manifest_path {
                Some(path) => found.push((name, path)),
                None => tracing::debug!(dir = %entry.path().display(), "no plugin manifest, skipping"),
            }
        }
        found.sort();

        for (name, path) in found {
            match implementations.remove(&name) {
                Some(plugin) => catalog.push(CatalogEntry {
                    plugin,
                    source: ManifestSource::Path(path),
                    expected_name: Some(name),
                }),
                None => tracing::warn!(
                    plugin = %name,
                    path = %path.display(),
                    "manifest has no compiled-in implementation, skipping"
                ),
            }
        }
        for name in implementations.keys() {
            tracing::warn!(plugin = %name, "implementation has no manifest, skipping");
        }

        Ok(catalog)
    }
}

// ─── Loading ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPlugin {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedPlugin>,
}

/// Register every catalog entry, then mark the registry initialized.
pub async fn load_plugins(host: &RuntimeHost, catalog: PluginCatalog) -> LoadReport {
    let mut report = LoadReport::default();
    let mut seen = HashSet::new();

    for (index, entry) in catalog.entries.into_iter().enumerate() {
        let label = entry.label(index);
        match load_one(host, entry, &mut seen).await {
            Ok(name) => report.loaded.push(name),
            Err((name, e)) => {
                let name = name.unwrap_or(label);
                tracing::error!(plugin = %name, "failed to load plugin: {e}");
                report.skipped.push(SkippedPlugin {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    host.registry().set_initialized(true);
    tracing::info!(
        loaded = report.loaded.len(),
        skipped = report.skipped.len(),
        "plugin loading complete"
    );
    report
}

/// On failure returns the manifest name when one was parsed.
async fn load_one(
    host: &RuntimeHost,
    entry: CatalogEntry,
    seen: &mut HashSet<String>,
) -> Result<String, (Option<String>, PluginError)> {
    let manifest = entry.source.parse().await.map_err(|e| (None, e))?;
    let name = manifest.name.clone();
    let fail = |e: PluginError| (Some(name.clone()), e);

    if let Some(expected) = &entry.expected_name {
        if expected != &name {
            return Err(fail(PluginError::InvalidManifest {
                plugin: expected.clone(),
                issues: vec![format!("manifest declares name '{name}'")],
            }));
        }
    }
    if !seen.insert(name.clone()) {
        return Err(fail(PluginError::InvalidManifest {
            plugin: name.clone(),
            issues: vec!["duplicate plugin name in catalog".into()],
        }));
    }

    let records = &host.services().plugin_records;
    let version = manifest.version.to_string();
    let record = match records.find_by_name(&name).await.map_err(fail)? {
        Some(mut record) => {
            if record.version != version {
                records.set_version(record.id, &version).await.map_err(fail)?;
                tracing::info!(
                    plugin = %name,
                    from = %record.version,
                    to = %version,
                    "plugin version changed"
                );
                record.version = version.clone();
            }
            record
        }
        None => {
            let record = records.create(&name, &version).await.map_err(fail)?;
            tracing::info!(plugin = %name, version = %version, "plugin record created");
            record
        }
    };

    host.register_plugin(entry.plugin, manifest, &record)
        .await
        .map_err(fail)?;
    Ok(name)
}
