//! Runtime configuration for the plugin host.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::PluginError;

// ─── Configuration ──────────────────────────────────────────────────────

/// Settings for the plugin runtime.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Secret the config-encryption key is derived from.
    pub config_secret: String,
    /// Directory scanned for `<name>/plugin.{json,toml}` manifests (default: `./plugins`).
    pub plugin_dir: PathBuf,
    /// Upper bound for a single hook handler (default: 30).
    pub hook_timeout_secs: u64,
    /// How often the job worker polls when it was not notified (default: 1000).
    pub job_poll_interval_ms: u64,
    /// Upper bound for a single job run (default: 120).
    pub job_timeout_secs: u64,
    /// Attempts before a retryable job failure becomes final (default: 3).
    pub job_max_attempts: u32,
    /// Upper bound for one LLM provider request (default: 60).
    pub provider_timeout_secs: u64,
    /// Largest accepted serialized job payload (default: 256 KiB).
    pub max_job_payload_bytes: usize,
    /// Finished jobs kept readable before the oldest are dropped (default: 1000).
    pub max_finished_jobs: usize,
    /// Age after which a finished job is dropped (default: 3600).
    pub finished_job_ttl_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_secret: String::new(),
            plugin_dir: PathBuf::from("./plugins"),
            hook_timeout_secs: 30,
            job_poll_interval_ms: 1000,
            job_timeout_secs: 120,
            job_max_attempts: 3,
            provider_timeout_secs: 60,
            max_job_payload_bytes: 256 * 1024,
            max_finished_jobs: 1000,
            finished_job_ttl_secs: 3600,
        }
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("config_secret", &"[redacted]")
            .field("plugin_dir", &self.plugin_dir)
            .field("hook_timeout_secs", &self.hook_timeout_secs)
            .field("job_poll_interval_ms", &self.job_poll_interval_ms)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("job_max_attempts", &self.job_max_attempts)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("max_job_payload_bytes", &self.max_job_payload_bytes)
            .field("max_finished_jobs", &self.max_finished_jobs)
            .field("finished_job_ttl_secs", &self.finished_job_ttl_secs)
            .finish()
    }
}

impl RuntimeConfig {
    /// Build config from environment variables.
    ///
    /// `PLUGIN_CONFIG_SECRET` (or `JWT_SECRET`) is required; everything else
    /// falls back to its default when unset or unparseable.
    pub fn from_env() -> Result<Self, PluginError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PluginError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config_secret = lookup("PLUGIN_CONFIG_SECRET")
            .filter(|s| !s.is_empty())
            .or_else(|| lookup("JWT_SECRET").filter(|s| !s.is_empty()))
            .ok_or_else(|| {
                PluginError::Config(
                    "PLUGIN_CONFIG_SECRET (or JWT_SECRET) must be set".to_string(),
                )
            })?;

        Ok(Self {
            config_secret,
            plugin_dir: lookup("PLUGIN_DIR")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.plugin_dir),
            hook_timeout_secs: lookup("PLUGIN_HOOK_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.hook_timeout_secs),
            job_poll_interval_ms: lookup("PLUGIN_JOB_POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.job_poll_interval_ms),
            job_timeout_secs: lookup("PLUGIN_JOB_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.job_timeout_secs),
            job_max_attempts: lookup("PLUGIN_JOB_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.job_max_attempts),
            provider_timeout_secs: lookup("PLUGIN_PROVIDER_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.provider_timeout_secs),
            max_job_payload_bytes: lookup("PLUGIN_MAX_JOB_PAYLOAD_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_job_payload_bytes),
            max_finished_jobs: lookup("PLUGIN_MAX_FINISHED_JOBS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_finished_jobs),
            finished_job_ttl_secs: lookup("PLUGIN_FINISHED_JOB_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.finished_job_ttl_secs),
        })
    }

    /// Config for tests and local development with the given secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            config_secret: secret.into(),
            ..Self::default()
        }
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn finished_job_ttl(&self) -> Duration {
        Duration::from_secs(self.finished_job_ttl_secs)
    }
}
