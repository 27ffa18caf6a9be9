//! Plugin runtime error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("invalid manifest for '{plugin}': {}", .issues.join("; "))]
    InvalidManifest { plugin: String, issues: Vec<String> },

    #[error("invalid config for '{plugin}': {}", .issues.join("; "))]
    InvalidConfig { plugin: String, issues: Vec<String> },

    #[error("permission denied: plugin '{plugin}' lacks '{permission}'")]
    PermissionDenied { plugin: String, permission: String },

    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("lifecycle error in plugin '{plugin}': {message}")]
    Lifecycle { plugin: String, message: String },

    #[error("hook handler error: {0}")]
    Handler(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("email error: {0}")]
    Email(String),

    #[error("config encryption error: {0}")]
    Crypto(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider error (retryable): {0}")]
    ProviderUnavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("runtime config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl PluginError {
    /// Shorthand for a permission failure attributed to `plugin`.
    pub fn permission_denied(plugin: &str, permission: impl std::fmt::Display) -> Self {
        Self::PermissionDenied {
            plugin: plugin.to_string(),
            permission: permission.to_string(),
        }
    }

    /// Whether a job that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Http(_) | Self::ProviderUnavailable(_) | Self::Io(_)
        )
    }

    /// Whether this is a permission failure.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    // ── Display messages ──────────────────────────────────────────────

    #[test]
    fn test_display_invalid_manifest_lists_all_issues() {
        let err = PluginError::InvalidManifest {
            plugin: "ai-reviewer".into(),
            issues: vec!["bad version".into(), "unknown hook 'x'".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid manifest for 'ai-reviewer': bad version; unknown hook 'x'"
        );
    }

    #[test]
    fn test_display_permission_denied() {
        let err = PluginError::permission_denied("ai-reviewer", "reviews:write");
        assert_eq!(
            err.to_string(),
            "permission denied: plugin 'ai-reviewer' lacks 'reviews:write'"
        );
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_display_not_found() {
        let err = PluginError::NotFound("my-plugin".into());
        assert_eq!(err.to_string(), "plugin not found: my-plugin");
    }

    #[test]
    fn test_display_lifecycle() {
        let err = PluginError::Lifecycle {
            plugin: "p".into(),
            message: "on_enable failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "lifecycle error in plugin 'p': on_enable failed"
        );
    }

    #[test]
    fn test_display_provider() {
        let err = PluginError::Provider("401 invalid api key".into());
        assert_eq!(err.to_string(), "provider error: 401 invalid api key");
    }

    #[test]
    fn test_display_invalid_config() {
        let err = PluginError::InvalidConfig {
            plugin: "p".into(),
            issues: vec!["model: required".into()],
        };
        assert_eq!(err.to_string(), "invalid config for 'p': model: required");
    }

    // ── Retry classification ──────────────────────────────────────────

    #[test]
    fn test_retryable_variants() {
        assert!(PluginError::Timeout("job".into()).is_retryable());
        assert!(PluginError::Http("connection reset".into()).is_retryable());
        assert!(PluginError::ProviderUnavailable("503".into()).is_retryable());
        assert!(!PluginError::Provider("400".into()).is_retryable());
        assert!(!PluginError::permission_denied("p", "jobs:write").is_retryable());
        assert!(!PluginError::InvalidJob("empty type".into()).is_retryable());
    }

    // ── From conversions ──────────────────────────────────────────────

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err: PluginError = io_err.into();
        assert!(matches!(err, PluginError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("bad json{{{").unwrap_err();
        let err: PluginError = json_err.into();
        assert!(matches!(err, PluginError::Serialization(_)));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= bad").unwrap_err();
        let err: PluginError = toml_err.into();
        assert!(matches!(err, PluginError::TomlParse(_)));
    }

    #[test]
    fn test_from_semver_error() {
        let sv_err = "not.a.version".parse::<semver::Version>().unwrap_err();
        let err: PluginError = sv_err.into();
        assert!(matches!(err, PluginError::Semver(_)));
    }

    // ── Error trait source chain ──────────────────────────────────────

    #[test]
    fn test_error_source_io() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broken");
        let err: PluginError = io_err.into();
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_source_string_variants() {
        use std::error::Error;
        let err = PluginError::Storage("bucket missing".into());
        assert!(err.source().is_none());
    }
}
