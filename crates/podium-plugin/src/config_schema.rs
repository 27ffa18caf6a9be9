//! Validation of plugin config objects against the manifest's `configSchema`.

use serde_json::Value;

use crate::error::PluginError;

/// Validate `config` against `schema`, collecting every violation.
///
/// A plugin without a schema accepts any object.
pub fn validate_config(plugin: &str, schema: Option<&Value>, config: &Value) -> Result<(), PluginError> {
    let Some(schema) = schema else {
        return if config.is_object() {
            Ok(())
        } else {
            Err(PluginError::InvalidConfig {
                plugin: plugin.to_string(),
                issues: vec!["config must be an object".to_string()],
            })
        };
    };

    let validator = jsonschema::options()
        .should_validate_formats(true)
        .build(schema)
        .map_err(|e| PluginError::InvalidConfig {
            plugin: plugin.to_string(),
            issues: vec![format!("configSchema is not a valid JSON schema: {e}")],
        })?;

    let issues: Vec<String> = validator
        .iter_errors(config)
        .map(|error| error.to_string())
        .collect();

    if issues.is_empty() {
        Ok(())
    } else {
        Err(PluginError::InvalidConfig {
            plugin: plugin.to_string(),
            issues,
        })
    }
}

/// Fill top-level properties missing from `config` with their schema `default`.
pub fn apply_defaults(schema: Option<&Value>, config: &Value) -> Value {
    let mut out = config.clone();
    let (Some(properties), Some(map)) = (
        schema
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object),
        out.as_object_mut(),
    ) else {
        return out;
    };

    for (name, prop) in properties {
        if map.contains_key(name) {
            continue;
        }
        if let Some(default) = prop.get("default") {
            map.insert(name.clone(), default.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "apiKey": { "type": "string", "format": "password" },
                "model": { "type": "string", "default": "gpt-4o-mini" },
                "threshold": { "type": "integer", "minimum": 0, "maximum": 10, "default": 5 }
            },
            "required": ["apiKey"]
        })
    }

    fn issues_of(err: PluginError) -> Vec<String> {
        match err {
            PluginError::InvalidConfig { issues, .. } => issues,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = json!({ "apiKey": "k", "threshold": 3 });
        validate_config("ai-reviewer", Some(&schema()), &config).unwrap();
    }

    #[test]
    fn test_collects_every_violation() {
        let config = json!({ "threshold": 42, "model": 7 });
        let issues = issues_of(validate_config("ai-reviewer", Some(&schema()), &config).unwrap_err());
        assert_eq!(issues.len(), 3, "issues: {issues:?}");
    }

    #[test]
    fn test_no_schema_requires_object() {
        validate_config("p", None, &json!({ "anything": true })).unwrap();
        assert!(validate_config("p", None, &json!("scalar")).is_err());
    }

    #[test]
    fn test_invalid_schema_reported() {
        let bad = json!({ "type": "not-a-type" });
        let issues = issues_of(validate_config("p", Some(&bad), &json!({})).unwrap_err());
        assert!(issues[0].contains("configSchema"));
    }

    #[test]
    fn test_apply_defaults_fills_missing_only() {
        let config = json!({ "apiKey": "k", "threshold": 1 });
        let filled = apply_defaults(Some(&schema()), &config);
        assert_eq!(filled["model"], "gpt-4o-mini");
        assert_eq!(filled["threshold"], 1);
        assert!(filled.get("apiKey").is_some());
    }

    #[test]
    fn test_apply_defaults_without_schema() {
        let config = json!({ "a": 1 });
        assert_eq!(apply_defaults(None, &config), config);
    }
}
