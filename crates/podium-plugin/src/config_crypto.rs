//! Encryption of password-format plugin config fields.
//!
//! Secrets are stored as `enc:v1:<base64(nonce || ciphertext)>` using
//! AES-256-GCM with a key derived from the runtime secret via HKDF-SHA256.
//! The admin UI only ever sees [`MASK_PLACEHOLDER`] in their place.

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use hkdf::Hkdf;
use serde_json::Value;
use sha2::Sha256;

use crate::error::PluginError;

/// Marker prefix on every encrypted value.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Value the admin UI sends back for a secret it did not change.
pub const MASK_PLACEHOLDER: &str = "••••••••";

// HKDF domain separation, not secrets. The secret input is the runtime config secret.
const HKDF_SALT: &[u8] = b"podium-plugin-config";
const HKDF_INFO: &[u8] = b"plugin-config-field";

const NONCE_LEN: usize = 12;

/// Names of the top-level schema properties declared with `"format": "password"`.
pub fn get_password_fields(schema: Option<&Value>) -> Vec<String> {
    let Some(properties) = schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    properties
        .iter()
        .filter(|(_, prop)| prop.get("format").and_then(Value::as_str) == Some("password"))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Whether a stored string carries the encrypted-value marker.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Replace every non-empty password field with [`MASK_PLACEHOLDER`].
pub fn mask_config_fields(config: &Value, password_fields: &[String]) -> Value {
    let mut masked = config.clone();
    if let Some(map) = masked.as_object_mut() {
        for field in password_fields {
            if let Some(value) = map.get_mut(field) {
                if !is_empty_value(value) {
                    *value = Value::String(MASK_PLACEHOLDER.to_string());
                }
            }
        }
    }
    masked
}

// ─── Cipher ─────────────────────────────────────────────────────────────

/// AES-256-GCM cipher bound to the runtime config secret.
#[derive(Clone)]
pub struct ConfigCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for ConfigCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCipher").finish_non_exhaustive()
    }
}

impl ConfigCipher {
    /// Derive the field-encryption key from `secret`.
    pub fn new(secret: &str) -> Result<Self, PluginError> {
        if secret.is_empty() {
            return Err(PluginError::Crypto("config secret must not be empty".into()));
        }

        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret.as_bytes());
        let mut derived = [0u8; 32];
        hk.expand(HKDF_INFO, &mut derived)
            .map_err(|e| PluginError::Crypto(format!("HKDF expand failed: {e}")))?;

        let cipher = Aes256Gcm::new_from_slice(&derived)
            .map_err(|e| PluginError::Crypto(format!("AES-GCM key init failed: {e}")))?;

        Ok(Self { cipher })
    }

    /// Encrypt one plaintext into its marked, base64-encoded form.
    pub fn encrypt_value(&self, plaintext: &str) -> Result<String, PluginError> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| PluginError::Crypto(format!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!(
            "{ENCRYPTED_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(&combined)
        ))
    }

    /// Decrypt a value produced by [`encrypt_value`](Self::encrypt_value).
    pub fn decrypt_value(&self, encrypted: &str) -> Result<String, PluginError> {
        let encoded = encrypted
            .strip_prefix(ENCRYPTED_PREFIX)
            .ok_or_else(|| PluginError::Crypto("value is not encrypted".into()))?;

        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| PluginError::Crypto(format!("base64 decode failed: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(PluginError::Crypto("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        #[allow(deprecated)]
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| PluginError::Crypto(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| PluginError::Crypto(format!("UTF-8 decode failed: {e}")))
    }

    /// Prepare a submitted config for storage.
    ///
    /// Per password field: empty values and already-encrypted values pass
    /// through, the placeholder is swapped for the stored ciphertext (or the
    /// field is dropped when nothing is stored), anything else is encrypted.
    pub fn encrypt_config_fields(
        &self,
        new_config: &Value,
        existing_config: Option<&Value>,
        password_fields: &[String],
    ) -> Result<Value, PluginError> {
        let mut out = new_config.clone();
        let Some(map) = out.as_object_mut() else {
            return Ok(out);
        };

        for field in password_fields {
            let Some(value) = map.get(field) else {
                continue;
            };
            if is_empty_value(value) {
                continue;
            }
            let Some(text) = value.as_str() else {
                continue;
            };
            if is_encrypted(text) {
                continue;
            }

            if text == MASK_PLACEHOLDER {
                match existing_config.and_then(|c| c.get(field)) {
                    Some(stored) if !is_empty_value(stored) => {
                        map.insert(field.clone(), stored.clone());
                    }
                    _ => {
                        map.remove(field);
                    }
                }
                continue;
            }

            let encrypted = self.encrypt_value(text)?;
            map.insert(field.clone(), Value::String(encrypted));
        }

        Ok(out)
    }

    /// Decrypt every encrypted password field. Other values pass through.
    pub fn decrypt_config_fields(
        &self,
        config: &Value,
        password_fields: &[String],
    ) -> Result<Value, PluginError> {
        let mut out = config.clone();
        let Some(map) = out.as_object_mut() else {
            return Ok(out);
        };

        for field in password_fields {
            let Some(Value::String(text)) = map.get(field) else {
                continue;
            };
            if !is_encrypted(text) {
                continue;
            }
            let plaintext = self.decrypt_value(text)?;
            map.insert(field.clone(), Value::String(plaintext));
        }

        Ok(out)
    }
}
