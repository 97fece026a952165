//! Signing secret model.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Secret ID type
pub type SecretId = Uuid;

/// Bytes of random key material per secret
pub const KEY_BYTES: usize = 32;

/// Signing secret. Never updated once created.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub id: SecretId,
    pub created_at: DateTime<Utc>,
    /// Hex-encoded opaque key material
    pub key: String,
}

impl Secret {
    /// Generate a new secret with fresh random key material
    pub fn generate() -> Self {
        let mut material = [0u8; KEY_BYTES];
        rand::rng().fill_bytes(&mut material);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            key: hex::encode(material),
        }
    }

    pub fn key_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secrets_are_unique() {
        let a = Secret::generate();
        let b = Secret::generate();
        assert_ne!(a.id, b.id);
        assert_ne!(a.key, b.key);
        assert_eq!(a.key.len(), KEY_BYTES * 2);
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let secret = Secret::generate();
        let debug = format!("{secret:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&secret.key));
    }
}
