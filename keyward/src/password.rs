//! Argon2id password hashing with a server-side pepper.

use crate::config::PasswordConfig;
use crate::errors::{IdentityError, IdentityResult};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use std::sync::Arc;

/// Hashes and verifies passwords off the async runtime threads
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: Arc<str>,
    params: Params,
}

impl PasswordHasher {
    /// Create a hasher from configuration
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::HashingFailed` if the Argon2 parameters are out of range
    pub fn new(config: &PasswordConfig) -> IdentityResult<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| {
                log::error!("Invalid Argon2 parameters: {}", e);
                IdentityError::HashingFailed
            })?;

        Ok(Self {
            pepper: Arc::from(config.pepper.as_str()),
            params,
        })
    }

    /// Hash password with Argon2id + pepper
    pub async fn hash(&self, password: &str) -> IdentityResult<String> {
        let hasher = self.clone();
        let peppered = self.peppered(password);

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .argon2()
                .hash_password(peppered.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|_| IdentityError::HashingFailed)
        })
        .await
        .map_err(|_| IdentityError::HashingFailed)?
    }

    /// Verify password against hash
    ///
    /// # Errors
    ///
    /// * `IdentityError::IncorrectPassword` - Mismatch or unparseable hash
    pub async fn verify(&self, password: &str, hash: &str) -> IdentityResult<()> {
        let hasher = self.clone();
        let peppered = self.peppered(password);
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || {
            let parsed_hash =
                PasswordHash::new(&hash).map_err(|_| IdentityError::IncorrectPassword)?;
            hasher
                .argon2()
                .verify_password(peppered.as_bytes(), &parsed_hash)
                .map_err(|_| IdentityError::IncorrectPassword)
        })
        .await
        .map_err(|_| IdentityError::HashingFailed)?
    }

    fn peppered(&self, password: &str) -> String {
        format!("{}{}", password, self.pepper)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}
