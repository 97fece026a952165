//! Identity configuration.
//!
//! Consolidates the environment variable reads of the core and validates the
//! relationships between cache lifetimes.

use crate::secrets::SecretTtl;
use std::time::Duration;

/// Title of the role that grants the administrator flag
pub const DEFAULT_ADMIN_ROLE: &str = "admin";

/// Default name of the refresh-token cookie
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "kw_refresh";

/// Argon2id hasher configuration
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Server-side pepper appended to every password
    pub pepper: String,
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Time cost
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

/// Complete identity configuration
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Role title whose holders get the administrator flag
    pub admin_role: String,
    pub password: PasswordConfig,
    /// Secret cache tiers and rotation interval
    pub secrets: SecretTtl,
    /// Distributed cache lifetime of user views
    pub user_view_ttl: Duration,
    /// Lifetime of a pending confirmation code
    pub confirmation_code_ttl: Duration,
    /// Wrong guesses after which a pending code is discarded
    pub confirmation_code_max_attempts: u64,
    /// Lifetime of a bearer access token
    pub access_token_lifetime: Duration,
    /// Lifetime of a session's refresh token
    pub refresh_token_lifetime_days: u32,
    /// Name of the cookie carrying the refresh token
    pub session_cookie_name: String,
}

impl IdentityConfig {
    /// Load configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `PASSWORD_PEPPER`: required, at least 16 characters
    /// - `ADMIN_ROLE` (default: admin)
    /// - `SECRET_LOCAL_TTL_SECS` (default: 300)
    /// - `SECRET_SHARED_TTL_SECS` (default: 604800)
    /// - `SECRET_ROTATION_SECS` (default: 86400)
    /// - `USER_VIEW_TTL_SECS` (default: 172800)
    /// - `CONFIRMATION_CODE_TTL_SECS` (default: 600)
    /// - `CONFIRMATION_CODE_MAX_ATTEMPTS` (default: 5)
    /// - `ACCESS_TOKEN_LIFETIME_SECS` (default: 900)
    /// - `REFRESH_TOKEN_LIFETIME_DAYS` (default: 30)
    /// - `SESSION_COOKIE_NAME` (default: kw_refresh)
    /// - `ARGON2_MEMORY_KIB` / `ARGON2_ITERATIONS` / `ARGON2_PARALLELISM`
    ///   (default: 19456 / 2 / 1)
    ///
    /// # Errors
    ///
    /// Returns error if the pepper is missing or any value fails [`IdentityConfig::validate`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::development();

        let pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let config = Self {
            admin_role: std::env::var("ADMIN_ROLE").unwrap_or(defaults.admin_role),
            password: PasswordConfig {
                pepper,
                memory_kib: parse_env_or("ARGON2_MEMORY_KIB", defaults.password.memory_kib),
                iterations: parse_env_or("ARGON2_ITERATIONS", defaults.password.iterations),
                parallelism: parse_env_or("ARGON2_PARALLELISM", defaults.password.parallelism),
            },
            secrets: SecretTtl {
                local: secs_env_or("SECRET_LOCAL_TTL_SECS", defaults.secrets.local),
                shared: secs_env_or("SECRET_SHARED_TTL_SECS", defaults.secrets.shared),
                actual: secs_env_or("SECRET_ROTATION_SECS", defaults.secrets.actual),
            },
            user_view_ttl: secs_env_or("USER_VIEW_TTL_SECS", defaults.user_view_ttl),
            confirmation_code_ttl: secs_env_or(
                "CONFIRMATION_CODE_TTL_SECS",
                defaults.confirmation_code_ttl,
            ),
            confirmation_code_max_attempts: parse_env_or(
                "CONFIRMATION_CODE_MAX_ATTEMPTS",
                defaults.confirmation_code_max_attempts,
            ),
            access_token_lifetime: secs_env_or(
                "ACCESS_TOKEN_LIFETIME_SECS",
                defaults.access_token_lifetime,
            ),
            refresh_token_lifetime_days: parse_env_or(
                "REFRESH_TOKEN_LIFETIME_DAYS",
                defaults.refresh_token_lifetime_days,
            ),
            session_cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or(defaults.session_cookie_name),
        };

        config.validate()?;
        Ok(config)
    }

    /// Development configuration with a fixed, public pepper
    pub fn development() -> Self {
        Self {
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
            password: PasswordConfig {
                pepper: "development-pepper-not-secret".to_string(),
                memory_kib: 19_456,
                iterations: 2,
                parallelism: 1,
            },
            secrets: SecretTtl {
                local: Duration::from_secs(300),
                shared: Duration::from_secs(7 * 24 * 3600),
                actual: Duration::from_secs(24 * 3600),
            },
            user_view_ttl: Duration::from_secs(48 * 3600),
            confirmation_code_ttl: Duration::from_secs(600),
            confirmation_code_max_attempts: 5,
            access_token_lifetime: Duration::from_secs(900),
            refresh_token_lifetime_days: 30,
            session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
        }
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_role.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "ADMIN_ROLE".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if self.password.pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if self.secrets.actual > self.secrets.shared {
            return Err(ConfigError::Invalid {
                var: "SECRET_ROTATION_SECS".to_string(),
                reason: format!(
                    "Must not exceed the shared secret TTL ({}s)",
                    self.secrets.shared.as_secs()
                ),
            });
        }

        if self.secrets.local > self.secrets.shared {
            return Err(ConfigError::Invalid {
                var: "SECRET_LOCAL_TTL_SECS".to_string(),
                reason: format!(
                    "Must not exceed the shared secret TTL ({}s)",
                    self.secrets.shared.as_secs()
                ),
            });
        }

        if self.secrets.shared < self.access_token_lifetime {
            return Err(ConfigError::Invalid {
                var: "SECRET_SHARED_TTL_SECS".to_string(),
                reason: format!(
                    "Must be at least the access token lifetime ({}s)",
                    self.access_token_lifetime.as_secs()
                ),
            });
        }

        if self.confirmation_code_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: "CONFIRMATION_CODE_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.confirmation_code_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "CONFIRMATION_CODE_MAX_ATTEMPTS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.access_token_lifetime.is_zero() {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_LIFETIME_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.refresh_token_lifetime_days == 0 {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_LIFETIME_DAYS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Refresh-token lifetime as a duration
    pub fn refresh_token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.refresh_token_lifetime_days))
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn secs_env_or(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_env_or(key, default.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_development_config_is_valid() {
        IdentityConfig::development().validate().unwrap();
    }

    #[test]
    fn test_rotation_longer_than_shared_ttl_rejected() {
        let mut config = IdentityConfig::development();
        config.secrets.actual = config.secrets.shared + Duration::from_secs(1);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SECRET_ROTATION_SECS"));
    }

    #[test]
    fn test_short_pepper_rejected() {
        let mut config = IdentityConfig::development();
        config.password.pepper = "short".to_string();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn test_shared_ttl_must_cover_access_tokens() {
        let mut config = IdentityConfig::development();
        config.secrets.shared = Duration::from_secs(60);
        config.secrets.actual = Duration::from_secs(60);
        config.secrets.local = Duration::from_secs(30);
        config.access_token_lifetime = Duration::from_secs(120);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SECRET_SHARED_TTL_SECS"));
    }

    #[test]
    fn test_zero_code_attempts_rejected() {
        let mut config = IdentityConfig::development();
        config.confirmation_code_max_attempts = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CONFIRMATION_CODE_MAX_ATTEMPTS"));
    }

    #[test]
    #[serial]
    fn test_from_env_requires_pepper() {
        // SAFETY: serialized with every other test touching the environment
        unsafe {
            std::env::remove_var("PASSWORD_PEPPER");
        }
        let err = IdentityConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        // SAFETY: serialized with every other test touching the environment
        unsafe {
            std::env::set_var("PASSWORD_PEPPER", "0123456789abcdef0123");
            std::env::set_var("ADMIN_ROLE", "root");
            std::env::set_var("USER_VIEW_TTL_SECS", "60");
            std::env::set_var("ARGON2_ITERATIONS", "not-a-number");
        }

        let config = IdentityConfig::from_env().unwrap();
        assert_eq!(config.admin_role, "root");
        assert_eq!(config.user_view_ttl, Duration::from_secs(60));
        assert_eq!(config.password.iterations, 2);

        unsafe {
            std::env::remove_var("PASSWORD_PEPPER");
            std::env::remove_var("ADMIN_ROLE");
            std::env::remove_var("USER_VIEW_TTL_SECS");
            std::env::remove_var("ARGON2_ITERATIONS");
        }
    }
}
