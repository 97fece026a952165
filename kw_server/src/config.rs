//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use keyward::config::{ConfigError, IdentityConfig, parse_env_or};
use keyward::db::DatabaseConfig;
use std::net::SocketAddr;

/// Default HTTP bind address
pub const DEFAULT_BIND: &str = "127.0.0.1:6969";

/// Values given on the command line; each wins over its environment variable
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub cache_url: Option<String>,
    pub metrics_bind: Option<SocketAddr>,
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address
    pub bind: SocketAddr,
    /// Prometheus scrape address; exporter disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis URL for the shared cache; the in-process cache is used when unset
    pub cache_url: Option<String>,
    /// Key prefix shared by every instance using the same Redis
    pub cache_prefix: String,
    /// Identity core configuration
    pub identity: IdentityConfig,
    /// Whether the session cookie carries the `Secure` attribute
    pub secure_cookies: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `overrides` - Values parsed from CLI args
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: ServerOverrides) -> Result<Self, ConfigError> {
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => parse_addr("SERVER_BIND", DEFAULT_BIND)?,
        };

        let metrics_bind = match overrides.metrics_bind {
            Some(addr) => Some(addr),
            None => match std::env::var("METRICS_BIND") {
                Ok(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{}' is not a socket address", value),
                })?),
                Err(_) => None,
            },
        };

        let database = match overrides.database_url {
            Some(database_url) => DatabaseConfig {
                database_url,
                ..DatabaseConfig::from_env().unwrap_or_else(|_| DatabaseConfig::development())
            },
            None => DatabaseConfig::from_env()?,
        };

        let cache_url = overrides
            .cache_url
            .or_else(|| std::env::var("CACHE_URL").ok())
            .filter(|url| !url.trim().is_empty());

        let config = ServerConfig {
            bind,
            metrics_bind,
            database,
            cache_url,
            cache_prefix: std::env::var("CACHE_PREFIX").unwrap_or_else(|_| "keyward".to_string()),
            identity: IdentityConfig::from_env()?,
            secure_cookies: parse_env_or("SECURE_COOKIES", true),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.identity.validate()?;

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from SERVER_BIND ({})", self.bind),
            });
        }

        if let Some(url) = &self.cache_url
            && !(url.starts_with("redis://") || url.starts_with("rediss://"))
        {
            return Err(ConfigError::Invalid {
                var: "CACHE_URL".to_string(),
                reason: "Must be a redis:// or rediss:// URL".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_addr(var: &str, default: &str) -> Result<SocketAddr, ConfigError> {
    let value = std::env::var(var).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|_| ConfigError::Invalid {
        var: var.to_string(),
        reason: format!("'{}' is not a socket address", value),
    })
}
