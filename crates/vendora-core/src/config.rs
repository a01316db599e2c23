// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

use crate::cache::DEFAULT_CACHE_TTL;

/// Vendora Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Redis/Valkey URL for the aggregate cache (in-process cache when unset)
    pub redis_url: Option<String>,
    /// Lifetime of a cached vendor aggregate entry
    pub cache_ttl: Duration,
    /// Maximum database pool connections
    pub db_max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `VENDORA_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `VENDORA_REDIS_URL`: Redis URL for the aggregate cache (default: in-process cache)
    /// - `VENDORA_CACHE_TTL_SECS`: cache entry lifetime in seconds (default: 86400)
    /// - `VENDORA_DB_MAX_CONNECTIONS`: database pool size (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("VENDORA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("VENDORA_DATABASE_URL"))?;

        let redis_url = std::env::var("VENDORA_REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let cache_ttl_secs: u64 = match std::env::var("VENDORA_CACHE_TTL_SECS") {
            Ok(value) => value.parse().map_err(|_| {
                ConfigError::Invalid("VENDORA_CACHE_TTL_SECS", "must be a non-negative integer")
            })?,
            Err(_) => DEFAULT_CACHE_TTL.as_secs(),
        };

        let db_max_connections: u32 = std::env::var("VENDORA_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("VENDORA_DB_MAX_CONNECTIONS", "must be a positive integer")
            })?;

        if db_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "VENDORA_DB_MAX_CONNECTIONS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            db_max_connections,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}


#[cfg(test)]
mod tests {
    use super::test_env::{ENV_MUTEX, EnvGuard};
    use super::*;

    fn clear_optional(guard: &mut EnvGuard) {
        guard.remove("VENDORA_REDIS_URL");
        guard.remove("VENDORA_CACHE_TTL_SECS");
        guard.remove("VENDORA_DB_MAX_CONNECTIONS");
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("VENDORA_DATABASE_URL", "postgres://localhost/vendora");
        clear_optional(&mut guard);

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/vendora");
        assert!(config.redis_url.is_none());
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.db_max_connections, 10);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("VENDORA_DATABASE_URL", "sqlite:vendora.db");
        guard.set("VENDORA_REDIS_URL", "redis://cache:6379");
        guard.set("VENDORA_CACHE_TTL_SECS", "600");
        guard.set("VENDORA_DB_MAX_CONNECTIONS", "4");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite:vendora.db");
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.db_max_connections, 4);
    }

    #[test]
    fn test_config_blank_redis_url_is_ignored() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("VENDORA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("VENDORA_REDIS_URL", "  ");

        let config = Config::from_env().unwrap();
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("VENDORA_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("VENDORA_DATABASE_URL")));
        assert!(err.to_string().contains("VENDORA_DATABASE_URL"));
    }

    #[test]
    fn test_config_invalid_cache_ttl() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("VENDORA_DATABASE_URL", "postgres://localhost/vendora");
        clear_optional(&mut guard);
        guard.set("VENDORA_CACHE_TTL_SECS", "a day");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("VENDORA_CACHE_TTL_SECS", _)));
    }

    #[test]
    fn test_config_zero_max_connections() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("VENDORA_DATABASE_URL", "postgres://localhost/vendora");
        clear_optional(&mut guard);
        guard.set("VENDORA_DB_MAX_CONNECTIONS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("VENDORA_DB_MAX_CONNECTIONS", _)
        ));
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
