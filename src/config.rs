//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::ledger::PageLimits;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    pub host: String,
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Requests per minute per client; 0 disables rate limiting
    pub rate_limit_per_minute: u32,

    pub request_timeout_secs: u64,

    /// How long a completed idempotent response is replayed
    pub idempotency_ttl_secs: u64,

    pub idempotency_sweep_interval_secs: u64,

    pub list_default_limit: u32,
    pub list_max_limit: u32,

    /// Attempts per posting on serialization conflicts
    pub posting_max_attempts: u32,

    /// Apply embedded migrations on startup
    pub run_migrations: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let list_default_limit = parse_or(&lookup, "LIST_DEFAULT_LIMIT", 50)?;
        let list_max_limit = parse_or(&lookup, "LIST_MAX_LIMIT", 1000)?;
        if list_default_limit == 0 || list_max_limit == 0 {
            return Err(ConfigError::InvalidValue("LIST_DEFAULT_LIMIT"));
        }

        let posting_max_attempts = parse_or(&lookup, "POSTING_MAX_ATTEMPTS", 3)?;
        if posting_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("POSTING_MAX_ATTEMPTS"));
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            host,
            port: parse_or(&lookup, "PORT", 3000)?,
            environment,
            rate_limit_per_minute: parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", 100)?,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 10)?,
            idempotency_ttl_secs: parse_or(&lookup, "IDEMPOTENCY_TTL_SECS", 86_400)?,
            idempotency_sweep_interval_secs: parse_or(
                &lookup,
                "IDEMPOTENCY_SWEEP_INTERVAL_SECS",
                60,
            )?,
            list_default_limit,
            list_max_limit,
            posting_max_attempts,
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_limit: self.list_default_limit,
            max_limit: self.list_max_limit,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    pub fn idempotency_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idempotency_sweep_interval_secs.max(1))
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/ledger")]).unwrap();

        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.rate_limit_per_minute, 100);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.idempotency_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.page_limits(), PageLimits::default());
        assert_eq!(config.posting_max_attempts, 3);
        assert!(config.run_migrations);
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::MissingEnv("DATABASE_URL"))
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("DATABASE_URL", "postgres://x"), ("PORT", "http")]),
            Err(ConfigError::InvalidValue("PORT"))
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "postgres://x"), ("RUN_MIGRATIONS", "yes")]),
            Err(ConfigError::InvalidValue("RUN_MIGRATIONS"))
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "postgres://x"), ("POSTING_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::InvalidValue("POSTING_MAX_ATTEMPTS"))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("ENVIRONMENT", "production"),
            ("RATE_LIMIT_PER_MINUTE", "0"),
            ("LIST_MAX_LIMIT", "200"),
        ])
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.rate_limit_per_minute, 0);
        assert_eq!(config.page_limits().max_limit, 200);
    }
}
