//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::cache::{default_ttls, ResourceCache};

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Resource cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Repository settings.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "repository.name must not be empty".to_string(),
            });
        }

        if self.repository.initial_version.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "repository.initial_version must not be empty".to_string(),
            });
        }

        if self.cache.default_ttl_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "cache.default_ttl_ms must be greater than zero".to_string(),
            });
        }

        if let Some((uri, _)) = self.cache.ttl_ms.iter().find(|(_, ttl)| **ttl == 0) {
            return Err(ConfigError::ValidationError {
                message: format!("cache.ttl_ms entry '{uri}' must be greater than zero"),
            });
        }

        Ok(())
    }
}

/// Resource cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether resource reads are cached at all.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL in milliseconds for resources without an entry in `ttl_ms`.
    /// Default: 30000
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Per-URI TTL overrides in milliseconds.
    #[serde(default)]
    pub ttl_ms: HashMap<String, u64>,

    /// Seconds between sweeps of expired entries; 0 disables the sweep.
    /// Default: 60
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            default_ttl_ms: default_ttl_ms(),
            ttl_ms: HashMap::new(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl CacheConfig {
    /// Builds a cache from the built-in TTL table with this configuration's
    /// overrides applied.
    #[must_use]
    pub fn build_cache(&self) -> ResourceCache {
        let mut ttls = default_ttls();
        ttls.extend(
            self.ttl_ms
                .iter()
                .map(|(uri, ms)| (uri.clone(), Duration::from_millis(*ms))),
        );

        let cache = ResourceCache::with_ttls(Duration::from_millis(self.default_ttl_ms), ttls);
        cache.set_enabled(self.enabled);
        cache
    }

    /// Interval of the periodic sweep, or `None` when disabled.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Option<Duration> {
        if self.cleanup_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.cleanup_interval_secs))
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_ttl_ms() -> u64 {
    30_000
}

const fn default_cleanup_interval() -> u64 {
    60
}

/// Repository configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Name of the repository releases are managed for.
    /// Default: "default"
    #[serde(default = "default_repository_name")]
    pub name: String,

    /// Version reported before the first release is planned.
    /// Default: "0.1.0"
    #[serde(default = "default_initial_version")]
    pub initial_version: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: default_repository_name(),
            initial_version: default_initial_version(),
        }
    }
}

fn default_repository_name() -> String {
    "default".to_string()
}

fn default_initial_version() -> String {
    "0.1.0".to_string()
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Replaces the instruction text returned from `initialize`.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
