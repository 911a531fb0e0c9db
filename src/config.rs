//! Configuration Module
//!
//! Handles loading cache and server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the cache instance
    pub cache_name: String,
    /// Maximum number of entries the store can hold (0 = unbounded)
    pub max_entries: usize,
    /// Default expiration in seconds for entries added without a policy
    pub default_expiration: u64,
    /// Background expiration sweep interval in milliseconds (0 = disabled)
    pub cleanup_interval_ms: u64,
    /// Memory limit hint in megabytes
    pub memory_limit_mb: Option<u64>,
    /// Memory limit hint as a percentage of physical memory
    pub physical_memory_limit_percent: Option<u8>,
    /// Polling interval hint in seconds for memory checks
    pub polling_interval: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Cache instance name (default: "default")
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 10000)
    /// - `DEFAULT_EXPIRATION` - Default expiration in seconds (default: 1200)
    /// - `CLEANUP_INTERVAL_MS` - Expiration sweep frequency (default: 1000)
    /// - `CACHE_MEMORY_LIMIT_MB` - Memory limit hint (default: unset)
    /// - `PHYSICAL_MEMORY_LIMIT_PERCENT` - Memory limit hint (default: unset)
    /// - `POLLING_INTERVAL` - Memory polling hint in seconds (default: 120)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_name: env::var("CACHE_NAME").unwrap_or(defaults.cache_name),
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_expiration: env_or("DEFAULT_EXPIRATION", defaults.default_expiration),
            cleanup_interval_ms: env_or("CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            memory_limit_mb: env_opt("CACHE_MEMORY_LIMIT_MB"),
            physical_memory_limit_percent: env_opt("PHYSICAL_MEMORY_LIMIT_PERCENT"),
            polling_interval: env_or("POLLING_INTERVAL", defaults.polling_interval),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Default expiration applied by `add` / `get_or_add` without a policy.
    pub fn default_expiration(&self) -> Duration {
        Duration::from_secs(self.default_expiration)
    }

    /// Derives the configuration of the backing store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            name: self.cache_name.clone(),
            max_entries: self.max_entries,
            cleanup_interval: Duration::from_millis(self.cleanup_interval_ms),
            memory_limit_mb: self.memory_limit_mb,
            physical_memory_limit_percent: self.physical_memory_limit_percent,
            polling_interval: Duration::from_secs(self.polling_interval),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_name: "default".to_string(),
            max_entries: 10_000,
            default_expiration: 20 * 60,
            cleanup_interval_ms: 1000,
            memory_limit_mb: None,
            physical_memory_limit_percent: None,
            polling_interval: 120,
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_opt(name).unwrap_or(default)
}

fn env_opt<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

// == Store Config ==
/// Configuration of a single expiring store instance.
///
/// The memory hints are carried along for observability; the store itself
/// only enforces `max_entries`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub name: String,
    pub max_entries: usize,
    pub cleanup_interval: Duration,
    pub memory_limit_mb: Option<u64>,
    pub physical_memory_limit_percent: Option<u8>,
    pub polling_interval: Duration,
}

impl StoreConfig {
    /// A store named `name` with default limits.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Config::default().store_config()
    }
}
