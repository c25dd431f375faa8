//! Configuration Module
//!
//! Handles loading engine and sidecar configuration from environment
//! variables.

use std::env;
use std::str::FromStr;

use crate::cache::DEFAULT_SIGNATURE_CAPACITY;
use crate::error::{CacheError, Result};
use crate::extract::{IdKind, DEFAULT_SUPPORTED_KINDS};

/// Default entry TTL in seconds.
pub const DEFAULT_TTL: u64 = 300;

/// Default extra lifetime of an entity index beyond its members, in seconds.
pub const DEFAULT_REVERSE_INDEX_TTL_GAP: u64 = 300;

// == Engine Config ==
/// Settings the caching engine itself consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// TTL applied when a function has no override
    pub default_ttl: u64,
    /// When set, every entry uses this TTL and overrides are rejected
    pub locked_ttl: Option<u64>,
    /// Seconds an entity index outlives its longest-lived member
    pub reverse_index_ttl_gap: u64,
    /// Whether a missing id fails the call rather than being skipped
    pub fail_on_missing_id: bool,
    /// When false, wrapped functions run uncached
    pub enabled: bool,
    /// Id kinds allowed into entity indices
    pub supported_id_kinds: Vec<IdKind>,
    /// Capacity of the function signature cache
    pub signature_capacity: usize,
}

impl EngineConfig {
    /// Checks the settings, returning a configuration error on the first
    /// invalid one.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl == 0 {
            return Err(CacheError::Configuration(
                "default_ttl must be greater than 0".to_string(),
            ));
        }
        if self.locked_ttl == Some(0) {
            return Err(CacheError::Configuration(
                "locked_ttl must be greater than 0".to_string(),
            ));
        }
        validate_id_kinds(&self.supported_id_kinds)
    }

    /// TTL for a function with the given override.
    pub fn effective_ttl(&self, ttl_override: Option<u64>) -> Result<u64> {
        let ttl = match (self.locked_ttl, ttl_override) {
            (Some(locked), Some(requested)) => {
                return Err(CacheError::Configuration(format!(
                    "ttl override {}s conflicts with locked ttl {}s",
                    requested, locked
                )))
            }
            (Some(locked), None) => locked,
            (None, Some(requested)) => requested,
            (None, None) => self.default_ttl,
        };
        if ttl == 0 {
            return Err(CacheError::Configuration(
                "ttl must be greater than 0".to_string(),
            ));
        }
        Ok(ttl)
    }
}

/// Supported id kinds must be a non-empty list of scalar kinds.
pub fn validate_id_kinds(kinds: &[IdKind]) -> Result<()> {
    if kinds.is_empty() {
        return Err(CacheError::Configuration(
            "supported id kinds must not be empty".to_string(),
        ));
    }
    if let Some(kind) = kinds.iter().find(|k| !k.is_key_kind()) {
        return Err(CacheError::Configuration(format!(
            "{} cannot be used as an entity id kind",
            kind
        )));
    }
    Ok(())
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            locked_ttl: None,
            reverse_index_ttl_gap: DEFAULT_REVERSE_INDEX_TTL_GAP,
            fail_on_missing_id: true,
            enabled: true,
            supported_id_kinds: DEFAULT_SUPPORTED_KINDS.to_vec(),
            signature_capacity: DEFAULT_SIGNATURE_CAPACITY,
        }
    }
}

// == Config ==
/// Process configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace prefix the backend applies to every key
    pub key_prefix: String,
    /// Engine settings
    pub engine: EngineConfig,
    /// Redis URL; the in-memory backend is used when unset
    pub redis_url: Option<String>,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `KEY_PREFIX` - Namespace prefix for every key (default: empty)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `LOCKED_TTL` - Forces one TTL for every function (default: unset)
    /// - `REVERSE_INDEX_TTL_GAP` - Extra entity index lifetime (default: 300)
    /// - `FAIL_ON_MISSING_ID` - Fail calls whose result lacks an id (default: true)
    /// - `CACHE_ENABLED` - Turns caching on or off (default: true)
    /// - `SIGNATURE_CACHE_CAPACITY` - Remembered function signatures (default: 1024)
    /// - `REDIS_URL` - Redis connection URL (default: unset, in-memory)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        Self {
            key_prefix: env::var("KEY_PREFIX").unwrap_or_default(),
            engine: EngineConfig {
                default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
                locked_ttl: env::var("LOCKED_TTL").ok().and_then(|v| v.parse().ok()),
                reverse_index_ttl_gap: env_or(
                    "REVERSE_INDEX_TTL_GAP",
                    defaults.reverse_index_ttl_gap,
                ),
                fail_on_missing_id: env_flag("FAIL_ON_MISSING_ID", defaults.fail_on_missing_id),
                enabled: env_flag("CACHE_ENABLED", defaults.enabled),
                supported_id_kinds: defaults.supported_id_kinds,
                signature_capacity: env_or("SIGNATURE_CACHE_CAPACITY", defaults.signature_capacity),
            },
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            server_port: env_or("SERVER_PORT", 3000),
            cleanup_interval: env_or("CLEANUP_INTERVAL", 1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            engine: EngineConfig::default(),
            redis_url: None,
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
