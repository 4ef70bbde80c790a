//! Registry configuration.
//!
//! Values come from code (`RegistryConfig::default()` and struct update
//! syntax), a YAML document, or the environment:
//!
//! - `CAPABILITY_REGISTRY_CACHE_TTL_MS`: discovery cache lifetime (default 300000)
//! - `CAPABILITY_REGISTRY_CACHE_DISABLED`: `true`/`1` turns the discovery cache off
//! - `CAPABILITY_REGISTRY_ANALYTICS_OPT_OUT`: `true`/`1` stops usage events

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capabilities::discovery::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::error::ManifestError;

pub const ENV_CACHE_TTL_MS: &str = "CAPABILITY_REGISTRY_CACHE_TTL_MS";
pub const ENV_CACHE_DISABLED: &str = "CAPABILITY_REGISTRY_CACHE_DISABLED";
pub const ENV_ANALYTICS_OPT_OUT: &str = "CAPABILITY_REGISTRY_ANALYTICS_OPT_OUT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Lifetime of cached discovery results, in milliseconds.
    pub discovery_cache_ttl_ms: u64,
    /// Maximum number of cached discovery results.
    pub discovery_cache_capacity: usize,
    pub discovery_cache_enabled: bool,
    pub analytics_enabled: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            discovery_cache_ttl_ms: DEFAULT_CACHE_TTL.as_millis() as u64,
            discovery_cache_capacity: DEFAULT_CACHE_CAPACITY,
            discovery_cache_enabled: true,
            analytics_enabled: true,
        }
    }
}

fn env_flag(name: &str) -> bool {
    let value = env::var(name).unwrap_or_default().to_lowercase();
    value == "true" || value == "1"
}

impl RegistryConfig {
    /// Defaults overridden by any `CAPABILITY_REGISTRY_*` variables that are set.
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = env::var(ENV_CACHE_TTL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.discovery_cache_ttl_ms = ms,
                Err(e) => log::warn!("Ignoring {}={:?}: {}", ENV_CACHE_TTL_MS, raw, e),
            }
        }
        if env_flag(ENV_CACHE_DISABLED) {
            config.discovery_cache_enabled = false;
        }
        if env_flag(ENV_ANALYTICS_OPT_OUT) {
            config.analytics_enabled = false;
        }
        config
    }

    /// Parse a YAML document; missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn discovery_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.discovery_cache_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.discovery_cache_ttl(), Duration::from_secs(300));
        assert!(config.discovery_cache_enabled);
        assert!(config.analytics_enabled);
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = RegistryConfig::from_yaml("discovery_cache_ttl_ms: 1500\n").unwrap();
        assert_eq!(config.discovery_cache_ttl(), Duration::from_millis(1500));
        assert_eq!(config.discovery_cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.discovery_cache_enabled);
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        assert!(RegistryConfig::from_yaml("discovery_cache_ttl_ms: [1, 2]").is_err());
    }

    // All environment assertions live in one test so parallel tests never
    // observe each other's variables.
    #[test]
    fn test_from_env() {
        env::set_var(ENV_CACHE_TTL_MS, "2500");
        env::set_var(ENV_CACHE_DISABLED, "TRUE");
        env::set_var(ENV_ANALYTICS_OPT_OUT, "0");
        let config = RegistryConfig::from_env();
        assert_eq!(config.discovery_cache_ttl_ms, 2500);
        assert!(!config.discovery_cache_enabled);
        assert!(config.analytics_enabled);

        env::set_var(ENV_CACHE_TTL_MS, "soon");
        let config = RegistryConfig::from_env();
        assert_eq!(config.discovery_cache_ttl_ms, 300_000);

        env::remove_var(ENV_CACHE_TTL_MS);
        env::remove_var(ENV_CACHE_DISABLED);
        env::remove_var(ENV_ANALYTICS_OPT_OUT);
    }
}
