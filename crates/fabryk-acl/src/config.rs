//! Configuration for the ACL engine.
//!
//! Provides [`AclConfig`], loaded from TOML files, environment variables,
//! and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit config path
//! 2. `FABRYK_ACL_CONFIG` environment variable
//! 3. Built-in defaults (also used when the file does not exist)
//!
//! `FABRYK_ACL_*` environment variables are layered on top of the file.
//! `confyg` passes environment values as strings, so only string fields
//! (e.g. `FABRYK_ACL_STORE_URL`) can be overridden that way.

use std::path::PathBuf;

use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};

use crate::error::{AclError, Result};
use crate::resource::DEFAULT_MODE;
use crate::subject::{UNIVERSAL_IDENTIFIER, UNIVERSAL_NAMESPACE};

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the ACL engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Mode used by mutations that do not name one.
    pub default_mode: String,

    /// Sort key given to newly created entries.
    pub default_sort_key: i64,

    /// Namespace of the universal subject.
    pub universal_namespace: String,

    /// Identifier of the universal subject.
    pub universal_identifier: String,

    /// Decision cache configuration.
    pub cache: CacheConfig,

    /// Entry store configuration.
    pub store: StoreConfig,
}

/// Decision cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether `check` results are memoized.
    pub enabled: bool,

    /// Maximum number of memoized decisions.
    pub capacity: usize,
}

/// Which entry store backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Entry store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreBackend,

    /// Database URL (sqlite backend only).
    pub url: String,

    /// Connection pool size (sqlite backend only).
    pub max_connections: u32,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            default_mode: DEFAULT_MODE.to_string(),
            default_sort_key: 0,
            universal_namespace: UNIVERSAL_NAMESPACE.to_string(),
            universal_identifier: UNIVERSAL_IDENTIFIER.to_string(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "sqlite://acl.db".to_string(),
            max_connections: 4,
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl AclConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| AclError::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| AclError::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("FABRYK_ACL");
        env_opts.add_section("cache");
        env_opts.add_section("store");
        builder
            .add_env(env_opts)
            .map_err(|e| AclError::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| AclError::config(format!("config build: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overlay.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| AclError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path from an explicit path or the
    /// `FABRYK_ACL_CONFIG` env var.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        std::env::var("FABRYK_ACL_CONFIG").ok().map(PathBuf::from)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.default_mode.trim().is_empty() {
            return Err(AclError::config("default_mode must not be empty"));
        }
        if self.universal_namespace.trim().is_empty() || self.universal_identifier.trim().is_empty()
        {
            return Err(AclError::config(
                "universal_namespace and universal_identifier must not be empty",
            ));
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(AclError::config(
                "cache.capacity must be positive when the cache is enabled",
            ));
        }
        Ok(())
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AclError::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
