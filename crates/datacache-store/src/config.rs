// SPDX-License-Identifier: Apache-2.0

use crate::error::{CacheError, CacheErrorCode};
use crate::space::{DEFAULT_EVICTION_MARGIN_FRACTION, DEFAULT_KEEP_VERSIONS_PER_KEY};
use crate::staleness::DEFAULT_REMOTE_NEWER_GRACE_SECONDS;
use datacache_catalog::CatalogClient;
use datacache_core::{
    non_empty_env, resolve_datacache_dir, ENV_DATACACHE_CACHE_DIR,
    ENV_DATACACHE_HTTP_TIMEOUT_SECONDS, ENV_DATACACHE_QUOTA_BYTES,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cache configuration, read from a JSON file and then overridden from the
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default)]
    pub cache_directory: Option<PathBuf>,
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
    #[serde(default = "default_validity_window_seconds")]
    pub validity_window_seconds: u64,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: f64,
    #[serde(default = "default_keep_versions_per_key")]
    pub keep_versions_per_key: usize,
    #[serde(default = "default_eviction_margin_fraction")]
    pub eviction_margin_fraction: f64,
    #[serde(default = "default_remote_newer_grace_seconds")]
    pub remote_newer_grace_seconds: u64,
    /// Accounting size of descriptors that declare none.
    #[serde(default)]
    pub default_size_estimate_bytes: u64,
    pub catalog: CatalogClient,
}

fn default_quota_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_validity_window_seconds() -> u64 {
    3600
}

fn default_http_timeout_seconds() -> f64 {
    30.0
}

fn default_keep_versions_per_key() -> usize {
    DEFAULT_KEEP_VERSIONS_PER_KEY
}

fn default_eviction_margin_fraction() -> f64 {
    DEFAULT_EVICTION_MARGIN_FRACTION
}

fn default_remote_newer_grace_seconds() -> u64 {
    DEFAULT_REMOTE_NEWER_GRACE_SECONDS.unsigned_abs()
}

impl CacheConfig {
    /// Defaults for everything but the catalog.
    #[must_use]
    pub fn new(catalog: CatalogClient) -> Self {
        Self {
            cache_directory: None,
            quota_bytes: default_quota_bytes(),
            validity_window_seconds: default_validity_window_seconds(),
            http_timeout_seconds: default_http_timeout_seconds(),
            keep_versions_per_key: default_keep_versions_per_key(),
            eviction_margin_fraction: default_eviction_margin_fraction(),
            remote_newer_grace_seconds: default_remote_newer_grace_seconds(),
            default_size_estimate_bytes: 0,
            catalog,
        }
    }

    pub fn from_json_slice(raw: &[u8]) -> Result<Self, CacheError> {
        serde_json::from_slice(raw).map_err(|e| {
            CacheError::new(
                CacheErrorCode::Configuration,
                format!(
                    "config is invalid at line {} column {}: {e}",
                    e.line(),
                    e.column()
                ),
            )
        })
    }

    /// Reads `path`, applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let raw = std::fs::read(path).map_err(|e| {
            CacheError::new(
                CacheErrorCode::Configuration,
                format!("config {} is not readable: {e}", path.display()),
            )
        })?;
        let mut cfg = Self::from_json_slice(&raw)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), CacheError> {
        if let Some(dir) = non_empty_env(ENV_DATACACHE_CACHE_DIR) {
            self.cache_directory = Some(PathBuf::from(dir));
        }
        if let Some(quota) = env_u64(ENV_DATACACHE_QUOTA_BYTES)? {
            self.quota_bytes = quota;
        }
        if let Some(raw) = non_empty_env(ENV_DATACACHE_HTTP_TIMEOUT_SECONDS) {
            self.http_timeout_seconds = raw.parse::<f64>().map_err(|e| {
                CacheError::new(
                    CacheErrorCode::Configuration,
                    format!("{ENV_DATACACHE_HTTP_TIMEOUT_SECONDS}={raw:?}: {e}"),
                )
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        let invalid = |msg: &str| Err(CacheError::new(CacheErrorCode::Configuration, msg));
        if self.quota_bytes == 0 {
            return invalid("quota_bytes must be > 0");
        }
        if !(0.0..1.0).contains(&self.eviction_margin_fraction) {
            return invalid("eviction_margin_fraction must be within [0, 1)");
        }
        if self.keep_versions_per_key == 0 {
            return invalid("keep_versions_per_key must be > 0");
        }
        if !self.http_timeout_seconds.is_finite() || self.http_timeout_seconds <= 0.0 {
            return invalid("http_timeout_seconds must be > 0");
        }
        if self.catalog.endpoint().trim().is_empty() {
            return invalid("catalog endpoint must not be empty");
        }
        Ok(())
    }

    #[must_use]
    pub fn resolved_cache_directory(&self) -> PathBuf {
        self.cache_directory
            .clone()
            .unwrap_or_else(resolve_datacache_dir)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout_seconds)
    }

    #[must_use]
    pub fn validity_window(&self) -> chrono::Duration {
        seconds_duration(self.validity_window_seconds)
    }

    #[must_use]
    pub fn remote_newer_grace(&self) -> chrono::Duration {
        seconds_duration(self.remote_newer_grace_seconds)
    }
}

/// Saturates at the largest span chrono represents.
fn seconds_duration(seconds: u64) -> chrono::Duration {
    let max = i64::MAX / 1000;
    chrono::Duration::seconds(i64::try_from(seconds).map_or(max, |s| s.min(max)))
}

fn env_u64(name: &str) -> Result<Option<u64>, CacheError> {
    match non_empty_env(name) {
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|e| {
            CacheError::new(
                CacheErrorCode::Configuration,
                format!("{name}={raw:?}: {e}"),
            )
        }),
        None => Ok(None),
    }
}
