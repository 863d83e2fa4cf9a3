// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod digest;
mod error;

pub use digest::{hex_digest, is_supported_algorithm, sha256_hex, DigestError};
pub use error::{ExitCode, MachineError};

use std::path::PathBuf;

pub const CRATE_NAME: &str = "datacache-core";

pub const ENV_DATACACHE_LOG_LEVEL: &str = "DATACACHE_LOG_LEVEL";
pub const ENV_DATACACHE_CACHE_DIR: &str = "DATACACHE_CACHE_DIR";
pub const ENV_DATACACHE_QUOTA_BYTES: &str = "DATACACHE_QUOTA_BYTES";
pub const ENV_DATACACHE_HTTP_TIMEOUT_SECONDS: &str = "DATACACHE_HTTP_TIMEOUT_SECONDS";
pub const ENV_DATACACHE_CONFIG: &str = "DATACACHE_CONFIG";

/// Default cache root when the configuration names none.
///
/// Lookup order: `DATACACHE_CACHE_DIR`, `$XDG_CACHE_HOME/datacache`,
/// `$HOME/.cache/datacache`, then `.datacache/cache` relative to the cwd.
#[must_use]
pub fn resolve_datacache_dir() -> PathBuf {
    if let Some(explicit) = non_empty_env(ENV_DATACACHE_CACHE_DIR) {
        return PathBuf::from(explicit);
    }
    if let Some(xdg_cache_home) = non_empty_env("XDG_CACHE_HOME") {
        return PathBuf::from(xdg_cache_home).join("datacache");
    }
    if let Some(home) = non_empty_env("HOME") {
        return PathBuf::from(home).join(".cache").join("datacache");
    }
    PathBuf::from(".datacache").join("cache")
}

#[must_use]
pub fn non_empty_env(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
