// SPDX-License-Identifier: Apache-2.0

use crate::output::{emit_ok, render_report};
use crate::{CacheLocation, CliError, OutputMode};
use datacache_catalog::ReqwestTransport;
use datacache_core::resolve_datacache_dir;
use datacache_store::{
    CacheConfig, CacheError, CacheErrorCode, DefaultPolicy, SyncCycle, SyncOptions,
    VersionedFileIndex,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

pub(crate) fn sync(
    config_path: &Path,
    local_only: bool,
    plan_only: bool,
    output_mode: OutputMode,
) -> Result<(), CliError> {
    let config = CacheConfig::load(config_path)?;
    let transport = ReqwestTransport::new(config.http_timeout()).map_err(|e| {
        CliError::from(CacheError::new(
            CacheErrorCode::Configuration,
            format!("http client setup failed: {e}"),
        ))
    })?;
    info!(
        config = %config_path.display(),
        catalog = config.catalog.kind().as_str(),
        endpoint = config.catalog.endpoint(),
        local_only,
        plan_only,
        "starting update cycle"
    );
    let report = SyncCycle::new(&config, &transport).run(SyncOptions {
        local_only,
        plan_only,
    })?;
    if output_mode.json {
        let payload = serde_json::to_value(&report).map_err(|e| CliError::internal(e.to_string()))?;
        emit_ok(output_mode, payload).map_err(CliError::internal)
    } else {
        print!("{}", render_report(&report, plan_only));
        Ok(())
    }
}

pub(crate) fn list(location: &CacheLocation, all: bool, output_mode: OutputMode) -> Result<(), CliError> {
    let root = cache_root(location)?;
    let index = VersionedFileIndex::scan(&root)?;
    let names = index.list_most_recent(all);
    if output_mode.json {
        emit_ok(
            output_mode,
            json!({"cache_directory": root, "files": names}),
        )
        .map_err(CliError::internal)
    } else {
        for name in names {
            println!("{name}");
        }
        Ok(())
    }
}

pub(crate) fn resolve(
    name: &str,
    location: &CacheLocation,
    keep_name: bool,
    fallback: Option<String>,
    output_mode: OutputMode,
) -> Result<(), CliError> {
    let policy = match (keep_name, fallback) {
        (_, Some(fallback)) => DefaultPolicy::Fallback(fallback),
        (true, None) => DefaultPolicy::KeepName,
        (false, None) => DefaultPolicy::Raise,
    };
    let root = cache_root(location)?;
    let index = VersionedFileIndex::scan(&root)?;
    let resolved = index.resolve_requested_name(name, &policy)?;
    if output_mode.json {
        emit_ok(
            output_mode,
            json!({
                "requested": name,
                "resolved": resolved,
                "path": root.join(&resolved),
            }),
        )
        .map_err(CliError::internal)
    } else {
        println!("{resolved}");
        Ok(())
    }
}

/// `--cache-dir`, else the configured directory, else the default root.
fn cache_root(location: &CacheLocation) -> Result<PathBuf, CacheError> {
    if let Some(dir) = &location.cache_dir {
        return Ok(dir.clone());
    }
    match &location.config {
        Some(path) => Ok(CacheConfig::load(path)?.resolved_cache_directory()),
        None => Ok(resolve_datacache_dir()),
    }
}
