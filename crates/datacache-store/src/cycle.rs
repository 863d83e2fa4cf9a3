// SPDX-License-Identifier: Apache-2.0

//! One synchronous plan-and-fetch cycle over a cache directory.

use crate::budget::SpaceBudget;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::fetcher::{CommitOutcome, Fetcher};
use crate::index::VersionedFileIndex;
use crate::planner::UpdatePlanner;
use crate::snapshot::{MetadataCache, SnapshotStatus};
use crate::space::{CacheSpaceManager, SpaceAssessment};
use crate::staleness::StalenessPolicy;
use chrono::{DateTime, Utc};
use datacache_catalog::{CatalogFetch, HttpTransport};
use datacache_model::{FileDescriptor, UpdateReason};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Plan from the stored snapshot only; never contact the catalog.
    pub local_only: bool,
    /// Stop after planning and accounting; nothing is written or deleted.
    pub plan_only: bool,
}

/// Where the descriptors of a cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    FreshSnapshot,
    Remote,
    /// Some catalog calls failed; fresh results were completed from the
    /// expired snapshot, which is kept as is.
    PartialRemote,
    /// Catalog unreachable; an expired snapshot was used.
    StaleSnapshot,
    /// Catalog unreachable and no snapshot exists.
    Unavailable,
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    pub file_name: String,
    pub reason: UpdateReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub file_name: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub cache_directory: PathBuf,
    pub catalog_source: CatalogSource,
    pub descriptors: usize,
    pub planned: Vec<PlannedFile>,
    pub required_bytes: u64,
    pub space: Option<SpaceAssessment>,
    pub evicted: Vec<String>,
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub bytes_written: u64,
    pub available_bytes: u64,
}

/// Wires catalog, snapshot, planner, space manager and fetcher together.
pub struct SyncCycle<'a> {
    config: &'a CacheConfig,
    transport: &'a dyn HttpTransport,
}

impl<'a> SyncCycle<'a> {
    #[must_use]
    pub fn new(config: &'a CacheConfig, transport: &'a dyn HttpTransport) -> Self {
        Self { config, transport }
    }

    pub fn run(&self, options: SyncOptions) -> Result<SyncReport, CacheError> {
        self.run_at(options, Utc::now())
    }

    pub fn run_at(&self, options: SyncOptions, now: DateTime<Utc>) -> Result<SyncReport, CacheError> {
        let root = self.config.resolved_cache_directory();
        if !options.plan_only {
            fs::create_dir_all(&root)
                .map_err(|e| CacheError::io("cache directory creation failed", &e))?;
        }
        let mut index = if options.plan_only && !root.exists() {
            VersionedFileIndex::empty(&root)
        } else {
            VersionedFileIndex::scan(&root)?
        };
        let (descriptors, catalog_source) = self.descriptors(&root, options, now)?;

        let plan = UpdatePlanner.plan(&descriptors, &index);
        let staleness = StalenessPolicy {
            remote_newer_grace: self.config.remote_newer_grace(),
        };
        let fetcher = Fetcher::new(
            self.transport,
            staleness,
            self.config.default_size_estimate_bytes,
        );
        let accounting = fetcher.account(&plan, &index, now);
        let mut budget = SpaceBudget::new(self.config.quota_bytes, index.total_bytes());
        let space_manager = CacheSpaceManager {
            keep_versions_per_key: self.config.keep_versions_per_key,
            margin_fraction: self.config.eviction_margin_fraction,
        };
        info!(
            cache = %root.display(),
            descriptors = descriptors.len(),
            planned = plan.len(),
            firing = accounting.firing_requests,
            required_bytes = accounting.required_bytes,
            available_bytes = budget.available_bytes(),
            "update plan ready"
        );

        let mut report = SyncReport {
            cache_directory: root,
            catalog_source,
            descriptors: descriptors.len(),
            planned: plan
                .iter()
                .map(|r| PlannedFile {
                    file_name: r.file_name().to_string(),
                    reason: r.reason,
                })
                .collect(),
            required_bytes: accounting.required_bytes,
            space: None,
            evicted: Vec::new(),
            downloaded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            bytes_written: 0,
            available_bytes: budget.available_bytes(),
        };

        if options.plan_only {
            report.space = Some(space_manager.assess(accounting.required_bytes, &mut index, &budget));
            return Ok(report);
        }

        report.evicted = space_manager.preflight(accounting.required_bytes, &mut index, &mut budget)?;

        for request in &plan {
            match fetcher.commit(request, &mut index, &mut budget, now) {
                Ok(CommitOutcome::Written { file_name, bytes }) => {
                    report.bytes_written += bytes;
                    report.downloaded.push(file_name);
                }
                Ok(CommitOutcome::Skipped) => report.skipped.push(request.file_name().to_string()),
                Err(e) if e.code.is_request_scoped() => {
                    warn!(file = %request.file_name(), error = %e, "update request failed; continuing");
                    report.failed.push(FailedFile {
                        file_name: request.file_name().to_string(),
                        code: e.code.as_str().to_string(),
                        message: e.message,
                    });
                }
                Err(e) => {
                    error!(file = %request.file_name(), error = %e, "update cycle aborted");
                    return Err(e);
                }
            }
        }
        report.available_bytes = budget.available_bytes();
        info!(
            downloaded = report.downloaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            evicted = report.evicted.len(),
            bytes_written = report.bytes_written,
            "update cycle complete"
        );
        Ok(report)
    }

    fn descriptors(
        &self,
        root: &std::path::Path,
        options: SyncOptions,
        now: DateTime<Utc>,
    ) -> Result<(Vec<FileDescriptor>, CatalogSource), CacheError> {
        let snapshots = MetadataCache::new(root, self.config.catalog.kind());
        if options.local_only {
            let snapshot = snapshots.force_local_only()?;
            return Ok((snapshot.descriptors, CatalogSource::LocalOnly));
        }
        let stale = match snapshots.load(self.config.validity_window(), now)? {
            SnapshotStatus::Fresh(snapshot) => {
                info!(fetched_at = %snapshot.fetched_at, "using fresh metadata snapshot");
                return Ok((snapshot.descriptors, CatalogSource::FreshSnapshot));
            }
            SnapshotStatus::Stale(snapshot) => Some(snapshot),
            SnapshotStatus::Missing => None,
        };
        match self.config.catalog.fetch_descriptors(self.transport)? {
            CatalogFetch::Fresh(descriptors) => {
                if options.plan_only {
                    return Ok((descriptors, CatalogSource::Remote));
                }
                snapshots.store(&descriptors, now)?;
                Ok((descriptors, CatalogSource::Remote))
            }
            CatalogFetch::Partial {
                mut descriptors,
                failed_calls,
                reason,
            } => {
                warn!(%reason, failed_calls, "catalog partially unavailable; snapshot not refreshed");
                if let Some(snapshot) = stale {
                    let fetched: BTreeSet<String> =
                        descriptors.iter().map(|d| d.name.clone()).collect();
                    descriptors.extend(
                        snapshot
                            .descriptors
                            .into_iter()
                            .filter(|d| !fetched.contains(&d.name)),
                    );
                }
                Ok((descriptors, CatalogSource::PartialRemote))
            }
            CatalogFetch::Unavailable { reason } => match stale {
                Some(snapshot) => {
                    warn!(%reason, fetched_at = %snapshot.fetched_at, "catalog unavailable; using stale snapshot");
                    Ok((snapshot.descriptors, CatalogSource::StaleSnapshot))
                }
                None => {
                    warn!(%reason, "catalog unavailable and no snapshot; nothing to update");
                    Ok((Vec::new(), CatalogSource::Unavailable))
                }
            },
        }
    }
}

impl SyncReport {
    /// Whether every planned request that fired was committed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
