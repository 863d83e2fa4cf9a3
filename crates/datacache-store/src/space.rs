// SPDX-License-Identifier: Apache-2.0

use crate::budget::SpaceBudget;
use crate::error::{CacheError, CacheErrorCode};
use crate::index::VersionedFileIndex;
use datacache_model::LocalFileEntry;
use serde::Serialize;
use std::fs;
use tracing::{error, info, warn};

pub const DEFAULT_KEEP_VERSIONS_PER_KEY: usize = 2;
pub const DEFAULT_EVICTION_MARGIN_FRACTION: f64 = 0.10;

/// Outcome of the space check, before anything is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SpaceAssessment {
    /// Enough room including the safety margin.
    Sufficient,
    /// Deleting the listed superseded versions covers the shortfall.
    EvictionNeeded {
        candidates: Vec<String>,
        recoverable_bytes: u64,
    },
    /// Even full eviction leaves too little room.
    Insufficient {
        shortfall_bytes: u64,
        recoverable_bytes: u64,
    },
}

/// Keeps the fetch phase within the quota by deleting superseded versions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSpaceManager {
    pub keep_versions_per_key: usize,
    pub margin_fraction: f64,
}

impl Default for CacheSpaceManager {
    fn default() -> Self {
        Self {
            keep_versions_per_key: DEFAULT_KEEP_VERSIONS_PER_KEY,
            margin_fraction: DEFAULT_EVICTION_MARGIN_FRACTION,
        }
    }
}

impl CacheSpaceManager {
    #[must_use]
    pub fn margin_bytes(&self, budget: &SpaceBudget) -> u64 {
        (budget.quota_bytes() as f64 * self.margin_fraction).floor() as u64
    }

    /// Versions beyond the newest `keep_versions_per_key` of each generic
    /// key, oldest first.
    pub fn scavenge_candidates(&self, index: &mut VersionedFileIndex) -> Vec<LocalFileEntry> {
        let mut candidates: Vec<LocalFileEntry> = index
            .enumerate_all_versions()
            .into_values()
            .flat_map(|versions| versions.into_iter().skip(self.keep_versions_per_key))
            .collect();
        candidates.sort_by(|a, b| a.recency_key().cmp(&b.recency_key()));
        candidates
    }

    pub fn assess(
        &self,
        required_bytes: u64,
        index: &mut VersionedFileIndex,
        budget: &SpaceBudget,
    ) -> SpaceAssessment {
        let available = budget.available_bytes();
        let margin = self.margin_bytes(budget);
        if available.saturating_sub(margin) >= required_bytes {
            return SpaceAssessment::Sufficient;
        }
        let candidates = self.scavenge_candidates(index);
        let recoverable_bytes: u64 = candidates.iter().map(|e| e.size_on_disk).sum();
        // Past eviction the margin no longer applies.
        let shortfall_bytes = required_bytes.saturating_sub(available);
        if candidates.is_empty() && shortfall_bytes == 0 {
            return SpaceAssessment::Sufficient;
        }
        if recoverable_bytes < shortfall_bytes {
            return SpaceAssessment::Insufficient {
                shortfall_bytes,
                recoverable_bytes,
            };
        }
        SpaceAssessment::EvictionNeeded {
            candidates: candidates.into_iter().map(|e| e.file_name).collect(),
            recoverable_bytes,
        }
    }

    /// Ensures `required_bytes` fit, evicting when needed. Returns the names
    /// of deleted files. Nothing is deleted when eviction could not free
    /// enough space.
    pub fn preflight(
        &self,
        required_bytes: u64,
        index: &mut VersionedFileIndex,
        budget: &mut SpaceBudget,
    ) -> Result<Vec<String>, CacheError> {
        let assessment = self.assess(required_bytes, index, budget);
        let candidates = match assessment {
            SpaceAssessment::Sufficient => return Ok(Vec::new()),
            SpaceAssessment::Insufficient {
                shortfall_bytes,
                recoverable_bytes,
            } => {
                error!(
                    required_bytes,
                    available_bytes = budget.available_bytes(),
                    shortfall_bytes,
                    recoverable_bytes,
                    "cache space insufficient even after eviction"
                );
                return Err(space_exhausted(required_bytes, budget));
            }
            SpaceAssessment::EvictionNeeded { candidates, .. } => candidates,
        };

        let mut evicted = Vec::new();
        for name in candidates {
            let Some(entry) = index.forget(&name) else {
                continue;
            };
            match fs::remove_file(&entry.full_path) {
                Ok(()) => {
                    budget.release(entry.size_on_disk);
                    info!(file = %name, bytes = entry.size_on_disk, "superseded version evicted");
                    evicted.push(name);
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "eviction failed; file kept");
                    index.record(entry);
                }
            }
        }

        if budget.available_bytes() < required_bytes {
            error!(
                required_bytes,
                available_bytes = budget.available_bytes(),
                "cache space insufficient after eviction"
            );
            return Err(space_exhausted(required_bytes, budget));
        }
        Ok(evicted)
    }
}

fn space_exhausted(required_bytes: u64, budget: &SpaceBudget) -> CacheError {
    CacheError::new(
        CacheErrorCode::SpaceExhausted,
        format!(
            "cache space insufficient: {required_bytes} bytes required, {} of {} bytes available",
            budget.available_bytes(),
            budget.quota_bytes()
        ),
    )
}
