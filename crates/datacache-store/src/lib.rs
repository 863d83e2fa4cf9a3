// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Versioned local data-file cache.
//!
//! A cycle scans the cache directory into a [`VersionedFileIndex`], obtains
//! descriptors through the [`MetadataCache`] or the remote catalog, plans
//! updates with the [`UpdatePlanner`], reserves space with the
//! [`CacheSpaceManager`] and commits downloads through the [`Fetcher`].

mod budget;
mod config;
mod cycle;
mod error;
mod fetcher;
mod index;
mod planner;
mod snapshot;
mod space;
mod staleness;

pub use budget::SpaceBudget;
pub use config::CacheConfig;
pub use cycle::{CatalogSource, FailedFile, PlannedFile, SyncCycle, SyncOptions, SyncReport};
pub use error::{CacheError, CacheErrorCode};
pub use fetcher::{Accounting, CommitOutcome, Fetcher};
pub use index::{partial_path, DefaultPolicy, VersionedFileIndex};
pub use planner::UpdatePlanner;
pub use snapshot::{MetadataCache, Snapshot, SnapshotStatus, SNAPSHOT_FORMAT, SNAPSHOT_VERSION};
pub use space::{
    CacheSpaceManager, SpaceAssessment, DEFAULT_EVICTION_MARGIN_FRACTION,
    DEFAULT_KEEP_VERSIONS_PER_KEY,
};
pub use staleness::{StalenessPolicy, DEFAULT_REMOTE_NEWER_GRACE_SECONDS};

pub const CRATE_NAME: &str = "datacache-store";
