// SPDX-License-Identifier: Apache-2.0

use crate::error::{CacheError, CacheErrorCode};
use crate::index::partial_path;
use chrono::{DateTime, Duration, Utc};
use datacache_catalog::CatalogKind;
use datacache_model::FileDescriptor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SNAPSHOT_FORMAT: &str = "datacache-metadata-snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotEnvelope {
    format: String,
    version: u32,
    catalog: CatalogKind,
    fetched_at: DateTime<Utc>,
    descriptors: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub descriptors: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Fresh(Snapshot),
    /// Older than the validity window; still usable when the catalog is
    /// unreachable.
    Stale(Snapshot),
    Missing,
}

impl SnapshotStatus {
    /// Descriptors and whether they are fresh.
    #[must_use]
    pub fn into_parts(self) -> (Vec<FileDescriptor>, bool) {
        match self {
            Self::Fresh(s) => (s.descriptors, true),
            Self::Stale(s) => (s.descriptors, false),
            Self::Missing => (Vec::new(), false),
        }
    }
}

/// Catalog snapshot stored as a dotfile in the cache directory, one per
/// catalog kind.
#[derive(Debug, Clone)]
pub struct MetadataCache {
    path: PathBuf,
    kind: CatalogKind,
}

impl MetadataCache {
    #[must_use]
    pub fn new(cache_dir: &Path, kind: CatalogKind) -> Self {
        Self {
            path: cache_dir.join(kind.snapshot_file_name()),
            kind,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An unreadable or foreign snapshot counts as missing.
    pub fn load(&self, validity: Duration, now: DateTime<Utc>) -> Result<SnapshotStatus, CacheError> {
        let Some(envelope) = self.read_envelope()? else {
            return Ok(SnapshotStatus::Missing);
        };
        let age = now - envelope.fetched_at;
        let snapshot = Snapshot {
            fetched_at: envelope.fetched_at,
            descriptors: envelope.descriptors,
        };
        if age <= validity {
            Ok(SnapshotStatus::Fresh(snapshot))
        } else {
            info!(
                snapshot = %self.path.display(),
                age_seconds = age.num_seconds(),
                "metadata snapshot is stale"
            );
            Ok(SnapshotStatus::Stale(snapshot))
        }
    }

    /// Overwrites the snapshot atomically.
    pub fn store(&self, descriptors: &[FileDescriptor], now: DateTime<Utc>) -> Result<(), CacheError> {
        let envelope = SnapshotEnvelope {
            format: SNAPSHOT_FORMAT.to_string(),
            version: SNAPSHOT_VERSION,
            catalog: self.kind,
            fetched_at: now,
            descriptors: descriptors.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope).map_err(|e| {
            CacheError::new(CacheErrorCode::Internal, format!("snapshot encode failed: {e}"))
        })?;
        write_atomic_file(&self.path, &bytes)?;
        info!(
            snapshot = %self.path.display(),
            descriptors = descriptors.len(),
            "metadata snapshot stored"
        );
        Ok(())
    }

    /// Snapshot regardless of age, for runs that must not touch the network.
    pub fn force_local_only(&self) -> Result<Snapshot, CacheError> {
        match self.read_envelope()? {
            Some(envelope) => Ok(Snapshot {
                fetched_at: envelope.fetched_at,
                descriptors: envelope.descriptors,
            }),
            None => Err(CacheError::new(
                CacheErrorCode::Configuration,
                format!(
                    "local-only run requested but no metadata snapshot exists at {}",
                    self.path.display()
                ),
            )),
        }
    }

    fn read_envelope(&self) -> Result<Option<SnapshotEnvelope>, CacheError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io("metadata snapshot read failed", &e)),
        };
        let envelope: SnapshotEnvelope = match serde_json::from_slice(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    snapshot = %self.path.display(),
                    line = e.line(),
                    column = e.column(),
                    error = %e,
                    "ignoring unreadable metadata snapshot"
                );
                return Ok(None);
            }
        };
        if envelope.format != SNAPSHOT_FORMAT
            || envelope.version != SNAPSHOT_VERSION
            || envelope.catalog != self.kind
        {
            warn!(
                snapshot = %self.path.display(),
                format = %envelope.format,
                version = envelope.version,
                "ignoring metadata snapshot written for another format or catalog"
            );
            return Ok(None);
        }
        Ok(Some(envelope))
    }
}

pub(crate) fn write_atomic_file(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let parent = path.parent().ok_or_else(|| {
        CacheError::new(CacheErrorCode::Internal, "atomic write missing parent")
    })?;
    // Carries the partial suffix so a scan after a crash sweeps it away.
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("file");
    let tmp = partial_path(
        parent,
        &format!("{}.{}", file_name.trim_start_matches('.'), std::process::id()),
    );
    let written = fs::File::create(&tmp).and_then(|mut f| {
        f.write_all(bytes)?;
        f.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(CacheError::io("snapshot write failed", &e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(CacheError::io("snapshot publish failed", &e));
    }
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacache_model::{Checksum, UpdateFrequency};
    use tempfile::tempdir;

    fn descriptors() -> Vec<FileDescriptor> {
        vec![
            FileDescriptor::new("vaccins-2021-04-08-19h03.csv", "https://x/1", "csv")
                .with_publisher("Sante publique France")
                .with_checksum(Checksum::new("sha256", "AB12"))
                .with_declared_size(1234)
                .with_remote_modified_at(Utc::now())
                .with_update_frequency(UpdateFrequency::Weekly),
            FileDescriptor::new("codes.csv", "https://x/2", "csv"),
        ]
    }

    #[test]
    fn store_then_load_round_trips_and_is_fresh() {
        let dir = tempdir().expect("tempdir");
        let cache = MetadataCache::new(dir.path(), CatalogKind::JsonRest);
        let now = Utc::now();
        cache.store(&descriptors(), now).expect("store");
        let (loaded, fresh) = cache.load(Duration::zero(), now).expect("load").into_parts();
        assert!(fresh);
        assert_eq!(loaded, descriptors_with_same_times(&loaded));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].checksum, Some(Checksum::new("sha256", "ab12")));
    }

    fn descriptors_with_same_times(loaded: &[FileDescriptor]) -> Vec<FileDescriptor> {
        let mut expected = descriptors();
        expected[0].remote_modified_at = loaded[0].remote_modified_at;
        expected
    }

    #[test]
    fn old_snapshot_is_stale_but_usable() {
        let dir = tempdir().expect("tempdir");
        let cache = MetadataCache::new(dir.path(), CatalogKind::Sparql);
        let then = Utc::now() - Duration::hours(3);
        cache.store(&descriptors(), then).expect("store");
        match cache.load(Duration::hours(1), Utc::now()).expect("load") {
            SnapshotStatus::Stale(s) => assert_eq!(s.descriptors.len(), 2),
            other => panic!("expected stale snapshot, got {other:?}"),
        }
    }

    #[test]
    fn snapshots_are_namespaced_by_catalog_kind() {
        let dir = tempdir().expect("tempdir");
        MetadataCache::new(dir.path(), CatalogKind::JsonRest)
            .store(&descriptors(), Utc::now())
            .expect("store");
        let sparql = MetadataCache::new(dir.path(), CatalogKind::Sparql);
        assert_eq!(
            sparql.load(Duration::hours(1), Utc::now()).expect("load"),
            SnapshotStatus::Missing
        );
    }

    #[test]
    fn local_only_without_snapshot_is_a_configuration_error() {
        let dir = tempdir().expect("tempdir");
        let cache = MetadataCache::new(dir.path(), CatalogKind::JsonRest);
        let err = cache.force_local_only().expect_err("no snapshot");
        assert_eq!(err.code, CacheErrorCode::Configuration);
    }

    #[test]
    fn corrupt_snapshot_is_treated_as_missing() {
        let dir = tempdir().expect("tempdir");
        let cache = MetadataCache::new(dir.path(), CatalogKind::JsonRest);
        fs::write(cache.path(), b"{not json").expect("write");
        assert_eq!(
            cache.load(Duration::hours(1), Utc::now()).expect("load"),
            SnapshotStatus::Missing
        );
    }
}
