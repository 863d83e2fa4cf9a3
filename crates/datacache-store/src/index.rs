// SPDX-License-Identifier: Apache-2.0

use crate::error::{CacheError, CacheErrorCode};
use chrono::{DateTime, Utc};
use datacache_model::{split_timestamped_name, LocalFileEntry};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

/// Hidden download target for `file_name` until it is verified.
#[must_use]
pub fn partial_path(root: &Path, file_name: &str) -> PathBuf {
    root.join(format!(".{file_name}{PARTIAL_SUFFIX}"))
}

/// What [`VersionedFileIndex::resolve_requested_name`] does when nothing
/// on disk matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultPolicy {
    Raise,
    KeepName,
    Fallback(String),
}

/// Data files of one cache directory, grouped by generic key.
///
/// Hidden files (metadata snapshots, in-flight downloads) are never indexed.
#[derive(Debug, Clone)]
pub struct VersionedFileIndex {
    root: PathBuf,
    versions: BTreeMap<String, Vec<LocalFileEntry>>,
    untimestamped: BTreeMap<String, LocalFileEntry>,
}

impl VersionedFileIndex {
    /// Empty index for `root`, without touching the filesystem.
    #[must_use]
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            versions: BTreeMap::new(),
            untimestamped: BTreeMap::new(),
        }
    }

    /// Lists `root` once. Leftover partial downloads from an interrupted run
    /// are deleted.
    pub fn scan(root: &Path) -> Result<Self, CacheError> {
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(CacheError::new(
                    CacheErrorCode::NotFound,
                    format!("cache path {} is not a directory", root.display()),
                ))
            }
            Err(e) => {
                return Err(CacheError::new(
                    CacheErrorCode::NotFound,
                    format!("cache directory {} is not readable: {e}", root.display()),
                ))
            }
        }

        let mut index = Self::empty(root);
        let entries =
            fs::read_dir(root).map_err(|e| CacheError::io("cache directory listing failed", &e))?;
        for item in entries {
            let item = item.map_err(|e| CacheError::io("cache directory listing failed", &e))?;
            let Some(name) = item.file_name().to_str().map(ToString::to_string) else {
                warn!(path = %item.path().display(), "skipping non utf-8 file name");
                continue;
            };
            let path = item.path();
            if name.starts_with('.') {
                if name.ends_with(PARTIAL_SUFFIX) {
                    warn!(file = %name, "removing partial download left by an interrupted run");
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(file = %name, error = %e, "partial download could not be removed");
                    }
                }
                continue;
            }
            let meta = item
                .metadata()
                .map_err(|e| CacheError::io("cache entry stat failed", &e))?;
            if !meta.is_file() {
                continue;
            }
            index.record(entry_from_metadata(&name, path, &meta));
        }
        debug!(
            root = %root.display(),
            keys = index.versions.len(),
            untimestamped = index.untimestamped.len(),
            "cache directory indexed"
        );
        Ok(index)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Latest version of `generic_key`; equal timestamps resolve to the
    /// lexicographically last file name.
    #[must_use]
    pub fn most_recent(&self, generic_key: &str) -> Option<&LocalFileEntry> {
        self.versions
            .get(generic_key)?
            .iter()
            .max_by(|a, b| a.recency_key().cmp(&b.recency_key()))
    }

    #[must_use]
    pub fn untimestamped(&self, file_name: &str) -> Option<&LocalFileEntry> {
        self.untimestamped.get(file_name)
    }

    #[must_use]
    pub fn contains_file(&self, file_name: &str) -> bool {
        if self.untimestamped.contains_key(file_name) {
            return true;
        }
        split_timestamped_name(file_name)
            .and_then(|t| self.versions.get(&t.generic_key()))
            .is_some_and(|v| v.iter().any(|e| e.file_name == file_name))
    }

    /// Maps a possibly outdated file name to the newest file sharing its
    /// generic key.
    pub fn resolve_requested_name(
        &self,
        name: &str,
        policy: &DefaultPolicy,
    ) -> Result<String, CacheError> {
        let found = match split_timestamped_name(name) {
            Some(split) => self
                .most_recent(&split.generic_key())
                .map(|e| e.file_name.clone()),
            None => self.untimestamped.get(name).map(|e| e.file_name.clone()),
        };
        if let Some(found) = found {
            return Ok(found);
        }
        match policy {
            DefaultPolicy::Raise => Err(CacheError::new(
                CacheErrorCode::NotFound,
                format!("no cached file matches {name}"),
            )),
            DefaultPolicy::KeepName => Ok(name.to_string()),
            DefaultPolicy::Fallback(fallback) => Ok(fallback.clone()),
        }
    }

    /// Newest file per generic key, optionally with the untimestamped
    /// files, sorted by name.
    #[must_use]
    pub fn list_most_recent(&self, include_untimestamped: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .versions
            .keys()
            .filter_map(|key| self.most_recent(key))
            .map(|e| e.file_name.clone())
            .collect();
        if include_untimestamped {
            names.extend(self.untimestamped.keys().cloned());
        }
        names.sort();
        names
    }

    /// Every version of every generic key, newest first, with sizes and
    /// modification times refreshed from disk. Versions that vanished since
    /// the scan are dropped from the index.
    pub fn enumerate_all_versions(&mut self) -> BTreeMap<String, Vec<LocalFileEntry>> {
        let mut out = BTreeMap::new();
        for (key, versions) in &mut self.versions {
            versions.retain_mut(|entry| match fs::metadata(&entry.full_path) {
                Ok(meta) => {
                    *entry = entry_from_metadata(&entry.file_name, entry.full_path.clone(), &meta);
                    true
                }
                Err(e) => {
                    warn!(file = %entry.file_name, error = %e, "indexed file disappeared");
                    false
                }
            });
            let mut sorted = versions.clone();
            sorted.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
            if !sorted.is_empty() {
                out.insert(key.clone(), sorted);
            }
        }
        self.versions.retain(|_, v| !v.is_empty());
        out
    }

    /// Adds or replaces (by file name) one entry.
    pub fn record(&mut self, entry: LocalFileEntry) {
        match entry.generic_key.clone() {
            Some(key) => {
                let versions = self.versions.entry(key).or_default();
                versions.retain(|e| e.file_name != entry.file_name);
                versions.push(entry);
            }
            None => {
                self.untimestamped.insert(entry.file_name.clone(), entry);
            }
        }
    }

    pub fn forget(&mut self, file_name: &str) -> Option<LocalFileEntry> {
        if let Some(entry) = self.untimestamped.remove(file_name) {
            return Some(entry);
        }
        let key = split_timestamped_name(file_name)?.generic_key();
        let versions = self.versions.get_mut(&key)?;
        let position = versions.iter().position(|e| e.file_name == file_name)?;
        let removed = versions.remove(position);
        if versions.is_empty() {
            self.versions.remove(&key);
        }
        Some(removed)
    }

    /// Bytes held by indexed data files.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.versions
            .values()
            .flatten()
            .chain(self.untimestamped.values())
            .map(|e| e.size_on_disk)
            .sum()
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.versions.values().map(Vec::len).sum::<usize>() + self.untimestamped.len()
    }
}

pub(crate) fn entry_from_metadata(name: &str, path: PathBuf, meta: &fs::Metadata) -> LocalFileEntry {
    let modified_at = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    LocalFileEntry::from_stat(name, path, meta.len(), modified_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, bytes: usize) {
        fs::write(dir.join(name), vec![b'x'; bytes]).expect("write");
    }

    #[test]
    fn scan_groups_versions_and_keeps_latest() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), "report-2021-04-08-21h20.csv", 3);
        touch(dir.path(), "report-2021-04-09-08h00.csv", 4);
        touch(dir.path(), "stock-20210407-101500.json", 5);
        touch(dir.path(), "population.csv", 6);

        let index = VersionedFileIndex::scan(dir.path()).expect("scan");
        assert_eq!(
            index.most_recent("report-!.csv").map(|e| e.file_name.as_str()),
            Some("report-2021-04-09-08h00.csv")
        );
        assert_eq!(index.file_count(), 4);
        assert_eq!(index.total_bytes(), 18);
        assert_eq!(
            index.list_most_recent(false),
            vec!["report-2021-04-09-08h00.csv", "stock-20210407-101500.json"]
        );
        assert!(index.list_most_recent(true).contains(&"population.csv".to_string()));
    }

    #[test]
    fn scan_of_empty_directory_is_empty() {
        let dir = tempdir().expect("tempdir");
        let index = VersionedFileIndex::scan(dir.path()).expect("scan");
        assert_eq!(index.file_count(), 0);
        assert!(index.list_most_recent(true).is_empty());
    }

    #[test]
    fn scan_rejects_missing_or_non_directory_paths() {
        let dir = tempdir().expect("tempdir");
        let missing = VersionedFileIndex::scan(&dir.path().join("absent")).expect_err("missing");
        assert_eq!(missing.code, CacheErrorCode::NotFound);
        touch(dir.path(), "plain.txt", 1);
        let file = VersionedFileIndex::scan(&dir.path().join("plain.txt")).expect_err("file");
        assert_eq!(file.code, CacheErrorCode::NotFound);
    }

    #[test]
    fn scan_removes_partials_and_ignores_snapshots() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), ".report-2021-04-08-21h20.csv.partial", 9);
        touch(dir.path(), ".datacache-json-rest.json", 9);
        let index = VersionedFileIndex::scan(dir.path()).expect("scan");
        assert_eq!(index.file_count(), 0);
        assert!(!partial_path(dir.path(), "report-2021-04-08-21h20.csv").exists());
        assert!(dir.path().join(".datacache-json-rest.json").exists());
    }

    #[test]
    fn scan_sweeps_snapshot_temp_left_by_a_crashed_write() {
        let dir = tempdir().expect("tempdir");
        let snapshot = dir.path().join(".datacache-sparql.json");
        crate::snapshot::write_atomic_file(&snapshot, b"{}").expect("write");
        touch(dir.path(), ".datacache-sparql.json.4242.partial", 7);

        let names = |dir: &Path| -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(dir)
                .expect("ls")
                .filter_map(|e| e.ok()?.file_name().into_string().ok())
                .collect();
            names.sort();
            names
        };
        assert_eq!(
            names(dir.path()),
            vec![".datacache-sparql.json", ".datacache-sparql.json.4242.partial"]
        );
        let index = VersionedFileIndex::scan(dir.path()).expect("scan");
        assert_eq!(index.file_count(), 0);
        assert_eq!(names(dir.path()), vec![".datacache-sparql.json"]);
    }

    #[test]
    fn identical_timestamps_resolve_to_last_name() {
        let dir = tempdir().expect("tempdir");
        let mut index = VersionedFileIndex::empty(dir.path());
        let at = Utc::now();
        for name in ["data-2021-04-08-10h00.csv", "data-20210408-100000.csv"] {
            index.record(LocalFileEntry::from_stat(name, dir.path().join(name), 1, at));
        }
        assert_eq!(
            index.most_recent("data-!.csv").map(|e| e.file_name.as_str()),
            Some("data-20210408-100000.csv")
        );

        index.record(LocalFileEntry::from_stat(
            "data-2021-04-08-10h00.csv",
            dir.path().join("data-2021-04-08-10h00.csv"),
            2,
            at,
        ));
        assert_eq!(index.file_count(), 2, "same file name replaces the entry");
        assert_eq!(index.total_bytes(), 3);
    }

    #[test]
    fn resolve_requested_name_follows_policy() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), "report-2021-04-09-08h00.csv", 1);
        touch(dir.path(), "notes.txt", 1);
        let index = VersionedFileIndex::scan(dir.path()).expect("scan");

        assert_eq!(
            index
                .resolve_requested_name("report-2020-01-01-00h00.csv", &DefaultPolicy::Raise)
                .expect("resolve"),
            "report-2021-04-09-08h00.csv"
        );
        assert_eq!(
            index
                .resolve_requested_name("notes.txt", &DefaultPolicy::Raise)
                .expect("resolve"),
            "notes.txt"
        );
        let err = index
            .resolve_requested_name("other-2020-01-01-00h00.csv", &DefaultPolicy::Raise)
            .expect_err("no match");
        assert_eq!(err.code, CacheErrorCode::NotFound);
        assert_eq!(
            index
                .resolve_requested_name("missing.csv", &DefaultPolicy::KeepName)
                .expect("keep"),
            "missing.csv"
        );
        assert_eq!(
            index
                .resolve_requested_name(
                    "missing.csv",
                    &DefaultPolicy::Fallback("default.csv".to_string())
                )
                .expect("fallback"),
            "default.csv"
        );
    }

    #[test]
    fn enumerate_all_versions_drops_vanished_files() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), "report-2021-04-08-21h20.csv", 1);
        touch(dir.path(), "report-2021-04-09-08h00.csv", 1);
        let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
        fs::remove_file(dir.path().join("report-2021-04-09-08h00.csv")).expect("rm");

        let all = index.enumerate_all_versions();
        let versions = all.get("report-!.csv").expect("key");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].file_name, "report-2021-04-08-21h20.csv");
        assert_eq!(
            index.most_recent("report-!.csv").map(|e| e.file_name.as_str()),
            Some("report-2021-04-08-21h20.csv")
        );
    }
}
