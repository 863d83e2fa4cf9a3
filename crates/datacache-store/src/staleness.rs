// SPDX-License-Identifier: Apache-2.0

//! Commit-time staleness test shared by accounting and commit modes.

use crate::index::VersionedFileIndex;
use chrono::{DateTime, Duration, Utc};
use datacache_model::{UpdateReason, UpdateRequest};
use tracing::debug;

pub const DEFAULT_REMOTE_NEWER_GRACE_SECONDS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// A remote modification time must exceed the local one by more than
    /// this to count as newer.
    pub remote_newer_grace: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            remote_newer_grace: Duration::seconds(DEFAULT_REMOTE_NEWER_GRACE_SECONDS),
        }
    }
}

impl StalenessPolicy {
    /// Whether `request` actually triggers a download against the current
    /// state of `index`.
    #[must_use]
    pub fn fires(
        &self,
        request: &UpdateRequest,
        index: &VersionedFileIndex,
        now: DateTime<Utc>,
    ) -> bool {
        let descriptor = &request.descriptor;
        let fires = match request.reason {
            UpdateReason::NoLocalCopy => true,
            UpdateReason::NoGenericTimestamp => !index.contains_file(&descriptor.name),
            UpdateReason::RemoteIsNewer => {
                match (self.local_modified_at(request, index), descriptor.remote_modified_at) {
                    (Some(local), Some(remote)) => remote - local > self.remote_newer_grace,
                    (None, _) => true,
                    (Some(_), None) => false,
                }
            }
            UpdateReason::FrequencyImpliesStale => {
                match (
                    self.local_modified_at(request, index),
                    descriptor.update_frequency,
                ) {
                    (None, _) => true,
                    (Some(local), Some(frequency)) => match frequency.interval() {
                        Some(interval) => now - local > interval,
                        None => true,
                    },
                    (Some(_), None) => false,
                }
            }
        };
        debug!(
            file = %descriptor.name,
            reason = %request.reason,
            fires,
            "staleness evaluated"
        );
        fires
    }

    fn local_modified_at(
        &self,
        request: &UpdateRequest,
        index: &VersionedFileIndex,
    ) -> Option<DateTime<Utc>> {
        request
            .generic_key
            .as_deref()
            .and_then(|key| index.most_recent(key))
            .map(|entry| entry.modified_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacache_model::{FileDescriptor, LocalFileEntry, UpdateFrequency};
    use std::path::PathBuf;

    const LOCAL: &str = "report-2021-04-08-21h20.csv";

    fn index_with_local(modified_at: DateTime<Utc>) -> VersionedFileIndex {
        let mut index = VersionedFileIndex::empty("/cache");
        index.record(LocalFileEntry::from_stat(
            LOCAL,
            PathBuf::from("/cache").join(LOCAL),
            10,
            modified_at,
        ));
        index
    }

    fn request(reason: UpdateReason, descriptor: FileDescriptor) -> UpdateRequest {
        UpdateRequest {
            reason,
            descriptor,
            generic_key: Some("report-!.csv".to_string()),
            replaces: None,
        }
    }

    #[test]
    fn remote_newer_beyond_grace_fires() {
        let local = Utc::now() - Duration::hours(1);
        let index = index_with_local(local);
        let d = FileDescriptor::new(LOCAL, "https://x/r", "csv")
            .with_remote_modified_at(local + Duration::minutes(10));
        assert!(StalenessPolicy::default().fires(&request(UpdateReason::RemoteIsNewer, d), &index, Utc::now()));
    }

    #[test]
    fn remote_newer_within_grace_does_not_fire() {
        let local = Utc::now() - Duration::hours(1);
        let index = index_with_local(local);
        let d = FileDescriptor::new(LOCAL, "https://x/r", "csv")
            .with_remote_modified_at(local + Duration::minutes(2));
        assert!(!StalenessPolicy::default().fires(&request(UpdateReason::RemoteIsNewer, d), &index, Utc::now()));
    }

    #[test]
    fn frequency_interval_is_compared_with_local_age() {
        let now = Utc::now();
        let index = index_with_local(now - Duration::days(3));
        let policy = StalenessPolicy::default();
        let weekly = FileDescriptor::new(LOCAL, "https://x/r", "csv")
            .with_update_frequency(UpdateFrequency::Weekly);
        let daily = weekly.clone().with_update_frequency(UpdateFrequency::Daily);
        let continuous = weekly.clone().with_update_frequency(UpdateFrequency::Continuous);
        assert!(!policy.fires(&request(UpdateReason::FrequencyImpliesStale, weekly), &index, now));
        assert!(policy.fires(&request(UpdateReason::FrequencyImpliesStale, daily), &index, now));
        assert!(policy.fires(&request(UpdateReason::FrequencyImpliesStale, continuous), &index, now));
    }

    #[test]
    fn untimestamped_name_fires_only_when_absent() {
        let mut index = VersionedFileIndex::empty("/cache");
        index.record(LocalFileEntry::from_stat(
            "codes.csv",
            PathBuf::from("/cache/codes.csv"),
            1,
            Utc::now(),
        ));
        let policy = StalenessPolicy::default();
        let present = UpdateRequest {
            reason: UpdateReason::NoGenericTimestamp,
            descriptor: FileDescriptor::new("codes.csv", "https://x/c", "csv"),
            generic_key: None,
            replaces: None,
        };
        let mut absent = present.clone();
        absent.descriptor.name = "regions.csv".to_string();
        assert!(!policy.fires(&present, &index, Utc::now()));
        assert!(policy.fires(&absent, &index, Utc::now()));
    }
}
