// SPDX-License-Identifier: Apache-2.0

use chrono::{NaiveDate, Utc};
use datacache_model::{FileDescriptor, LocalFileEntry};
use datacache_store::{UpdatePlanner, VersionedFileIndex};
use proptest::prelude::*;
use std::path::PathBuf;

fn versioned_name(day: u32, hour: u32) -> String {
    format!("hospital-2021-03-{day:02}-{hour:02}h00.csv")
}

fn entry(name: &str) -> LocalFileEntry {
    LocalFileEntry::from_stat(name, PathBuf::from("/cache").join(name), 1, Utc::now())
}

proptest! {
    #[test]
    fn most_recent_is_the_maximal_timestamp(
        stamps in prop::collection::vec((1u32..29, 0u32..24), 1..12),
    ) {
        let mut index = VersionedFileIndex::empty("/cache");
        for (day, hour) in &stamps {
            index.record(entry(&versioned_name(*day, *hour)));
        }
        let (day, hour) = stamps.iter().copied().max().expect("non-empty");
        let best = index.most_recent("hospital-!.csv").expect("indexed");
        prop_assert_eq!(&best.file_name, &versioned_name(day, hour));
        let expected = NaiveDate::from_ymd_opt(2021, 3, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0));
        prop_assert_eq!(best.timestamp, expected);
    }

    #[test]
    fn older_entries_never_displace_and_newer_always_do(
        day in 2u32..28,
        hour in 0u32..24,
    ) {
        let mut index = VersionedFileIndex::empty("/cache");
        index.record(entry(&versioned_name(day, hour)));

        index.record(entry(&versioned_name(day - 1, hour)));
        prop_assert_eq!(
            index.most_recent("hospital-!.csv").map(|e| e.file_name.clone()),
            Some(versioned_name(day, hour))
        );

        index.record(entry(&versioned_name(day + 1, hour)));
        prop_assert_eq!(
            index.most_recent("hospital-!.csv").map(|e| e.file_name.clone()),
            Some(versioned_name(day + 1, hour))
        );
    }

    #[test]
    fn planning_twice_yields_identical_requests(
        names in prop::collection::vec("[a-z]{1,6}(-2021-0[1-9]-1[0-9]-1[0-9]h[0-5][0-9])?\\.csv", 0..10),
    ) {
        let mut index = VersionedFileIndex::empty("/cache");
        for name in names.iter().step_by(2) {
            index.record(entry(name));
        }
        let descriptors: Vec<FileDescriptor> = names
            .iter()
            .map(|n| FileDescriptor::new(n.clone(), format!("https://x/{n}"), "csv"))
            .collect();
        prop_assert_eq!(
            UpdatePlanner.plan(&descriptors, &index),
            UpdatePlanner.plan(&descriptors, &index)
        );
    }
}
