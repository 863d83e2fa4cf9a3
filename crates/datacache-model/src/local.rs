// SPDX-License-Identifier: Apache-2.0

use crate::timestamp::split_timestamped_name;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A data file found in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileEntry {
    pub file_name: String,
    /// `None` for names without an embedded timestamp.
    pub generic_key: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub size_on_disk: u64,
    pub full_path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

impl LocalFileEntry {
    /// Builds an entry from a file name and its stat information.
    #[must_use]
    pub fn from_stat(
        file_name: &str,
        full_path: PathBuf,
        size_on_disk: u64,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let split = split_timestamped_name(file_name);
        Self {
            file_name: file_name.to_string(),
            generic_key: split.as_ref().map(|t| t.generic_key()),
            timestamp: split.map(|t| t.timestamp),
            size_on_disk,
            full_path,
            modified_at,
        }
    }

    #[must_use]
    pub fn is_timestamped(&self) -> bool {
        self.timestamp.is_some()
    }

    /// Ordering used to pick the most recent version of a generic key:
    /// timestamp first, then file name so equal timestamps resolve to the
    /// lexicographically last name.
    #[must_use]
    pub fn recency_key(&self) -> (Option<NaiveDateTime>, &str) {
        (self.timestamp, self.file_name.as_str())
    }
}
