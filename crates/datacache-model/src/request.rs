// SPDX-License-Identifier: Apache-2.0

use crate::descriptor::FileDescriptor;
use crate::local::LocalFileEntry;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Why the planner asked for a file. Each reason selects the staleness test
/// applied right before the download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// The name has no timestamp; fetch only when no file of that exact name exists.
    NoGenericTimestamp,
    /// Fetch when the remote modification time beats the local mtime by the grace margin.
    RemoteIsNewer,
    /// Nothing local shares the generic key; always fetch.
    NoLocalCopy,
    /// Fetch when the local copy is older than the advertised cadence.
    FrequencyImpliesStale,
}

impl UpdateReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoGenericTimestamp => "no_generic_timestamp",
            Self::RemoteIsNewer => "remote_is_newer",
            Self::NoLocalCopy => "no_local_copy",
            Self::FrequencyImpliesStale => "frequency_implies_stale",
        }
    }
}

impl Display for UpdateReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub reason: UpdateReason,
    pub descriptor: FileDescriptor,
    pub generic_key: Option<String>,
    /// Local version this download would supersede.
    pub replaces: Option<LocalFileEntry>,
}

impl UpdateRequest {
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.descriptor.name
    }
}
