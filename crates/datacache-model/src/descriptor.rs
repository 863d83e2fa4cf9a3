// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Declared integrity digest of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checksum {
    pub algorithm: String,
    pub value: String,
}

impl Checksum {
    #[must_use]
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            value: value.into().to_ascii_lowercase(),
        }
    }
}

/// Publication cadence advertised by a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFrequency {
    Continuous,
    Daily,
    Weekly,
    Monthly,
    Bimonthly,
    Quarterly,
    Annual,
}

impl UpdateFrequency {
    /// Parses data.gouv.fr words and EU authority-table URIs alike.
    ///
    /// Only the last path segment of a URI is considered. Cadences that do not
    /// imply a refresh interval (`punctual`, `irregular`, `unknown`, ...)
    /// yield `None`.
    #[must_use]
    pub fn parse_label(raw: &str) -> Option<Self> {
        let label = raw
            .trim()
            .trim_end_matches('/')
            .rsplit(['/', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match label.as_str() {
            "continuous" | "cont" | "update_cont" | "continuously" => Some(Self::Continuous),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "bimonthly" => Some(Self::Bimonthly),
            "quarterly" => Some(Self::Quarterly),
            "annual" | "annually" | "yearly" => Some(Self::Annual),
            _ => None,
        }
    }

    /// Refresh interval implied by the cadence. `None` means always stale.
    #[must_use]
    pub fn interval(self) -> Option<Duration> {
        match self {
            Self::Continuous => None,
            Self::Daily => Some(Duration::days(1)),
            Self::Weekly => Some(Duration::days(7)),
            Self::Monthly => Some(Duration::days(30)),
            Self::Bimonthly => Some(Duration::days(61)),
            Self::Quarterly => Some(Duration::days(91)),
            Self::Annual => Some(Duration::days(365)),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Bimonthly => "bimonthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }
}

impl Display for UpdateFrequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remotely available file, normalized across catalog wire formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDescriptor {
    pub name: String,
    pub download_url: String,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub checksum: Option<Checksum>,
    #[serde(default)]
    pub declared_size: Option<u64>,
    pub format: String,
    #[serde(default)]
    pub remote_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_frequency: Option<UpdateFrequency>,
}

impl FileDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        download_url: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            publisher: None,
            checksum: None,
            declared_size: None,
            format: format.into(),
            remote_modified_at: None,
            update_frequency: None,
        }
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    #[must_use]
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_remote_modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.remote_modified_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_update_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.update_frequency = Some(frequency);
        self
    }
}

/// Rejects names that would escape the cache directory or collide with its
/// bookkeeping files.
pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError("file name must not be empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(ValidationError(format!(
            "file name {name:?} must not contain path separators"
        )));
    }
    if name == "." || name == ".." {
        return Err(ValidationError(format!(
            "file name {name:?} is a directory reference"
        )));
    }
    if name.starts_with('.') {
        return Err(ValidationError(format!(
            "file name {name:?} is reserved for cache bookkeeping"
        )));
    }
    Ok(())
}
