// SPDX-License-Identifier: Apache-2.0

use datacache_catalog::{CatalogError, CatalogErrorCode};
use datacache_core::DigestError;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CacheErrorCode {
    NotFound,
    Validation,
    Configuration,
    Network,
    Io,
    ChecksumMismatch,
    SpaceExhausted,
    Internal,
}

impl CacheErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation_error",
            Self::Configuration => "configuration_error",
            Self::Network => "network_error",
            Self::Io => "io_error",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::SpaceExhausted => "cache_space_exhausted",
            Self::Internal => "internal_error",
        }
    }

    /// Failures confined to one update request. The cycle reports them and
    /// moves on to the next request.
    #[must_use]
    pub const fn is_request_scoped(self) -> bool {
        matches!(self, Self::Network | Self::ChecksumMismatch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError {
    pub code: CacheErrorCode,
    pub message: String,
}

impl CacheError {
    #[must_use]
    pub fn new(code: CacheErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        Self::new(CacheErrorCode::Io, format!("{context}: {err}"))
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for CacheError {}

impl From<CatalogError> for CacheError {
    fn from(err: CatalogError) -> Self {
        let code = match err.code {
            CatalogErrorCode::Configuration => CacheErrorCode::Configuration,
            _ => CacheErrorCode::Validation,
        };
        Self::new(code, err.to_string())
    }
}

impl From<DigestError> for CacheError {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::UnsupportedAlgorithm(_) => {
                Self::new(CacheErrorCode::Validation, err.to_string())
            }
            DigestError::Io(ref e) => Self::io("checksum read failed", e),
        }
    }
}
