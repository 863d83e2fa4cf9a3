// SPDX-License-Identifier: Apache-2.0

use crate::budget::SpaceBudget;
use crate::error::{CacheError, CacheErrorCode};
use crate::index::{entry_from_metadata, partial_path, VersionedFileIndex};
use crate::staleness::StalenessPolicy;
use chrono::{DateTime, Utc};
use datacache_catalog::{HttpTransport, TransportErrorKind};
use datacache_core::{hex_digest, is_supported_algorithm};
use datacache_model::{validate_file_name, UpdateRequest};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Byte estimate of the downloads a request list would trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accounting {
    pub required_bytes: u64,
    pub firing_requests: usize,
    /// Firing requests whose size was estimated rather than declared.
    pub estimated_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The staleness test did not fire.
    Skipped,
    Written { file_name: String, bytes: u64 },
}

/// Performs, or only tallies, the transfer behind each update request.
pub struct Fetcher<'a> {
    transport: &'a dyn HttpTransport,
    staleness: StalenessPolicy,
    default_size_estimate: u64,
}

impl<'a> Fetcher<'a> {
    #[must_use]
    pub fn new(
        transport: &'a dyn HttpTransport,
        staleness: StalenessPolicy,
        default_size_estimate: u64,
    ) -> Self {
        Self {
            transport,
            staleness,
            default_size_estimate,
        }
    }

    /// Accounting mode: no disk or index writes.
    #[must_use]
    pub fn account(
        &self,
        requests: &[UpdateRequest],
        index: &VersionedFileIndex,
        now: DateTime<Utc>,
    ) -> Accounting {
        let mut accounting = Accounting::default();
        for request in requests {
            if !self.staleness.fires(request, index, now) {
                continue;
            }
            accounting.firing_requests += 1;
            let size = match request.descriptor.declared_size {
                Some(size) => size,
                None => {
                    warn!(
                        file = %request.descriptor.name,
                        estimate_bytes = self.default_size_estimate,
                        "no declared size; using default estimate"
                    );
                    accounting.estimated_requests += 1;
                    self.default_size_estimate
                }
            };
            accounting.required_bytes = accounting.required_bytes.saturating_add(size);
        }
        accounting
    }

    /// Commit mode. The file lands under its final name only after the
    /// checksum (when declared) matches and the budget accepts its size.
    pub fn commit(
        &self,
        request: &UpdateRequest,
        index: &mut VersionedFileIndex,
        budget: &mut SpaceBudget,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome, CacheError> {
        if !self.staleness.fires(request, index, now) {
            info!(file = %request.file_name(), reason = %request.reason, "already up to date");
            return Ok(CommitOutcome::Skipped);
        }
        let descriptor = &request.descriptor;
        validate_file_name(&descriptor.name)
            .map_err(|e| CacheError::new(CacheErrorCode::Validation, e.to_string()))?;

        let root = index.root().to_path_buf();
        let partial = partial_path(&root, &descriptor.name);
        let target = root.join(&descriptor.name);
        let started = Instant::now();

        // Overwriting a same-named file gives its bytes back.
        let replaced_bytes = fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        let limit = budget.available_replacing(replaced_bytes);

        let written = match self.transport.download_to(&descriptor.download_url, &partial, limit) {
            Ok(bytes) => bytes,
            Err(e) if e.kind == TransportErrorKind::LimitExceeded => {
                discard(&partial);
                error!(file = %descriptor.name, limit, error = %e, "download overruns the cache quota");
                return Err(CacheError::new(
                    CacheErrorCode::SpaceExhausted,
                    format!(
                        "download of {} exceeds the {limit} bytes left in the cache quota",
                        descriptor.name
                    ),
                ));
            }
            Err(e) => {
                discard(&partial);
                error!(file = %descriptor.name, url = %descriptor.download_url, error = %e, "download failed");
                return Err(CacheError::new(
                    CacheErrorCode::Network,
                    format!("download of {} failed: {e}", descriptor.name),
                ));
            }
        };

        if let Err(e) = verify_checksum(request, &partial) {
            discard(&partial);
            return Err(e);
        }

        if let Err(e) = budget.replace(replaced_bytes, written) {
            discard(&partial);
            error!(file = %descriptor.name, bytes = written, "download overruns the cache quota");
            return Err(e);
        }

        if let Err(e) = fs::rename(&partial, &target) {
            budget.release(written);
            budget.restore(replaced_bytes);
            discard(&partial);
            return Err(CacheError::io("publishing download failed", &e));
        }
        let meta = fs::metadata(&target).map_err(|e| CacheError::io("stat after download failed", &e))?;
        index.record(entry_from_metadata(&descriptor.name, target, &meta));

        info!(
            file = %descriptor.name,
            reason = %request.reason,
            bytes = written,
            latency_ms = started.elapsed().as_millis() as u64,
            "download committed"
        );
        Ok(CommitOutcome::Written {
            file_name: descriptor.name.clone(),
            bytes: written,
        })
    }
}

fn verify_checksum(request: &UpdateRequest, path: &Path) -> Result<(), CacheError> {
    let name = request.file_name();
    let Some(expected) = request.descriptor.checksum.as_ref() else {
        warn!(file = %name, "no checksum declared; integrity unverified");
        return Ok(());
    };
    if !is_supported_algorithm(&expected.algorithm) {
        warn!(
            file = %name,
            algorithm = %expected.algorithm,
            "unsupported checksum algorithm; integrity unverified"
        );
        return Ok(());
    }
    let file = fs::File::open(path).map_err(|e| CacheError::io("checksum read failed", &e))?;
    let actual = hex_digest(&expected.algorithm, file)?;
    if actual != expected.value {
        error!(
            file = %name,
            algorithm = %expected.algorithm,
            expected = %expected.value,
            actual = %actual,
            "checksum mismatch"
        );
        return Err(CacheError::new(
            CacheErrorCode::ChecksumMismatch,
            format!(
                "{name}: {} checksum {actual} does not match declared {}",
                expected.algorithm, expected.value
            ),
        ));
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial download");
        }
    }
}
