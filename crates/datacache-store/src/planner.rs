// SPDX-License-Identifier: Apache-2.0

use crate::index::VersionedFileIndex;
use datacache_model::{
    split_timestamped_name, validate_file_name, FileDescriptor, UpdateReason, UpdateRequest,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Decides, for every descriptor, whether a download is requested and why.
///
/// Pure over its inputs: the same descriptors and index always yield the
/// same requests in the same order.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdatePlanner;

impl UpdatePlanner {
    #[must_use]
    pub fn plan(
        &self,
        descriptors: &[FileDescriptor],
        index: &VersionedFileIndex,
    ) -> Vec<UpdateRequest> {
        let mut requests: Vec<UpdateRequest> = Vec::new();
        // Dedup key (generic key, or the bare name) -> position in `requests`.
        let mut planned: BTreeMap<String, usize> = BTreeMap::new();

        for descriptor in descriptors {
            if descriptor.format.trim().is_empty() {
                continue;
            }
            if let Err(e) = validate_file_name(&descriptor.name) {
                warn!(file = %descriptor.name, error = %e, "descriptor rejected");
                continue;
            }
            if descriptor.checksum.is_none() {
                debug!(file = %descriptor.name, "descriptor declares no checksum");
            }

            let Some(request) = plan_one(descriptor, index) else {
                continue;
            };
            let dedup_key = request
                .generic_key
                .clone()
                .unwrap_or_else(|| descriptor.name.clone());
            match planned.get(&dedup_key) {
                Some(&at) => {
                    if supersedes(&request, &requests[at]) {
                        debug!(
                            file = %descriptor.name,
                            replaced = %requests[at].descriptor.name,
                            "newer duplicate descriptor replaces earlier one"
                        );
                        requests[at] = request;
                    } else if requests[at].descriptor.download_url != descriptor.download_url {
                        warn!(
                            file = %descriptor.name,
                            url = %descriptor.download_url,
                            kept = %requests[at].descriptor.download_url,
                            "descriptor shadowed by another source with the same name"
                        );
                    } else {
                        debug!(file = %descriptor.name, "duplicate descriptor ignored");
                    }
                }
                None => {
                    planned.insert(dedup_key, requests.len());
                    requests.push(request);
                }
            }
        }
        requests
    }
}

fn plan_one(descriptor: &FileDescriptor, index: &VersionedFileIndex) -> Option<UpdateRequest> {
    let Some(split) = split_timestamped_name(&descriptor.name) else {
        return Some(UpdateRequest {
            reason: UpdateReason::NoGenericTimestamp,
            descriptor: descriptor.clone(),
            generic_key: None,
            replaces: index.untimestamped(&descriptor.name).cloned(),
        });
    };
    let generic_key = split.generic_key();
    let Some(local) = index.most_recent(&generic_key) else {
        return Some(UpdateRequest {
            reason: UpdateReason::NoLocalCopy,
            descriptor: descriptor.clone(),
            generic_key: Some(generic_key),
            replaces: None,
        });
    };
    let reason = if descriptor.remote_modified_at.is_some() {
        UpdateReason::RemoteIsNewer
    } else if descriptor.update_frequency.is_some() {
        UpdateReason::FrequencyImpliesStale
    } else {
        debug!(
            file = %descriptor.name,
            "no freshness signal for a locally cached key; not fetched"
        );
        return None;
    };
    Some(UpdateRequest {
        reason,
        descriptor: descriptor.clone(),
        generic_key: Some(generic_key),
        replaces: Some(local.clone()),
    })
}

/// Later duplicates win only when their name carries a later timestamp.
fn supersedes(candidate: &UpdateRequest, current: &UpdateRequest) -> bool {
    let ts = |r: &UpdateRequest| split_timestamped_name(&r.descriptor.name).map(|t| t.timestamp);
    match (ts(candidate), ts(current)) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}
