// SPDX-License-Identifier: Apache-2.0

use crate::error::{CatalogError, CatalogErrorCode};
use crate::params::QueryParameters;
use crate::timestamps::parse_remote_timestamp;
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::{CatalogFetch, FileDescriptor};
use datacache_model::{Checksum, UpdateFrequency};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Client for data.gouv.fr style catalogs answering
/// `{"data": [{"organization": {...}, "resources": [...]}, ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonRestCatalogClient {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: JsonRestMethod,
    #[serde(default)]
    pub query_parameters: QueryParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JsonRestMethod {
    Get,
    Post,
}

fn default_method() -> JsonRestMethod {
    JsonRestMethod::Get
}

#[derive(Deserialize)]
struct CatalogPage {
    data: Vec<DatasetRecord>,
}

#[derive(Deserialize)]
struct DatasetRecord {
    #[serde(default)]
    organization: Option<OrganizationRecord>,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default)]
    resources: Vec<ResourceRecord>,
}

#[derive(Deserialize)]
struct OrganizationRecord {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct ResourceRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    latest: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    checksum: Option<ChecksumRecord>,
    #[serde(default)]
    filesize: Option<u64>,
}

#[derive(Deserialize)]
struct ChecksumRecord {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

impl JsonRestCatalogClient {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: JsonRestMethod::Get,
            query_parameters: QueryParameters::default(),
        }
    }

    #[must_use]
    pub fn with_query_parameters(mut self, params: QueryParameters) -> Self {
        self.query_parameters = params;
        self
    }

    /// One call per element of the parameter product, results concatenated
    /// in call order. A call that cannot be completed is logged and skipped;
    /// the fetch is unavailable only when every call failed.
    pub fn fetch_descriptors(
        &self,
        transport: &dyn HttpTransport,
    ) -> Result<CatalogFetch, CatalogError> {
        let mut descriptors = Vec::new();
        let mut resources_seen = 0_usize;
        let mut calls = 0_usize;
        let mut failures = Vec::new();
        for query in self.query_parameters.expand() {
            calls += 1;
            let request = match self.method {
                JsonRestMethod::Get => HttpRequest::new(HttpMethod::Get, &self.endpoint)
                    .with_query(query.clone()),
                JsonRestMethod::Post => {
                    HttpRequest::new(HttpMethod::Post, &self.endpoint).with_form(query.clone())
                }
            }
            .with_header("Accept", "application/json");

            let response = match transport.send(&request) {
                Ok(resp) => resp,
                Err(e) => {
                    error!(endpoint = %self.endpoint, ?query, error = %e, "catalog request failed");
                    failures.push(e.to_string());
                    continue;
                }
            };
            if !response.is_success() {
                error!(
                    endpoint = %self.endpoint,
                    ?query,
                    status = response.status,
                    "catalog request rejected"
                );
                failures.push(format!(
                    "{} answered http status {}",
                    self.endpoint, response.status
                ));
                continue;
            }
            let (seen, mut parsed) = parse_catalog_page(&response.body)?;
            resources_seen += seen;
            descriptors.append(&mut parsed);
        }

        if calls > 0 && failures.len() == calls {
            return Ok(CatalogFetch::Unavailable {
                reason: failures.join("; "),
            });
        }
        if resources_seen > 0 && descriptors.is_empty() {
            return Err(CatalogError::new(
                CatalogErrorCode::Validation,
                format!(
                    "{} listed {resources_seen} resources but none is a usable data file",
                    self.endpoint
                ),
            ));
        }
        if !failures.is_empty() {
            warn!(
                endpoint = %self.endpoint,
                failed_calls = failures.len(),
                calls,
                descriptors = descriptors.len(),
                "json catalog partially fetched"
            );
            return Ok(CatalogFetch::Partial {
                descriptors,
                failed_calls: failures.len(),
                reason: failures.join("; "),
            });
        }
        info!(
            endpoint = %self.endpoint,
            descriptors = descriptors.len(),
            "json catalog fetched"
        );
        Ok(CatalogFetch::Fresh(descriptors))
    }
}

/// Returns the number of resources listed and the usable descriptors.
fn parse_catalog_page(body: &[u8]) -> Result<(usize, Vec<FileDescriptor>), CatalogError> {
    let page: CatalogPage = serde_json::from_slice(body).map_err(|e| {
        error!(line = e.line(), column = e.column(), error = %e, "malformed catalog json");
        CatalogError::malformed(format!(
            "catalog json is malformed at line {} column {}: {e}",
            e.line(),
            e.column()
        ))
    })?;

    let mut seen = 0_usize;
    let mut out = Vec::new();
    for dataset in page.data {
        let publisher = dataset.organization.and_then(|o| o.name);
        let dataset_frequency = dataset.frequency.as_deref().and_then(parse_frequency);
        for resource in dataset.resources {
            seen += 1;
            if let Some(descriptor) =
                resource_descriptor(resource, publisher.as_deref(), dataset_frequency)
            {
                out.push(descriptor);
            }
        }
    }
    Ok((seen, out))
}

fn resource_descriptor(
    resource: ResourceRecord,
    publisher: Option<&str>,
    dataset_frequency: Option<UpdateFrequency>,
) -> Option<FileDescriptor> {
    let label = resource.title.clone().unwrap_or_default();
    let Some(format) = resource
        .format
        .map(|f| f.trim().to_ascii_lowercase())
        .filter(|f| !f.is_empty())
    else {
        warn!(resource = %label, "skipping catalog resource without format");
        return None;
    };
    let Some(download_url) = resource.latest.or(resource.url).filter(|u| !u.is_empty()) else {
        warn!(resource = %label, "skipping catalog resource without download url");
        return None;
    };
    let name = match resource.title.filter(|t| !t.trim().is_empty()) {
        Some(title) => title.trim().to_string(),
        None => match last_url_segment(&download_url) {
            Some(segment) => segment,
            None => {
                warn!(url = %download_url, "skipping catalog resource without usable name");
                return None;
            }
        },
    };

    let mut descriptor = FileDescriptor::new(name, download_url, format);
    descriptor.publisher = publisher.map(ToString::to_string);
    descriptor.checksum = match resource.checksum {
        Some(ChecksumRecord {
            kind: Some(kind),
            value: Some(value),
        }) if !kind.is_empty() && !value.is_empty() => Some(Checksum::new(kind, value)),
        _ => None,
    };
    descriptor.declared_size = resource.filesize;
    descriptor.remote_modified_at = match resource.last_modified.as_deref() {
        Some(raw) => {
            let parsed = parse_remote_timestamp(raw);
            if parsed.is_none() {
                warn!(file = %descriptor.name, value = raw, "unparsable last_modified ignored");
            }
            parsed
        }
        None => None,
    };
    descriptor.update_frequency = dataset_frequency;
    Some(descriptor)
}

fn parse_frequency(raw: &str) -> Option<UpdateFrequency> {
    let parsed = UpdateFrequency::parse_label(raw);
    if parsed.is_none() {
        info!(frequency = raw, "frequency implies no refresh interval");
    }
    parsed
}

pub(crate) fn last_url_segment(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(ToString::to_string)
}
