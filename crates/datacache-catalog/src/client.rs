// SPDX-License-Identifier: Apache-2.0

use crate::error::CatalogError;
use crate::json_rest::JsonRestCatalogClient;
use crate::sparql::SparqlCatalogClient;
use crate::transport::HttpTransport;
use crate::FileDescriptor;
use serde::{Deserialize, Serialize};

/// Outcome of one catalog consultation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogFetch {
    Fresh(Vec<FileDescriptor>),
    /// Some calls of a multi-call catalog failed; `descriptors` holds what
    /// the others returned.
    Partial {
        descriptors: Vec<FileDescriptor>,
        failed_calls: usize,
        reason: String,
    },
    /// The endpoint could not be reached or refused the request.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    JsonRest,
    Sparql,
}

impl CatalogKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JsonRest => "json_rest",
            Self::Sparql => "sparql",
        }
    }

    /// Per-kind metadata snapshot, kept inside the cache directory.
    #[must_use]
    pub const fn snapshot_file_name(self) -> &'static str {
        match self {
            Self::JsonRest => ".datacache-json-rest.json",
            Self::Sparql => ".datacache-sparql.json",
        }
    }
}

/// Closed set of supported catalog wire formats. Also the `catalog` section
/// of the cache configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogClient {
    JsonRest(JsonRestCatalogClient),
    Sparql(SparqlCatalogClient),
}

impl CatalogClient {
    #[must_use]
    pub const fn kind(&self) -> CatalogKind {
        match self {
            Self::JsonRest(_) => CatalogKind::JsonRest,
            Self::Sparql(_) => CatalogKind::Sparql,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::JsonRest(c) => &c.endpoint,
            Self::Sparql(c) => &c.endpoint,
        }
    }

    pub fn fetch_descriptors(
        &self,
        transport: &dyn HttpTransport,
    ) -> Result<CatalogFetch, CatalogError> {
        match self {
            Self::JsonRest(c) => c.fetch_descriptors(transport),
            Self::Sparql(c) => c.fetch_descriptors(transport),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_config_is_tagged_by_kind() {
        let raw = r#"{"kind": "sparql", "endpoint": "https://data.europa.eu/sparql", "keyword": "covid"}"#;
        let client: CatalogClient = serde_json::from_str(raw).expect("parse");
        assert_eq!(client.kind(), CatalogKind::Sparql);
        assert_eq!(client.endpoint(), "https://data.europa.eu/sparql");

        let raw = r#"{"kind": "json_rest", "endpoint": "https://www.data.gouv.fr/api/1/datasets/",
            "query_parameters": {"q": ["covid", "vaccination"]}}"#;
        let client: CatalogClient = serde_json::from_str(raw).expect("parse");
        assert_eq!(client.kind(), CatalogKind::JsonRest);
    }

    #[test]
    fn snapshot_names_differ_per_kind() {
        assert_ne!(
            CatalogKind::JsonRest.snapshot_file_name(),
            CatalogKind::Sparql.snapshot_file_name()
        );
        assert!(CatalogKind::Sparql.snapshot_file_name().starts_with('.'));
    }
}
