// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Remote catalog clients.
//!
//! Every client turns one provider's wire format into a flat list of
//! [`FileDescriptor`]s. Transport failures are absorbed and reported as
//! [`CatalogFetch::Unavailable`], or [`CatalogFetch::Partial`] when only
//! some calls of a multi-call catalog failed. Malformed bodies are hard
//! errors.

mod client;
mod error;
mod json_rest;
mod params;
mod sparql;
mod timestamps;
mod transport;

pub use client::{CatalogClient, CatalogFetch, CatalogKind};
pub use error::{CatalogError, CatalogErrorCode};
pub use json_rest::{JsonRestCatalogClient, JsonRestMethod};
pub use params::{ParamValue, QueryParameters};
pub use sparql::{flatten_sparql_results, RdfTerm, SparqlCatalogClient, Triple, TripleStore};
pub use timestamps::parse_remote_timestamp;
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
    TransportErrorKind,
};

use datacache_model::FileDescriptor;

pub const CRATE_NAME: &str = "datacache-catalog";
