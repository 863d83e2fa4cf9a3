// SPDX-License-Identifier: Apache-2.0

use crate::error::{CatalogError, CatalogErrorCode};
use crate::timestamps::parse_remote_timestamp;
use crate::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::{CatalogFetch, FileDescriptor};
use datacache_model::UpdateFrequency;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

const PREFIXES: &str = "PREFIX dcat: <http://www.w3.org/ns/dcat#>\n\
PREFIX dct: <http://purl.org/dc/terms/>\n";

const SELECT_CLAUSE: &str = "SELECT ?dataset ?distribution ?url ?format ?publisher ?modified \
?frequency ?byteSize WHERE {\n";

const PATTERN: &str = "  ?dataset a dcat:Dataset ;\n\
           dcat:distribution ?distribution .\n\
  OPTIONAL { ?distribution dcat:downloadURL ?url }\n\
  OPTIONAL { ?distribution dct:format ?format }\n\
  OPTIONAL { ?distribution dcat:byteSize ?byteSize }\n\
  OPTIONAL { ?distribution dct:modified ?modified }\n\
  OPTIONAL { ?dataset dct:publisher ?publisher }\n\
  OPTIONAL { ?dataset dct:accrualPeriodicity ?frequency }\n";

/// Client for DCAT catalogs exposed through a SPARQL endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SparqlCatalogClient {
    pub endpoint: String,
    /// Restricts the query to these dataset IRIs when non-empty.
    #[serde(default)]
    pub dataset_uris: Vec<String>,
    /// Case-insensitive match on dataset titles.
    #[serde(default)]
    pub keyword: Option<String>,
}

impl SparqlCatalogClient {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            dataset_uris: Vec::new(),
            keyword: None,
        }
    }

    #[must_use]
    pub fn with_dataset_uris(mut self, uris: Vec<String>) -> Self {
        self.dataset_uris = uris;
        self
    }

    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Renders the distribution query sent to the endpoint.
    pub fn query_text(&self) -> Result<String, CatalogError> {
        let mut query = String::from(PREFIXES);
        query.push_str(SELECT_CLAUSE);
        if !self.dataset_uris.is_empty() {
            query.push_str("  VALUES ?dataset {");
            for uri in &self.dataset_uris {
                if uri.is_empty() || uri.contains(['<', '>', '"', ' ', '{', '}']) {
                    return Err(CatalogError::new(
                        CatalogErrorCode::Configuration,
                        format!("dataset uri {uri:?} is not a valid IRI"),
                    ));
                }
                query.push_str(" <");
                query.push_str(uri);
                query.push('>');
            }
            query.push_str(" }\n");
        }
        query.push_str(PATTERN);
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.trim().is_empty()) {
            let escaped = keyword
                .trim()
                .to_lowercase()
                .replace('\\', "\\\\")
                .replace('"', "\\\"");
            query.push_str("  ?dataset dct:title ?title .\n");
            query.push_str(&format!(
                "  FILTER(CONTAINS(LCASE(STR(?title)), \"{escaped}\"))\n"
            ));
        }
        query.push('}');
        Ok(query)
    }

    pub fn fetch_descriptors(
        &self,
        transport: &dyn HttpTransport,
    ) -> Result<CatalogFetch, CatalogError> {
        let query = self.query_text()?;
        let request = HttpRequest::new(HttpMethod::Post, &self.endpoint)
            .with_form(vec![("query".to_string(), query)])
            .with_header("Accept", "application/rdf+xml");
        let response = match transport.send(&request) {
            Ok(resp) => resp,
            Err(e) => {
                error!(endpoint = %self.endpoint, error = %e, "sparql request failed");
                return Ok(CatalogFetch::Unavailable {
                    reason: e.to_string(),
                });
            }
        };
        if !response.is_success() {
            error!(endpoint = %self.endpoint, status = response.status, "sparql request rejected");
            return Ok(CatalogFetch::Unavailable {
                reason: format!("{} answered http status {}", self.endpoint, response.status),
            });
        }

        let store = flatten_sparql_results(&response.body)?;
        let rows = store.select(&["url"], &["format", "publisher", "modified", "frequency", "byteSize"]);
        let distributions = store.subjects().len();
        let descriptors: Vec<FileDescriptor> = rows.iter().filter_map(row_descriptor).collect();
        if distributions > 0 && descriptors.is_empty() {
            return Err(CatalogError::new(
                CatalogErrorCode::Validation,
                format!(
                    "{} returned {distributions} distributions but none exposes a download url",
                    self.endpoint
                ),
            ));
        }
        info!(
            endpoint = %self.endpoint,
            distributions,
            descriptors = descriptors.len(),
            "sparql catalog fetched"
        );
        Ok(CatalogFetch::Fresh(descriptors))
    }
}

fn row_descriptor(row: &BTreeMap<String, RdfTerm>) -> Option<FileDescriptor> {
    let download_url = row.get("url")?.value().to_string();
    let declared_format = row.get("format").and_then(|t| term_label(t.value()));
    let Some((name, format)) = distribution_file_name(&download_url, declared_format) else {
        warn!(url = %download_url, "skipping distribution without usable file name");
        return None;
    };

    let mut descriptor = FileDescriptor::new(name, download_url, format);
    descriptor.publisher = row.get("publisher").map(|t| t.value().to_string());
    descriptor.remote_modified_at = row
        .get("modified")
        .and_then(|t| parse_remote_timestamp(t.value()));
    descriptor.update_frequency = row
        .get("frequency")
        .and_then(|t| UpdateFrequency::parse_label(t.value()));
    descriptor.declared_size = match row.get("byteSize") {
        Some(term) => {
            let raw = term.value().trim();
            let parsed = raw
                .parse::<u64>()
                .ok()
                .or_else(|| raw.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64));
            if parsed.is_none() {
                warn!(file = %descriptor.name, value = raw, "unparsable byteSize ignored");
            }
            parsed
        }
        None => None,
    };
    Some(descriptor)
}

/// Local file name and format for a distribution url.
///
/// A final segment carrying an extension is used as is. Extensionless
/// endpoints such as `.../casedistribution/csv` are qualified with their
/// parent segment and suffixed with the format (`casedistribution-csv.csv`),
/// so sibling datasets exposing the same trailing segment stay distinct.
pub(crate) fn distribution_file_name(
    download_url: &str,
    declared_format: Option<String>,
) -> Option<(String, String)> {
    let parsed = url::Url::parse(download_url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    let (last, parents) = segments.split_last()?;
    let extension = last
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase());
    let format = declared_format
        .or_else(|| extension.clone())
        .unwrap_or_else(|| "unknown".to_string());
    if extension.is_some() {
        return Some(((*last).to_string(), format));
    }
    let mut name = match parents.last() {
        Some(parent) => format!("{parent}-{last}"),
        None => (*last).to_string(),
    };
    if format != "unknown" {
        name.push('.');
        name.push_str(&format);
    }
    Some((name, format))
}

/// Last IRI segment, lowercased: `.../file-type/CSV` becomes `csv`.
fn term_label(raw: &str) -> Option<String> {
    raw.trim()
        .trim_end_matches('/')
        .rsplit(['/', '#'])
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdfTerm {
    Iri(String),
    Literal {
        value: String,
        datatype: Option<String>,
        lang: Option<String>,
    },
    Blank(String),
}

impl RdfTerm {
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Iri(v) | Self::Blank(v) => v,
            Self::Literal { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: RdfTerm,
}

/// In-memory triple store built from one SPARQL results document. Each
/// `<result>` becomes a blank subject `_:rN` whose predicates are the
/// binding names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripleStore {
    triples: Vec<Triple>,
}

impl TripleStore {
    pub fn insert(&mut self, triple: Triple) {
        self.triples.push(triple);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Distinct subjects in insertion order.
    #[must_use]
    pub fn subjects(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for t in &self.triples {
            if out.last() != Some(&t.subject.as_str()) && !out.contains(&t.subject.as_str()) {
                out.push(&t.subject);
            }
        }
        out
    }

    pub fn objects<'a>(
        &'a self,
        subject: &'a str,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a RdfTerm> + 'a {
        self.triples
            .iter()
            .filter(move |t| t.subject == subject && t.predicate == predicate)
            .map(|t| &t.object)
    }

    /// One row per subject binding every `required` predicate; `optional`
    /// predicates are included when present. The first object wins when a
    /// predicate repeats.
    #[must_use]
    pub fn select(&self, required: &[&str], optional: &[&str]) -> Vec<BTreeMap<String, RdfTerm>> {
        let mut rows = Vec::new();
        'subjects: for subject in self.subjects() {
            let mut row = BTreeMap::new();
            for predicate in required {
                match self.objects(subject, predicate).next() {
                    Some(term) => {
                        row.insert((*predicate).to_string(), term.clone());
                    }
                    None => continue 'subjects,
                }
            }
            for predicate in optional {
                if let Some(term) = self.objects(subject, predicate).next() {
                    row.insert((*predicate).to_string(), term.clone());
                }
            }
            rows.push(row);
        }
        rows
    }
}

enum TermKind {
    Iri,
    Literal {
        datatype: Option<String>,
        lang: Option<String>,
    },
    Blank,
}

/// Parses a SPARQL XML results document into a [`TripleStore`].
pub fn flatten_sparql_results(body: &[u8]) -> Result<TripleStore, CatalogError> {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut store = TripleStore::default();
    let mut saw_root = false;
    let mut result_index = 0_usize;
    let mut bindings: Option<Vec<(String, RdfTerm)>> = None;
    let mut binding: Option<String> = None;
    let mut term: Option<(TermKind, String)> = None;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            let offset = reader.buffer_position();
            error!(offset, error = %e, "malformed sparql results");
            malformed_at(offset, &e.to_string())
        })?;
        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"sparql" => saw_root = true,
                b"result" => bindings = Some(Vec::new()),
                b"binding" => {
                    binding = Some(required_attribute(e, "name", reader.buffer_position())?);
                }
                b"uri" => term = Some((TermKind::Iri, String::new())),
                b"bnode" => term = Some((TermKind::Blank, String::new())),
                b"literal" => term = Some((literal_kind(e, reader.buffer_position())?, String::new())),
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.local_name().as_ref() == b"literal" {
                    let kind = literal_kind(e, reader.buffer_position())?;
                    push_term(&mut bindings, binding.as_deref(), kind, String::new());
                }
            }
            Event::Text(ref t) => {
                if let Some((_, text)) = term.as_mut() {
                    let unescaped = t.unescape().map_err(|e| {
                        malformed_at(reader.buffer_position(), &e.to_string())
                    })?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(ref t) => {
                if let Some((_, text)) = term.as_mut() {
                    text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"uri" | b"bnode" | b"literal" => {
                    if let Some((kind, text)) = term.take() {
                        push_term(&mut bindings, binding.as_deref(), kind, text);
                    }
                }
                b"binding" => binding = None,
                b"result" => {
                    if let Some(done) = bindings.take() {
                        let subject = format!("_:r{result_index}");
                        result_index += 1;
                        for (predicate, object) in done {
                            store.insert(Triple {
                                subject: subject.clone(),
                                predicate,
                                object,
                            });
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(CatalogError::malformed(
            "response is not a sparql results document (no <sparql> root)",
        ));
    }
    if bindings.is_some() {
        return Err(malformed_at(
            reader.buffer_position(),
            "document ended inside a <result>",
        ));
    }
    Ok(store)
}

fn push_term(
    bindings: &mut Option<Vec<(String, RdfTerm)>>,
    binding: Option<&str>,
    kind: TermKind,
    text: String,
) {
    let (Some(bindings), Some(name)) = (bindings.as_mut(), binding) else {
        return;
    };
    let term = match kind {
        TermKind::Iri => RdfTerm::Iri(text),
        TermKind::Blank => RdfTerm::Blank(text),
        TermKind::Literal { datatype, lang } => RdfTerm::Literal {
            value: text,
            datatype,
            lang,
        },
    };
    bindings.push((name.to_string(), term));
}

fn literal_kind(e: &BytesStart<'_>, offset: usize) -> Result<TermKind, CatalogError> {
    Ok(TermKind::Literal {
        datatype: optional_attribute(e, "datatype", offset)?,
        lang: optional_attribute(e, "xml:lang", offset)?,
    })
}

fn optional_attribute(
    e: &BytesStart<'_>,
    name: &str,
    offset: usize,
) -> Result<Option<String>, CatalogError> {
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| malformed_at(offset, &err.to_string()))?;
    match attr {
        Some(a) => a
            .unescape_value()
            .map(|v| Some(v.into_owned()))
            .map_err(|err| malformed_at(offset, &err.to_string())),
        None => Ok(None),
    }
}

fn required_attribute(e: &BytesStart<'_>, name: &str, offset: usize) -> Result<String, CatalogError> {
    optional_attribute(e, name, offset)?.ok_or_else(|| {
        malformed_at(
            offset,
            &format!(
                "<{}> is missing attribute {name}",
                String::from_utf8_lossy(e.local_name().as_ref())
            ),
        )
    })
}

fn malformed_at(offset: usize, detail: &str) -> CatalogError {
    CatalogError::malformed(format!(
        "sparql results are malformed at byte offset {offset}: {detail}"
    ))
}
