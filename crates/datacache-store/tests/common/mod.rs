// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use datacache_catalog::{HttpRequest, HttpResponse, HttpTransport, TransportError, TransportErrorKind};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

/// In-memory network: catalog bodies and downloadable files keyed by URL.
#[derive(Default)]
pub struct FakeTransport {
    pub catalog: BTreeMap<String, (u16, Vec<u8>)>,
    pub files: BTreeMap<String, Vec<u8>>,
    pub downloads: RefCell<Vec<String>>,
    /// Byte limit and bytes written, per download.
    pub download_limits: RefCell<Vec<(u64, u64)>>,
    pub catalog_calls: RefCell<usize>,
    /// Catalog calls carrying this query pair time out.
    pub failing_query: Option<(String, String)>,
}

impl FakeTransport {
    pub fn with_catalog(mut self, url: &str, body: &str) -> Self {
        self.catalog
            .insert(url.to_string(), (200, body.as_bytes().to_vec()));
        self
    }

    pub fn with_file(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn failing_on(mut self, key: &str, value: &str) -> Self {
        self.failing_query = Some((key.to_string(), value.to_string()));
        self
    }

    pub fn downloaded(&self) -> Vec<String> {
        self.downloads.borrow().clone()
    }
}

impl HttpTransport for FakeTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        *self.catalog_calls.borrow_mut() += 1;
        if let Some(pair) = &self.failing_query {
            if request.query.contains(pair) {
                return Err(TransportError::new(
                    TransportErrorKind::Timeout,
                    format!("{}={} timed out", pair.0, pair.1),
                ));
            }
        }
        match self.catalog.get(&request.url) {
            Some((status, body)) => Ok(HttpResponse {
                status: *status,
                headers: Vec::new(),
                body: body.clone(),
            }),
            None => Err(TransportError::new(
                TransportErrorKind::Connect,
                format!("no route to {}", request.url),
            )),
        }
    }

    fn download_to(&self, url: &str, dest: &Path, limit: u64) -> Result<u64, TransportError> {
        self.downloads.borrow_mut().push(url.to_string());
        let bytes = self.files.get(url).ok_or_else(|| {
            TransportError::new(TransportErrorKind::Status(404), format!("{url} not found"))
        })?;
        let cap = usize::try_from(limit.saturating_add(1)).unwrap_or(usize::MAX);
        let streamed = &bytes[..bytes.len().min(cap)];
        std::fs::write(dest, streamed)
            .map_err(|e| TransportError::new(TransportErrorKind::Io, e.to_string()))?;
        self.download_limits
            .borrow_mut()
            .push((limit, streamed.len() as u64));
        if streamed.len() as u64 > limit {
            return Err(TransportError::new(
                TransportErrorKind::LimitExceeded,
                format!("{url} exceeded the {limit} byte limit"),
            ));
        }
        Ok(streamed.len() as u64)
    }
}

pub fn write_file(dir: &Path, name: &str, bytes: usize) {
    std::fs::write(dir.join(name), vec![b'x'; bytes]).expect("write fixture");
}
