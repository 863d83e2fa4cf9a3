// SPDX-License-Identifier: Apache-2.0

use reqwest::blocking::Client;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Sent as an `application/x-www-form-urlencoded` body when non-empty.
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.form = form;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Status(u16),
    Io,
    /// The body grew past the byte limit given to the download.
    LimitExceeded,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if let Some(status) = err.status() {
            TransportErrorKind::Status(status.as_u16())
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TransportErrorKind::Timeout => write!(f, "timeout: {}", self.message),
            TransportErrorKind::Connect => write!(f, "connection failed: {}", self.message),
            TransportErrorKind::Status(code) => write!(f, "http status {code}: {}", self.message),
            TransportErrorKind::Io => write!(f, "io: {}", self.message),
            TransportErrorKind::LimitExceeded => write!(f, "size limit exceeded: {}", self.message),
            TransportErrorKind::Other => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

/// Blocking HTTP seam between the cache and the network.
pub trait HttpTransport {
    /// Performs one request and buffers the body. Non-2xx statuses are
    /// returned as responses, not errors.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Streams `url` into `dest` (created or truncated) and returns the number
    /// of bytes written. Non-2xx statuses are errors. At most `limit + 1`
    /// bytes reach `dest`; a larger body fails with
    /// [`TransportErrorKind::LimitExceeded`].
    fn download_to(&self, url: &str, dest: &Path, limit: u64) -> Result<u64, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("datacache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp = builder
            .send()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .map_err(|e| TransportError::from_reqwest(&e))?
            .to_vec();
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            status,
            bytes = body.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "catalog request complete"
        );
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn download_to(&self, url: &str, dest: &Path, limit: u64) -> Result<u64, TransportError> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        if !resp.status().is_success() {
            return Err(TransportError::new(
                TransportErrorKind::Status(resp.status().as_u16()),
                format!("download of {url} rejected"),
            ));
        }
        if let Some(announced) = resp.content_length().filter(|len| *len > limit) {
            return Err(TransportError::new(
                TransportErrorKind::LimitExceeded,
                format!("{url} announces {announced} bytes, over the {limit} byte limit"),
            ));
        }
        let mut file = File::create(dest)
            .map_err(|e| TransportError::new(TransportErrorKind::Io, e.to_string()))?;
        let written = std::io::copy(&mut (&mut resp).take(limit.saturating_add(1)), &mut file)
            .map_err(|e| TransportError::new(TransportErrorKind::Io, e.to_string()))?;
        file.flush()
            .and_then(|()| file.sync_all())
            .map_err(|e| TransportError::new(TransportErrorKind::Io, e.to_string()))?;
        if written > limit {
            return Err(TransportError::new(
                TransportErrorKind::LimitExceeded,
                format!("{url} exceeded the {limit} byte limit"),
            ));
        }
        Ok(written)
    }
}
