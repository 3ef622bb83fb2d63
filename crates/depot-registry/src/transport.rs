//! The HTTP seam used by the index fetcher.

use std::io::{self, Read};

use tracing::trace;
use ureq::{
    http::header::{ETAG, LAST_MODIFIED},
    Agent,
};

use crate::error::{RegistryError, Result};

/// A GET request for an index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl IndexRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status, validators and an unread body.
pub struct IndexResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Box<dyn Read + Send>,
}

impl IndexResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

impl std::fmt::Debug for IndexResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexResponse")
            .field("status", &self.status)
            .field("etag", &self.etag)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Performs blocking index requests.
///
/// Non-2xx statuses are returned as responses, not errors. Only failures to talk to the
/// server at all surface as [`RegistryError::Transport`].
pub trait IndexTransport: Send + Sync {
    fn get(&self, request: &IndexRequest) -> Result<IndexResponse>;
}

/// [`IndexTransport`] backed by a shared ureq agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }
}

impl IndexTransport for UreqTransport {
    fn get(&self, request: &IndexRequest) -> Result<IndexResponse> {
        let mut req = self.agent.get(&request.url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        trace!(url = %request.url, "requesting index");
        let resp = match req.call() {
            Ok(resp) => resp,
            // Agents configured to treat statuses as errors still report them as statuses.
            Err(ureq::Error::StatusCode(status)) => {
                return Ok(IndexResponse {
                    status,
                    etag: None,
                    last_modified: None,
                    body: Box::new(io::empty()),
                });
            }
            Err(err) => {
                return Err(RegistryError::Transport {
                    url: request.url.clone(),
                    message: err.to_string(),
                });
            }
        };

        let header = |name: ureq::http::HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(String::from)
        };
        let etag = header(ETAG);
        let last_modified = header(LAST_MODIFIED);
        let status = resp.status().as_u16();

        Ok(IndexResponse {
            status,
            etag,
            last_modified,
            body: Box::new(resp.into_body().into_reader()),
        })
    }
}
