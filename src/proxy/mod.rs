//! Request handling for the two proxied providers
//!
//! Each handler turns a validated request into a `ProxyResponse`. Every fault is
//! converted to a structured error response at the handler boundary, so callers
//! never see a `Result`.

mod documents;
mod inflight;
mod params;
mod telemetry;

pub use documents::{DocumentsBody, DocumentsProxy, DocumentsSettings, FetchError};
pub use inflight::InFlight;
pub use params::{DocumentParams, DocumentQuery, InputError};
pub use telemetry::{TelemetryProxy, TelemetrySettings};

use chrono::Duration;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::config::ConfigError;
use crate::data::UpstreamError;
use crate::negotiate::quote_etag;

pub const HEADER_ETAG: &str = "etag";
pub const HEADER_CACHE_CONTROL: &str = "cache-control";
pub const HEADER_CACHE_STATUS: &str = "x-cache";

/// Transport-neutral response produced by the handlers
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    /// `None` for bodiless responses (304)
    pub body: Option<Value>,
}

impl ProxyResponse {
    /// A JSON response with the given status
    pub fn json<T: Serialize>(status: u16, body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            status,
            headers: Vec::new(),
            body: Some(serde_json::to_value(body)?),
        })
    }

    /// A 304 carrying the current ETag and freshness directive
    pub fn not_modified(etag: &str, max_age: Duration) -> Self {
        Self {
            status: 304,
            headers: Vec::new(),
            body: None,
        }
        .with_etag(etag)
        .with_max_age(max_age)
        .with_header(HEADER_CACHE_STATUS, "HIT")
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_etag(self, etag: &str) -> Self {
        self.with_header(HEADER_ETAG, quote_etag(etag))
    }

    pub fn with_max_age(self, max_age: Duration) -> Self {
        let secs = max_age.num_seconds().max(0);
        self.with_header(HEADER_CACHE_CONTROL, format!("public, max-age={}", secs))
    }

    /// Marks the response as served from cache or fetched upstream
    pub fn with_cache_status(self, hit: bool) -> Self {
        self.with_header(HEADER_CACHE_STATUS, if hit { "HIT" } else { "MISS" })
    }

    /// First value of the named header, if present
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Any fault raised while handling a request
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Upstream fetch failed: {0}")]
    Fetch(Arc<FetchError>),

    /// The provider answered but had no reading in the requested window
    #[error("No readings available")]
    NoData,

    #[error("Failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<Arc<FetchError>> for ProxyError {
    fn from(err: Arc<FetchError>) -> Self {
        ProxyError::Fetch(err)
    }
}

/// Status for an upstream fault: the provider's own error status, else 502
fn upstream_status(err: &UpstreamError) -> u16 {
    match err.status() {
        Some(status) if (400..=599).contains(&status) => status,
        _ => 502,
    }
}

impl ProxyError {
    /// HTTP status reported to the caller
    pub fn status(&self) -> u16 {
        match self {
            ProxyError::Config(_) => 500,
            ProxyError::Input(_) => 400,
            ProxyError::Upstream(err) => upstream_status(err),
            ProxyError::Fetch(err) => match err.as_ref() {
                FetchError::Aggregate(AggregateError::Upstream { source, .. }) => {
                    upstream_status(source)
                }
                FetchError::Aggregate(AggregateError::LimitExceeded { .. }) => 502,
                FetchError::Digest(_) | FetchError::Aborted(_) => 500,
            },
            ProxyError::NoData => 404,
            ProxyError::Serialize(_) => 500,
        }
    }

    /// Upstream response body attached for diagnosis, when available
    pub fn detail(&self) -> Option<&str> {
        match self {
            ProxyError::Upstream(err) => err.body(),
            ProxyError::Fetch(err) => match err.as_ref() {
                FetchError::Aggregate(agg) => agg.upstream().and_then(UpstreamError::body),
                _ => None,
            },
            _ => None,
        }
    }

    /// Converts the fault into a structured error response
    pub fn into_response(self) -> ProxyResponse {
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
        });
        if let Some(detail) = self.detail() {
            body["detail"] = Value::String(detail.to_string());
        }
        ProxyResponse {
            status: self.status(),
            headers: Vec::new(),
            body: Some(body),
        }
    }
}
