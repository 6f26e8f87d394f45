//! Upstream data sources and the payload types they exchange
//!
//! This module defines the two provider seams (`TelemetrySource` and
//! `DocumentSource`), the raw and normalized payload types, and the error type
//! shared by both HTTP clients.

pub mod documents;
pub mod share;

pub use documents::QueryClient;
pub use share::ShareClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to an upstream provider
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Failed to parse JSON response
    #[error("Failed to parse upstream response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The provider accepted the login call but issued no usable session
    #[error("Login rejected by telemetry provider")]
    LoginRejected,

    /// A timestamp field could not be interpreted
    #[error("Invalid timestamp in response: {0}")]
    InvalidTimestamp(String),
}

impl UpstreamError {
    /// The provider's HTTP status, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The provider's response body, when the failure carried one
    pub fn body(&self) -> Option<&str> {
        match self {
            UpstreamError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Account credentials for the telemetry provider
#[derive(Debug, Clone)]
pub struct ShareCredentials {
    pub account_name: String,
    pub password: String,
    pub application_id: String,
}

/// Trend code as reported by the telemetry provider
///
/// Older API revisions send a number, newer ones send the trend name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrendCode {
    Numeric(u8),
    Named(String),
}

/// A single reading exactly as the telemetry provider returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Sensor value (mg/dL)
    #[serde(rename = "Value")]
    pub value: u32,
    /// Direction of change
    #[serde(rename = "Trend")]
    pub trend: TrendCode,
    /// Wall time, formatted like `Date(1721044800000)`
    #[serde(rename = "WT")]
    pub wall_time: String,
}

/// Normalized telemetry reading returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub value: u32,
    /// Numeric trend code, `None` when the provider's code is not recognized
    pub trend: Option<u8>,
    pub trend_description: String,
    pub trend_description_unicode: String,
    pub timestamp: DateTime<Utc>,
    /// Localized display string in the configured timezone
    pub parsed_timestamp: String,
    pub cached: bool,
}

/// Parameters for one document-query page request
///
/// Serializes directly into the provider's request body; absent optional fields
/// are omitted rather than sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRequest {
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorts: Option<Value>,
}

impl PageRequest {
    /// Returns a copy of this request positioned at `cursor`
    pub fn at_cursor(&self, cursor: Option<String>) -> Self {
        Self {
            start_cursor: cursor,
            ..self.clone()
        }
    }
}

/// One page of document-query results (or the aggregate of several)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub results: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Auth and target for document queries
#[derive(Debug, Clone)]
pub struct DocumentTarget {
    pub api_token: String,
    pub database_id: String,
}

/// Telemetry provider seam
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Exchanges account credentials for a session id
    async fn login(&self, credentials: &ShareCredentials) -> Result<String, UpstreamError>;

    /// Fetches readings from the last `minutes`, newest first, at most `max_count`
    async fn fetch_latest(
        &self,
        session_id: &str,
        minutes: u32,
        max_count: u32,
    ) -> Result<Vec<RawReading>, UpstreamError>;
}

/// Document-database provider seam
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetches a single page of query results
    async fn query(
        &self,
        target: &DocumentTarget,
        request: &PageRequest,
    ) -> Result<DocumentPage, UpstreamError>;
}
