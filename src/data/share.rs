//! Glucose share service client
//!
//! Logs in with publisher account credentials and reads the latest sensor
//! values. Both calls are JSON POSTs against the share web services root.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::{info, warn};

use super::{RawReading, ShareCredentials, TelemetrySource, UpstreamError};

/// Default root for the share web services
pub const DEFAULT_SHARE_BASE_URL: &str = "https://share2.dexcom.com/ShareWebServices/Services";

/// Session id returned by the provider when credentials are rejected
const NULL_SESSION_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Login request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    account_name: &'a str,
    password: &'a str,
    application_id: &'a str,
}

/// Client for the share web services
#[derive(Debug, Clone)]
pub struct ShareClient {
    client: Client,
    base_url: String,
}

impl Default for ShareClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareClient {
    /// Create a new ShareClient pointing at the default service root
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a new ShareClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different service root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn login_url(&self) -> String {
        format!("{}/General/LoginPublisherAccountByName", self.base_url)
    }

    fn latest_url(&self) -> String {
        format!("{}/Publisher/ReadPublisherLatestGlucoseValues", self.base_url)
    }

    /// Readings request with the session and window encoded as query parameters
    fn latest_request(&self, session_id: &str, minutes: u32, max_count: u32) -> RequestBuilder {
        self.client
            .post(self.latest_url())
            .query(&[
                ("sessionId", session_id.to_string()),
                ("minutes", minutes.to_string()),
                ("maxCount", max_count.to_string()),
            ])
            .header(reqwest::header::CONTENT_LENGTH, "0")
    }
}

/// Reads the body of a non-success response into an `UpstreamError`
pub(crate) async fn status_error(response: Response) -> UpstreamError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    warn!(status, body = %body, "upstream returned an error status");
    UpstreamError::Status { status, body }
}

#[async_trait]
impl TelemetrySource for ShareClient {
    async fn login(&self, credentials: &ShareCredentials) -> Result<String, UpstreamError> {
        info!(account = %credentials.account_name, "logging in to share service");
        let response = self
            .client
            .post(self.login_url())
            .json(&LoginRequest {
                account_name: &credentials.account_name,
                password: &credentials.password,
                application_id: &credentials.application_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await?;
        let session_id: String = serde_json::from_str(&text)?;
        if session_id.is_empty() || session_id == NULL_SESSION_ID {
            return Err(UpstreamError::LoginRejected);
        }
        Ok(session_id)
    }

    async fn fetch_latest(
        &self,
        session_id: &str,
        minutes: u32,
        max_count: u32,
    ) -> Result<Vec<RawReading>, UpstreamError> {
        info!(minutes, max_count, "fetching latest readings");
        let response = self
            .latest_request(session_id, minutes, max_count)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
