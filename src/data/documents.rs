//! Document-database query client
//!
//! Issues one `databases/{id}/query` call per page. Pagination across pages is
//! driven by the aggregator, not here.

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use super::share::status_error;
use super::{DocumentPage, DocumentSource, DocumentTarget, PageRequest, UpstreamError};

/// Default API root for the document database
pub const DEFAULT_QUERY_BASE_URL: &str = "https://api.notion.com/v1";

/// API version header value sent with every request
pub const DEFAULT_API_VERSION: &str = "2022-06-28";

/// Client for the document-database query endpoint
#[derive(Debug, Clone)]
pub struct QueryClient {
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    api_version: String,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    /// Creates a new QueryClient with default configuration
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Creates a new QueryClient with a custom HTTP client
    pub fn with_client(http_client: Client) -> Self {
        Self {
            http_client,
            base_url: DEFAULT_QUERY_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn query_url(&self, database_id: &str) -> String {
        format!("{}/databases/{}/query", self.base_url, database_id)
    }
}

#[async_trait]
impl DocumentSource for QueryClient {
    async fn query(
        &self,
        target: &DocumentTarget,
        request: &PageRequest,
    ) -> Result<DocumentPage, UpstreamError> {
        info!(
            database = %target.database_id,
            page_size = request.page_size,
            cursor = request.start_cursor.as_deref().unwrap_or("-"),
            "querying document database"
        );

        let response = self
            .http_client
            .post(self.query_url(&target.database_id))
            .bearer_auth(&target.api_token)
            .header("Notion-Version", &self.api_version)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
