//! Document query handler
//!
//! Negotiates against the keyed cache first. On a miss it aggregates (or fetches
//! a single page), stores the result under the query's cache key with a fresh
//! ETag and answers with the full body.

use chrono::Utc;
use futures::future::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use super::{DocumentParams, DocumentQuery, InFlight, ProxyError, ProxyResponse};
use crate::aggregate::{aggregate_pages, AggregateError};
use crate::cache::{digest_etag, CacheEntry, CacheKey, KeyedCache};
use crate::config::{require, DocumentsConfig, MAX_PAGE_SIZE};
use crate::data::{DocumentPage, DocumentSource, DocumentTarget};
use crate::negotiate::{negotiate, Negotiation};

/// Errors from the shared fetch-and-store task
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("Failed to compute ETag: {0}")]
    Digest(#[from] serde_json::Error),

    /// The fetch task panicked or was cancelled
    #[error("Fetch task aborted: {0}")]
    Aborted(String),
}

type FetchResult = Result<CacheEntry<DocumentPage>, Arc<FetchError>>;

/// Response body for the document endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentsBody {
    pub success: bool,
    pub data: Vec<Value>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub total_results: usize,
}

impl From<&DocumentPage> for DocumentsBody {
    fn from(page: &DocumentPage) -> Self {
        Self {
            success: true,
            data: page.results.clone(),
            next_cursor: page.next_cursor.clone(),
            has_more: page.has_more,
            total_results: page.results.len(),
        }
    }
}

/// Settings for the document handler
#[derive(Debug, Clone)]
pub struct DocumentsSettings {
    pub api_token: Option<String>,
    pub database_id: Option<String>,
    pub default_page_size: u32,
    pub max_pages: usize,
}

impl Default for DocumentsSettings {
    fn default() -> Self {
        Self::from(&DocumentsConfig::default())
    }
}

impl From<&DocumentsConfig> for DocumentsSettings {
    fn from(config: &DocumentsConfig) -> Self {
        Self {
            api_token: config.api_token.clone(),
            database_id: config.database_id.clone(),
            default_page_size: config.default_page_size.clamp(1, MAX_PAGE_SIZE),
            max_pages: config.max_pages.max(1),
        }
    }
}

impl DocumentsSettings {
    fn target(&self) -> Result<DocumentTarget, ProxyError> {
        Ok(DocumentTarget {
            api_token: require(&self.api_token, "documents.api_token")?.to_string(),
            database_id: require(&self.database_id, "documents.database_id")?.to_string(),
        })
    }
}

/// Caching proxy for the document-database query endpoint
pub struct DocumentsProxy {
    source: Arc<dyn DocumentSource>,
    cache: Arc<KeyedCache<DocumentPage>>,
    in_flight: Arc<InFlight<FetchResult>>,
    settings: DocumentsSettings,
}

impl DocumentsProxy {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        cache: Arc<KeyedCache<DocumentPage>>,
        settings: DocumentsSettings,
    ) -> Self {
        Self {
            source,
            cache,
            in_flight: Arc::new(InFlight::new()),
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<KeyedCache<DocumentPage>> {
        &self.cache
    }

    /// Handles one request, converting every fault into an error response
    pub async fn handle(&self, params: &DocumentParams, client_etag: Option<&str>) -> ProxyResponse {
        match self.try_handle(params, client_etag).await {
            Ok(response) => response,
            Err(err) => {
                error!(status = err.status(), detail = err.detail().unwrap_or(""), "document query failed: {}", err);
                err.into_response()
            }
        }
    }

    async fn try_handle(
        &self,
        params: &DocumentParams,
        client_etag: Option<&str>,
    ) -> Result<ProxyResponse, ProxyError> {
        let target = self.settings.target()?;
        let query = DocumentQuery::from_params(params, self.settings.default_page_size)?;
        let key = query.cache_key();
        let ttl = self.cache.ttl();
        let now = Utc::now();

        let cached = self.cache.get_at(&key, now);
        match negotiate(client_etag, cached.as_ref(), ttl, now) {
            Negotiation::NotModified { etag, max_age } => {
                debug!(key = %key, "etag matched, not modified");
                return Ok(ProxyResponse::not_modified(etag, max_age));
            }
            Negotiation::Full { body, etag, max_age } => {
                debug!(key = %key, "cache hit");
                return Ok(ProxyResponse::json(200, &DocumentsBody::from(body))?
                    .with_etag(etag)
                    .with_max_age(max_age)
                    .with_cache_status(true));
            }
            Negotiation::Miss => debug!(key = %key, "cache miss"),
        }

        let entry = self.fetch(target, query, key).await?;
        Ok(ProxyResponse::json(200, &DocumentsBody::from(&entry.data))?
            .with_etag(&entry.etag)
            .with_max_age(ttl)
            .with_cache_status(false))
    }

    /// Runs (or joins) the upstream fetch for `key`
    ///
    /// The fetch runs on its own task, so it completes and warms the cache even
    /// if every waiting caller goes away. The registration is released when the
    /// task ends, whether it returns, panics or is aborted.
    async fn fetch(
        &self,
        target: DocumentTarget,
        query: DocumentQuery,
        key: CacheKey,
    ) -> Result<CacheEntry<DocumentPage>, ProxyError> {
        let shared = self.in_flight.join_or_start(&key, || {
            let source = Arc::clone(&self.source);
            let cache = Arc::clone(&self.cache);
            let guard = self.in_flight.guard(key.clone());
            let max_pages = self.settings.max_pages;
            let key = key.clone();

            let task = tokio::spawn(async move {
                let _guard = guard;
                fetch_and_store(source.as_ref(), &cache, &target, &query, key, max_pages)
                    .await
                    .map_err(Arc::new)
            });

            async move {
                task.await
                    .unwrap_or_else(|e| Err(Arc::new(FetchError::Aborted(e.to_string()))))
            }
            .boxed()
        });

        Ok(shared.await?)
    }
}

/// Fetches from upstream, tags the result and stores it
async fn fetch_and_store(
    source: &dyn DocumentSource,
    cache: &KeyedCache<DocumentPage>,
    target: &DocumentTarget,
    query: &DocumentQuery,
    key: CacheKey,
    max_pages: usize,
) -> Result<CacheEntry<DocumentPage>, FetchError> {
    let page = if query.fetch_all {
        aggregate_pages(source, target, &query.request, max_pages).await?
    } else {
        source
            .query(target, &query.request)
            .await
            .map_err(|source| AggregateError::Upstream { page: 1, source })?
    };

    let etag = digest_etag(&page)?;
    info!(key = %key, results = page.results.len(), etag = %etag, "caching document query");
    Ok(cache.insert(key, page, etag))
}
