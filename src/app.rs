//! Application wiring
//!
//! Builds the HTTP clients, cache stores and handlers from a loaded `Config`.
//! The stores live as long as the returned state, which is the process lifetime
//! in the server binary and a single test in the test suite.

use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::cache::{KeyedCache, SlotCache};
use crate::config::{Config, ConfigError};
use crate::data::{DocumentSource, QueryClient, ShareClient, TelemetrySource};
use crate::proxy::{DocumentsProxy, DocumentsSettings, TelemetryProxy, TelemetrySettings};
use crate::server::AppState;

/// Errors that can occur while assembling the application
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Builds the shared state with real upstream clients
pub fn build_state(config: &Config) -> Result<AppState, AppError> {
    let http = Client::builder()
        .timeout(std::time::Duration::from_secs(config.server.request_timeout_secs))
        .build()?;

    let share = ShareClient::with_client(http.clone()).with_base_url(&config.telemetry.base_url);
    let query = QueryClient::with_client(http)
        .with_base_url(&config.documents.base_url)
        .with_api_version(&config.documents.api_version);

    build_state_with(config, Arc::new(share), Arc::new(query))
}

/// Builds the shared state around the given upstream sources
pub fn build_state_with(
    config: &Config,
    telemetry_source: Arc<dyn TelemetrySource>,
    document_source: Arc<dyn DocumentSource>,
) -> Result<AppState, AppError> {
    let telemetry = TelemetryProxy::new(
        telemetry_source,
        Arc::new(SlotCache::new(config.telemetry.ttl())),
        TelemetrySettings::from_config(&config.telemetry)?,
    );

    let documents = DocumentsProxy::new(
        document_source,
        Arc::new(KeyedCache::new(
            config.documents.ttl(),
            config.documents.max_entries.max(1),
        )),
        DocumentsSettings::from(&config.documents),
    );

    info!(
        telemetry_ttl_secs = config.telemetry.ttl_secs,
        documents_ttl_secs = config.documents.ttl_secs,
        max_entries = config.documents.max_entries,
        max_pages = config.documents.max_pages,
        "application state built"
    );

    Ok(AppState {
        telemetry: Arc::new(telemetry),
        documents: Arc::new(documents),
    })
}
