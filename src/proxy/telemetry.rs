//! Latest-reading handler
//!
//! There is only one telemetry query, so results live in a single-slot cache.
//! A fresh fetch answers with `cached: false` and stores a copy flagged
//! `cached: true`, which is what later callers within the TTL receive. Both
//! carry the ETag of the stored copy, so hits can answer `If-None-Match`.

use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, error};

use super::{ProxyError, ProxyResponse};
use crate::cache::{digest_etag, CacheEntry, SlotCache};
use crate::config::{require, ConfigError, TelemetryConfig};
use crate::data::{Reading, ShareCredentials, TelemetrySource};
use crate::negotiate::{negotiate, Negotiation};
use crate::normalize::normalize_reading;

/// Settings for the telemetry handler
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub account_name: Option<String>,
    pub password: Option<String>,
    pub application_id: Option<String>,
    pub window_minutes: u32,
    pub max_count: u32,
    pub timezone: Tz,
}

impl TelemetrySettings {
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            account_name: config.account_name.clone(),
            password: config.password.clone(),
            application_id: config.application_id.clone(),
            window_minutes: config.window_minutes,
            max_count: config.max_count.max(1),
            timezone: config.display_timezone()?,
        })
    }

    fn credentials(&self) -> Result<ShareCredentials, ConfigError> {
        Ok(ShareCredentials {
            account_name: require(&self.account_name, "telemetry.account_name")?.to_string(),
            password: require(&self.password, "telemetry.password")?.to_string(),
            application_id: require(&self.application_id, "telemetry.application_id")?.to_string(),
        })
    }
}

/// Caching proxy for the latest telemetry reading
pub struct TelemetryProxy {
    source: Arc<dyn TelemetrySource>,
    cache: Arc<SlotCache<CacheEntry<Reading>>>,
    settings: TelemetrySettings,
}

impl TelemetryProxy {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        cache: Arc<SlotCache<CacheEntry<Reading>>>,
        settings: TelemetrySettings,
    ) -> Self {
        Self {
            source,
            cache,
            settings,
        }
    }

    /// Handles one request, converting every fault into an error response
    pub async fn handle(&self, client_etag: Option<&str>) -> ProxyResponse {
        match self.try_handle(client_etag).await {
            Ok(response) => response,
            Err(err) => {
                error!(status = err.status(), detail = err.detail().unwrap_or(""), "telemetry request failed: {}", err);
                err.into_response()
            }
        }
    }

    async fn try_handle(&self, client_etag: Option<&str>) -> Result<ProxyResponse, ProxyError> {
        let ttl = self.cache.ttl();
        let now = Utc::now();

        let cached = self.cache.get_at(now);
        match negotiate(client_etag, cached.as_ref(), ttl, now) {
            Negotiation::NotModified { etag, max_age } => {
                debug!("telemetry etag matched, not modified");
                return Ok(ProxyResponse::not_modified(etag, max_age));
            }
            Negotiation::Full { body, etag, max_age } => {
                debug!("telemetry cache hit");
                return Ok(ProxyResponse::json(200, body)?
                    .with_etag(etag)
                    .with_max_age(max_age)
                    .with_cache_status(true));
            }
            Negotiation::Miss => debug!("telemetry cache miss"),
        }

        let reading = self.fetch_latest().await?;
        let stored = Reading {
            cached: true,
            ..reading.clone()
        };
        let etag = digest_etag(&stored)?;
        let now = Utc::now();
        self.cache.put_at(
            CacheEntry {
                data: stored,
                stored_at: now,
                etag: etag.clone(),
            },
            now,
        );
        Ok(ProxyResponse::json(200, &reading)?
            .with_etag(&etag)
            .with_max_age(ttl)
            .with_cache_status(false))
    }

    /// Logs in and reads the newest reading from the provider
    async fn fetch_latest(&self) -> Result<Reading, ProxyError> {
        let credentials = self.settings.credentials()?;
        let session_id = self.source.login(&credentials).await?;
        let readings = self
            .source
            .fetch_latest(&session_id, self.settings.window_minutes, self.settings.max_count)
            .await?;

        let latest = readings.first().ok_or(ProxyError::NoData)?;
        Ok(normalize_reading(latest, self.settings.timezone)?)
    }
}
