//! HTTP surface
//!
//! Thin axum layer: extracts the query string and `If-None-Match`, calls the
//! handlers and writes their `ProxyResponse` back out.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::warn;

use crate::proxy::{
    DocumentParams, DocumentsProxy, InputError, ProxyError, ProxyResponse, TelemetryProxy,
};

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<TelemetryProxy>,
    pub documents: Arc<DocumentsProxy>,
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/telemetry", get(get_telemetry))
        .route("/api/documents", get(get_documents))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_telemetry(State(state): State<AppState>, headers: HeaderMap) -> Response {
    into_http(state.telemetry.handle(if_none_match(&headers)).await)
}

async fn get_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<DocumentParams>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "rejected document query string");
            let err = ProxyError::from(InputError::InvalidQuery(rejection.body_text()));
            return into_http(err.into_response());
        }
    };
    into_http(state.documents.handle(&params, if_none_match(&headers)).await)
}

fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
}

/// Converts a handler response into an axum response
pub fn into_http(response: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut out = match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };

    let headers = out.headers_mut();
    for (name, value) in response.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = name, value = %value, "dropping invalid header"),
        }
    }
    out
}
