//! Cursor-driven aggregation across a paginated query API
//!
//! Pages are fetched one after another, each with the cursor handed back by the
//! previous page, until the provider reports there is nothing left. Any failed
//! page aborts the whole aggregation; partial results are never returned.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::{DocumentPage, DocumentSource, DocumentTarget, PageRequest, UpstreamError};
use crate::normalize::completed_page;

/// Default ceiling on pages fetched by one aggregation
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Errors that can occur while aggregating pages
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A page fetch failed
    #[error("Page {page} failed: {source}")]
    Upstream {
        page: usize,
        #[source]
        source: UpstreamError,
    },

    /// The provider kept reporting more pages past the configured ceiling
    #[error("Aggregation limit exceeded after {pages} pages")]
    LimitExceeded { pages: usize },
}

impl AggregateError {
    /// The upstream failure behind this error, if any
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            AggregateError::Upstream { source, .. } => Some(source),
            AggregateError::LimitExceeded { .. } => None,
        }
    }
}

/// Fetches every page for `base` and concatenates the results in order
///
/// The first page uses `base.start_cursor`. The returned page always has
/// `has_more = false` and no cursor.
pub async fn aggregate_pages<S>(
    source: &S,
    target: &DocumentTarget,
    base: &PageRequest,
    max_pages: usize,
) -> Result<DocumentPage, AggregateError>
where
    S: DocumentSource + ?Sized,
{
    let mut results: Vec<Value> = Vec::new();
    let mut cursor = base.start_cursor.clone();
    let mut pages = 0;

    loop {
        let request = base.at_cursor(cursor.take());
        let page = source
            .query(target, &request)
            .await
            .map_err(|source| AggregateError::Upstream {
                page: pages + 1,
                source,
            })?;
        pages += 1;

        debug!(page = pages, items = page.results.len(), has_more = page.has_more, "fetched page");
        results.extend(page.results);

        if !page.has_more {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                warn!(page = pages, "upstream reported more pages without a cursor");
                break;
            }
        }
        if pages >= max_pages {
            return Err(AggregateError::LimitExceeded { pages });
        }
    }

    Ok(completed_page(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Serves a fixed sequence of pages and records the cursors it was asked for
    struct ScriptedSource {
        pages: Vec<Result<DocumentPage, u16>>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<DocumentPage, u16>>) -> Self {
            Self {
                pages,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DocumentSource for ScriptedSource {
        async fn query(
            &self,
            _target: &DocumentTarget,
            request: &PageRequest,
        ) -> Result<DocumentPage, UpstreamError> {
            let mut seen = self.seen.lock();
            let index = seen.len();
            seen.push(request.start_cursor.clone());
            match self.pages.get(index) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(status)) => Err(UpstreamError::Status {
                    status: *status,
                    body: "boom".to_string(),
                }),
                None => panic!("unexpected page request {}", index + 1),
            }
        }
    }

    fn page(ids: &[u32], next: Option<&str>, has_more: bool) -> DocumentPage {
        DocumentPage {
            results: ids.iter().map(|id| json!({ "id": id })).collect(),
            next_cursor: next.map(str::to_string),
            has_more,
        }
    }

    fn target() -> DocumentTarget {
        DocumentTarget {
            api_token: "token".to_string(),
            database_id: "db".to_string(),
        }
    }

    fn base(cursor: Option<&str>) -> PageRequest {
        PageRequest {
            page_size: 2,
            start_cursor: cursor.map(str::to_string),
            filter: None,
            sorts: None,
        }
    }

    #[tokio::test]
    async fn test_concatenates_all_pages_in_order() {
        let source = ScriptedSource::new(vec![
            Ok(page(&[1, 2], Some("b"), true)),
            Ok(page(&[3, 4], Some("c"), true)),
            Ok(page(&[5], None, false)),
        ]);

        let result = aggregate_pages(&source, &target(), &base(None), 10).await.unwrap();

        let ids: Vec<u64> = result.results.iter().map(|r| r["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(!result.has_more);
        assert!(result.next_cursor.is_none());
        assert_eq!(
            *source.seen.lock(),
            vec![None, Some("b".to_string()), Some("c".to_string())]
        );
    }

    #[tokio::test]
    async fn test_starts_from_caller_cursor() {
        let source = ScriptedSource::new(vec![Ok(page(&[9], None, false))]);

        aggregate_pages(&source, &target(), &base(Some("start")), 10).await.unwrap();

        assert_eq!(*source.seen.lock(), vec![Some("start".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_page_aborts_without_partial_results() {
        let source = ScriptedSource::new(vec![
            Ok(page(&[1, 2], Some("b"), true)),
            Err(502),
            Ok(page(&[5], None, false)),
        ]);

        let err = aggregate_pages(&source, &target(), &base(None), 10).await.unwrap_err();

        match err {
            AggregateError::Upstream { page, ref source } => {
                assert_eq!(page, 2);
                assert_eq!(source.status(), Some(502));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(source.seen.lock().len(), 2, "third page must not be requested");
    }

    #[tokio::test]
    async fn test_page_ceiling() {
        let source = ScriptedSource::new(vec![
            Ok(page(&[1], Some("b"), true)),
            Ok(page(&[2], Some("c"), true)),
            Ok(page(&[3], Some("d"), true)),
        ]);

        let err = aggregate_pages(&source, &target(), &base(None), 2).await.unwrap_err();

        assert!(matches!(err, AggregateError::LimitExceeded { pages: 2 }));
        assert_eq!(source.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_ceiling_not_hit_when_last_page_completes() {
        let source = ScriptedSource::new(vec![
            Ok(page(&[1], Some("b"), true)),
            Ok(page(&[2], None, false)),
        ]);

        let result = aggregate_pages(&source, &target(), &base(None), 2).await.unwrap();
        assert_eq!(result.results.len(), 2);
    }

    #[tokio::test]
    async fn test_more_pages_without_cursor_stops() {
        let source = ScriptedSource::new(vec![Ok(page(&[1], None, true))]);

        let result = aggregate_pages(&source, &target(), &base(None), 10).await.unwrap();

        assert_eq!(result.results.len(), 1);
        assert!(!result.has_more);
    }
}
