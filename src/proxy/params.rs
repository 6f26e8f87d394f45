//! Document query parameters: parsing, validation and cache key derivation

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::cache::CacheKey;
use crate::config::MAX_PAGE_SIZE;
use crate::data::PageRequest;

/// Errors in caller-supplied query parameters
#[derive(Debug, Error)]
pub enum InputError {
    /// A JSON-valued parameter did not parse
    #[error("Invalid JSON in '{param}' parameter: {message}")]
    InvalidJson { param: &'static str, message: String },

    /// A JSON-valued parameter parsed but has the wrong shape
    #[error("Parameter '{param}' must be a JSON {expected}")]
    WrongShape {
        param: &'static str,
        expected: &'static str,
    },

    #[error("Parameter 'page_size' must be an integer between 1 and {max}, got '{value}'")]
    InvalidPageSize { value: String, max: u32 },

    #[error("Parameter 'fetch_all' must be true or false, got '{0}'")]
    InvalidFlag(String),

    /// The query string itself did not decode (repeated or conflicting keys)
    #[error("Invalid query string: {0}")]
    InvalidQuery(String),
}

/// Raw query-string parameters for the document endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentParams {
    pub page_size: Option<String>,
    #[serde(alias = "cursor")]
    pub start_cursor: Option<String>,
    pub filter: Option<String>,
    pub sorts: Option<String>,
    pub fetch_all: Option<String>,
}

/// A validated document query
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub request: PageRequest,
    /// Follow cursors until the provider is exhausted
    pub fetch_all: bool,
}

/// Treats empty or whitespace-only values as absent
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_json(param: &'static str, raw: &str) -> Result<Value, InputError> {
    serde_json::from_str(raw).map_err(|e| InputError::InvalidJson {
        param,
        message: e.to_string(),
    })
}

impl DocumentQuery {
    /// Validates raw parameters, filling in `default_page_size` when none is given
    pub fn from_params(params: &DocumentParams, default_page_size: u32) -> Result<Self, InputError> {
        let page_size = match present(&params.page_size) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => n,
                _ => {
                    return Err(InputError::InvalidPageSize {
                        value: raw.to_string(),
                        max: MAX_PAGE_SIZE,
                    })
                }
            },
            None => default_page_size.clamp(1, MAX_PAGE_SIZE),
        };

        let filter = match present(&params.filter) {
            Some(raw) => match parse_json("filter", raw)? {
                value @ Value::Object(_) => Some(value),
                _ => {
                    return Err(InputError::WrongShape {
                        param: "filter",
                        expected: "object",
                    })
                }
            },
            None => None,
        };

        let sorts = match present(&params.sorts) {
            Some(raw) => match parse_json("sorts", raw)? {
                value @ Value::Array(_) => Some(value),
                _ => {
                    return Err(InputError::WrongShape {
                        param: "sorts",
                        expected: "array",
                    })
                }
            },
            None => None,
        };

        let fetch_all = match present(&params.fetch_all) {
            None => true,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(InputError::InvalidFlag(raw.to_string())),
            },
        };

        Ok(Self {
            request: PageRequest {
                page_size,
                start_cursor: present(&params.start_cursor).map(str::to_string),
                filter,
                sorts,
            },
            fetch_all,
        })
    }

    /// Cache key over the effective query
    ///
    /// Independent of the key order inside `filter` and `sorts` objects; absent
    /// fields are left out rather than recorded as null.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_fields(
            "documents",
            [
                ("page_size", Some(json!(self.request.page_size))),
                ("start_cursor", self.request.start_cursor.clone().map(Value::String)),
                ("filter", self.request.filter.clone()),
                ("sorts", self.request.sorts.clone()),
                ("fetch_all", Some(Value::Bool(self.fetch_all))),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> DocumentParams {
        let mut params = DocumentParams::default();
        for (name, value) in pairs {
            let value = Some(value.to_string());
            match *name {
                "page_size" => params.page_size = value,
                "start_cursor" => params.start_cursor = value,
                "filter" => params.filter = value,
                "sorts" => params.sorts = value,
                "fetch_all" => params.fetch_all = value,
                other => panic!("unknown param {}", other),
            }
        }
        params
    }

    #[test]
    fn test_defaults() {
        let query = DocumentQuery::from_params(&DocumentParams::default(), 100).unwrap();
        assert_eq!(query.request.page_size, 100);
        assert!(query.request.start_cursor.is_none());
        assert!(query.request.filter.is_none());
        assert!(query.request.sorts.is_none());
        assert!(query.fetch_all);
    }

    #[test]
    fn test_parses_all_fields() {
        let query = DocumentQuery::from_params(
            &params(&[
                ("page_size", "2"),
                ("start_cursor", "abc"),
                ("filter", r#"{"property":"Done","checkbox":{"equals":true}}"#),
                ("sorts", r#"[{"property":"Date","direction":"ascending"}]"#),
                ("fetch_all", "false"),
            ]),
            100,
        )
        .unwrap();

        assert_eq!(query.request.page_size, 2);
        assert_eq!(query.request.start_cursor.as_deref(), Some("abc"));
        assert_eq!(query.request.filter.as_ref().unwrap()["property"], "Done");
        assert!(query.request.sorts.as_ref().unwrap().is_array());
        assert!(!query.fetch_all);
    }

    #[test]
    fn test_malformed_filter_names_parameter() {
        let err = DocumentQuery::from_params(&params(&[("filter", "{not json")]), 100).unwrap_err();
        assert!(matches!(err, InputError::InvalidJson { param: "filter", .. }));
        assert!(err.to_string().contains("'filter'"));
    }

    #[test]
    fn test_malformed_sorts_names_parameter() {
        let err = DocumentQuery::from_params(&params(&[("sorts", "[")]), 100).unwrap_err();
        assert!(matches!(err, InputError::InvalidJson { param: "sorts", .. }));
    }

    #[test]
    fn test_wrong_shapes() {
        let err = DocumentQuery::from_params(&params(&[("filter", "[1]")]), 100).unwrap_err();
        assert!(matches!(err, InputError::WrongShape { param: "filter", .. }));

        let err = DocumentQuery::from_params(&params(&[("sorts", "{}")]), 100).unwrap_err();
        assert!(matches!(err, InputError::WrongShape { param: "sorts", .. }));
    }

    #[test]
    fn test_page_size_bounds() {
        for bad in ["0", "101", "-1", "ten"] {
            let err = DocumentQuery::from_params(&params(&[("page_size", bad)]), 100).unwrap_err();
            assert!(matches!(err, InputError::InvalidPageSize { .. }), "page_size {}", bad);
        }
        let query = DocumentQuery::from_params(&params(&[("page_size", "100")]), 10).unwrap();
        assert_eq!(query.request.page_size, 100);
    }

    #[test]
    fn test_invalid_fetch_all_flag() {
        let err = DocumentQuery::from_params(&params(&[("fetch_all", "maybe")]), 100).unwrap_err();
        assert!(matches!(err, InputError::InvalidFlag(_)));
    }

    #[test]
    fn test_blank_values_are_absent() {
        let query = DocumentQuery::from_params(
            &params(&[("start_cursor", ""), ("filter", "  "), ("page_size", "")]),
            25,
        )
        .unwrap();
        assert!(query.request.start_cursor.is_none());
        assert!(query.request.filter.is_none());
        assert_eq!(query.request.page_size, 25);
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = DocumentQuery::from_params(
            &params(&[
                ("page_size", "10"),
                ("filter", r#"{"property":"Status","select":{"equals":"Done"}}"#),
                ("sorts", r#"[{"property":"Date","direction":"descending"}]"#),
            ]),
            100,
        )
        .unwrap();
        let b = DocumentQuery::from_params(
            &params(&[
                ("sorts", r#"[{"direction":"descending","property":"Date"}]"#),
                ("filter", r#"{"select":{"equals":"Done"},"property":"Status"}"#),
                ("page_size", "10"),
            ]),
            100,
        )
        .unwrap();

        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_distinguishes_queries() {
        let base = DocumentQuery::from_params(&params(&[("page_size", "10")]), 100).unwrap();
        let cursor = DocumentQuery::from_params(&params(&[("page_size", "10"), ("start_cursor", "c")]), 100)
            .unwrap();
        let single = DocumentQuery::from_params(&params(&[("page_size", "10"), ("fetch_all", "false")]), 100)
            .unwrap();

        assert_ne!(base.cache_key(), cursor.cache_key());
        assert_ne!(base.cache_key(), single.cache_key());
    }

    #[test]
    fn test_cache_key_omits_absent_cursor() {
        let query = DocumentQuery::from_params(&params(&[("start_cursor", "")]), 100).unwrap();
        assert!(!query.cache_key().as_str().contains("start_cursor"));
    }
}
