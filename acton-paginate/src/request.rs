//! Request parameters for paginated and exported list endpoints
//!
//! [`RequestContext`] is an owned snapshot of the request's query string. It
//! is passed explicitly into the paginator; nothing reads request state
//! implicitly. [`PaginationRequest`] layers typed accessors with defaults on
//! top of it. Accessors re-read the snapshot on every call and never fail:
//! missing or malformed values fall back to defaults.
//!
//! # Example
//!
//! ```rust
//! use acton_paginate::config::PaginationDefaults;
//! use acton_paginate::query::OrderDirection;
//! use acton_paginate::request::{ExportMode, PaginationRequest, RequestContext};
//!
//! let context = RequestContext::from_pairs([
//!     ("page", "3"),
//!     ("limit", "10"),
//!     ("order", "sideways"),
//!     ("export", "filtered"),
//! ]);
//! let defaults = PaginationDefaults::default();
//! let request = PaginationRequest::new(&context, &defaults);
//!
//! assert_eq!(request.page(), 3);
//! assert_eq!(request.limit(), 10);
//! assert_eq!(request.offset(), 20);
//! assert_eq!(request.order(), OrderDirection::Ascending);
//! assert_eq!(request.order_by(), "created_at");
//! assert_eq!(request.export_mode(), ExportMode::Filtered);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};

use crate::config::PaginationDefaults;
use crate::error::Error;
use crate::query::OrderDirection;

/// Query-string parameter names
pub mod params {
    /// 1-indexed page number
    pub const PAGE: &str = "page";
    /// Page size
    pub const LIMIT: &str = "limit";
    /// Free-text search term
    pub const SEARCH: &str = "search";
    /// Sort column
    pub const ORDER_BY: &str = "order_by";
    /// Sort direction (`asc` or `desc`)
    pub const ORDER: &str = "order";
    /// Column the range filter applies to
    pub const RANGE: &str = "range";
    /// Inclusive lower bound of the range filter
    pub const RANGE_START: &str = "range_start";
    /// Inclusive upper bound of the range filter
    pub const RANGE_END: &str = "range_end";
    /// Named filter key
    pub const FILTER: &str = "filter";
    /// Export mode (`all` or `filtered`)
    pub const EXPORT: &str = "export";
}

/// Owned snapshot of a request's query-string parameters
///
/// Implements [`FromRequestParts`], so it can be taken directly as a handler
/// argument. Repeated keys keep the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    params: BTreeMap<String, String>,
}

impl RequestContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from key/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Set a parameter, replacing any previous value
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Whether the parameter is present at all (even if empty)
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Raw parameter value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parameter value, treating an empty string as absent
    #[must_use]
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

impl From<HashMap<String, String>> for RequestContext {
    fn from(params: HashMap<String, String>) -> Self {
        Self {
            params: params.into_iter().collect(),
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // A query string that is not valid form encoding degrades to "no parameters"
        match Query::<Vec<(String, String)>>::from_request_parts(parts, state).await {
            Ok(Query(pairs)) => Ok(Self::from_pairs(pairs)),
            Err(rejection) => {
                tracing::debug!("Ignoring malformed query string: {}", rejection);
                Ok(Self::default())
            }
        }
    }
}

/// Which kind of export the request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// No export; paginate
    #[default]
    None,
    /// Export every row of the query, ignoring filters and sort
    All,
    /// Export every row matching the filters, sorted, without paging
    Filtered,
}

impl ExportMode {
    /// Interpret the raw `export` parameter
    ///
    /// Absent → `None`; `filtered` → `Filtered`; any other value (including
    /// empty) → `All`.
    #[must_use]
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            None => Self::None,
            Some("filtered") => Self::Filtered,
            Some(_) => Self::All,
        }
    }

    /// Whether an export was requested
    #[must_use]
    pub fn is_export(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::All => write!(f, "all"),
            Self::Filtered => write!(f, "filtered"),
        }
    }
}

/// Range filter requested through `range`, `range_start` and `range_end`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeSpec {
    /// Column to filter
    pub column: String,
    /// Inclusive lower bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Inclusive upper bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Typed, defaulted view over a [`RequestContext`]
#[derive(Debug, Clone, Copy)]
pub struct PaginationRequest<'a> {
    context: &'a RequestContext,
    defaults: &'a PaginationDefaults,
}

impl<'a> PaginationRequest<'a> {
    /// Create a view over `context` using `defaults` for missing values
    #[must_use]
    pub fn new(context: &'a RequestContext, defaults: &'a PaginationDefaults) -> Self {
        Self { context, defaults }
    }

    /// The underlying request context
    #[must_use]
    pub fn context(&self) -> &'a RequestContext {
        self.context
    }

    /// 1-indexed page number; anything that is not a positive integer yields 1
    #[must_use]
    pub fn page(&self) -> u64 {
        self.context
            .get(params::PAGE)
            .and_then(|p| p.trim().parse::<u64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }

    /// Page size; anything that is not a positive integer yields the default
    ///
    /// Capped at `max_limit` when one is configured.
    #[must_use]
    pub fn limit(&self) -> u64 {
        let limit = self
            .context
            .get(params::LIMIT)
            .and_then(|l| l.trim().parse::<u64>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(self.defaults.limit.max(1));

        match self.defaults.max_limit {
            Some(max) => limit.min(max.max(1)),
            None => limit,
        }
    }

    /// Number of rows to skip: `(page - 1) * limit`
    #[must_use]
    pub fn offset(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Search term, if present and non-empty
    #[must_use]
    pub fn search(&self) -> Option<&'a str> {
        self.context.get_non_empty(params::SEARCH)
    }

    /// Sort column
    #[must_use]
    pub fn order_by(&self) -> &'a str {
        self.context
            .get_non_empty(params::ORDER_BY)
            .unwrap_or(self.defaults.order_by.as_str())
    }

    /// Sort direction; values other than `asc`/`desc` yield the default
    #[must_use]
    pub fn order(&self) -> OrderDirection {
        self.context
            .get(params::ORDER)
            .and_then(OrderDirection::try_parse)
            .unwrap_or(self.defaults.order)
    }

    /// Range filter, if a range column is named
    #[must_use]
    pub fn range(&self) -> Option<RangeSpec> {
        let column = self.context.get_non_empty(params::RANGE)?;
        Some(RangeSpec {
            column: column.to_string(),
            start: self
                .context
                .get_non_empty(params::RANGE_START)
                .map(str::to_string),
            end: self
                .context
                .get_non_empty(params::RANGE_END)
                .map(str::to_string),
        })
    }

    /// Requested named filter key
    #[must_use]
    pub fn filter(&self) -> Option<&'a str> {
        self.context.get_non_empty(params::FILTER)
    }

    /// Values of the given filterable columns that are present and non-empty
    #[must_use]
    pub fn column_filters<I, S>(&self, columns: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        columns
            .into_iter()
            .filter_map(|column| {
                let column = column.as_ref();
                self.context
                    .get_non_empty(column)
                    .map(|value| (column.to_string(), value.to_string()))
            })
            .collect()
    }

    /// Requested export mode
    #[must_use]
    pub fn export_mode(&self) -> ExportMode {
        ExportMode::from_param(self.context.get(params::EXPORT))
    }
}
