//! Per-endpoint pagination configuration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

/// Callback that applies a reusable named filter to the query
pub type NamedFilter<Q> = Arc<dyn Fn(&mut Q) + Send + Sync>;

/// Callback that applies a search term to the query
pub type SearchFn<Q> = Arc<dyn Fn(&mut Q, &str) + Send + Sync>;

/// Maps one row to the cells of one spreadsheet line
pub type RowMapper<R> = Arc<dyn Fn(&R) -> Vec<Value> + Send + Sync>;

/// How the `search` parameter is applied
pub enum SearchConfig<Q> {
    /// `LIKE '%term%'` on each column, OR-ed together as one group
    Columns(Vec<String>),
    /// Caller-supplied search logic
    Custom(SearchFn<Q>),
}

impl<Q> SearchConfig<Q> {
    /// Whether this configuration can never affect the query
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Columns(columns) if columns.is_empty())
    }
}

impl<Q> Default for SearchConfig<Q> {
    fn default() -> Self {
        Self::Columns(Vec::new())
    }
}

impl<Q> Clone for SearchConfig<Q> {
    fn clone(&self) -> Self {
        match self {
            Self::Columns(columns) => Self::Columns(columns.clone()),
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<Q> fmt::Debug for SearchConfig<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Columns(columns) => f.debug_tuple("Columns").field(columns).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for one paginated endpoint
///
/// `Q` is the query adapter type the callbacks operate on and `R` its row
/// type (for the export mapper).
///
/// # Example
///
/// ```rust
/// use acton_paginate::pagination::PaginationOptions;
/// use acton_paginate::query::{MemoryQuery, Predicate, QueryAdapter};
/// use serde_json::{json, Value};
///
/// let options: PaginationOptions<MemoryQuery, Value> = PaginationOptions::new()
///     .with_search_columns(["name", "email"])
///     .with_filter_columns(["status"])
///     .with_filter("admins", |q: &mut MemoryQuery| {
///         q.and_where(Predicate::eq("role", "admin"));
///     })
///     .with_export_headings(["Name", "Email"])
///     .with_export_mapper(|row: &Value| vec![row["name"].clone(), row["email"].clone()]);
///
/// assert!(options.named_filter("admins").is_some());
/// assert!(options.named_filter("owners").is_none());
/// ```
pub struct PaginationOptions<Q, R = Value> {
    pub(crate) search: SearchConfig<Q>,
    pub(crate) filter_columns: Vec<String>,
    pub(crate) filters: HashMap<String, NamedFilter<Q>>,
    pub(crate) cache_duration: Option<Duration>,
    pub(crate) cache_tags: Option<Vec<String>>,
    pub(crate) export_headings: Option<Vec<String>>,
    pub(crate) export_mapper: Option<RowMapper<R>>,
}

impl<Q, R> PaginationOptions<Q, R> {
    /// Empty options: no search, no filters, default cache settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Search with `LIKE '%term%'` on these columns
    #[must_use]
    pub fn with_search_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search = SearchConfig::Columns(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Search with custom logic instead of column matching
    #[must_use]
    pub fn with_search<F>(mut self, search: F) -> Self
    where
        F: Fn(&mut Q, &str) + Send + Sync + 'static,
    {
        self.search = SearchConfig::Custom(Arc::new(search));
        self
    }

    /// Columns that may be filtered by exact value through same-named parameters
    #[must_use]
    pub fn with_filter_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Register a named filter selectable with `?filter=<name>`
    #[must_use]
    pub fn with_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&mut Q) + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    /// Override the cache lifespan
    #[must_use]
    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }

    /// Override the cache tags (default: the query's table name)
    #[must_use]
    pub fn with_cache_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Spreadsheet header row (default: keys of the first row)
    #[must_use]
    pub fn with_export_headings<I, S>(mut self, headings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.export_headings = Some(headings.into_iter().map(Into::into).collect());
        self
    }

    /// Spreadsheet row mapping (default: the row's values in declaration order)
    ///
    /// Must produce cells in the same order as the export headings.
    #[must_use]
    pub fn with_export_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&R) -> Vec<Value> + Send + Sync + 'static,
    {
        self.export_mapper = Some(Arc::new(mapper));
        self
    }

    /// Search configuration
    pub fn search(&self) -> &SearchConfig<Q> {
        &self.search
    }

    /// Filterable columns
    pub fn filter_columns(&self) -> &[String] {
        &self.filter_columns
    }

    /// Look a named filter up by its key
    pub fn named_filter(&self, name: &str) -> Option<&NamedFilter<Q>> {
        self.filters.get(name)
    }

    /// Cache tags, falling back to the table name
    pub fn cache_tags_or(&self, table: &str) -> Vec<String> {
        self.cache_tags
            .clone()
            .unwrap_or_else(|| vec![table.to_string()])
    }

    /// Cache lifespan, falling back to `default`
    pub fn cache_duration_or(&self, default: Duration) -> Duration {
        self.cache_duration.unwrap_or(default)
    }
}

impl<Q, R> Default for PaginationOptions<Q, R> {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            filter_columns: Vec::new(),
            filters: HashMap::new(),
            cache_duration: None,
            cache_tags: None,
            export_headings: None,
            export_mapper: None,
        }
    }
}

impl<Q, R> Clone for PaginationOptions<Q, R> {
    fn clone(&self) -> Self {
        Self {
            search: self.search.clone(),
            filter_columns: self.filter_columns.clone(),
            filters: self.filters.clone(),
            cache_duration: self.cache_duration,
            cache_tags: self.cache_tags.clone(),
            export_headings: self.export_headings.clone(),
            export_mapper: self.export_mapper.clone(),
        }
    }
}

impl<Q, R> fmt::Debug for PaginationOptions<Q, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filter_names: Vec<&String> = self.filters.keys().collect();
        filter_names.sort();
        f.debug_struct("PaginationOptions")
            .field("search", &self.search)
            .field("filter_columns", &self.filter_columns)
            .field("filters", &filter_names)
            .field("cache_duration", &self.cache_duration)
            .field("cache_tags", &self.cache_tags)
            .field("export_headings", &self.export_headings)
            .field("export_mapper", &self.export_mapper.is_some())
            .finish()
    }
}
