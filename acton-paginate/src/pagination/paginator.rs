//! Request orchestration: paginate or export, through the cache

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::config::{Config, PaginationDefaults};
use crate::error::Result;
use crate::export::{self, ExportFile};
use crate::query::QueryAdapter;
use crate::request::{ExportMode, PaginationRequest, RequestContext};
use crate::response::{PageResponse, Paginated};

use super::cache_key::CacheKey;
use super::meta::PageMeta;
use super::options::PaginationOptions;
use super::pipeline::Pipeline;
use super::resource::{GenericResource, Resource};

/// Rows produced by one run of the pipeline
///
/// `total` counts every row matching the filters before offset and limit
/// were applied. This is the unit stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet<R> {
    /// Materialized rows
    pub rows: Vec<R>,
    /// Rows matching the filters across all pages
    pub total: u64,
}

/// Runs paginated and exported list requests against a cache store
///
/// Cheap to clone when the cache store is (both bundled stores are), so it
/// can live directly in axum router state.
///
/// # Example
///
/// ```rust
/// use acton_paginate::cache::MemoryCache;
/// use acton_paginate::config::PaginationDefaults;
/// use acton_paginate::pagination::{PaginationOptions, Paginator};
/// use acton_paginate::query::MemoryQuery;
/// use acton_paginate::request::RequestContext;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> acton_paginate::error::Result<()> {
/// let paginator = Paginator::new(MemoryCache::new(), PaginationDefaults::default());
/// let rows = (1..=25).map(|id| json!({"id": id, "created_at": id})).collect();
/// let query = MemoryQuery::new("users", rows);
///
/// let context = RequestContext::from_pairs([("page", "2"), ("limit", "10")]);
/// let page = paginator
///     .paginate(query, &context, &PaginationOptions::new())
///     .await?;
///
/// assert_eq!((page.meta.from, page.meta.to, page.meta.last_page), (11, 20, 3));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Paginator<C> {
    cache: C,
    defaults: PaginationDefaults,
}

impl<C: CacheStore> Paginator<C> {
    /// Create a paginator with explicit defaults
    pub fn new(cache: C, defaults: PaginationDefaults) -> Self {
        Self { cache, defaults }
    }

    /// Create a paginator using the `[pagination]` section of the configuration
    pub fn from_config(cache: C, config: &Config) -> Self {
        Self::new(cache, config.pagination.clone())
    }

    /// The cache store, e.g. to flush tags after a write
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Request defaults
    pub fn defaults(&self) -> &PaginationDefaults {
        &self.defaults
    }

    /// Paginate, or export when the request carries an `export` parameter
    ///
    /// Rows are presented with [`GenericResource`].
    pub async fn process<Q>(
        &self,
        query: Q,
        context: &RequestContext,
        options: &PaginationOptions<Q, Q::Row>,
    ) -> Result<Paginated<Q::Row>>
    where
        Q: QueryAdapter,
        Q::Row: Serialize + DeserializeOwned,
    {
        self.process_with(query, context, options, &GenericResource)
            .await
    }

    /// Like [`process`](Self::process), presenting page rows through `resource`
    pub async fn process_with<Q, Res>(
        &self,
        query: Q,
        context: &RequestContext,
        options: &PaginationOptions<Q, Q::Row>,
        resource: &Res,
    ) -> Result<Paginated<Res::Output>>
    where
        Q: QueryAdapter,
        Q::Row: Serialize + DeserializeOwned,
        Res: Resource<Q::Row>,
    {
        let request = PaginationRequest::new(context, &self.defaults);
        if request.export_mode().is_export() {
            let file = self.export(query, context, options).await?;
            Ok(Paginated::Download(file))
        } else {
            let page = self.paginate_with(query, context, options, resource).await?;
            Ok(Paginated::Page(page))
        }
    }

    /// Run the full pipeline with offset/limit and build one page
    pub async fn paginate<Q>(
        &self,
        query: Q,
        context: &RequestContext,
        options: &PaginationOptions<Q, Q::Row>,
    ) -> Result<PageResponse<Q::Row>>
    where
        Q: QueryAdapter,
        Q::Row: Serialize + DeserializeOwned,
    {
        self.paginate_with(query, context, options, &GenericResource)
            .await
    }

    /// Like [`paginate`](Self::paginate), presenting rows through `resource`
    pub async fn paginate_with<Q, Res>(
        &self,
        query: Q,
        context: &RequestContext,
        options: &PaginationOptions<Q, Q::Row>,
        resource: &Res,
    ) -> Result<PageResponse<Res::Output>>
    where
        Q: QueryAdapter,
        Q::Row: Serialize + DeserializeOwned,
        Res: Resource<Q::Row>,
    {
        let request = PaginationRequest::new(context, &self.defaults);
        let table = query.table_name().to_string();
        let key = CacheKey::from_request(&table, &request, options.filter_columns()).render();
        let tags = options.cache_tags_or(&table);
        let ttl = options.cache_duration_or(self.defaults.cache_duration());

        tracing::debug!(
            table = %table,
            page = request.page(),
            limit = request.limit(),
            "Paginating query"
        );

        let result: ResultSet<Q::Row> = self
            .cache
            .remember(&tags, &key, ttl, load_page(query, request, options))
            .await?;

        let meta = PageMeta::new(
            result.total,
            request.limit(),
            request.page(),
            result.rows.len() as u64,
            request.order(),
            request.order_by(),
        );
        let data = result
            .rows
            .into_iter()
            .map(|row| resource.present(row))
            .collect();

        Ok(PageResponse::new(data, meta))
    }

    /// Build a spreadsheet of the query's rows
    ///
    /// With `export=filtered` the pipeline runs without offset/limit; any
    /// other mode exports every row of the query untouched.
    pub async fn export<Q>(
        &self,
        query: Q,
        context: &RequestContext,
        options: &PaginationOptions<Q, Q::Row>,
    ) -> Result<ExportFile>
    where
        Q: QueryAdapter,
        Q::Row: Serialize + DeserializeOwned,
    {
        let request = PaginationRequest::new(context, &self.defaults);
        let mode = request.export_mode();
        let table = query.table_name().to_string();
        let key = CacheKey::from_request(&table, &request, options.filter_columns()).render();
        let tags = options.cache_tags_or(&table);
        let ttl = options.cache_duration_or(self.defaults.cache_duration());

        tracing::debug!(table = %table, mode = %mode, "Exporting query");

        let result: ResultSet<Q::Row> = self
            .cache
            .remember(&tags, &key, ttl, load_export(query, request, options))
            .await?;

        let bytes = export::build_workbook(
            &result.rows,
            options.export_headings.as_deref(),
            options.export_mapper.as_ref(),
        )?;
        let filename = export::export_filename(&self.defaults.export_prefix, Utc::now());

        Ok(ExportFile::new(filename, bytes))
    }
}

/// One page of rows plus the filtered total
async fn load_page<Q>(
    mut query: Q,
    request: PaginationRequest<'_>,
    options: &PaginationOptions<Q, Q::Row>,
) -> Result<ResultSet<Q::Row>>
where
    Q: QueryAdapter,
{
    Pipeline::new(&mut query, request, options)
        .apply_filters()
        .apply_limit();
    let total = query.count().await?;
    let rows = query.get().await?;
    Ok(ResultSet { rows, total })
}

/// Every exported row; the pipeline only runs for `export=filtered`
async fn load_export<Q>(
    mut query: Q,
    request: PaginationRequest<'_>,
    options: &PaginationOptions<Q, Q::Row>,
) -> Result<ResultSet<Q::Row>>
where
    Q: QueryAdapter,
{
    if request.export_mode() == ExportMode::Filtered {
        Pipeline::new(&mut query, request, options).apply_filters();
    }
    let rows = query.get().await?;
    let total = rows.len() as u64;
    Ok(ResultSet { rows, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::Error;
    use crate::query::{FilterOperator, MemoryQuery, OrderDirection, Predicate};
    use crate::export::tests::read_sheet;
    use crate::pagination::MapResource;
    use calamine::Data;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Options = PaginationOptions<MemoryQuery, Value>;

    fn paginator() -> Paginator<MemoryCache> {
        Paginator::new(MemoryCache::new(), PaginationDefaults::default())
    }

    /// 25 users; odd ids are active, every fifth is an admin
    fn users() -> MemoryQuery {
        let rows = (1..=25)
            .map(|id| {
                json!({
                    "id": id,
                    "name": format!("user{:02}", id),
                    "status": if id % 2 == 1 { "active" } else { "inactive" },
                    "role": if id % 5 == 0 { "admin" } else { "member" },
                    "created_at": format!("2024-01-{:02}", id),
                })
            })
            .collect();
        MemoryQuery::new("users", rows)
    }

    fn ids(rows: &[Value]) -> Vec<i64> {
        rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_page_two_of_twenty_five() {
        let context = RequestContext::from_pairs([("page", "2"), ("limit", "10")]);
        let page = paginator()
            .paginate(users(), &context, &Options::new())
            .await
            .unwrap();

        assert_eq!(page.data.len(), 10);
        assert_eq!(ids(&page.data), (11..=20).collect::<Vec<_>>());
        assert_eq!(page.meta.total, 25);
        assert_eq!(page.meta.per_page, 10);
        assert_eq!(page.meta.current_page, 2);
        assert_eq!(page.meta.from, 11);
        assert_eq!(page.meta.to, 20);
        assert_eq!(page.meta.last_page, 3);
        assert_eq!(page.meta.order, OrderDirection::Ascending);
        assert_eq!(page.meta.order_by, "created_at");
    }

    #[tokio::test]
    async fn test_search_spellings_are_cached_apart() {
        let items = || {
            MemoryQuery::new(
                "items",
                vec![
                    json!({"id": 1, "name": "foobar", "created_at": 1}),
                    json!({"id": 2, "name": "foo bar", "created_at": 2}),
                ],
            )
        };
        let options = Options::new().with_search_columns(["name"]);
        let paginator = paginator();

        let camel = RequestContext::from_pairs([("search", "fooBar")]);
        let spaced = RequestContext::from_pairs([("search", "foo bar")]);
        let first = paginator.paginate(items(), &camel, &options).await.unwrap();
        let second = paginator.paginate(items(), &spaced, &options).await.unwrap();

        assert_eq!(ids(&first.data), vec![1]);
        assert_eq!(ids(&second.data), vec![2]);
    }

    #[tokio::test]
    async fn test_row_count_never_exceeds_limit() {
        for (page, limit) in [(1, 1), (1, 7), (3, 7), (4, 7), (9, 3), (1, 100)] {
            let context = RequestContext::from_pairs([
                ("page", page.to_string()),
                ("limit", limit.to_string()),
            ]);
            let result = paginator()
                .paginate(users(), &context, &Options::new())
                .await
                .unwrap();
            assert!(result.data.len() as u64 <= limit, "page={page} limit={limit}");
            if let Some(first) = result.data.first() {
                assert_eq!(first["id"].as_u64().unwrap(), (page - 1) * limit + 1);
            }
        }
    }

    #[tokio::test]
    async fn test_empty_result_metadata() {
        let context = RequestContext::from_pairs([("status", "deleted")]);
        let options = Options::new().with_filter_columns(["status"]);
        let page = paginator()
            .paginate(users(), &context, &options)
            .await
            .unwrap();

        assert!(page.data.is_empty());
        assert_eq!((page.meta.total, page.meta.from, page.meta.to), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_filters_compose() {
        let options = Options::new()
            .with_search_columns(["name"])
            .with_filter_columns(["status"])
            .with_filter("admins", |q: &mut MemoryQuery| {
                q.and_where(Predicate::eq("role", "admin"));
            });
        let context = RequestContext::from_pairs([
            ("search", "user1"),
            ("status", "active"),
            ("order", "desc"),
            ("order_by", "id"),
        ]);

        let page = paginator()
            .paginate(users(), &context, &options)
            .await
            .unwrap();
        assert_eq!(ids(&page.data), vec![19, 17, 15, 13, 11]);

        let context = context.with("filter", "admins");
        let page = paginator()
            .paginate(users(), &context, &options)
            .await
            .unwrap();
        assert_eq!(ids(&page.data), vec![15]);
        assert_eq!(page.meta.order, OrderDirection::Descending);
    }

    #[tokio::test]
    async fn test_unknown_filter_behaves_like_no_filter() {
        let options = Options::new().with_filter("admins", |q: &mut MemoryQuery| {
            q.and_where(Predicate::eq("role", "admin"));
        });
        let context = RequestContext::from_pairs([("filter", "unknown_name"), ("limit", "100")]);

        let page = paginator()
            .paginate(users(), &context, &options)
            .await
            .unwrap();
        assert_eq!(page.meta.total, 25);
    }

    #[tokio::test]
    async fn test_range_filter() {
        let context = RequestContext::from_pairs([
            ("range", "created_at"),
            ("range_start", "2024-01-05"),
            ("range_end", "2024-01-08"),
        ]);
        let page = paginator()
            .paginate(users(), &context, &Options::new())
            .await
            .unwrap();
        assert_eq!(ids(&page.data), vec![5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_cache_computes_once_per_key() {
        let counter = Arc::new(AtomicUsize::new(0));
        let paginator = paginator();
        let options = {
            let counter = Arc::clone(&counter);
            Options::new().with_search(move |_q: &mut MemoryQuery, _term: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        };
        let context = RequestContext::from_pairs([("search", "x")]);

        for _ in 0..3 {
            paginator.paginate(users(), &context, &options).await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let other_page = context.clone().with("page", "2");
        paginator.paginate(users(), &other_page, &options).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        paginator
            .cache()
            .flush_tags(&["users".to_string()])
            .await
            .unwrap();
        paginator.paginate(users(), &context, &options).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_presenter_shapes_rows() {
        let resource = MapResource::new(|row: Value| row["name"].clone());
        let context = RequestContext::from_pairs([("limit", "2")]);
        let page = paginator()
            .paginate_with(users(), &context, &Options::new(), &resource)
            .await
            .unwrap();
        assert_eq!(page.data, vec![json!("user01"), json!("user02")]);
    }

    #[tokio::test]
    async fn test_process_without_export_paginates() {
        let context = RequestContext::new();
        let result = paginator()
            .process(users(), &context, &Options::new())
            .await
            .unwrap();
        let page = result.into_page().unwrap();
        assert_eq!(page.data.len(), 15);
    }

    #[tokio::test]
    async fn test_export_all_ignores_filters_and_sort() {
        let context = RequestContext::from_pairs([
            ("export", "all"),
            ("status", "active"),
            ("order", "desc"),
            ("order_by", "id"),
            ("limit", "5"),
        ]);
        let options = Options::new().with_filter_columns(["status"]);

        let result = paginator()
            .process(users(), &context, &options)
            .await
            .unwrap();
        let file = result.download().unwrap();
        assert!(file.filename.starts_with("export-"));
        assert!(file.filename.ends_with(".xlsx"));

        let sheet = read_sheet(&file.bytes);
        assert_eq!(sheet.len(), 26);
        assert_eq!(
            sheet[0],
            ["id", "name", "status", "role", "created_at"]
                .map(|h| Data::String(h.to_string()))
                .to_vec()
        );
        assert_eq!(sheet[1][0], Data::Float(1.0));
        assert_eq!(sheet[25][0], Data::Float(25.0));
    }

    #[tokio::test]
    async fn test_export_modes_materialize_different_row_sets() {
        let options = Options::new()
            .with_search_columns(["name"])
            .with_filter_columns(["status"]);
        let base = [("status", "active"), ("order", "desc"), ("order_by", "id"), ("limit", "2")];

        let paginator = paginator();
        let all = RequestContext::from_pairs(base).with("export", "all");
        let filtered = RequestContext::from_pairs(base).with("export", "filtered");
        let unknown = RequestContext::from_pairs(base).with("export", "xlsx");

        paginator.export(users(), &all, &options).await.unwrap();
        paginator.export(users(), &filtered, &options).await.unwrap();
        paginator.export(users(), &unknown, &options).await.unwrap();

        let request_all = PaginationRequest::new(&all, paginator.defaults());
        let request_filtered = PaginationRequest::new(&filtered, paginator.defaults());
        let cached_all: ResultSet<Value> = paginator
            .cache()
            .remember(
                &["users".to_string()],
                &CacheKey::from_request("users", &request_all, ["status"]).render(),
                std::time::Duration::from_secs(60),
                async { Err(Error::Internal("should be cached".to_string())) },
            )
            .await
            .unwrap();
        let cached_filtered: ResultSet<Value> = paginator
            .cache()
            .remember(
                &["users".to_string()],
                &CacheKey::from_request("users", &request_filtered, ["status"]).render(),
                std::time::Duration::from_secs(60),
                async { Err(Error::Internal("should be cached".to_string())) },
            )
            .await
            .unwrap();

        // all: every row, insertion order, no limit
        assert_eq!(ids(&cached_all.rows), (1..=25).collect::<Vec<_>>());
        // filtered: active only, sorted desc, still no limit
        assert_eq!(
            ids(&cached_filtered.rows),
            vec![25, 23, 21, 19, 17, 15, 13, 11, 9, 7, 5, 3, 1]
        );
    }

    #[tokio::test]
    async fn test_export_uses_configured_headings_and_mapper() {
        let mapped = Arc::new(AtomicUsize::new(0));
        let options = {
            let mapped = Arc::clone(&mapped);
            Options::new()
                .with_filter_columns(["status"])
                .with_export_headings(["Id"])
                .with_export_mapper(move |row: &Value| {
                    mapped.fetch_add(1, Ordering::SeqCst);
                    vec![row["id"].clone()]
                })
        };
        let context = RequestContext::from_pairs([("export", "filtered"), ("status", "active")]);

        let file = paginator()
            .export(users(), &context, &options)
            .await
            .unwrap();
        assert_eq!(mapped.load(Ordering::SeqCst), 13);

        let sheet = read_sheet(&file.bytes);
        assert_eq!(sheet.len(), 14);
        assert_eq!(sheet[0], vec![Data::String("Id".to_string())]);
        assert_eq!(sheet[1], vec![Data::Float(1.0)]);
        assert_eq!(sheet[13], vec![Data::Float(25.0)]);
    }

    #[tokio::test]
    async fn test_existing_predicates_are_kept() {
        let mut query = users();
        query.and_where(Predicate::compare("id", FilterOperator::LessThanOrEqual, "3"));
        let page = paginator()
            .paginate(query, &RequestContext::new(), &Options::new())
            .await
            .unwrap();
        assert_eq!(ids(&page.data), vec![1, 2, 3]);
        assert_eq!(page.meta.total, 3);
    }

    /// Adapter whose backend is always down
    struct BrokenQuery;

    impl QueryAdapter for BrokenQuery {
        type Row = Value;

        fn table_name(&self) -> &str {
            "broken"
        }
        fn and_where(&mut self, _predicate: Predicate) -> &mut Self {
            self
        }
        fn or_where(&mut self, _predicate: Predicate) -> &mut Self {
            self
        }
        fn reorder(&mut self, _column: &str, _direction: OrderDirection) -> &mut Self {
            self
        }
        fn offset(&mut self, _offset: u64) -> &mut Self {
            self
        }
        fn limit(&mut self, _limit: u64) -> &mut Self {
            self
        }
        async fn count(&self) -> Result<u64> {
            Err(Error::Query("connection refused".to_string()))
        }
        async fn get(&self) -> Result<Vec<Value>> {
            Err(Error::Query("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_backend_errors_propagate_and_are_not_cached() {
        let paginator = paginator();
        let options = PaginationOptions::<BrokenQuery, Value>::new();

        let err = paginator
            .paginate(BrokenQuery, &RequestContext::new(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));

        let export = RequestContext::from_pairs([("export", "all")]);
        let err = paginator
            .process(BrokenQuery, &export, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));
        assert!(paginator.cache().is_empty());
    }
}
