//! # acton-paginate
//!
//! Cached pagination, filtering and spreadsheet export for axum list endpoints.
//!
//! One call turns a query and the request's query string into either a page
//! of rows with metadata or an `.xlsx` download.
//!
//! ## Features
//!
//! - **Filtering**: free-text search, exact-match column filters, named filters, range bounds
//! - **Sorting and paging**: `order_by`/`order`, `page`/`limit` with safe defaults
//! - **Caching**: tag-scoped compute-if-absent with TTL (in-memory or Redis)
//! - **Export**: `?export=all` or `?export=filtered` streams an `.xlsx` workbook
//! - **Backends**: in-memory rows, or PostgreSQL via sqlx (`database` feature)
//!
//! ## Request parameters
//!
//! | Parameter | Meaning | Default |
//! |-----------|---------|---------|
//! | `page` | 1-indexed page | `1` |
//! | `limit` | page size | `15` |
//! | `search` | matched with `LIKE '%term%'` against the search columns | none |
//! | `order_by` / `order` | sort column and `asc`/`desc` | `created_at` / `asc` |
//! | `range`, `range_start`, `range_end` | inclusive bounds on one column | none |
//! | `filter` | named filter key | none |
//! | *column name* | exact match on a configured filter column | none |
//! | `export` | `all` or `filtered` | none (paginate) |
//!
//! Missing or malformed values never fail a request; they fall back to defaults.
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_paginate::prelude::*;
//! use axum::{extract::State, response::Response, routing::get, Router};
//! use serde_json::{json, Value};
//!
//! async fn list_users(
//!     State(paginator): State<Paginator<MemoryCache>>,
//!     context: RequestContext,
//! ) -> Result<Response> {
//!     let rows = vec![json!({"id": 1, "name": "alice", "created_at": "2024-01-01"})];
//!     let query = MemoryQuery::new("users", rows);
//!     let options: PaginationOptions<MemoryQuery, Value> = PaginationOptions::new()
//!         .with_search_columns(["name"]);
//!
//!     paginated_response(&paginator, query, &context, &options).await
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let app = Router::new()
//!         .route("/users", get(list_users))
//!         .with_state(Paginator::from_config(MemoryCache::new(), &config));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod observability;
pub mod pagination;
pub mod query;
pub mod request;
pub mod response;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheStore, MemoryCache};

    #[cfg(feature = "cache")]
    pub use crate::cache::RedisCache;

    pub use crate::config::{Config, PaginationDefaults, RedisConfig};
    pub use crate::error::{Error, Result};
    pub use crate::export::ExportFile;
    pub use crate::observability::init_tracing;
    pub use crate::pagination::{
        GenericResource, MapResource, PageMeta, PaginationOptions, Paginator, Resource, SearchConfig,
    };
    pub use crate::query::{FilterOperator, MemoryQuery, OrderDirection, Predicate, QueryAdapter};

    #[cfg(feature = "database")]
    pub use crate::query::PgQuery;

    pub use crate::request::{ExportMode, PaginationRequest, RequestContext};
    pub use crate::response::{paginated_response, Envelope, PageResponse, Paginated};
}
