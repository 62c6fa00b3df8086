//! Response types for paginated list endpoints
//!
//! A paginated endpoint answers with either a JSON page or an `.xlsx`
//! download. [`Paginated`] carries both outcomes and implements
//! [`IntoResponse`], wrapping pages in the standard [`Envelope`].
//!
//! # Example
//!
//! ```rust
//! use acton_paginate::pagination::PageMeta;
//! use acton_paginate::query::OrderDirection;
//! use acton_paginate::response::{Envelope, PageResponse};
//!
//! let page = PageResponse::new(
//!     vec!["alice", "bob"],
//!     PageMeta::new(2, 15, 1, 2, OrderDirection::Ascending, "created_at"),
//! );
//! let body = serde_json::to_value(Envelope::fetched(page)).unwrap();
//!
//! assert_eq!(body["success"], true);
//! assert_eq!(body["message"], "Data fetched successfully");
//! assert_eq!(body["data"]["meta"]["to"], 2);
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::error::Result;
use crate::export::ExportFile;
use crate::pagination::{PageMeta, PaginationOptions, Paginator};
use crate::query::QueryAdapter;
use crate::request::RequestContext;

/// Message sent with every successful page
pub const FETCHED_MESSAGE: &str = "Data fetched successfully";

/// One page of presented rows with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// Presented rows
    pub data: Vec<T>,
    /// Page metadata
    pub meta: PageMeta,
}

impl<T> PageResponse<T> {
    /// Create a page response
    pub fn new(data: Vec<T>, meta: PageMeta) -> Self {
        Self { data, meta }
    }

    /// Map each row to a new type
    pub fn map<U, F>(self, f: F) -> PageResponse<U>
    where
        F: FnMut(T) -> U,
    {
        PageResponse {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

impl<T: Serialize> IntoResponse for PageResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Success envelope: `{success, message, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Always `true` for envelopes produced by this crate
    pub success: bool,
    /// Human-readable status
    pub message: String,
    /// Payload
    pub data: T,
}

impl<T> Envelope<T> {
    /// Successful envelope with a custom message
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    /// Successful envelope with [`FETCHED_MESSAGE`]
    pub fn fetched(data: T) -> Self {
        Self::success(FETCHED_MESSAGE, data)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Outcome of a paginated request: exactly one of a page or a download
#[derive(Debug, Clone)]
pub enum Paginated<T> {
    /// JSON page
    Page(PageResponse<T>),
    /// Spreadsheet export
    Download(ExportFile),
}

impl<T> Paginated<T> {
    /// The page, if this is not an export
    pub fn page(&self) -> Option<&PageResponse<T>> {
        match self {
            Self::Page(page) => Some(page),
            Self::Download(_) => None,
        }
    }

    /// The download, if this is an export
    pub fn download(&self) -> Option<&ExportFile> {
        match self {
            Self::Page(_) => None,
            Self::Download(file) => Some(file),
        }
    }

    /// Consume into the page, if this is not an export
    pub fn into_page(self) -> Option<PageResponse<T>> {
        match self {
            Self::Page(page) => Some(page),
            Self::Download(_) => None,
        }
    }
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Page(page) => Envelope::fetched(page).into_response(),
            Self::Download(file) => file.into_response(),
        }
    }
}

/// Paginate or export `query` and render the HTTP response
///
/// Pages are wrapped in `{success: true, message: "Data fetched successfully", data}`;
/// exports are returned as the bare download.
///
/// # Example
///
/// ```rust,no_run
/// use acton_paginate::prelude::*;
/// use axum::{extract::State, response::Response, routing::get, Router};
/// use serde_json::Value;
///
/// async fn list_users(
///     State(paginator): State<Paginator<MemoryCache>>,
///     context: RequestContext,
/// ) -> Result<Response> {
///     let query = MemoryQuery::new("users", Vec::<Value>::new());
///     let options = PaginationOptions::new().with_search_columns(["name", "email"]);
///     paginated_response(&paginator, query, &context, &options).await
/// }
///
/// let app: Router = Router::new()
///     .route("/users", get(list_users))
///     .with_state(Paginator::new(MemoryCache::new(), PaginationDefaults::default()));
/// ```
pub async fn paginated_response<C, Q>(
    paginator: &Paginator<C>,
    query: Q,
    context: &RequestContext,
    options: &PaginationOptions<Q, Q::Row>,
) -> Result<Response>
where
    C: CacheStore,
    Q: QueryAdapter,
    Q::Row: Serialize + DeserializeOwned,
{
    let outcome = paginator.process(query, context, options).await?;
    Ok(outcome.into_response())
}
