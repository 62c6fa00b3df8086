//! Pagination and export of list queries
//!
//! A [`Paginator`] takes a [`QueryAdapter`](crate::query::QueryAdapter), the
//! request's [`RequestContext`](crate::request::RequestContext) and
//! per-endpoint [`PaginationOptions`], and produces either one page of rows
//! with [`PageMeta`] or a spreadsheet download. The row set is computed inside
//! the cache's compute-if-absent call under a [`CacheKey`] derived from the
//! request.

mod cache_key;
mod meta;
mod options;
mod paginator;
mod pipeline;
mod resource;

pub use cache_key::CacheKey;
pub use meta::PageMeta;
pub use options::{NamedFilter, PaginationOptions, RowMapper, SearchConfig, SearchFn};
pub use paginator::{Paginator, ResultSet};
pub use pipeline::Pipeline;
pub use resource::{GenericResource, MapResource, Resource};
