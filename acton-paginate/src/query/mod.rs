//! Query adapter abstraction
//!
//! The paginator never builds SQL itself. It drives a [`QueryAdapter`], a
//! not-yet-executed query that accepts predicates, ordering and bounds, and
//! finally materializes rows.
//!
//! # Implementations
//!
//! - [`MemoryQuery`]: filters an in-memory `Vec` of rows (tests, fixtures, small lookup tables)
//! - [`PgQuery`]: PostgreSQL via `sqlx::QueryBuilder` (requires the `database` feature)
//!
//! # Example
//!
//! ```rust
//! use acton_paginate::query::{FilterOperator, MemoryQuery, OrderDirection, Predicate, QueryAdapter};
//! use serde_json::json;
//!
//! let mut query = MemoryQuery::new("users", vec![
//!     json!({"name": "alice", "role": "admin"}),
//!     json!({"name": "bob", "role": "member"}),
//! ]);
//!
//! query
//!     .and_where(Predicate::compare("role", FilterOperator::Equal, "admin"))
//!     .reorder("name", OrderDirection::Descending);
//!
//! assert_eq!(query.where_sql(), "role = 'admin'");
//! ```

mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use memory::MemoryQuery;
#[cfg(feature = "database")]
pub use postgres::PgQuery;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use acton_paginate::query::OrderDirection;
///
/// assert_eq!(OrderDirection::parse("desc"), OrderDirection::Descending);
/// assert_eq!(OrderDirection::parse("sideways"), OrderDirection::Ascending);
/// assert_eq!(OrderDirection::Descending.to_string(), "desc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9, oldest first)
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    /// Sort in descending order (Z-A, 9-0, newest first)
    #[serde(rename = "desc")]
    Descending,
}

impl OrderDirection {
    /// Parse a request value, falling back to ascending for anything other than `asc`/`desc`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::try_parse(value).unwrap_or_default()
    }

    /// Parse a request value, returning `None` for anything other than `asc`/`desc`
    #[must_use]
    pub fn try_parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Ascending),
            "desc" => Some(Self::Descending),
            _ => None,
        }
    }

    /// SQL keyword for this direction
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Comparison operators the pagination pipeline emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching (LIKE) with `%` wildcards
    Like,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
        }
    }
}

/// A boolean condition on one or more columns
///
/// Request values arrive as strings, so comparison operands are strings too;
/// each adapter decides how to coerce them against its column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `column <op> value`
    Compare {
        /// Column name
        column: String,
        /// Comparison operator
        operator: FilterOperator,
        /// Right-hand operand
        value: String,
    },
    /// Disjunction of the inner predicates, evaluated as one parenthesized group
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Create a `column <op> value` predicate
    pub fn compare(
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        Self::Compare {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Create an equality predicate (column = value)
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(column, FilterOperator::Equal, value)
    }

    /// Create a LIKE predicate (column LIKE pattern)
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, FilterOperator::Like, pattern)
    }

    /// Create an OR group
    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Any(predicates.into_iter().collect())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare {
                column,
                operator,
                value,
            } => write!(f, "{} {} '{}'", column, operator, value.replace('\'', "''")),
            Self::Any(inner) => {
                if inner.len() > 1 {
                    write!(f, "(")?;
                }
                for (i, predicate) in inner.iter().enumerate() {
                    if i > 0 {
                        write!(f, " OR ")?;
                    }
                    write!(f, "{}", predicate)?;
                }
                if inner.len() > 1 {
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

/// How a top-level predicate joins the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connector {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// A not-yet-executed query the pagination pipeline can mutate
///
/// Builder methods take `&mut self` and return `&mut Self` so that named
/// filters and custom search callbacks can chain calls on the borrowed query.
/// Only `count` and `get` touch the backend.
///
/// # Example
///
/// ```rust,ignore
/// impl QueryAdapter for UserQuery {
///     type Row = User;
///
///     fn table_name(&self) -> &str { "users" }
///     fn and_where(&mut self, predicate: Predicate) -> &mut Self { /* ... */ self }
///     fn or_where(&mut self, predicate: Predicate) -> &mut Self { /* ... */ self }
///     fn reorder(&mut self, column: &str, direction: OrderDirection) -> &mut Self { /* ... */ self }
///     fn offset(&mut self, offset: u64) -> &mut Self { /* ... */ self }
///     fn limit(&mut self, limit: u64) -> &mut Self { /* ... */ self }
///
///     async fn count(&self) -> Result<u64> { /* SELECT COUNT(*) ... */ }
///     async fn get(&self) -> Result<Vec<User>> { /* SELECT * ... */ }
/// }
/// ```
pub trait QueryAdapter: Send + Sync {
    /// Materialized row type
    type Row: Send;

    /// Owning table or collection name, used for cache keys and default cache tags
    fn table_name(&self) -> &str;

    /// AND a predicate onto the query
    fn and_where(&mut self, predicate: Predicate) -> &mut Self;

    /// OR a predicate onto the query at the top level
    fn or_where(&mut self, predicate: Predicate) -> &mut Self;

    /// Replace any existing ordering with a single column ordering
    fn reorder(&mut self, column: &str, direction: OrderDirection) -> &mut Self;

    /// Skip the first `offset` matching rows
    fn offset(&mut self, offset: u64) -> &mut Self;

    /// Return at most `limit` rows
    fn limit(&mut self, limit: u64) -> &mut Self;

    /// Count the rows matching the predicates, ignoring offset and limit
    fn count(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Execute the query and materialize the rows
    fn get(&self) -> impl Future<Output = Result<Vec<Self::Row>>> + Send;

    /// Convenience for `and_where(Predicate::compare(column, operator, value))`
    fn where_cmp(
        &mut self,
        column: &str,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> &mut Self
    where
        Self: Sized,
    {
        self.and_where(Predicate::compare(column, operator, value))
    }
}
