//! PostgreSQL query adapter built on `sqlx::QueryBuilder`
//!
//! Rows are fetched as `row_to_json` and decoded into any `DeserializeOwned`
//! type, so the adapter works for arbitrary tables without a `FromRow` impl.
//!
//! Request operands are bound as text. Columns compare through `::text`
//! unless a cast is registered with [`PgQuery::cast`], in which case the bound
//! operand is cast to that type instead (use this for numeric or timestamp
//! range filters).

use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{postgres::Postgres, types::Json, PgPool, QueryBuilder};

use super::{Connector, FilterOperator, OrderDirection, Predicate, QueryAdapter};
use crate::error::{Error, Result};

/// Query adapter for a single PostgreSQL table
#[derive(Debug, Clone)]
pub struct PgQuery<R = Value> {
    pool: PgPool,
    table: String,
    casts: HashMap<String, String>,
    clauses: Vec<(Connector, Predicate)>,
    order: Option<(String, OrderDirection)>,
    offset: Option<u64>,
    limit: Option<u64>,
    _row: PhantomData<fn() -> R>,
}

impl<R> PgQuery<R> {
    /// Create a query selecting every row of `table`
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
            casts: HashMap::new(),
            clauses: Vec::new(),
            order: None,
            offset: None,
            limit: None,
            _row: PhantomData,
        }
    }

    /// Compare `column` against operands cast to `sql_type` (e.g. `bigint`, `timestamptz`)
    ///
    /// Type names containing anything other than ASCII letters, digits,
    /// underscores or spaces are rejected.
    pub fn cast(mut self, column: impl Into<String>, sql_type: impl Into<String>) -> Result<Self> {
        let sql_type = sql_type.into();
        if sql_type.is_empty()
            || !sql_type
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
        {
            return Err(Error::Query(format!("Invalid SQL type name: {}", sql_type)));
        }
        self.casts.insert(column.into(), sql_type);
        Ok(self)
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        if self.clauses.is_empty() {
            return;
        }
        builder.push(" WHERE ");
        for (i, (connector, predicate)) in self.clauses.iter().enumerate() {
            if i > 0 {
                builder.push(format!(" {} ", connector));
            }
            self.push_predicate(builder, predicate);
        }
    }

    fn push_predicate(&self, builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
        match predicate {
            Predicate::Compare {
                column,
                operator,
                value,
            } => {
                let column_sql = quote_identifier(column);
                match (operator, self.casts.get(column)) {
                    (FilterOperator::Like, _) => {
                        builder.push(format!("{}::text ILIKE ", column_sql));
                        builder.push_bind(value.clone());
                    }
                    (op, Some(sql_type)) => {
                        builder.push(format!("{} {} CAST(", column_sql, op));
                        builder.push_bind(value.clone());
                        builder.push(format!(" AS {})", sql_type));
                    }
                    (op, None) => {
                        builder.push(format!("{}::text {} ", column_sql, op));
                        builder.push_bind(value.clone());
                    }
                }
            }
            Predicate::Any(inner) if inner.is_empty() => {
                builder.push("FALSE");
            }
            Predicate::Any(inner) => {
                builder.push("(");
                for (i, p) in inner.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    self.push_predicate(builder, p);
                }
                builder.push(")");
            }
        }
    }

    fn select_builder(&self) -> QueryBuilder<'_, Postgres> {
        let mut builder = QueryBuilder::new("SELECT row_to_json(t) FROM (SELECT * FROM ");
        builder.push(quote_identifier(&self.table));
        self.push_where(&mut builder);

        if let Some((column, direction)) = &self.order {
            builder.push(format!(
                " ORDER BY {} {}",
                quote_identifier(column),
                direction.as_sql()
            ));
        }
        if let Some(limit) = self.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = self.offset {
            builder.push(" OFFSET ");
            builder.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }
        builder.push(") t");
        builder
    }

    fn count_builder(&self) -> QueryBuilder<'_, Postgres> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM ");
        builder.push(quote_identifier(&self.table));
        self.push_where(&mut builder);
        builder
    }
}

impl<R> QueryAdapter for PgQuery<R>
where
    R: DeserializeOwned + Send + Sync + Unpin + 'static,
{
    type Row = R;

    fn table_name(&self) -> &str {
        &self.table
    }

    fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        self.clauses.push((Connector::And, predicate));
        self
    }

    fn or_where(&mut self, predicate: Predicate) -> &mut Self {
        self.clauses.push((Connector::Or, predicate));
        self
    }

    fn reorder(&mut self, column: &str, direction: OrderDirection) -> &mut Self {
        self.order = Some((column.to_string(), direction));
        self
    }

    fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    async fn count(&self) -> Result<u64> {
        let mut builder = self.count_builder();
        let total: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn get(&self) -> Result<Vec<R>> {
        let mut builder = self.select_builder();
        tracing::debug!(table = %self.table, sql = builder.sql(), "Executing paginated query");

        let rows: Vec<Json<R>> = builder
            .build_query_scalar::<Json<R>>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }
}

/// Quote a possibly schema-qualified identifier (`schema.table` → `"schema"."table"`)
fn quote_identifier(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_query() -> PgQuery {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/acton_paginate_test")
            .unwrap();
        PgQuery::new(pool, "users")
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("public.users"), "\"public\".\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_select_sql_shape() {
        let mut query = lazy_query()
            .cast("created_at", "timestamptz")
            .unwrap();
        query
            .and_where(Predicate::any([
                Predicate::like("name", "%foo%"),
                Predicate::like("email", "%foo%"),
            ]))
            .and_where(Predicate::eq("status", "active"))
            .and_where(Predicate::compare(
                "created_at",
                FilterOperator::GreaterThanOrEqual,
                "2024-01-01",
            ))
            .reorder("created_at", OrderDirection::Descending)
            .offset(10)
            .limit(10);

        let builder = query.select_builder();
        assert_eq!(
            builder.sql(),
            "SELECT row_to_json(t) FROM (SELECT * FROM \"users\" WHERE \
             (\"name\"::text ILIKE $1 OR \"email\"::text ILIKE $2) AND \
             \"status\"::text = $3 AND \"created_at\" >= CAST($4 AS timestamptz) \
             ORDER BY \"created_at\" DESC LIMIT $5 OFFSET $6) t"
        );
    }

    #[tokio::test]
    async fn test_count_sql_ignores_bounds() {
        let mut query = lazy_query();
        query.and_where(Predicate::eq("status", "active")).limit(5);
        let builder = query.count_builder();
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM \"users\" WHERE \"status\"::text = $1"
        );
    }

    #[tokio::test]
    async fn test_cast_rejects_injection() {
        assert!(lazy_query().cast("age", "bigint); DROP TABLE users; --").is_err());
    }
}
