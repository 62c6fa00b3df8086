//! Request-driven filter pipeline
//!
//! Steps run in a fixed order: search → column filters → named filter →
//! range → sort, and for the paginate path only, offset/limit. Each step is a
//! no-op when its request input is absent, and none of them can fail.

use crate::query::{FilterOperator, Predicate, QueryAdapter};
use crate::request::PaginationRequest;

use super::options::{PaginationOptions, SearchConfig};

/// Applies request parameters to a query according to endpoint options
pub struct Pipeline<'a, Q: QueryAdapter> {
    query: &'a mut Q,
    request: PaginationRequest<'a>,
    options: &'a PaginationOptions<Q, Q::Row>,
}

impl<'a, Q: QueryAdapter> Pipeline<'a, Q> {
    /// Create a pipeline over a borrowed query
    pub fn new(
        query: &'a mut Q,
        request: PaginationRequest<'a>,
        options: &'a PaginationOptions<Q, Q::Row>,
    ) -> Self {
        Self {
            query,
            request,
            options,
        }
    }

    /// Run every filtering step (search through sort), without paging
    pub fn apply_filters(&mut self) -> &mut Self {
        self.apply_search()
            .apply_column_filters()
            .apply_named_filter()
            .apply_range()
            .apply_sorting()
    }

    /// Search: one OR-group of `LIKE '%term%'` over the configured columns, or the custom callback
    pub fn apply_search(&mut self) -> &mut Self {
        let Some(term) = self.request.search() else {
            return self;
        };

        match &self.options.search {
            SearchConfig::Columns(columns) if columns.is_empty() => {}
            SearchConfig::Columns(columns) => {
                let pattern = format!("%{}%", term);
                let group = Predicate::any(
                    columns
                        .iter()
                        .map(|column| Predicate::like(column.as_str(), pattern.as_str())),
                );
                tracing::debug!(term, columns = ?columns, "Applying column search");
                self.query.and_where(group);
            }
            SearchConfig::Custom(search) => {
                tracing::debug!(term, "Applying custom search");
                search(&mut *self.query, term);
            }
        }
        self
    }

    /// Column filters: `column = value` for each configured column present in the request
    pub fn apply_column_filters(&mut self) -> &mut Self {
        for (column, value) in self.request.column_filters(&self.options.filter_columns) {
            tracing::debug!(%column, %value, "Applying column filter");
            self.query.and_where(Predicate::eq(column, value));
        }
        self
    }

    /// Named filter: invoke the configured filter whose key matches `filter`; unknown names are ignored
    pub fn apply_named_filter(&mut self) -> &mut Self {
        let Some(name) = self.request.filter() else {
            return self;
        };

        match self.options.named_filter(name) {
            Some(filter) => {
                tracing::debug!(filter = name, "Applying named filter");
                filter(&mut *self.query);
            }
            None => tracing::debug!(filter = name, "Ignoring unknown named filter"),
        }
        self
    }

    /// Range: `column >= start` and/or `column <= end` for the bounds present
    pub fn apply_range(&mut self) -> &mut Self {
        let Some(range) = self.request.range() else {
            return self;
        };

        tracing::debug!(column = %range.column, start = ?range.start, end = ?range.end, "Applying range filter");
        if let Some(start) = range.start {
            self.query.and_where(Predicate::compare(
                range.column.as_str(),
                FilterOperator::GreaterThanOrEqual,
                start,
            ));
        }
        if let Some(end) = range.end {
            self.query.and_where(Predicate::compare(
                range.column.as_str(),
                FilterOperator::LessThanOrEqual,
                end,
            ));
        }
        self
    }

    /// Sort: always reorder by the requested (or default) column and direction
    pub fn apply_sorting(&mut self) -> &mut Self {
        self.query
            .reorder(self.request.order_by(), self.request.order());
        self
    }

    /// Paging: skip `(page - 1) * limit` rows and take exactly `limit`
    pub fn apply_limit(&mut self) -> &mut Self {
        self.query
            .offset(self.request.offset())
            .limit(self.request.limit());
        self
    }
}
