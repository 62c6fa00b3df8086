//! Page metadata

use serde::{Deserialize, Serialize};

use crate::query::OrderDirection;

/// Metadata describing one page of results
///
/// `from` and `to` are 1-indexed positions of the first and last row on the
/// page; both are `0` when the page is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Rows matching the filters across all pages
    pub total: u64,
    /// Page size
    pub per_page: u64,
    /// 1-indexed current page
    pub current_page: u64,
    /// Last page number (0 when nothing matches)
    pub last_page: u64,
    /// Position of the first row on this page
    pub from: u64,
    /// Position of the last row on this page
    pub to: u64,
    /// Sort direction applied
    pub order: OrderDirection,
    /// Sort column applied
    pub order_by: String,
}

impl PageMeta {
    /// Compute metadata for a page of `rows_on_page` rows
    pub fn new(
        total: u64,
        per_page: u64,
        current_page: u64,
        rows_on_page: u64,
        order: OrderDirection,
        order_by: impl Into<String>,
    ) -> Self {
        let per_page = per_page.max(1);
        let offset = current_page.saturating_sub(1).saturating_mul(per_page);
        let (from, to) = if rows_on_page == 0 {
            (0, 0)
        } else {
            (offset + 1, offset + rows_on_page)
        };

        Self {
            total,
            per_page,
            current_page,
            last_page: total.div_ceil(per_page),
            from,
            to,
            order,
            order_by: order_by.into(),
        }
    }

    /// Whether a page follows this one
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.current_page < self.last_page
    }
}
