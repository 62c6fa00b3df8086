//! Deterministic cache keys for paginated queries

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::OrderDirection;
use crate::request::{PaginationRequest, RangeSpec};

/// Every request input that can change a paginated or exported result
///
/// Column filters live in a `BTreeMap`, so the serialized form (and therefore
/// the digest) does not depend on the order parameters appeared in the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Table the query reads
    pub table: String,
    /// Requested page
    pub page: u64,
    /// Search term, verbatim
    pub search: Option<String>,
    /// Named filter key
    pub filter: Option<String>,
    /// Range filter
    pub range: Option<RangeSpec>,
    /// Sort column
    pub order_by: String,
    /// Sort direction
    pub order: OrderDirection,
    /// Page size
    pub limit: u64,
    /// Raw `export` parameter
    pub export: Option<String>,
    /// Filter column values present in the request
    pub column_filters: BTreeMap<String, String>,
}

impl CacheKey {
    /// Capture the cache-relevant inputs of a request against `table`
    pub fn from_request<I, S>(table: &str, request: &PaginationRequest<'_>, filter_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            table: table.to_string(),
            page: request.page(),
            search: request.search().map(str::to_string),
            filter: request.filter().map(str::to_string),
            range: request.range(),
            order_by: request.order_by().to_string(),
            order: request.order(),
            limit: request.limit(),
            export: request
                .context()
                .get(crate::request::params::EXPORT)
                .map(str::to_string),
            column_filters: request.column_filters(filter_columns),
        }
    }

    /// BLAKE3 hex digest of the serialized key
    pub fn digest(&self) -> String {
        // Serializing plain strings, integers and a BTreeMap cannot fail
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&encoded).to_hex().to_string()
    }

    /// Rendered key: `paginate:<table>:<digest>`
    pub fn render(&self) -> String {
        format!("paginate:{}:{}", self.table, self.digest())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginationDefaults;
    use crate::request::RequestContext;

    fn key(pairs: &[(&str, &str)]) -> CacheKey {
        let context = RequestContext::from_pairs(pairs.iter().copied());
        let defaults = PaginationDefaults::default();
        let request = PaginationRequest::new(&context, &defaults);
        CacheKey::from_request("users", &request, ["status", "role"])
    }

    #[test]
    fn test_search_terms_are_not_normalized() {
        let spellings = ["fooBar", "foo bar", "Foo  Bar", "foo_bar"];
        for (i, a) in spellings.iter().enumerate() {
            for b in &spellings[i + 1..] {
                assert_ne!(
                    key(&[("search", *a)]).render(),
                    key(&[("search", *b)]).render(),
                    "{a:?} vs {b:?}"
                );
            }
        }
    }

    #[test]
    fn test_key_is_independent_of_parameter_order() {
        let a = key(&[("status", "active"), ("role", "admin"), ("page", "2")]);
        let b = key(&[("page", "2"), ("role", "admin"), ("status", "active")]);
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn test_key_changes_with_each_input() {
        let base = key(&[]).render();
        let variants = [
            key(&[("page", "2")]),
            key(&[("limit", "50")]),
            key(&[("search", "foo")]),
            key(&[("filter", "admins")]),
            key(&[("range", "created_at"), ("range_start", "2024-01-01")]),
            key(&[("order_by", "name")]),
            key(&[("order", "desc")]),
            key(&[("export", "all")]),
            key(&[("status", "active")]),
        ];
        for variant in &variants {
            assert_ne!(variant.render(), base, "{:?}", variant);
        }
    }

    #[test]
    fn test_export_modes_do_not_share_keys() {
        assert_ne!(
            key(&[("export", "all")]).render(),
            key(&[("export", "filtered")]).render()
        );
    }

    #[test]
    fn test_unconfigured_columns_do_not_affect_key() {
        assert_eq!(key(&[("secret", "x")]).render(), key(&[]).render());
    }

    #[test]
    fn test_render_format() {
        let rendered = key(&[]).render();
        let digest = rendered.strip_prefix("paginate:users:").unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
