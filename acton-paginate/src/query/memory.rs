//! In-memory query adapter
//!
//! Evaluates predicates against the serde representation of each row, so any
//! `Serialize` type works as long as it serializes to a JSON object. `LIKE`
//! matching is case-insensitive and supports the `%` and `_` wildcards.

use std::cmp::Ordering;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use super::{Connector, FilterOperator, OrderDirection, Predicate, QueryAdapter};
use crate::error::Result;

/// Query adapter over an owned vector of rows
#[derive(Debug, Clone)]
pub struct MemoryQuery<R = Value> {
    table: String,
    rows: Vec<R>,
    clauses: Vec<(Connector, Predicate)>,
    order: Option<(String, OrderDirection)>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl<R> MemoryQuery<R> {
    /// Create a query over `rows`, reported as belonging to `table`
    pub fn new(table: impl Into<String>, rows: Vec<R>) -> Self {
        Self {
            table: table.into(),
            rows,
            clauses: Vec::new(),
            order: None,
            offset: None,
            limit: None,
        }
    }

    /// Predicates applied so far, with the connector joining each to its predecessor
    pub fn clauses(&self) -> &[(Connector, Predicate)] {
        &self.clauses
    }

    /// Current ordering, if any
    pub fn ordering(&self) -> Option<(&str, OrderDirection)> {
        self.order.as_ref().map(|(c, d)| (c.as_str(), *d))
    }

    /// Current offset, if any
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Current limit, if any
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Render the WHERE clause body (without the `WHERE` keyword)
    pub fn where_sql(&self) -> String {
        let mut sql = String::new();
        for (i, (connector, predicate)) in self.clauses.iter().enumerate() {
            if i > 0 {
                let _ = write!(sql, " {} ", connector);
            }
            let _ = write!(sql, "{}", predicate);
        }
        sql
    }

    /// Render the whole query as SQL text, for logging and assertions
    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT * FROM {}", self.table);
        if !self.clauses.is_empty() {
            let _ = write!(sql, " WHERE {}", self.where_sql());
        }
        if let Some((column, direction)) = &self.order {
            let _ = write!(sql, " ORDER BY {} {}", column, direction.as_sql());
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {}", limit);
        }
        if let Some(offset) = self.offset {
            let _ = write!(sql, " OFFSET {}", offset);
        }
        sql
    }
}

impl<R> MemoryQuery<R>
where
    R: Serialize + Clone,
{
    /// Rows matching the predicates, ordered, before offset/limit
    fn matching(&self) -> Result<Vec<R>> {
        let mut matched = Vec::new();
        for row in &self.rows {
            let value = serde_json::to_value(row)?;
            if self.evaluate(&value) {
                matched.push((value, row.clone()));
            }
        }

        if let Some((column, direction)) = &self.order {
            matched.sort_by(|(a, _), (b, _)| {
                let ordering = compare_values(a.get(column), b.get(column));
                match direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }

        Ok(matched.into_iter().map(|(_, row)| row).collect())
    }

    /// AND binds tighter than OR, as in SQL
    fn evaluate(&self, row: &Value) -> bool {
        if self.clauses.is_empty() {
            return true;
        }

        let mut any_group = false;
        let mut group = true;
        for (i, (connector, predicate)) in self.clauses.iter().enumerate() {
            if i > 0 && *connector == Connector::Or {
                any_group |= group;
                group = true;
            }
            group = group && matches_predicate(row, predicate);
        }
        any_group || group
    }
}

impl<R> QueryAdapter for MemoryQuery<R>
where
    R: Serialize + Clone + Send + Sync,
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
        Ok(self.matching()?.len() as u64)
    }

    async fn get(&self) -> Result<Vec<R>> {
        let skip = usize::try_from(self.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let take = self
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        let rows: Vec<R> = self.matching()?.into_iter().skip(skip).take(take).collect();
        tracing::trace!(table = %self.table, rows = rows.len(), "In-memory query executed");
        Ok(rows)
    }
}

fn matches_predicate(row: &Value, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Compare {
            column,
            operator,
            value,
        } => {
            let Some(field) = row.get(column).filter(|v| !v.is_null()) else {
                return false;
            };
            match operator {
                FilterOperator::Equal => compare_operand(field, value) == Ordering::Equal,
                FilterOperator::GreaterThanOrEqual => {
                    compare_operand(field, value) != Ordering::Less
                }
                FilterOperator::LessThanOrEqual => {
                    compare_operand(field, value) != Ordering::Greater
                }
                FilterOperator::Like => like_match(&scalar_text(field), value),
            }
        }
        Predicate::Any(inner) => inner.iter().any(|p| matches_predicate(row, p)),
    }
}

/// Compare a row field to a request-supplied operand
///
/// Numbers compare numerically when the operand parses as a number; everything
/// else compares by its text form.
fn compare_operand(field: &Value, operand: &str) -> Ordering {
    if let (Some(lhs), Ok(rhs)) = (field.as_f64(), operand.parse::<f64>()) {
        return lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal);
    }
    if let Some(lhs) = field.as_bool() {
        if let Ok(rhs) = operand.parse::<bool>() {
            return lhs.cmp(&rhs);
        }
        if let Ok(rhs) = operand.parse::<u8>() {
            return u8::from(lhs).cmp(&rhs);
        }
    }
    scalar_text(field).as_str().cmp(operand)
}

/// Total order over JSON scalars for sorting; missing and null sort first
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => scalar_text(a).cmp(&scalar_text(b)),
        },
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Case-insensitive SQL LIKE with `%` (any run) and `_` (any one char)
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // Classic two-pointer wildcard match with backtracking to the last `%`
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_t = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}
