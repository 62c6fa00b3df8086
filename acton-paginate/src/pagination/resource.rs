//! Row presenters for the paginate path

use serde::Serialize;

/// Shapes one row for the `data` array of a page
///
/// Implement this to hide columns, rename fields or attach computed values
/// without touching the row type itself.
pub trait Resource<R>: Send + Sync {
    /// Presented form of a row
    type Output: Serialize + Send;

    /// Present one row
    fn present(&self, row: R) -> Self::Output;
}

/// Presents rows as their own serde representation
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericResource;

impl<R: Serialize + Send> Resource<R> for GenericResource {
    type Output = R;

    fn present(&self, row: R) -> R {
        row
    }
}

/// Presents rows through a closure
///
/// ```rust
/// use acton_paginate::pagination::{MapResource, Resource};
/// use serde_json::{json, Value};
///
/// let resource = MapResource::new(|row: Value| json!({ "name": row["name"] }));
/// let shown = resource.present(json!({"name": "alice", "password_hash": "x"}));
/// assert_eq!(shown, json!({"name": "alice"}));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MapResource<F>(F);

impl<F> MapResource<F> {
    /// Wrap a presenter closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<R, O, F> Resource<R> for MapResource<F>
where
    F: Fn(R) -> O + Send + Sync,
    O: Serialize + Send,
{
    type Output = O;

    fn present(&self, row: R) -> O {
        (self.0)(row)
    }
}
