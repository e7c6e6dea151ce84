//! Sub-object pagination.
//!
//! Nested `limit`/`page` cannot be pushed into the single SQL statement
//! without cutting the parent rows, so they are applied after hydration by
//! slicing each matching child array in place.

use serde_json::Value;

use crate::query::node::PaginationDescriptor;

/// Slice every child array addressed by `descriptors`
///
/// Paths are dotted response keys below the root (`department.users`).
/// Missing keys, nulls and to-one values are left alone.
pub fn paginate(result: &mut Value, descriptors: &[PaginationDescriptor]) {
    for descriptor in descriptors {
        let segments: Vec<&str> = descriptor.key.split('.').collect();
        let (start, end) = descriptor.range();
        apply(result, &segments, start, end);
    }
}

fn apply(value: &mut Value, segments: &[&str], start: usize, end: usize) {
    match value {
        Value::Array(items) => {
            for item in items {
                apply(item, segments, start, end);
            }
        }
        Value::Object(object) => {
            let Some((head, rest)) = segments.split_first() else {
                return;
            };
            let Some(child) = object.get_mut(*head) else {
                return;
            };
            if !rest.is_empty() {
                apply(child, rest, start, end);
            } else if let Value::Array(items) = child {
                slice(items, start, end);
            }
        }
        _ => {}
    }
}

fn slice(items: &mut Vec<Value>, start: usize, end: usize) {
    items.truncate(end);
    items.drain(..start.min(items.len()));
}
