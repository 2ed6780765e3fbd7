// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filter-document matching.
//!
//! One matcher shared by every backend. Semantics follow document-store
//! conventions:
//!
//! - field equality against an array field matches when the array contains
//!   the value (`$addToSet`-safe: `{"channels": "C1"}` matches a stored
//!   channel list);
//! - supported operators: `$in`, `$nin`, `$ne`, `$gt`, `$gte`, `$lt`,
//!   `$lte`, `$exists`, `$all`, and top-level `$or` / `$and`;
//! - dotted paths descend nested objects.

use std::cmp::Ordering;

use serde_json::Value;

/// Whether `doc` satisfies `filter`.
pub fn matches(doc: &Value, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return false;
    };
    conditions.iter().all(|(key, cond)| match key.as_str() {
        "$or" => cond
            .as_array()
            .is_some_and(|branches| branches.iter().any(|b| matches(doc, b))),
        "$and" => cond
            .as_array()
            .is_some_and(|branches| branches.iter().all(|b| matches(doc, b))),
        path => field_matches(lookup(doc, path), cond),
    })
}

/// Resolve a dotted path against a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn field_matches(stored: Option<&Value>, cond: &Value) -> bool {
    if let Some(operators) = operator_map(cond) {
        return operators.iter().all(|(op, arg)| match op.as_str() {
            "$in" => arg.as_array().is_some_and(|choices| {
                choices.iter().any(|c| stored.is_some_and(|s| contains_or_eq(s, c)))
            }),
            "$nin" => arg.as_array().is_some_and(|choices| {
                !choices.iter().any(|c| stored.is_some_and(|s| contains_or_eq(s, c)))
            }),
            "$ne" => !stored.is_some_and(|s| contains_or_eq(s, arg)),
            "$gt" => stored.is_some_and(|s| compare(s, arg) == Some(Ordering::Greater)),
            "$gte" => stored.is_some_and(|s| {
                matches!(compare(s, arg), Some(Ordering::Greater | Ordering::Equal))
            }),
            "$lt" => stored.is_some_and(|s| compare(s, arg) == Some(Ordering::Less)),
            "$lte" => stored.is_some_and(|s| {
                matches!(compare(s, arg), Some(Ordering::Less | Ordering::Equal))
            }),
            "$exists" => arg.as_bool().is_some_and(|wanted| stored.is_some() == wanted),
            "$all" => arg.as_array().is_some_and(|required| {
                required.iter().all(|r| stored.is_some_and(|s| contains_or_eq(s, r)))
            }),
            _ => false,
        });
    }
    stored.is_some_and(|s| contains_or_eq(s, cond))
}

/// A condition is an operator map when every key starts with `$`.
fn operator_map(cond: &Value) -> Option<&serde_json::Map<String, Value>> {
    let map = cond.as_object()?;
    if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) {
        Some(map)
    } else {
        None
    }
}

/// Deep equality, or containment when the stored value is an array and the
/// wanted value is not.
fn contains_or_eq(stored: &Value, wanted: &Value) -> bool {
    if values_equal(stored, wanted) {
        return true;
    }
    match (stored, wanted) {
        (Value::Array(items), w) if !w.is_array() => {
            items.iter().any(|item| values_equal(item, w))
        }
        _ => false,
    }
}

/// Deep equality with numeric coercion (1 == 1.0).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, v)| ym.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Order two values: numbers numerically, strings lexicographically.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
