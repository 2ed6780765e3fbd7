// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Update-operator application.
//!
//! The single implementation shared by every backend. Operator semantics:
//!
//! - `$setOnInsert` applies only while inserting (upsert with no match);
//! - `$addToSet` appends unless a deep-equal element exists;
//! - `$push` appends unconditionally;
//! - `$max` / `$min` keep the larger/smaller value, writing when the field
//!   is absent;
//! - `$inc` treats an absent field as zero.
//!
//! All operators accept dotted paths and create intermediate objects.

use serde_json::{Map, Value};

use crate::filter::{compare, values_equal};
use crate::ops::UpdateDoc;

/// Apply `update` to `doc` in place. `inserting` selects whether
/// `$setOnInsert` participates.
pub fn apply_update(doc: &mut Value, update: &UpdateDoc, inserting: bool) {
    if inserting {
        for (path, value) in &update.set_on_insert {
            set_path(doc, path, value.clone());
        }
    }
    for (path, value) in &update.set {
        set_path(doc, path, value.clone());
    }
    for (path, value) in &update.add_to_set {
        for element in each_values(value) {
            let array = array_at(doc, path);
            if !array.iter().any(|existing| values_equal(existing, element)) {
                array.push(element.clone());
            }
        }
    }
    for (path, value) in &update.push {
        for element in each_values(value) {
            array_at(doc, path).push(element.clone());
        }
    }
    for (path, value) in &update.max {
        let keep = match lookup_mut(doc, path) {
            Some(existing) => compare(existing, value) == Some(std::cmp::Ordering::Less),
            None => true,
        };
        if keep {
            set_path(doc, path, value.clone());
        }
    }
    for (path, value) in &update.min {
        let keep = match lookup_mut(doc, path) {
            Some(existing) => compare(existing, value) == Some(std::cmp::Ordering::Greater),
            None => true,
        };
        if keep {
            set_path(doc, path, value.clone());
        }
    }
    for (path, value) in &update.inc {
        let current = lookup_mut(doc, path).and_then(|v| v.as_i64()).unwrap_or(0);
        let delta = value.as_i64().unwrap_or(0);
        set_path(doc, path, Value::from(current + delta));
    }
}

/// Build the document inserted by an unmatched upsert: equality fields of
/// the selector become the seed, then all operators apply in insert mode.
pub fn upsert_document(filter: &Value, update: &UpdateDoc) -> Value {
    let mut doc = Value::Object(Map::new());
    if let Some(conditions) = filter.as_object() {
        for (path, cond) in conditions {
            if path.starts_with('$') {
                continue;
            }
            // operator conditions carry no equality value to seed with
            let is_operator = cond
                .as_object()
                .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')));
            if !is_operator {
                set_path(&mut doc, path, cond.clone());
            }
        }
    }
    apply_update(&mut doc, update, true);
    doc
}

/// Unwrap an `{"$each": [...]}` wrapper into its elements.
fn each_values(value: &Value) -> Vec<&Value> {
    if let Some(each) = value
        .as_object()
        .and_then(|m| m.get("$each"))
        .and_then(Value::as_array)
    {
        each.iter().collect()
    } else {
        vec![value]
    }
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("just ensured object");
        if i == segments.len() - 1 {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn lookup_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

/// The array at `path`, created empty when absent. A non-array value at the
/// path is replaced; set operators only ever target array fields.
fn array_at<'a>(doc: &'a mut Value, path: &str) -> &'a mut Vec<Value> {
    let needs_init = !matches!(lookup_mut(doc, path), Some(Value::Array(_)));
    if needs_init {
        set_path(doc, path, Value::Array(Vec::new()));
    }
    match lookup_mut(doc, path) {
        Some(Value::Array(items)) => items,
        _ => unreachable!("path was just initialized to an array"),
    }
}
