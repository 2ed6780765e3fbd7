// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Canonical JSON encoder for content addressing.
//!
//! Canonical rules:
//! - object keys sorted by UTF-8 byte order, recursively
//! - no insignificant whitespace
//!
//! Non-finite floats cannot occur: inputs are [`serde_json::Value`] trees,
//! whose number type only holds finite values.

use serde_json::{Map, Value};

/// Return a copy of `value` with all object keys sorted recursively.
pub fn canon_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            let mut out = Map::with_capacity(entries.len());
            for (key, val) in entries {
                out.insert(key.clone(), canon_value(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canon_value).collect()),
        other => other.clone(),
    }
}

/// Serialize `value` to canonical JSON bytes.
pub fn to_canon_bytes(value: &Value) -> Vec<u8> {
    // serde_json emits compact output (no whitespace) by default; key order
    // is fixed by canon_value above.
    serde_json::to_vec(&canon_value(value)).expect("canonical JSON serialization cannot fail")
}
