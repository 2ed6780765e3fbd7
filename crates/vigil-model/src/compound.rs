// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compound records and per-channel flavors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest::Digest;
use crate::stock::StockId;

/// A per-channel policy deviation from the effective compound.
///
/// Recorded when a channel's strict view (exclusions included) differs from
/// the effective compound it shares with other channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundFlavor {
    /// Channel the deviation belongs to.
    pub channel: String,
    /// Content id of the strict view.
    pub strict: Digest,
    /// Number of points the channel excluded.
    pub omitted: u32,
}

/// An ordered, possibly policy-annotated view of a stock's photometry,
/// content-addressed by a 128-bit digest.
///
/// Two compounds with the same id are byte-equal in `body`; the body is
/// immutable once written, only `channels` and `flavors` grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundRecord {
    /// Content digest over the stock id and the canonical body payload.
    #[serde(rename = "_id")]
    pub id: Digest,
    /// Owning transient.
    pub stock: StockId,
    /// Tier that created the compound.
    pub tier: i32,
    /// Wall time of creation, epoch seconds.
    pub added: i64,
    /// Body length.
    pub len: u32,
    /// Ordered list of raw datapoint ids or per-point policy dicts.
    pub body: Vec<Value>,
    /// Channels sharing this view.
    #[serde(default)]
    pub channels: BTreeSet<String>,
    /// Symbolic markers inherited from the contributing channels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Per-channel strict deviations.
    #[serde(default)]
    pub flavors: Vec<CompoundFlavor>,
    /// Digest over the measurement-only subset, when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pp_id: Option<Digest>,
    /// Run that created the compound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
}

impl CompoundRecord {
    /// The raw datapoint id of a body element, whether the element is a
    /// bare id or a policy dict.
    pub fn body_point_id(element: &Value) -> Option<i64> {
        match element {
            Value::Number(n) => n.as_i64(),
            Value::Object(map) => map.get("id").and_then(Value::as_i64),
            _ => None,
        }
    }

    /// Datapoint ids in body order.
    pub fn point_ids(&self) -> Vec<i64> {
        self.body.iter().filter_map(Self::body_point_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_ids_mixed_body() {
        let rec: CompoundRecord = serde_json::from_value(json!({
            "_id": "000102030405060708090a0b0c0d0e0f",
            "stock": "ST1",
            "tier": 0,
            "added": 1700000000,
            "len": 3,
            "body": [100, {"id": 101, "huzp": true}, 102],
        }))
        .unwrap();
        assert_eq!(rec.point_ids(), vec![100, 101, 102]);
    }

    #[test]
    fn test_flavor_round_trip() {
        let flavor = CompoundFlavor {
            channel: "C1".to_string(),
            strict: "000102030405060708090a0b0c0d0e0f".parse().unwrap(),
            omitted: 2,
        };
        let value = serde_json::to_value(&flavor).unwrap();
        assert_eq!(value["omitted"], json!(2));
        let back: CompoundFlavor = serde_json::from_value(value).unwrap();
        assert_eq!(back, flavor);
    }
}
