// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lightcurve reconstruction from the store.

use serde_json::{Value, json};

use vigil_model::{CompoundRecord, LightCurve, PhotoPoint};
use vigil_store::{DocStore, cols};

use crate::error::Result;

/// Resolve a compound's body against the photo-point collection.
///
/// Returns `None` when any referenced point is absent; the caller decides
/// whether that is terminal.
pub async fn lightcurve_for(
    store: &dyn DocStore,
    compound: &CompoundRecord,
) -> Result<Option<LightCurve>> {
    let ids = compound.point_ids();
    let docs = store
        .find(cols::T0, &json!({"_id": {"$in": ids}}))
        .await?;

    let mut by_id = std::collections::HashMap::new();
    for doc in docs {
        if let Ok(point) = serde_json::from_value::<PhotoPoint>(strip_stock_fields(doc)) {
            by_id.insert(point.id, point);
        }
    }

    let mut points = Vec::with_capacity(ids.len());
    for id in &ids {
        match by_id.remove(id) {
            Some(point) => points.push(point),
            None => return Ok(None),
        }
    }

    Ok(Some(LightCurve {
        compound_id: compound.id,
        points,
        excluded: Vec::new(),
    }))
}

/// Store bookkeeping fields are not part of the instrument payload.
fn strip_stock_fields(mut doc: Value) -> Value {
    if let Some(map) = doc.as_object_mut() {
        map.remove("stock_ids");
        map.remove("superseded_by");
        map.remove("superseded");
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_model::Digest;
    use vigil_store::{MemStore, WriteOp};

    fn compound_over(ids: &[i64]) -> CompoundRecord {
        serde_json::from_value(json!({
            "_id": Digest([9; 16]).to_hex(),
            "stock": "ST1",
            "tier": 0,
            "added": 100,
            "len": ids.len(),
            "body": ids,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_points_resolved_in_body_order() {
        let store = Arc::new(MemStore::new());
        store
            .bulk_write(
                cols::T0,
                vec![
                    WriteOp::insert_one(
                        json!({"_id": 101, "jd": 101.0, "rcid": 3, "stock_ids": ["ST1"]}),
                    ),
                    WriteOp::insert_one(
                        json!({"_id": 100, "jd": 100.0, "rcid": 3, "stock_ids": ["ST1"]}),
                    ),
                ],
            )
            .await
            .unwrap();

        let lc = lightcurve_for(store.as_ref(), &compound_over(&[100, 101]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lc.point_ids(), vec![100, 101]);
        assert!(lc.points[0].body.get("stock_ids").is_none());
    }

    #[tokio::test]
    async fn test_missing_point_yields_none() {
        let store = Arc::new(MemStore::new());
        store
            .bulk_write(
                cols::T0,
                vec![WriteOp::insert_one(json!({"_id": 100, "jd": 100.0, "rcid": 3}))],
            )
            .await
            .unwrap();
        let lc = lightcurve_for(store.as_ref(), &compound_over(&[100, 999]))
            .await
            .unwrap();
        assert!(lc.is_none());
    }
}
