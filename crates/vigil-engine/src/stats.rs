// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The stats publisher.
//!
//! Collects per-collection document counts and bulk-buffer timing and
//! emits them as an event entry; remote metrics shipping stays outside
//! the pipeline.

use chrono::Utc;
use serde_json::{Map, Value, json};

use vigil_store::{BulkUpdateBuffer, DocStore, cols};

use crate::error::Result;
use crate::events::{EventEntry, record_event};

/// Publish one stats snapshot.
pub async fn publish_stats(store: &dyn DocStore, buffer: &BulkUpdateBuffer) -> Result<()> {
    let mut counts = Map::new();
    for col in [cols::STOCK, cols::T0, cols::T1, cols::T2, cols::LOGS, cols::TROUBLES] {
        counts.insert(col.to_string(), json!(store.count(col, &json!({})).await?));
    }

    let mut timing = Map::new();
    for (col, metrics) in buffer.metrics() {
        timing.insert(
            col,
            json!({
                "bulks": metrics.bulks,
                "ops": metrics.ops,
                "total_secs": metrics.total_secs,
                "mean_op_secs": metrics.mean_op_secs(),
            }),
        );
    }

    let entry = EventEntry {
        name: "stats".to_string(),
        tier: json!("stats"),
        ts: Utc::now().timestamp(),
        duration: 0.0,
        run_ids: Vec::new(),
        success: true,
        event_info: json!({"counts": counts, "bulk_timing": timing}),
    };
    record_event(store, &entry).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_store::{BufferConfig, MemStore, WriteOp};

    #[tokio::test]
    async fn test_snapshot_written_as_event() {
        let store = Arc::new(MemStore::new());
        store
            .bulk_write(
                cols::STOCK,
                vec![WriteOp::insert_one(json!({"_id": "ST1"}))],
            )
            .await
            .unwrap();
        let buffer = BulkUpdateBuffer::new(store.clone(), BufferConfig::default());

        publish_stats(store.as_ref(), &buffer).await.unwrap();

        let days = store.find(cols::EVENTS, &json!({})).await.unwrap();
        assert_eq!(days.len(), 1);
        let entry = &days[0]["events"][0];
        assert_eq!(entry["name"], json!("stats"));
        assert_eq!(entry["event_info"]["counts"]["stock"], json!(1));
    }
}
