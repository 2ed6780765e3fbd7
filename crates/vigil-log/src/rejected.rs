// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rejected-alert log routing.
//!
//! Rejections never touch the primary logs collection: each channel gets a
//! dedicated handler writing to a collection named after it (or one shared
//! collection, per configuration). There is no cross-channel fan-out.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};

use vigil_store::{DocStore, WriteOp, cols};

use crate::error::LogError;
use crate::ident::RecordIdFactory;

/// Where a channel's rejections are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectedDest {
    /// One collection per channel (`rejected_<name>`).
    #[default]
    PerChannel,
    /// The shared `rejected` collection, with a `channel` field.
    Shared,
}

/// Router for rejected-alert records.
pub struct RejectedLogs {
    store: Arc<dyn DocStore>,
    run_id: i64,
    ids: Arc<RecordIdFactory>,
    dest: RejectedDest,
}

impl RejectedLogs {
    /// A router writing through `store`, sharing the record-id factory of
    /// the owning tier instance.
    pub fn new(
        store: Arc<dyn DocStore>,
        run_id: i64,
        ids: Arc<RecordIdFactory>,
        dest: RejectedDest,
    ) -> Self {
        Self {
            store,
            run_id,
            ids,
            dest,
        }
    }

    /// Record one rejection for `channel`.
    pub async fn log_rejection(
        &self,
        channel: &str,
        stock: &Value,
        alert_id: i64,
        extra: Map<String, Value>,
    ) -> Result<(), LogError> {
        let ts = Utc::now().timestamp();
        let mut doc = Map::new();
        doc.insert(
            "_id".to_string(),
            Value::from(self.ids.mint(ts as u32).to_hex()),
        );
        doc.insert("run_id".to_string(), Value::from(self.run_id));
        doc.insert("stock".to_string(), stock.clone());
        doc.insert("alert_id".to_string(), Value::from(alert_id));
        for (key, value) in extra {
            doc.insert(key, value);
        }
        let col = match self.dest {
            RejectedDest::PerChannel => cols::rejected(channel),
            RejectedDest::Shared => {
                doc.insert("channel".to_string(), Value::from(channel));
                cols::REJECTED_SHARED.to_string()
            }
        };
        self.store
            .bulk_write(&col, vec![WriteOp::insert_one(Value::Object(doc))])
            .await?;
        Ok(())
    }
}
