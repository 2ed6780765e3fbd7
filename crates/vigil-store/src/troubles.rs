// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagnostic documents for non-fatal errors.
//!
//! Faults local to a single alert or document are absorbed into the
//! troubles collection and surfaced only through status codes; the writer
//! itself never raises.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::error;

use crate::cols;
use crate::ops::WriteOp;
use crate::store::DocStore;

/// Writes trouble documents describing non-fatal pipeline errors.
#[derive(Clone)]
pub struct TroubleWriter {
    store: Arc<dyn DocStore>,
}

impl TroubleWriter {
    /// A writer over the given store.
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self { store }
    }

    /// Record one trouble document.
    ///
    /// `location` names the emitting component, `extra` carries the
    /// diagnostic payload (offending alert content, document keys, ...).
    pub async fn report(&self, tier: i32, location: &str, message: &str, extra: Value) {
        let doc = json!({
            "tier": tier,
            "location": location,
            "msg": message,
            "ts": Utc::now().timestamp(),
            "extra": extra,
        });
        if let Err(e) = self
            .store
            .bulk_write(cols::TROUBLES, vec![WriteOp::insert_one(doc)])
            .await
        {
            // Nothing left to escalate to; the error is at least on the
            // process log.
            error!(location, error = %e, "Failed to write trouble document");
        }
    }
}
