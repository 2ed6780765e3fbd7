// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The process-wide run-id counter.
//!
//! Run ids are minted by an atomic increment-with-upsert on a well-known
//! counter document; the returned value is monotonic per store and must
//! never be reused across processes.

use serde_json::json;

use crate::cols;
use crate::error::StoreError;
use crate::ops::UpdateDoc;
use crate::store::DocStore;

/// Id of the counter document.
pub const RUN_ID_COUNTER: &str = "current_run_id";

/// Mint a new run id.
pub async fn new_run_id(store: &dyn DocStore) -> Result<i64, StoreError> {
    let doc = store
        .find_one_and_update(
            cols::COUNTER,
            &json!({"_id": RUN_ID_COUNTER}),
            &UpdateDoc::new().inc("value", 1),
            true,
        )
        .await?;
    doc.as_ref()
        .and_then(|d| d.get("value"))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::backend("new_run_id", "counter document has no integer value"))
}
