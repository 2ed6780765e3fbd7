// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Store account lifecycle.
//!
//! Role documents live in the `accounts` collection; `init` also creates
//! the collection set and the run-id counter document so a fresh store is
//! ready for the pipeline.

use chrono::Utc;
use serde_json::{Value, json};

use vigil_store::counter::RUN_ID_COUNTER;
use vigil_store::{DocStore, StoreError, UpdateDoc, WriteOp, cols};

/// Access role of a provisioned account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Query-only access; the minimum the pipeline requires.
    Read,
    /// Full pipeline access.
    ReadWrite,
}

impl Role {
    /// Parse the CLI form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "read" => Some(Role::Read),
            "readwrite" => Some(Role::ReadWrite),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Role::Read => "read",
            Role::ReadWrite => "readwrite",
        }
    }
}

/// Create the collection set and the counter document.
pub async fn init(store: &dyn DocStore) -> Result<(), StoreError> {
    for col in cols::all_fixed() {
        store.ensure_collection(col).await?;
    }
    store
        .find_one_and_update(
            cols::COUNTER,
            &json!({"_id": RUN_ID_COUNTER}),
            &UpdateDoc::new().set_on_insert("value", json!(0)),
            true,
        )
        .await?;
    Ok(())
}

/// Upsert an account role.
pub async fn provision(store: &dyn DocStore, name: &str, role: Role) -> Result<(), StoreError> {
    let summary = store
        .bulk_write(
            cols::ACCOUNTS,
            vec![WriteOp::upsert_one(
                json!({"_id": name}),
                UpdateDoc::new()
                    .set("role", json!(role.as_str()))
                    .set_on_insert("created", json!(Utc::now().timestamp())),
            )],
        )
        .await?;
    if let Some(err) = summary.errors.into_iter().next() {
        return Err(StoreError::backend("provision", err.message));
    }
    Ok(())
}

/// Remove an account; returns whether one existed.
pub async fn revoke(store: &dyn DocStore, name: &str) -> Result<bool, StoreError> {
    Ok(store
        .delete_many(cols::ACCOUNTS, &json!({"_id": name}))
        .await?
        > 0)
}

/// All accounts as `(name, role)` pairs.
pub async fn list(store: &dyn DocStore) -> Result<Vec<(String, String)>, StoreError> {
    let docs = store.find(cols::ACCOUNTS, &json!({})).await?;
    Ok(docs
        .iter()
        .filter_map(|doc| {
            let name = doc.get("_id").and_then(Value::as_str)?;
            let role = doc.get("role").and_then(Value::as_str)?;
            Some((name.to_string(), role.to_string()))
        })
        .collect())
}
