// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The `DocStore` trait.
//!
//! This is the seam between the pipeline and the external document
//! database. Every tier writes through it, directly or via the
//! [`BulkUpdateBuffer`](crate::buffer::BulkUpdateBuffer). Implementations
//! must guarantee that [`find_one_and_update`](DocStore::find_one_and_update)
//! is a single atomic operation: it linearizes T2 claims and run-id
//! minting, the only globally serialized writes in the pipeline.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::ops::{BulkSummary, UpdateDoc, WriteOp};

/// Async interface of the document store.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Apply an unordered bulk of write operations to one collection.
    ///
    /// Per-operation failures are reported in the summary; the remaining
    /// operations are still applied. Whole-request failures (connectivity,
    /// malformed collection) surface as `Err`.
    async fn bulk_write(&self, col: &str, ops: Vec<WriteOp>) -> Result<BulkSummary, StoreError>;

    /// All documents matching `filter`.
    async fn find(&self, col: &str, filter: &Value) -> Result<Vec<Value>, StoreError>;

    /// The first document matching `filter`.
    async fn find_one(&self, col: &str, filter: &Value) -> Result<Option<Value>, StoreError>;

    /// Atomically update the first document matching `filter` and return
    /// the post-update document. With `upsert`, a missing match inserts a
    /// document built from the selector's equality fields.
    async fn find_one_and_update(
        &self,
        col: &str,
        filter: &Value,
        update: &UpdateDoc,
        upsert: bool,
    ) -> Result<Option<Value>, StoreError>;

    /// Number of documents matching `filter`.
    async fn count(&self, col: &str, filter: &Value) -> Result<u64, StoreError>;

    /// Delete all documents matching `filter`; returns the count removed.
    async fn delete_many(&self, col: &str, filter: &Value) -> Result<u64, StoreError>;

    /// Names of existing collections.
    async fn collection_names(&self) -> Result<Vec<String>, StoreError>;

    /// Create a collection if it does not exist.
    async fn ensure_collection(&self, col: &str) -> Result<(), StoreError>;

    /// Whether the store is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}
