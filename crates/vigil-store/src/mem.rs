// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory backend.
//!
//! Collections are maps keyed by the canonical form of `_id`. All writes
//! for one call happen under a single lock, which makes
//! `find_one_and_update` trivially atomic; iteration order is the key
//! order, so repeated queries are deterministic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::filter::matches;
use crate::ops::{BulkSummary, OpError, OpErrorClass, UpdateDoc, WriteOp};
use crate::store::DocStore;
use crate::update::{apply_update, upsert_document};

/// The embedded in-memory store.
#[derive(Default)]
pub struct MemStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    minted: AtomicU64,
}

impl MemStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn doc_key(&self, doc: &mut Value) -> String {
        if let Some(id) = doc.get("_id") {
            return serde_json::to_string(id).expect("id serialization cannot fail");
        }
        // Mint an id for documents inserted without one.
        let n = self.minted.fetch_add(1, Ordering::Relaxed);
        let id = format!("mem:{n:016x}");
        if let Some(map) = doc.as_object_mut() {
            map.insert("_id".to_string(), Value::from(id.clone()));
        }
        format!("\"{id}\"")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<String, Value>>> {
        self.collections.lock().expect("store lock poisoned")
    }

    fn apply_one(
        &self,
        docs: &mut BTreeMap<String, Value>,
        index: usize,
        op: WriteOp,
        summary: &mut BulkSummary,
    ) {
        match op {
            WriteOp::InsertOne { document } => {
                let mut document = document;
                let key = self.doc_key(&mut document);
                if docs.contains_key(&key) {
                    summary.errors.push(OpError {
                        index,
                        class: OpErrorClass::DuplicateKey,
                        message: format!("duplicate key: {key}"),
                        op: WriteOp::InsertOne { document },
                    });
                } else {
                    docs.insert(key, document);
                    summary.inserted += 1;
                }
            }
            WriteOp::UpdateOne {
                filter,
                update,
                upsert,
            } => {
                let hit = docs
                    .iter()
                    .find(|(_, doc)| matches(doc, &filter))
                    .map(|(key, _)| key.clone());
                match hit {
                    Some(key) => {
                        let doc = docs.get_mut(&key).expect("key just found");
                        summary.matched += 1;
                        apply_update(doc, &update, false);
                        summary.modified += 1;
                    }
                    None if upsert => {
                        let mut doc = upsert_document(&filter, &update);
                        let key = self.doc_key(&mut doc);
                        if docs.contains_key(&key) {
                            summary.errors.push(OpError {
                                index,
                                class: OpErrorClass::DuplicateKey,
                                message: format!("duplicate key: {key}"),
                                op: WriteOp::UpdateOne {
                                    filter,
                                    update,
                                    upsert,
                                },
                            });
                        } else {
                            docs.insert(key, doc);
                            summary.upserted += 1;
                        }
                    }
                    None => {}
                }
            }
            WriteOp::UpdateMany {
                filter,
                update,
                upsert,
            } => {
                let mut matched = 0u64;
                for (_, doc) in docs.iter_mut() {
                    if matches(doc, &filter) {
                        matched += 1;
                        apply_update(doc, &update, false);
                    }
                }
                if matched == 0 && upsert {
                    let mut doc = upsert_document(&filter, &update);
                    let key = self.doc_key(&mut doc);
                    docs.insert(key, doc);
                    summary.upserted += 1;
                } else {
                    summary.matched += matched;
                    summary.modified += matched;
                }
            }
        }
    }
}

#[async_trait]
impl DocStore for MemStore {
    async fn bulk_write(&self, col: &str, ops: Vec<WriteOp>) -> Result<BulkSummary, StoreError> {
        let mut guard = self.lock();
        let docs = guard.entry(col.to_string()).or_default();
        let mut summary = BulkSummary::default();
        for (index, op) in ops.into_iter().enumerate() {
            self.apply_one(docs, index, op, &mut summary);
        }
        Ok(summary)
    }

    async fn find(&self, col: &str, filter: &Value) -> Result<Vec<Value>, StoreError> {
        let guard = self.lock();
        Ok(guard
            .get(col)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, col: &str, filter: &Value) -> Result<Option<Value>, StoreError> {
        let guard = self.lock();
        Ok(guard
            .get(col)
            .and_then(|docs| docs.values().find(|doc| matches(doc, filter)).cloned()))
    }

    async fn find_one_and_update(
        &self,
        col: &str,
        filter: &Value,
        update: &UpdateDoc,
        upsert: bool,
    ) -> Result<Option<Value>, StoreError> {
        let mut guard = self.lock();
        let docs = guard.entry(col.to_string()).or_default();
        let hit = docs
            .iter()
            .find(|(_, doc)| matches(doc, filter))
            .map(|(key, _)| key.clone());
        if let Some(key) = hit {
            let doc = docs.get_mut(&key).expect("key just found");
            apply_update(doc, update, false);
            return Ok(Some(doc.clone()));
        }
        if upsert {
            let mut doc = upsert_document(filter, update);
            let key = self.doc_key(&mut doc);
            docs.insert(key.clone(), doc);
            return Ok(docs.get(&key).cloned());
        }
        Ok(None)
    }

    async fn count(&self, col: &str, filter: &Value) -> Result<u64, StoreError> {
        let guard = self.lock();
        Ok(guard
            .get(col)
            .map(|docs| docs.values().filter(|doc| matches(doc, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn delete_many(&self, col: &str, filter: &Value) -> Result<u64, StoreError> {
        let mut guard = self.lock();
        let Some(docs) = guard.get_mut(col) else {
            return Ok(0);
        };
        let doomed: Vec<String> = docs
            .iter()
            .filter(|(_, doc)| matches(doc, filter))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            docs.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }

    async fn ensure_collection(&self, col: &str) -> Result<(), StoreError> {
        self.lock().entry(col.to_string()).or_default();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
