// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Write operations and update documents.
//!
//! The operator vocabulary is the store contract of the pipeline: upserts
//! with `$set`, `$setOnInsert`, `$addToSet`, `$push`, `$max` and `$inc`.
//! All identifiers used in selectors are deterministic content hashes, so
//! concurrent ingestion of the same alert by two workers produces the same
//! documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Update operators applied to one document.
///
/// Keys may be dotted paths (`ts.C1.upd`); intermediate objects are created
/// on write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDoc {
    /// Unconditional field assignment.
    #[serde(default, rename = "$set", skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    /// Field assignment applied only when the upsert inserts.
    #[serde(default, rename = "$setOnInsert", skip_serializing_if = "Map::is_empty")]
    pub set_on_insert: Map<String, Value>,
    /// Set-semantics append; accepts `{"$each": [...]}` values.
    #[serde(default, rename = "$addToSet", skip_serializing_if = "Map::is_empty")]
    pub add_to_set: Map<String, Value>,
    /// List append; accepts `{"$each": [...]}` values.
    #[serde(default, rename = "$push", skip_serializing_if = "Map::is_empty")]
    pub push: Map<String, Value>,
    /// Keep the larger of the stored and given value.
    #[serde(default, rename = "$max", skip_serializing_if = "Map::is_empty")]
    pub max: Map<String, Value>,
    /// Keep the smaller of the stored and given value.
    #[serde(default, rename = "$min", skip_serializing_if = "Map::is_empty")]
    pub min: Map<String, Value>,
    /// Numeric increment.
    #[serde(default, rename = "$inc", skip_serializing_if = "Map::is_empty")]
    pub inc: Map<String, Value>,
}

impl UpdateDoc {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `$set` entry.
    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.set.insert(key.to_string(), value);
        self
    }

    /// Add a `$setOnInsert` entry.
    pub fn set_on_insert(mut self, key: &str, value: Value) -> Self {
        self.set_on_insert.insert(key.to_string(), value);
        self
    }

    /// Add a single-value `$addToSet` entry.
    pub fn add_to_set(mut self, key: &str, value: Value) -> Self {
        self.add_to_set.insert(key.to_string(), value);
        self
    }

    /// Add an `$addToSet` entry with `$each` semantics.
    pub fn add_to_set_each(mut self, key: &str, values: Vec<Value>) -> Self {
        let mut each = Map::new();
        each.insert("$each".to_string(), Value::Array(values));
        self.add_to_set.insert(key.to_string(), Value::Object(each));
        self
    }

    /// Add a `$push` entry.
    pub fn push(mut self, key: &str, value: Value) -> Self {
        self.push.insert(key.to_string(), value);
        self
    }

    /// Add a `$max` entry.
    pub fn max(mut self, key: &str, value: Value) -> Self {
        self.max.insert(key.to_string(), value);
        self
    }

    /// Add a `$min` entry.
    pub fn min(mut self, key: &str, value: Value) -> Self {
        self.min.insert(key.to_string(), value);
        self
    }

    /// Add an `$inc` entry.
    pub fn inc(mut self, key: &str, amount: i64) -> Self {
        self.inc.insert(key.to_string(), Value::from(amount));
        self
    }

    /// Whether no operator carries any entry.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.set_on_insert.is_empty()
            && self.add_to_set.is_empty()
            && self.push.is_empty()
            && self.max.is_empty()
            && self.min.is_empty()
            && self.inc.is_empty()
    }
}

/// One write operation against a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    /// Insert a new document; duplicate `_id` is a per-op error.
    InsertOne {
        /// The document to insert.
        document: Value,
    },
    /// Update the first document matching `filter`.
    UpdateOne {
        /// Selector.
        filter: Value,
        /// Operators to apply.
        update: UpdateDoc,
        /// Insert a document built from the selector when nothing matches.
        upsert: bool,
    },
    /// Update every document matching `filter`.
    UpdateMany {
        /// Selector.
        filter: Value,
        /// Operators to apply.
        update: UpdateDoc,
        /// Insert a document built from the selector when nothing matches.
        upsert: bool,
    },
}

impl WriteOp {
    /// Insert one document.
    pub fn insert_one(document: Value) -> Self {
        WriteOp::InsertOne { document }
    }

    /// Update the first match, no upsert.
    pub fn update_one(filter: Value, update: UpdateDoc) -> Self {
        WriteOp::UpdateOne {
            filter,
            update,
            upsert: false,
        }
    }

    /// Update the first match or insert.
    pub fn upsert_one(filter: Value, update: UpdateDoc) -> Self {
        WriteOp::UpdateOne {
            filter,
            update,
            upsert: true,
        }
    }

    /// Update every match, no upsert.
    pub fn update_many(filter: Value, update: UpdateDoc) -> Self {
        WriteOp::UpdateMany {
            filter,
            update,
            upsert: false,
        }
    }
}

/// Classification of a per-operation bulk error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpErrorClass {
    /// Another writer created the same document concurrently; the
    /// compensating write is an upserting `update_one` with the same
    /// selector.
    DuplicateKey,
    /// Anything else; terminal for the operation.
    Other,
}

impl OpErrorClass {
    /// The wire-level error code of the class.
    pub fn code(&self) -> i32 {
        match self {
            OpErrorClass::DuplicateKey => 11000,
            OpErrorClass::Other => 0,
        }
    }
}

/// A failed operation inside an unordered bulk write.
#[derive(Debug, Clone)]
pub struct OpError {
    /// Index of the operation in the submitted batch.
    pub index: usize,
    /// Error class.
    pub class: OpErrorClass,
    /// Backend-reported message.
    pub message: String,
    /// The operation itself, for recovery.
    pub op: WriteOp,
}

/// Outcome of an unordered bulk write.
#[derive(Debug, Clone, Default)]
pub struct BulkSummary {
    /// Documents matched by update operations.
    pub matched: u64,
    /// Documents modified.
    pub modified: u64,
    /// Documents inserted through upserts.
    pub upserted: u64,
    /// Documents inserted through insert operations.
    pub inserted: u64,
    /// Per-operation failures; the remaining operations were applied.
    pub errors: Vec<OpError>,
}

impl BulkSummary {
    /// Fold another summary into this one.
    pub fn merge(&mut self, other: BulkSummary) {
        self.matched += other.matched;
        self.modified += other.modified;
        self.upserted += other.upserted;
        self.inserted += other.inserted;
        self.errors.extend(other.errors);
    }
}
