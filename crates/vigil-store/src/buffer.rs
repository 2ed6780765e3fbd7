// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The bulk-update buffer.
//!
//! Accepts write operations keyed by target collection, coalesces them and
//! submits unordered bulk writes through a bounded worker pool. Ordering
//! across workers and collections is not guaranteed; per-stock ordering
//! holds because all server-side operators are commutative under set/list
//! semantics and identities are content-addressed.
//!
//! Failure discipline: a duplicate-key error is a benign race with another
//! writer and is re-issued as an upserting `update_one` with the same
//! selector. Any other error is terminal for the operation: a trouble
//! document is written and the producer is cancelled through the shared
//! token. The buffer itself never raises to its caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ops::{BulkSummary, OpErrorClass, UpdateDoc, WriteOp};
use crate::store::DocStore;
use crate::troubles::TroubleWriter;

/// Buffer tuning knobs.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Flush when the pending set has been open this long.
    pub push_interval: Duration,
    /// Flush when this many operations are pending.
    pub autopush_size: usize,
    /// Concurrent bulk submissions.
    pub workers: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(10),
            autopush_size: 100,
            workers: 8,
        }
    }
}

/// Per-collection submission timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionMetrics {
    /// Bulk writes submitted.
    pub bulks: u64,
    /// Operations submitted.
    pub ops: u64,
    /// Total wall time spent in bulk writes, seconds.
    pub total_secs: f64,
}

impl CollectionMetrics {
    /// Mean wall time per operation, seconds.
    pub fn mean_op_secs(&self) -> f64 {
        if self.ops == 0 {
            0.0
        } else {
            self.total_secs / self.ops as f64
        }
    }
}

#[derive(Default)]
struct Pending {
    ops: HashMap<String, Vec<WriteOp>>,
    count: usize,
    opened_at: Option<Instant>,
}

struct BufferInner {
    store: Arc<dyn DocStore>,
    config: BufferConfig,
    pending: Mutex<Pending>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    troubles: TroubleWriter,
    metrics: Mutex<BTreeMap<String, CollectionMetrics>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Buffered, worker-pooled, idempotency-aware bulk writer.
#[derive(Clone)]
pub struct BulkUpdateBuffer {
    inner: Arc<BufferInner>,
}

impl BulkUpdateBuffer {
    /// A buffer writing through `store`.
    pub fn new(store: Arc<dyn DocStore>, config: BufferConfig) -> Self {
        let troubles = TroubleWriter::new(store.clone());
        Self {
            inner: Arc::new(BufferInner {
                store,
                permits: Arc::new(Semaphore::new(config.workers.max(1))),
                config,
                pending: Mutex::new(Pending::default()),
                cancel: CancellationToken::new(),
                troubles,
                metrics: Mutex::new(BTreeMap::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The cancellation token set on unrecoverable store errors.
    ///
    /// Producers test it each iteration and drain when it fires.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Whether an unrecoverable error has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Enqueue operations for one collection. O(1) per op, thread-safe.
    pub fn add(&self, col: &str, ops: Vec<WriteOp>) {
        if ops.is_empty() {
            return;
        }
        let mut pending = self.inner.pending.lock().expect("buffer lock poisoned");
        pending.count += ops.len();
        pending
            .ops
            .entry(col.to_string())
            .or_default()
            .extend(ops);
        if pending.opened_at.is_none() {
            pending.opened_at = Some(Instant::now());
        }
    }

    /// Enqueue a collection-keyed operation map.
    pub fn add_map(&self, ops_by_col: HashMap<String, Vec<WriteOp>>) {
        for (col, ops) in ops_by_col {
            self.add(&col, ops);
        }
    }

    /// Number of operations currently pending.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().expect("buffer lock poisoned").count
    }

    /// Flush when the pending set has been open longer than the push
    /// interval. Called periodically by the scheduler.
    pub fn flush_if_due(&self) {
        let due = {
            let pending = self.inner.pending.lock().expect("buffer lock poisoned");
            pending.count > 0
                && pending
                    .opened_at
                    .is_some_and(|t| t.elapsed() >= self.inner.config.push_interval)
        };
        if due {
            self.flush();
        }
    }

    /// Flush when the pending size exceeds the autopush threshold;
    /// otherwise reset the push-interval deadline. Called after each alert
    /// so steady ingestion postpones the periodic flush.
    pub fn flush_if_large(&self) {
        let large = {
            let mut pending = self.inner.pending.lock().expect("buffer lock poisoned");
            if pending.count >= self.inner.config.autopush_size {
                true
            } else {
                if pending.count > 0 {
                    pending.opened_at = Some(Instant::now());
                }
                false
            }
        };
        if large {
            self.flush();
        }
    }

    /// Swap out the pending set and submit it through the worker pool.
    pub fn flush(&self) {
        let taken = {
            let mut pending = self.inner.pending.lock().expect("buffer lock poisoned");
            std::mem::take(&mut *pending)
        };
        if taken.count == 0 {
            return;
        }
        debug!(ops = taken.count, collections = taken.ops.len(), "Flushing bulk buffer");

        let mut tasks = self.inner.tasks.lock().expect("buffer lock poisoned");
        tasks.retain(|handle| !handle.is_finished());
        for (col, ops) in taken.ops {
            if ops.is_empty() {
                continue;
            }
            let inner = self.inner.clone();
            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = inner.permits.clone().acquire_owned().await else {
                    return;
                };
                submit(&inner, &col, ops).await;
            }));
        }
    }

    /// Flush everything and wait for all submissions to finish.
    pub async fn close(&self) {
        self.flush();
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut tasks = self.inner.tasks.lock().expect("buffer lock poisoned");
                tasks.drain(..).collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Per-collection submission metrics.
    pub fn metrics(&self) -> BTreeMap<String, CollectionMetrics> {
        self.inner.metrics.lock().expect("buffer lock poisoned").clone()
    }
}

/// Submit one collection's batch, recovering duplicate-key races and
/// escalating everything else.
async fn submit(inner: &BufferInner, col: &str, ops: Vec<WriteOp>) {
    let op_count = ops.len();
    let started = Instant::now();

    let outcome = match inner.store.bulk_write(col, ops.clone()).await {
        Ok(summary) => Ok(summary),
        Err(first_err) => {
            // One retry for transient connectivity faults.
            warn!(col, error = %first_err, "Bulk write failed, retrying once");
            inner.store.bulk_write(col, ops).await
        }
    };

    {
        let mut metrics = inner.metrics.lock().expect("buffer lock poisoned");
        let entry = metrics.entry(col.to_string()).or_default();
        entry.bulks += 1;
        entry.ops += op_count as u64;
        entry.total_secs += started.elapsed().as_secs_f64();
    }

    let summary: BulkSummary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            fatal(inner, col, &format!("bulk write failed twice: {e}"), json!({})).await;
            return;
        }
    };

    for err in summary.errors {
        match err.class {
            OpErrorClass::DuplicateKey => {
                let recovery = recovery_op(&err.op);
                match inner.store.bulk_write(col, vec![recovery]).await {
                    Ok(s) if s.errors.is_empty() => {
                        debug!(col, index = err.index, "Recovered duplicate-key race");
                    }
                    Ok(s) => {
                        let msg = s
                            .errors
                            .first()
                            .map(|e| e.message.clone())
                            .unwrap_or_default();
                        fatal(inner, col, &format!("duplicate-key recovery failed: {msg}"), op_json(&err.op)).await;
                    }
                    Err(e) => {
                        fatal(inner, col, &format!("duplicate-key recovery failed: {e}"), op_json(&err.op)).await;
                    }
                }
            }
            OpErrorClass::Other => {
                fatal(inner, col, &err.message, op_json(&err.op)).await;
            }
        }
    }
}

async fn fatal(inner: &BufferInner, col: &str, message: &str, extra: serde_json::Value) {
    warn!(col, message, "Unrecoverable store error, cancelling producer");
    inner
        .troubles
        .report(-1, "bulk_update_buffer", message, json!({"col": col, "op": extra}))
        .await;
    inner.cancel.cancel();
}

fn op_json(op: &WriteOp) -> serde_json::Value {
    serde_json::to_value(op).unwrap_or(serde_json::Value::Null)
}

/// The compensating write for a duplicate-key race: an upserting
/// `update_one` with the same selector.
fn recovery_op(op: &WriteOp) -> WriteOp {
    match op {
        WriteOp::InsertOne { document } => {
            let id = document.get("_id").cloned().unwrap_or(serde_json::Value::Null);
            let mut update = UpdateDoc::new();
            if let Some(map) = document.as_object() {
                for (key, value) in map {
                    if key != "_id" {
                        update.set.insert(key.clone(), value.clone());
                    }
                }
            }
            WriteOp::UpdateOne {
                filter: json!({"_id": id}),
                update,
                upsert: true,
            }
        }
        WriteOp::UpdateOne { filter, update, .. } => WriteOp::UpdateOne {
            filter: filter.clone(),
            update: update.clone(),
            upsert: true,
        },
        WriteOp::UpdateMany { filter, update, .. } => WriteOp::UpdateMany {
            filter: filter.clone(),
            update: update.clone(),
            upsert: true,
        },
    }
}
