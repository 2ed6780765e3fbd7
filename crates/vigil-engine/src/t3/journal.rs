// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The T3 journal updater.
//!
//! Task units return journal-update requests; the updater keeps two
//! pending lists. Standard requests become `update_many` pushes whose
//! modified count must equal the expected stock count; resilient requests
//! become per-stock upserts. A count mismatch is recorded as a trouble
//! document, never raised.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use vigil_model::JournalEntry;
use vigil_store::{DocStore, TroubleWriter, UpdateDoc, WriteOp, cols};
use vigil_units::JournalUpdateRequest;

use crate::error::Result;

/// Queues and flushes per-stock journal pushes for one event run.
pub struct JournalUpdater {
    store: Arc<dyn DocStore>,
    event: String,
    run_id: i64,
    troubles: TroubleWriter,
    standard: Vec<(Vec<Value>, Value)>,
    resilient: Vec<(Value, Value)>,
}

impl JournalUpdater {
    /// An updater stamping entries with the event name and run id.
    pub fn new(store: Arc<dyn DocStore>, event: &str, run_id: i64) -> Self {
        let troubles = TroubleWriter::new(store.clone());
        Self {
            store,
            event: event.to_string(),
            run_id,
            troubles,
            standard: Vec::new(),
            resilient: Vec::new(),
        }
    }

    /// Queue one request.
    pub fn queue(&mut self, request: JournalUpdateRequest) {
        let mut entry = JournalEntry::new(3, Utc::now().timestamp())
            .with_event(&self.event)
            .with_run_id(self.run_id);
        for (key, value) in &request.content {
            entry = entry.with_extra(key, value.clone());
        }
        let entry = match serde_json::to_value(&entry) {
            Ok(entry) => entry,
            Err(_) => return,
        };
        let stocks: Vec<Value> = request.stocks.iter().map(|s| s.to_value()).collect();
        if request.ext {
            for stock in stocks {
                self.resilient.push((stock, entry.clone()));
            }
        } else if !stocks.is_empty() {
            self.standard.push((stocks, entry));
        }
    }

    /// Number of queued requests.
    pub fn pending(&self) -> usize {
        self.standard.len() + self.resilient.len()
    }

    /// Submit both lists and verify the modified counts.
    pub async fn flush(&mut self) -> Result<()> {
        let standard = std::mem::take(&mut self.standard);
        let resilient = std::mem::take(&mut self.resilient);
        if standard.is_empty() && resilient.is_empty() {
            return Ok(());
        }

        let mut expected = 0u64;
        let mut ops = Vec::with_capacity(standard.len() + resilient.len());
        for (stocks, entry) in standard {
            expected += stocks.len() as u64;
            ops.push(WriteOp::update_many(
                json!({"_id": {"$in": stocks}}),
                UpdateDoc::new().push("journal", entry),
            ));
        }
        for (stock, entry) in resilient {
            expected += 1;
            ops.push(WriteOp::UpdateOne {
                filter: json!({"_id": stock}),
                update: UpdateDoc::new().push("journal", entry),
                upsert: true,
            });
        }

        let summary = self.store.bulk_write(cols::STOCK, ops).await?;
        let applied = summary.modified + summary.upserted;
        if applied != expected || !summary.errors.is_empty() {
            warn!(expected, applied, "Journal update count mismatch");
            self.troubles
                .report(
                    3,
                    "journal_updater",
                    "journal update count mismatch",
                    json!({
                        "event": self.event,
                        "expected": expected,
                        "applied": applied,
                        "errors": summary.errors.len(),
                    }),
                )
                .await;
        }
        Ok(())
    }
}
