// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event-document lifecycle.
//!
//! One event document exists per day, keyed by the date as an integer
//! (`YYYYMMDD`); each run of a named tiered process pushes one entry onto
//! its `events` list. A failed run still writes its entry, with a duration
//! and the run ids it minted and `success: false`.

use chrono::{Datelike, Utc};
use serde_json::{Value, json};

use vigil_store::{DocStore, StoreError, UpdateDoc, WriteOp, cols};

/// One entry pushed onto the day's event document.
#[derive(Debug, Clone)]
pub struct EventEntry {
    /// Name of the tiered process.
    pub name: String,
    /// Tier that ran (`0`..`3`, or a symbolic label for auxiliary jobs).
    pub tier: Value,
    /// Start time, epoch seconds.
    pub ts: i64,
    /// Wall time, seconds.
    pub duration: f64,
    /// Run ids minted during the run.
    pub run_ids: Vec<i64>,
    /// Whether the run succeeded.
    pub success: bool,
    /// Free-form payload (alert counts, selection sizes, ...).
    pub event_info: Value,
}

/// The `YYYYMMDD` integer key of the day containing `ts` (UTC).
pub fn day_key(ts: i64) -> i64 {
    let day = chrono::DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now);
    day.year() as i64 * 10_000 + day.month() as i64 * 100 + day.day() as i64
}

/// Append one entry to the day's event document.
pub async fn record_event(store: &dyn DocStore, entry: &EventEntry) -> Result<(), StoreError> {
    let doc = json!({
        "name": entry.name,
        "tier": entry.tier,
        "ts": entry.ts,
        "duration": entry.duration,
        "run_ids": entry.run_ids,
        "success": entry.success,
        "event_info": entry.event_info,
    });
    let op = WriteOp::upsert_one(
        json!({"_id": day_key(entry.ts)}),
        UpdateDoc::new().push("events", doc),
    );
    let summary = store.bulk_write(cols::EVENTS, vec![op]).await?;
    if let Some(err) = summary.errors.into_iter().next() {
        return Err(StoreError::backend("record_event", err.message));
    }
    Ok(())
}

/// Completion time of the most recent successful run of `name`.
pub async fn last_run_of(store: &dyn DocStore, name: &str) -> Result<Option<i64>, StoreError> {
    let days = store.find(cols::EVENTS, &json!({})).await?;
    let mut best: Option<i64> = None;
    for day in days {
        let Some(entries) = day.get("events").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            if entry.get("name").and_then(Value::as_str) == Some(name)
                && entry.get("success").and_then(Value::as_bool) == Some(true)
            {
                if let Some(ts) = entry.get("ts").and_then(Value::as_i64) {
                    best = Some(best.map_or(ts, |b| b.max(ts)));
                }
            }
        }
    }
    Ok(best)
}

/// Alerts observed by T0 runs since `since` (epoch seconds; `None` counts
/// everything), summed over event documents.
pub async fn alerts_since(store: &dyn DocStore, since: Option<i64>) -> Result<i64, StoreError> {
    let days = store.find(cols::EVENTS, &json!({})).await?;
    let mut total = 0i64;
    for day in days {
        let Some(entries) = day.get("events").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            if entry.get("tier").and_then(Value::as_i64) != Some(0) {
                continue;
            }
            let ts = entry.get("ts").and_then(Value::as_i64).unwrap_or(0);
            if since.is_some_and(|s| ts <= s) {
                continue;
            }
            total += entry
                .get("event_info")
                .and_then(|i| i.get("alerts"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
        }
    }
    Ok(total)
}
