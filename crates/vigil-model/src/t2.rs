// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! T2 documents, links and the status machine.
//!
//! One document exists per unique `(unit, config, link, col)` key. Results
//! are appended to `body`, never overwritten, and `status` only moves
//! forward:
//!
//! ```text
//! TO_RUN ──► RUNNING ──► COMPLETED
//!               │
//!               ├──► ERROR | EXCEPTION | TOO_MANY_TRIALS
//!               └──► MISSING_DEPENDENCY | UNKNOWN_LINK
//!                    | UNKNOWN_CONFIG | MISSING_INFO
//! ```
//!
//! RUNNING may return to TO_RUN only by operator action.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::journal::JournalEntry;
use crate::stock::StockId;

/// Processing state of a T2 document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum T2Status {
    /// Queued, waiting to be claimed.
    ToRun,
    /// Claimed by a controller.
    Running,
    /// Unit ran and returned a result.
    Completed,
    /// Unit returned an error code.
    Error,
    /// Unit raised.
    Exception,
    /// Too many failed attempts; no further claims.
    TooManyTrials,
    /// A declared dependency result is absent.
    MissingDependency,
    /// The linked document does not exist.
    UnknownLink,
    /// The run configuration id resolves to nothing.
    UnknownConfig,
    /// The reconstructed payload lacks required fields.
    MissingInfo,
}

impl T2Status {
    /// Whether no further transitions are allowed without operator action.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, T2Status::ToRun | T2Status::Running)
    }
}

/// Which collection a T2 document's `link` points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkCol {
    /// Stock-bound: `link` is a stock id.
    #[serde(rename = "stock")]
    Stock,
    /// Datapoint-bound: `link` is a photo point id.
    #[serde(rename = "t0")]
    Point,
    /// State-bound: `link` is an effective compound id.
    #[serde(rename = "t1")]
    State,
}

/// One versioned result appended by the job controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct T2Result {
    /// Run that produced the result.
    pub run_id: i64,
    /// Completion time, epoch seconds.
    pub ts: i64,
    /// Unit wall time in seconds.
    pub duration: f64,
    /// Versions of the unit and its inputs at run time.
    #[serde(default)]
    pub versions: Map<String, Value>,
    /// Unit output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error description on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A queued per-state computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct T2Record {
    /// Unit name, resolved through the registry.
    pub unit: String,
    /// Hashed run-configuration id.
    pub config: crate::digest::Digest,
    /// Target document id; interpreted per `col`.
    pub link: Value,
    /// Which collection `link` points into.
    pub col: LinkCol,
    /// Owning transient, denormalized for journal updates.
    pub stock: StockId,
    /// Processing state.
    pub status: T2Status,
    /// Channels that requested this computation.
    #[serde(default)]
    pub channel: BTreeSet<String>,
    /// Symbolic markers.
    #[serde(default)]
    pub tag: BTreeSet<String>,
    /// Versioned results, append-only.
    #[serde(default)]
    pub body: Vec<T2Result>,
    /// Per-stage records (claims, releases, status moves).
    #[serde(default)]
    pub meta: Vec<JournalEntry>,
}

impl T2Record {
    /// Number of failed attempts recorded in `body`.
    pub fn error_count(&self) -> usize {
        self.body.iter().filter(|r| r.error.is_some()).count()
    }

    /// The most recent successful result.
    pub fn latest_output(&self) -> Option<&Value> {
        self.body.iter().rev().find_map(|r| r.output.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_form() {
        assert_eq!(
            serde_json::to_value(T2Status::ToRun).unwrap(),
            json!("TO_RUN")
        );
        assert_eq!(
            serde_json::to_value(T2Status::TooManyTrials).unwrap(),
            json!("TOO_MANY_TRIALS")
        );
        let s: T2Status = serde_json::from_value(json!("MISSING_DEPENDENCY")).unwrap();
        assert_eq!(s, T2Status::MissingDependency);
    }

    #[test]
    fn test_terminality() {
        assert!(!T2Status::ToRun.is_terminal());
        assert!(!T2Status::Running.is_terminal());
        assert!(T2Status::Completed.is_terminal());
        assert!(T2Status::UnknownLink.is_terminal());
    }

    #[test]
    fn test_error_count_and_latest_output() {
        let rec: T2Record = serde_json::from_value(json!({
            "unit": "UnitA",
            "config": "000102030405060708090a0b0c0d0e0f",
            "link": "aa0102030405060708090a0b0c0d0e0f",
            "col": "t1",
            "stock": "ST1",
            "status": "COMPLETED",
            "body": [
                {"run_id": 1, "ts": 10, "duration": 0.5, "error": "boom"},
                {"run_id": 2, "ts": 20, "duration": 0.4, "output": {"mag": 18.0}},
            ],
        }))
        .unwrap();
        assert_eq!(rec.error_count(), 1);
        assert_eq!(rec.latest_output().unwrap()["mag"], json!(18.0));
    }
}
