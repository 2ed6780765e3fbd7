// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Journal entries appended to stock documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One event in a stock's append-only journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Tier that produced the entry (0..=3).
    pub tier: i32,
    /// Creation time, epoch seconds.
    pub ts: i64,
    /// Event label, when the entry is more than a plain ingestion marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Run that produced the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    /// Channels the entry is scoped to; absent means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    /// Free-form payload (alert ids, unit names, success flags).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JournalEntry {
    /// A bare entry for the given tier and timestamp.
    pub fn new(tier: i32, ts: i64) -> Self {
        Self {
            tier,
            ts,
            event: None,
            run_id: None,
            channels: None,
            extra: Map::new(),
        }
    }

    /// Scope the entry to one channel.
    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channels = Some(vec![channel.to_string()]);
        self
    }

    /// Scope the entry to a channel set.
    pub fn with_channels<I: IntoIterator<Item = String>>(mut self, channels: I) -> Self {
        self.channels = Some(channels.into_iter().collect());
        self
    }

    /// Attach the minting run id.
    pub fn with_run_id(mut self, run_id: i64) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attach an event label.
    pub fn with_event(mut self, event: &str) -> Self {
        self.event = Some(event.to_string());
        self
    }

    /// Attach one free-form field.
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}
