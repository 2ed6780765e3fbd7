// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stock identifiers and records.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::journal::JournalEntry;

/// Identifier of one astronomical transient.
///
/// Instruments assign either numeric or string identifiers; both are
/// preserved as-is so selectors always match what the supplier delivered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StockId {
    /// Numeric instrument-assigned identifier.
    Int(i64),
    /// String instrument-assigned identifier.
    Str(String),
}

impl StockId {
    /// The identifier as a JSON value, for use in selectors.
    pub fn to_value(&self) -> Value {
        match self {
            StockId::Int(n) => Value::from(*n),
            StockId::Str(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for StockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockId::Int(n) => write!(f, "{}", n),
            StockId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for StockId {
    fn from(n: i64) -> Self {
        StockId::Int(n)
    }
}

impl From<&str> for StockId {
    fn from(s: &str) -> Self {
        StockId::Str(s.to_string())
    }
}

impl From<String> for StockId {
    fn from(s: String) -> Self {
        StockId::Str(s)
    }
}

/// Persistent record for one transient.
///
/// Created on the first accepted alert and mutated only by append-only
/// operations; never deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecord {
    /// Instrument-assigned identifier.
    #[serde(rename = "_id")]
    pub id: StockId,
    /// Channels that have accepted at least one alert for this stock.
    #[serde(default)]
    pub channels: BTreeSet<String>,
    /// Symbolic markers.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Append-only list of tier events.
    #[serde(default)]
    pub journal: Vec<JournalEntry>,
    /// Per-channel `{tied, upd}` timestamps (epoch seconds).
    #[serde(default)]
    pub ts: Map<String, Value>,
}

impl StockRecord {
    /// Journal entries restricted to the given channels.
    ///
    /// An entry without channel annotation is visible to every channel.
    pub fn journal_for<'a>(
        &'a self,
        channels: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a JournalEntry> {
        self.journal
            .iter()
            .filter(move |entry| match &entry.channels {
                None => true,
                Some(own) => own.iter().any(|c| channels.contains(c)),
            })
    }
}
