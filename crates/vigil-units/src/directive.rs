// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! T2 ingest directives and eligibility slices.
//!
//! An accepting channel requests T2 documents through directives. Each
//! directive names the unit, carries the raw run configuration (hashed
//! into the document key), the link kind, and the groups it belongs to for
//! group-restricted filter verdicts.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use vigil_model::{Digest, canon_value, to_canon_bytes};

use crate::filter::FilterVerdict;

/// Which datapoints of an alert produce a point-bound document.
///
/// Recognized forms are exactly: all (absent), `"first"`, `"last"`, and a
/// python-style `[start, stop, step]` triple.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EligibilitySlice {
    /// Every datapoint.
    #[default]
    All,
    /// Only the first (earliest in the given order).
    First,
    /// Only the last.
    Last,
    /// Python-slice selection.
    Range {
        /// Start index; negative counts from the end.
        start: i64,
        /// Stop index (exclusive); absent means the end.
        stop: Option<i64>,
        /// Step; must be nonzero.
        step: i64,
    },
}

impl EligibilitySlice {
    /// Indices selected out of a sequence of length `len`.
    pub fn select(&self, len: usize) -> Vec<usize> {
        let n = len as i64;
        match self {
            EligibilitySlice::All => (0..len).collect(),
            EligibilitySlice::First => {
                if len == 0 {
                    vec![]
                } else {
                    vec![0]
                }
            }
            EligibilitySlice::Last => {
                if len == 0 {
                    vec![]
                } else {
                    vec![len - 1]
                }
            }
            EligibilitySlice::Range { start, stop, step } => {
                if *step == 0 || len == 0 {
                    return vec![];
                }
                let clamp = |i: i64| -> i64 {
                    let i = if i < 0 { i + n } else { i };
                    i.clamp(0, n)
                };
                let mut out = Vec::new();
                if *step > 0 {
                    let begin = clamp(*start);
                    let end = stop.map(clamp).unwrap_or(n);
                    let mut i = begin;
                    while i < end {
                        out.push(i as usize);
                        i += step;
                    }
                } else {
                    let begin = {
                        let i = if *start < 0 { start + n } else { *start };
                        i.min(n - 1)
                    };
                    let end = stop.map(|s| if s < 0 { s + n } else { s }).unwrap_or(-1);
                    let mut i = begin;
                    while i > end && i >= 0 {
                        out.push(i as usize);
                        i += step;
                    }
                }
                out
            }
        }
    }
}

impl Serialize for EligibilitySlice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EligibilitySlice::All => serializer.serialize_none(),
            EligibilitySlice::First => serializer.serialize_str("first"),
            EligibilitySlice::Last => serializer.serialize_str("last"),
            EligibilitySlice::Range { start, stop, step } => {
                let triple = (start, stop, step);
                triple.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for EligibilitySlice {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(EligibilitySlice::All),
            Value::String(s) => match s.as_str() {
                "first" => Ok(EligibilitySlice::First),
                "last" => Ok(EligibilitySlice::Last),
                other => Err(D::Error::custom(format!(
                    "unrecognized slice '{other}', expected 'first' or 'last'"
                ))),
            },
            Value::Array(items) if items.len() == 3 => {
                let start = items[0].as_i64().unwrap_or(0);
                let stop = items[1].as_i64();
                let step = items[2].as_i64().unwrap_or(1);
                if step == 0 {
                    return Err(D::Error::custom("slice step must be nonzero"));
                }
                Ok(EligibilitySlice::Range { start, stop, step })
            }
            other => Err(D::Error::custom(format!(
                "unrecognized slice form: {other}"
            ))),
        }
    }
}

/// Which document a T2 computation is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    /// One document per (unit, config, stock).
    Stock,
    /// One document per (unit, config, datapoint), sliced for eligibility.
    Point {
        /// Which datapoints are eligible.
        #[serde(default)]
        slice: EligibilitySlice,
    },
    /// One document per (unit, config, effective compound).
    State,
}

/// One T2 ingest directive of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct T2Directive {
    /// Unit name, resolved through the registry at run time.
    pub unit: String,
    /// Raw run configuration; hashed into the document key.
    #[serde(default)]
    pub config: Value,
    /// Link kind.
    pub link: LinkTarget,
    /// Groups this directive belongs to; group-restricted verdicts only
    /// match directives listing one of their groups.
    #[serde(default)]
    pub group: Vec<i64>,
}

impl T2Directive {
    /// The hashed run-configuration id stored on T2 documents.
    pub fn config_id(&self) -> Digest {
        let canonical = canon_value(&self.config);
        Digest::of_parts(&self.unit, &to_canon_bytes(&canonical))
    }

    /// Whether this directive applies under the given verdict.
    pub fn matches_verdict(&self, verdict: &FilterVerdict) -> bool {
        match verdict {
            FilterVerdict::Reject => false,
            FilterVerdict::Accept => true,
            FilterVerdict::AcceptGroup(g) => self.group.contains(g),
            FilterVerdict::AcceptGroups(gs) => gs.iter().any(|g| self.group.contains(g)),
        }
    }
}
