// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Time constraints for transient selection.

use serde::{Deserialize, Serialize};

/// One bound of a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRef {
    /// Absolute epoch seconds.
    Timestamp(i64),
    /// Delta relative to now; negative fields point into the past.
    TimeDelta {
        /// Days component.
        #[serde(default)]
        days: i64,
        /// Hours component.
        #[serde(default)]
        hours: i64,
        /// Minutes component.
        #[serde(default)]
        minutes: i64,
        /// Seconds component.
        #[serde(default)]
        seconds: i64,
    },
    /// The completion time of the most recent successful run of the named
    /// event.
    LastRunOf(String),
}

impl TimeRef {
    /// Resolve to epoch seconds.
    ///
    /// `last_run` supplies completion times for [`TimeRef::LastRunOf`];
    /// `None` means the event never ran, in which case the bound is
    /// unresolvable and `None` is returned.
    pub fn resolve(&self, now: i64, last_run: impl Fn(&str) -> Option<i64>) -> Option<i64> {
        match self {
            TimeRef::Timestamp(ts) => Some(*ts),
            TimeRef::TimeDelta {
                days,
                hours,
                minutes,
                seconds,
            } => Some(now + ((days * 24 + hours) * 60 + minutes) * 60 + seconds),
            TimeRef::LastRunOf(event) => last_run(event),
        }
    }
}

/// A window over a document timestamp field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<TimeRef>,
    /// Exclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<TimeRef>,
}

impl TimeWindow {
    /// Whether the window constrains anything.
    pub fn is_empty(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delta_resolution() {
        let delta = TimeRef::TimeDelta {
            days: -1,
            hours: 0,
            minutes: 0,
            seconds: 0,
        };
        assert_eq!(delta.resolve(86_400 * 10, |_| None), Some(86_400 * 9));
    }

    #[test]
    fn test_last_run_resolution() {
        let bound = TimeRef::LastRunOf("nightly_export".to_string());
        assert_eq!(bound.resolve(0, |name| {
            assert_eq!(name, "nightly_export");
            Some(12345)
        }), Some(12345));
        assert_eq!(bound.resolve(0, |_| None), None);
    }

    #[test]
    fn test_serde_shapes() {
        let r: TimeRef = serde_json::from_value(json!({"timestamp": 100})).unwrap();
        assert_eq!(r, TimeRef::Timestamp(100));
        let r: TimeRef = serde_json::from_value(json!({"time_delta": {"days": -1}})).unwrap();
        assert_eq!(
            r.resolve(86_400, |_| None),
            Some(0),
        );
        let r: TimeRef = serde_json::from_value(json!({"last_run_of": "ev"})).unwrap();
        assert!(matches!(r, TimeRef::LastRunOf(_)));
    }
}
