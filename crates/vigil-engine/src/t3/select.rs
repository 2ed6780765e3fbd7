// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transient selection for batch events.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use vigil_model::{ChannelLogic, TimeWindow};

/// Which states of a selected transient are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StateSelect {
    /// The latest state per stock.
    #[default]
    #[serde(rename = "$latest")]
    Latest,
    /// Every existing compound.
    #[serde(rename = "$all")]
    All,
}

/// The selection clause of an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Channel requirement tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<ChannelLogic>,
    /// Window over the stock `created` timestamp.
    #[serde(default, skip_serializing_if = "TimeWindow::is_empty")]
    pub created: TimeWindow,
    /// Window over the stock `modified` timestamp.
    #[serde(default, skip_serializing_if = "TimeWindow::is_empty")]
    pub modified: TimeWindow,
    /// Tags every selected stock must carry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub with_tags: Vec<String>,
    /// Tags no selected stock may carry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub without_tags: Vec<String>,
    /// Expand the configured task into one task per distinct channel
    /// present in the matched stocks.
    #[serde(default, rename = "for_each", skip_serializing_if = "std::ops::Not::not")]
    pub for_each_channel: bool,
}

impl Selection {
    /// Compile to a store predicate over the stock collection.
    ///
    /// `last_run` resolves event-relative time bounds; an unresolvable
    /// bound (the referenced event never ran) drops out of the predicate,
    /// which is the first-run behavior.
    pub fn to_filter(&self, now: i64, last_run: &dyn Fn(&str) -> Option<i64>) -> Value {
        let mut clauses: Vec<Value> = Vec::new();

        if let Some(logic) = &self.channels {
            clauses.push(logic.to_filter());
        }
        push_window(&mut clauses, "created", &self.created, now, last_run);
        push_window(&mut clauses, "modified", &self.modified, now, last_run);
        if !self.with_tags.is_empty() {
            clauses.push(json!({"tags": {"$all": self.with_tags}}));
        }
        if !self.without_tags.is_empty() {
            clauses.push(json!({"tags": {"$nin": self.without_tags}}));
        }

        match clauses.len() {
            0 => json!({}),
            1 => clauses.into_iter().next().expect("one clause"),
            _ => json!({"$and": clauses}),
        }
    }
}

fn push_window(
    clauses: &mut Vec<Value>,
    field: &str,
    window: &TimeWindow,
    now: i64,
    last_run: &dyn Fn(&str) -> Option<i64>,
) {
    if let Some(bound) = window.after.as_ref().and_then(|b| b.resolve(now, last_run)) {
        clauses.push(json!({field: {"$gte": bound}}));
    }
    if let Some(bound) = window.before.as_ref().and_then(|b| b.resolve(now, last_run)) {
        clauses.push(json!({field: {"$lt": bound}}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_model::TimeRef;

    #[test]
    fn test_state_select_wire_form() {
        assert_eq!(
            serde_json::to_value(StateSelect::Latest).unwrap(),
            json!("$latest")
        );
        let s: StateSelect = serde_json::from_value(json!("$all")).unwrap();
        assert_eq!(s, StateSelect::All);
    }

    #[test]
    fn test_empty_selection_matches_all() {
        assert_eq!(Selection::default().to_filter(0, &|_| None), json!({}));
    }

    #[test]
    fn test_full_selection_compiles() {
        let selection = Selection {
            channels: Some(ChannelLogic::any_of(["C1", "C2"])),
            modified: TimeWindow {
                after: Some(TimeRef::TimeDelta {
                    days: -1,
                    hours: 0,
                    minutes: 0,
                    seconds: 0,
                }),
                before: None,
            },
            with_tags: vec!["hot".to_string()],
            without_tags: vec!["junk".to_string()],
            ..Default::default()
        };
        let now = 86_400 * 10;
        let filter = selection.to_filter(now, &|_| None);
        assert_eq!(
            filter,
            json!({"$and": [
                {"channels": {"$in": ["C1", "C2"]}},
                {"modified": {"$gte": 86_400 * 9}},
                {"tags": {"$all": ["hot"]}},
                {"tags": {"$nin": ["junk"]}},
            ]})
        );
    }

    #[test]
    fn test_unresolvable_last_run_bound_drops_out() {
        let selection = Selection {
            modified: TimeWindow {
                after: Some(TimeRef::LastRunOf("nightly".to_string())),
                before: None,
            },
            ..Default::default()
        };
        assert_eq!(selection.to_filter(0, &|_| None), json!({}));
        assert_eq!(
            selection.to_filter(0, &|_| Some(500)),
            json!({"modified": {"$gte": 500}})
        );
    }

    #[test]
    fn test_selection_parses_from_config() {
        let selection: Selection = serde_json::from_value(json!({
            "channels": {"any_of": ["C1", "C2"]},
            "modified": {"after": {"time_delta": {"days": -1}}},
            "for_each": true,
        }))
        .unwrap();
        assert!(selection.for_each_channel);
        assert!(selection.channels.is_some());
    }
}
