// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Channel expression trees and their predicate form.
//!
//! Selection clauses reference channels through `any_of` / `all_of` trees.
//! Because `channels` is stored as an array on the stock document, the
//! compiled predicates use array-containment semantics (`$in` / `$all`)
//! rather than scalar equality.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A tree of channel requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelLogic {
    /// At least one branch must hold.
    #[serde(rename = "any_of")]
    AnyOf(Vec<ChannelLogic>),
    /// Every branch must hold.
    #[serde(rename = "all_of")]
    AllOf(Vec<ChannelLogic>),
    /// A single channel must be present.
    #[serde(untagged)]
    Channel(String),
}

impl ChannelLogic {
    /// Convenience constructor for `any_of` over plain channel names.
    pub fn any_of<I: IntoIterator<Item = S>, S: Into<String>>(names: I) -> Self {
        ChannelLogic::AnyOf(
            names
                .into_iter()
                .map(|n| ChannelLogic::Channel(n.into()))
                .collect(),
        )
    }

    /// Convenience constructor for `all_of` over plain channel names.
    pub fn all_of<I: IntoIterator<Item = S>, S: Into<String>>(names: I) -> Self {
        ChannelLogic::AllOf(
            names
                .into_iter()
                .map(|n| ChannelLogic::Channel(n.into()))
                .collect(),
        )
    }

    /// All channel names mentioned anywhere in the tree.
    pub fn channels(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_channels(&mut out);
        out
    }

    fn collect_channels<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ChannelLogic::Channel(name) => out.push(name),
            ChannelLogic::AnyOf(items) | ChannelLogic::AllOf(items) => {
                for item in items {
                    item.collect_channels(out);
                }
            }
        }
    }

    /// Compile to a store predicate over the stock `channels` array.
    pub fn to_filter(&self) -> Value {
        match self {
            ChannelLogic::Channel(name) => json!({"channels": name}),
            ChannelLogic::AnyOf(items) => {
                if let Some(names) = scalar_names(items) {
                    json!({"channels": {"$in": names}})
                } else {
                    let branches: Vec<Value> = items.iter().map(|i| i.to_filter()).collect();
                    json!({"$or": branches})
                }
            }
            ChannelLogic::AllOf(items) => {
                if let Some(names) = scalar_names(items) {
                    json!({"channels": {"$all": names}})
                } else {
                    let branches: Vec<Value> = items.iter().map(|i| i.to_filter()).collect();
                    json!({"$and": branches})
                }
            }
        }
    }
}

fn scalar_names(items: &[ChannelLogic]) -> Option<Vec<&str>> {
    items
        .iter()
        .map(|i| match i {
            ChannelLogic::Channel(name) => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_shapes() {
        let logic: ChannelLogic = serde_json::from_value(json!("C1")).unwrap();
        assert_eq!(logic, ChannelLogic::Channel("C1".to_string()));

        let logic: ChannelLogic =
            serde_json::from_value(json!({"any_of": ["C1", {"all_of": ["C2", "C3"]}]})).unwrap();
        match &logic {
            ChannelLogic::AnyOf(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_scalar_any_of_compiles_to_in() {
        let filter = ChannelLogic::any_of(["C1", "C2"]).to_filter();
        assert_eq!(filter, json!({"channels": {"$in": ["C1", "C2"]}}));
    }

    #[test]
    fn test_scalar_all_of_compiles_to_all() {
        let filter = ChannelLogic::all_of(["C1", "C2"]).to_filter();
        assert_eq!(filter, json!({"channels": {"$all": ["C1", "C2"]}}));
    }

    #[test]
    fn test_nested_compiles_to_boolean_tree() {
        let logic = ChannelLogic::AnyOf(vec![
            ChannelLogic::Channel("C1".to_string()),
            ChannelLogic::all_of(["C2", "C3"]),
        ]);
        assert_eq!(
            logic.to_filter(),
            json!({"$or": [
                {"channels": "C1"},
                {"channels": {"$all": ["C2", "C3"]}},
            ]})
        );
    }

    #[test]
    fn test_channels_enumeration() {
        let logic = ChannelLogic::AnyOf(vec![
            ChannelLogic::Channel("C1".to_string()),
            ChannelLogic::all_of(["C2", "C3"]),
        ]);
        assert_eq!(logic.channels(), vec!["C1", "C2", "C3"]);
    }
}
