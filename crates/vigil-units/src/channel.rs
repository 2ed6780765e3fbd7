// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Channel configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::directive::T2Directive;

/// Auto-complete behavior of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoComplete {
    /// No auto-complete.
    #[default]
    Off,
    /// Rejected alerts for known stocks are accepted with the channel's
    /// default T2 set and marked as auto-completed.
    Live,
    /// Rejected stock ids are recorded so the next batch event over the
    /// channel can top up.
    Next,
}

/// One configured analysis stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name; also the rejected-log collection suffix.
    pub name: String,
    /// Filter unit name.
    pub filter: String,
    /// Filter unit configuration.
    #[serde(default)]
    pub filter_config: Value,
    /// Auto-complete mode.
    #[serde(default)]
    pub auto_complete: AutoComplete,
    /// Tags contributed to this channel's compounds.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Name of the compound policy; absent means identity.
    #[serde(default)]
    pub policy: Option<String>,
    /// T2 ingest directives; the full set is the channel's default T2 set.
    #[serde(default)]
    pub t2: Vec<T2Directive>,
    /// Route rejections into the shared collection instead of a
    /// per-channel one.
    #[serde(default)]
    pub shared_rejected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_config_parses() {
        let cfg: ChannelConfig = serde_json::from_value(json!({
            "name": "C1",
            "filter": "BrightFilter",
        }))
        .unwrap();
        assert_eq!(cfg.auto_complete, AutoComplete::Off);
        assert!(cfg.t2.is_empty());
        assert!(!cfg.shared_rejected);
    }

    #[test]
    fn test_full_config_parses() {
        let cfg: ChannelConfig = serde_json::from_value(json!({
            "name": "C1",
            "filter": "BrightFilter",
            "filter_config": {"min_mag": 19.5},
            "auto_complete": "live",
            "tags": ["ZTF"],
            "policy": "drop_flagged",
            "t2": [
                {"unit": "UnitA", "link": "state", "group": [3, 5]},
                {"unit": "UnitB", "link": {"point": {"slice": "last"}}},
            ],
        }))
        .unwrap();
        assert_eq!(cfg.auto_complete, AutoComplete::Live);
        assert_eq!(cfg.t2.len(), 2);
        assert_eq!(cfg.t2[0].group, vec![3, 5]);
    }
}
