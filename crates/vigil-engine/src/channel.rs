// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime channel assembly.

use std::sync::Arc;

use vigil_model::{ChannelPolicy, ChannelView, IdentityPolicy};
use vigil_units::{ChannelConfig, FilterUnit, UnitError, UnitRegistry};

/// A channel with its units resolved, ready to run.
pub struct ChannelContext {
    /// The channel's configuration.
    pub config: ChannelConfig,
    /// Resolved filter unit.
    pub filter: Box<dyn FilterUnit>,
    /// Resolved compound policy.
    pub policy: Arc<dyn ChannelPolicy>,
}

impl ChannelContext {
    /// Resolve a channel configuration against the registry.
    pub fn build(config: ChannelConfig, registry: &UnitRegistry) -> Result<Self, UnitError> {
        let filter = registry.new_filter(&config.filter, &config.filter_config)?;
        let policy: Arc<dyn ChannelPolicy> = match &config.policy {
            Some(name) => registry.policy(name)?,
            None => Arc::new(IdentityPolicy),
        };
        Ok(Self {
            config,
            filter,
            policy,
        })
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Borrow as a blueprint input.
    pub fn view(&self) -> ChannelView<'_> {
        ChannelView {
            name: &self.config.name,
            policy: self.policy.as_ref(),
            tags: &self.config.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vigil_model::AlertContent;
    use vigil_units::FilterVerdict;

    struct AcceptAll;

    impl FilterUnit for AcceptAll {
        fn apply(&self, _alert: &AlertContent) -> Result<FilterVerdict, UnitError> {
            Ok(FilterVerdict::Accept)
        }
    }

    #[test]
    fn test_build_resolves_filter_and_default_policy() {
        let mut registry = UnitRegistry::new();
        registry.register_filter("AcceptAll", |_| Ok(Box::new(AcceptAll)));
        let config: ChannelConfig =
            serde_json::from_value(json!({"name": "C1", "filter": "AcceptAll"})).unwrap();
        let ctx = ChannelContext::build(config, &registry).unwrap();
        assert_eq!(ctx.name(), "C1");
        assert_eq!(ctx.view().name, "C1");
    }

    #[test]
    fn test_build_fails_on_unknown_filter() {
        let registry = UnitRegistry::new();
        let config: ChannelConfig =
            serde_json::from_value(json!({"name": "C1", "filter": "Nope"})).unwrap();
        assert!(matches!(
            ChannelContext::build(config, &registry),
            Err(UnitError::Unknown(_))
        ));
    }
}
