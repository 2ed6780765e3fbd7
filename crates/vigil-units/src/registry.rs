// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The unit registry.
//!
//! Units are referenced by name in configuration and resolved here. The
//! registry is populated explicitly at program start; registering a name
//! twice replaces the earlier entry (latest wins, like any configuration
//! override).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use vigil_model::ChannelPolicy;

use crate::error::UnitError;
use crate::filter::FilterUnit;
use crate::t2::T2Unit;
use crate::t3::T3Unit;

/// What a registered unit is, replacing source-side class hierarchy
/// inspection with an explicit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// T0 alert filter.
    Filter,
    /// T2 unit bound to stock documents.
    StockBound,
    /// T2 unit bound to photo points.
    PointBound,
    /// T2 unit bound to compound states.
    StateBound,
    /// T2 unit bound to states it assembles itself.
    CustomStateBound,
    /// T3 batch unit.
    Review,
}

type FilterCtor = Arc<dyn Fn(&Value) -> Result<Box<dyn FilterUnit>, UnitError> + Send + Sync>;
type T2Ctor = Arc<dyn Fn(&Value) -> Result<Box<dyn T2Unit>, UnitError> + Send + Sync>;
type T3Ctor = Arc<dyn Fn(&Value) -> Result<Box<dyn T3Unit>, UnitError> + Send + Sync>;

/// Name-to-constructor registry for every unit kind.
#[derive(Default)]
pub struct UnitRegistry {
    filters: HashMap<String, FilterCtor>,
    t2: HashMap<String, (UnitKind, T2Ctor)>,
    t3: HashMap<String, T3Ctor>,
    policies: HashMap<String, Arc<dyn ChannelPolicy>>,
}

impl UnitRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter unit.
    pub fn register_filter<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&Value) -> Result<Box<dyn FilterUnit>, UnitError> + Send + Sync + 'static,
    {
        self.filters.insert(name.to_string(), Arc::new(ctor));
    }

    /// Register a T2 unit with its kind.
    pub fn register_t2<F>(&mut self, name: &str, kind: UnitKind, ctor: F)
    where
        F: Fn(&Value) -> Result<Box<dyn T2Unit>, UnitError> + Send + Sync + 'static,
    {
        self.t2.insert(name.to_string(), (kind, Arc::new(ctor)));
    }

    /// Register a T3 unit.
    pub fn register_t3<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&Value) -> Result<Box<dyn T3Unit>, UnitError> + Send + Sync + 'static,
    {
        self.t3.insert(name.to_string(), Arc::new(ctor));
    }

    /// Register a compound policy.
    pub fn register_policy(&mut self, name: &str, policy: Arc<dyn ChannelPolicy>) {
        self.policies.insert(name.to_string(), policy);
    }

    /// Instantiate a filter unit.
    pub fn new_filter(&self, name: &str, config: &Value) -> Result<Box<dyn FilterUnit>, UnitError> {
        let ctor = self
            .filters
            .get(name)
            .ok_or_else(|| UnitError::Unknown(name.to_string()))?;
        ctor(config)
    }

    /// Instantiate a T2 unit, returning its kind alongside.
    pub fn new_t2(
        &self,
        name: &str,
        config: &Value,
    ) -> Result<(UnitKind, Box<dyn T2Unit>), UnitError> {
        let (kind, ctor) = self
            .t2
            .get(name)
            .ok_or_else(|| UnitError::Unknown(name.to_string()))?;
        Ok((*kind, ctor(config)?))
    }

    /// Instantiate a T3 unit.
    pub fn new_t3(&self, name: &str, config: &Value) -> Result<Box<dyn T3Unit>, UnitError> {
        let ctor = self
            .t3
            .get(name)
            .ok_or_else(|| UnitError::Unknown(name.to_string()))?;
        ctor(config)
    }

    /// The compound policy registered under `name`.
    pub fn policy(&self, name: &str) -> Result<Arc<dyn ChannelPolicy>, UnitError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| UnitError::Unknown(name.to_string()))
    }

    /// The kind of a registered T2 unit.
    pub fn t2_kind(&self, name: &str) -> Option<UnitKind> {
        self.t2.get(name).map(|(kind, _)| *kind)
    }

    /// Names of all registered T2 units.
    pub fn t2_names(&self) -> Vec<String> {
        self.t2.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterVerdict;
    use crate::t2::T2Payload;
    use serde_json::{Map, json};
    use vigil_model::AlertContent;

    struct AcceptAll;

    impl FilterUnit for AcceptAll {
        fn apply(&self, _alert: &AlertContent) -> Result<FilterVerdict, UnitError> {
            Ok(FilterVerdict::Accept)
        }
    }

    struct Echo(Value);

    impl T2Unit for Echo {
        fn run(
            &self,
            _payload: &T2Payload,
            _run_config: &Value,
            _deps: &[Value],
        ) -> Result<Value, UnitError> {
            Ok(self.0.clone())
        }

        fn versions(&self) -> Map<String, Value> {
            let mut m = Map::new();
            m.insert("echo".to_string(), json!("1.0"));
            m
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = UnitRegistry::new();
        registry.register_filter("AcceptAll", |_cfg| Ok(Box::new(AcceptAll)));
        registry.register_t2("Echo", UnitKind::StateBound, |cfg| {
            Ok(Box::new(Echo(cfg.clone())))
        });

        assert!(registry.new_filter("AcceptAll", &Value::Null).is_ok());
        let (kind, unit) = registry.new_t2("Echo", &json!({"x": 1})).unwrap();
        assert_eq!(kind, UnitKind::StateBound);
        let out = unit
            .run(&T2Payload::Stock(Value::Null), &Value::Null, &[])
            .unwrap();
        assert_eq!(out["x"], json!(1));
        assert_eq!(registry.t2_kind("Echo"), Some(UnitKind::StateBound));
    }

    #[test]
    fn test_unknown_names_error() {
        let registry = UnitRegistry::new();
        assert!(matches!(
            registry.new_filter("Nope", &Value::Null),
            Err(UnitError::Unknown(_))
        ));
        assert!(matches!(
            registry.new_t2("Nope", &Value::Null),
            Err(UnitError::Unknown(_))
        ));
        assert!(matches!(
            registry.new_t3("Nope", &Value::Null),
            Err(UnitError::Unknown(_))
        ));
        assert!(registry.policy("Nope").is_err());
    }
}
