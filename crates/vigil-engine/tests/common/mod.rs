// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};

use vigil_engine::ChannelContext;
use vigil_engine::t0::AlertProcessor;
use vigil_log::{DbLoggerConfig, RecordIdFactory};
use vigil_model::{AlertContent, PhotoPoint};
use vigil_store::{BufferConfig, BulkUpdateBuffer, MemStore};
use vigil_units::{
    ChannelConfig, FilterUnit, FilterVerdict, JournalUpdateRequest, SessionInfo, T2Payload, T2Unit,
    T3Unit, UnitError, UnitKind, UnitRegistry,
};

/// Accepts everything with the default T2 set.
pub struct AcceptAll;

impl FilterUnit for AcceptAll {
    fn apply(&self, _alert: &AlertContent) -> Result<FilterVerdict, UnitError> {
        Ok(FilterVerdict::Accept)
    }
}

/// Rejects everything.
pub struct RejectAll;

impl FilterUnit for RejectAll {
    fn apply(&self, _alert: &AlertContent) -> Result<FilterVerdict, UnitError> {
        Ok(FilterVerdict::Reject)
    }
}

/// Accepts with a fixed group id.
pub struct GroupFilter(pub i64);

impl FilterUnit for GroupFilter {
    fn apply(&self, _alert: &AlertContent) -> Result<FilterVerdict, UnitError> {
        Ok(FilterVerdict::AcceptGroup(self.0))
    }
}

/// Panics on every alert.
pub struct PanicFilter;

impl FilterUnit for PanicFilter {
    fn apply(&self, _alert: &AlertContent) -> Result<FilterVerdict, UnitError> {
        panic!("synthetic filter failure");
    }
}

/// Returns its configuration as the result.
pub struct EchoUnit(pub Value);

impl T2Unit for EchoUnit {
    fn run(
        &self,
        _payload: &T2Payload,
        _run_config: &Value,
        _deps: &[Value],
    ) -> Result<Value, UnitError> {
        Ok(json!({"echo": self.0}))
    }
}

/// Consumes the latest completed output of `StockEcho` for the same link.
pub struct DependentUnit;

impl T2Unit for DependentUnit {
    fn run(
        &self,
        _payload: &T2Payload,
        _run_config: &Value,
        deps: &[Value],
    ) -> Result<Value, UnitError> {
        let upstream = deps
            .first()
            .ok_or_else(|| UnitError::MissingInput("StockEcho output".to_string()))?;
        Ok(json!({"derived_from": upstream}))
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["StockEcho".to_string()]
    }
}

/// State of a [`Collector`] T3 unit, shared with the test body.
#[derive(Default)]
pub struct CollectorState {
    pub adds: usize,
    pub dones: usize,
    pub views: usize,
    pub sessions: Vec<SessionInfo>,
}

/// Counts chunks and views.
pub struct Collector(pub Arc<Mutex<CollectorState>>);

impl T3Unit for Collector {
    fn add(
        &mut self,
        session: &SessionInfo,
        views: &[vigil_model::TransientView],
    ) -> Result<Vec<JournalUpdateRequest>, UnitError> {
        let mut state = self.0.lock().expect("collector lock poisoned");
        state.adds += 1;
        state.views += views.len();
        state.sessions.push(session.clone());
        Ok(Vec::new())
    }

    fn done(&mut self) -> Result<Vec<JournalUpdateRequest>, UnitError> {
        self.0.lock().expect("collector lock poisoned").dones += 1;
        Ok(Vec::new())
    }
}

/// A registry with every test unit registered.
pub fn test_registry() -> UnitRegistry {
    let mut registry = UnitRegistry::new();
    registry.register_filter("AcceptAll", |_| Ok(Box::new(AcceptAll)));
    registry.register_filter("RejectAll", |_| Ok(Box::new(RejectAll)));
    registry.register_filter("Panicky", |_| Ok(Box::new(PanicFilter)));
    registry.register_filter("Group5", |_| Ok(Box::new(GroupFilter(5))));
    registry.register_t2("UnitA", UnitKind::StateBound, |cfg| {
        Ok(Box::new(EchoUnit(cfg.clone())))
    });
    registry.register_t2("UnitB", UnitKind::StateBound, |cfg| {
        Ok(Box::new(EchoUnit(cfg.clone())))
    });
    registry.register_t2("StockEcho", UnitKind::StockBound, |cfg| {
        Ok(Box::new(EchoUnit(cfg.clone())))
    });
    registry.register_t2("NeedsStockEcho", UnitKind::StockBound, |_| {
        Ok(Box::new(DependentUnit))
    });
    registry
}

/// A channel whose filter is resolved from `registry`, with `UnitA`
/// state-bound as the default T2 set.
pub fn state_channel(registry: &UnitRegistry, name: &str, filter: &str) -> ChannelContext {
    let config: ChannelConfig = serde_json::from_value(json!({
        "name": name,
        "filter": filter,
        "t2": [{"unit": "UnitA", "link": "state", "group": [3, 5]}],
    }))
    .expect("static channel config parses");
    ChannelContext::build(config, registry).expect("test units are registered")
}

/// One measurement.
pub fn point(id: i64, jd: f64, rcid: i32) -> PhotoPoint {
    PhotoPoint {
        id,
        jd,
        rcid,
        body: Map::new(),
    }
}

/// An alert over one stock with the given measurements.
pub fn alert(alert_id: i64, stock: &str, pps: Vec<PhotoPoint>) -> AlertContent {
    AlertContent {
        alert_id,
        stock_id: stock.into(),
        pps,
        uls: Vec::new(),
    }
}

/// Store, buffer and processor wired together over `channels`.
pub fn processor_over(
    store: Arc<MemStore>,
    channels: Vec<ChannelContext>,
) -> (BulkUpdateBuffer, AlertProcessor) {
    let buffer = BulkUpdateBuffer::new(store.clone(), BufferConfig::default());
    let ids = Arc::new(RecordIdFactory::with_host_name(1, "test-host"));
    let processor = AlertProcessor::new(
        store,
        buffer.clone(),
        channels,
        1,
        ids,
        DbLoggerConfig::default(),
    );
    (buffer, processor)
}
