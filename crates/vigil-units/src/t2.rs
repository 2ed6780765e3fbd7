// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! T2-unit interface.

use serde_json::{Map, Value};

use vigil_model::LightCurve;

use crate::error::UnitError;

/// The reconstructed input of a T2 run, by link kind.
#[derive(Debug, Clone)]
pub enum T2Payload {
    /// State-bound: the lightcurve of the linked compound.
    State(LightCurve),
    /// Point-bound: the raw photo point document.
    Point(Value),
    /// Stock-bound: the stock document.
    Stock(Value),
}

/// One queued computation.
///
/// Unit code is CPU-bound and runs on the claiming worker with a resolved,
/// deep-copied run configuration.
pub trait T2Unit: Send + Sync {
    /// Run against the reconstructed payload.
    ///
    /// `deps` carries the latest completed outputs of the units named by
    /// [`dependencies`](Self::dependencies), in the same order.
    fn run(&self, payload: &T2Payload, run_config: &Value, deps: &[Value])
    -> Result<Value, UnitError>;

    /// Unit names whose completed results this unit consumes.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Version stamps recorded with every result.
    fn versions(&self) -> Map<String, Value> {
        Map::new()
    }
}
