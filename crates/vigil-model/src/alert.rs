// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Alert content as consumed by the T0 processor.
//!
//! The wire format and its deserialization live with the supplier; the
//! pipeline only sees this shaped record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stock::StockId;

/// One observation of a stock.
///
/// Upper limits (non-detections) carry a negative id; the remaining fields
/// are instrument-defined and preserved verbatim in `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoPoint {
    /// Instrument-assigned numeric id; negative for upper limits.
    #[serde(rename = "_id")]
    pub id: i64,
    /// Observation time (julian date).
    pub jd: f64,
    /// Sub-detector the observation came from.
    pub rcid: i32,
    /// Instrument-defined fields.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl PhotoPoint {
    /// Whether this point is an upper limit rather than a measurement.
    pub fn is_upper_limit(&self) -> bool {
        self.id < 0
    }
}

/// The abstract alert record handed to the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertContent {
    /// Supplier-assigned alert identifier.
    pub alert_id: i64,
    /// The transient this alert belongs to.
    pub stock_id: StockId,
    /// Measurements, ordered by the supplier.
    #[serde(default)]
    pub pps: Vec<PhotoPoint>,
    /// Upper limits, ordered by the supplier.
    #[serde(default)]
    pub uls: Vec<PhotoPoint>,
}

impl AlertContent {
    /// All photo points, measurements then upper limits, sorted by
    /// observation time ascending.
    ///
    /// The blueprint builder never sorts; callers pass the result of this
    /// method when a timely order is required.
    pub fn points_time_ordered(&self) -> Vec<&PhotoPoint> {
        let mut points: Vec<&PhotoPoint> = self.pps.iter().chain(self.uls.iter()).collect();
        points.sort_by(|a, b| {
            a.jd.partial_cmp(&b.jd)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        points
    }

    /// The most recent observation time across all points.
    pub fn latest_jd(&self) -> Option<f64> {
        self.pps
            .iter()
            .chain(self.uls.iter())
            .map(|p| p.jd)
            .fold(None, |acc, jd| match acc {
                Some(m) if m >= jd => Some(m),
                _ => Some(jd),
            })
    }
}
