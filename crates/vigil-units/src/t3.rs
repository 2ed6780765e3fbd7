// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! T3-unit interface.

use serde_json::{Map, Value};

use vigil_model::{StockId, TransientView};

use crate::error::UnitError;

/// Session context handed to every task unit before the first chunk.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    /// Name of the running event.
    pub event: String,
    /// Completion time of the most recent successful prior run, epoch
    /// seconds; absent on first run.
    pub last_run: Option<i64>,
    /// Alerts observed since the last run.
    pub processed_alerts: Option<i64>,
    /// Operator message, when one was attached to the event.
    pub admin_msg: Option<String>,
}

/// A journal update requested by a task unit.
#[derive(Debug, Clone)]
pub struct JournalUpdateRequest {
    /// Stocks to annotate.
    pub stocks: Vec<StockId>,
    /// Resilient mode: issue as an upserting write and verify the
    /// modified count.
    pub ext: bool,
    /// Entry payload merged into the journal entry.
    pub content: Map<String, Value>,
}

/// One batch task of a T3 event.
///
/// `add` is called once per chunk of transient views as they stream in;
/// `done` exactly once afterwards. Both may request journal updates.
pub trait T3Unit: Send {
    /// Consume one chunk.
    fn add(
        &mut self,
        session: &SessionInfo,
        views: &[TransientView],
    ) -> Result<Vec<JournalUpdateRequest>, UnitError>;

    /// Finish the session.
    fn done(&mut self) -> Result<Vec<JournalUpdateRequest>, UnitError>;
}
