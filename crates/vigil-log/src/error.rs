// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the logging core.

use vigil_store::StoreError;

/// Errors surfaced by log handlers.
///
/// Any variant reaching a producer loop aborts it: faults affecting the
/// pipeline's ability to record its own progress are never absorbed.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The store rejected log writes.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A duplicate log id was written by a different run.
    #[error("log record '{record_id}' already written by run {other_run}")]
    ForeignDuplicate {
        /// The contested record id.
        record_id: String,
        /// The run id found on the stored record.
        other_run: i64,
    },
}
