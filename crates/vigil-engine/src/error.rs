// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the tier engines.

use vigil_log::LogError;
use vigil_store::StoreError;
use vigil_units::UnitError;

/// Result type using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that abort a tier loop.
///
/// Faults local to a single alert or document never surface here; they go
/// to the troubles collection and the loop continues. What does surface is
/// anything that would make the pipeline run blind or inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The store failed outside the buffered path.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The logging core refused to record progress.
    #[error(transparent)]
    Log(#[from] LogError),

    /// A unit referenced by configuration cannot be resolved.
    #[error(transparent)]
    Unit(#[from] UnitError),

    /// The bulk buffer signalled an unrecoverable error.
    #[error("run cancelled by the bulk writer")]
    Cancelled,

    /// An event aborted because `raise_exc` was set.
    #[error("task '{task}' failed: {details}")]
    TaskFailed {
        /// The failing task unit.
        task: String,
        /// What happened.
        details: String,
    },

    /// A stored document could not be interpreted.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// A value refused to serialize; indicates a programming error.
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
