// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for unit execution and resolution.

/// Errors surfaced by units and the registry.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// The unit ran and reported a failure.
    #[error("unit failed: {0}")]
    Failed(String),

    /// The unit cannot run against the given payload.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// No unit of the requested name is registered.
    #[error("unknown unit: '{0}'")]
    Unknown(String),

    /// The unit rejected its configuration.
    #[error("invalid config for '{unit}': {details}")]
    InvalidConfig {
        /// Unit name.
        unit: String,
        /// What was wrong.
        details: String,
    },
}
