// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vigil Log - the database logging core
//!
//! Process diagnostics go through `tracing`; this crate is the *domain*
//! logging layer that records pipeline activity inside the store:
//!
//! - [`RecordIdFactory`]: 12-byte time-prefixed record ids, so log queries
//!   by time range can use the id index alone;
//! - [`DbLogger`]: aggregates similar records within a configurable
//!   interval, writes them in bulk, and resolves duplicate-id races by
//!   run-id comparison;
//! - [`RejectedLogs`]: per-channel handlers keeping rejected-alert records
//!   out of the primary logs collection.
//!
//! A store that refuses log writes is a process-fatal condition: the
//! pipeline does not run blind.

#![deny(missing_docs)]

/// Error types.
pub mod error;

/// Record-id minting.
pub mod ident;

/// The aggregating database logger.
pub mod logger;

/// Rejected-alert log routing.
pub mod rejected;

pub use error::LogError;
pub use ident::{RecordId, RecordIdFactory};
pub use logger::{DbLogger, DbLoggerConfig, LogLevel};
pub use rejected::{RejectedDest, RejectedLogs};
