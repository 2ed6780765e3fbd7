// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vigil Units - the plugin surface of the pipeline
//!
//! Filter, compute and batch units are referenced by name in channel and
//! event configuration and resolved through an explicit [`UnitRegistry`]
//! populated at program start; there is no dynamic class loading.
//!
//! - [`FilterUnit`]: `apply(alert) -> verdict` (T0);
//! - [`T2Unit`]: `run(payload, run_config) -> result` (T2);
//! - [`T3Unit`]: `add(session, views)` repeatedly, then `done()` (T3);
//! - [`T2Directive`]: which T2 documents an accepting channel requests,
//!   with link kinds, eligibility slices and group gating;
//! - [`ChannelConfig`]: one configured analysis stream.

#![deny(missing_docs)]

/// Channel configuration.
pub mod channel;

/// T2 ingest directives and eligibility slices.
pub mod directive;

/// Error types.
pub mod error;

/// Filter-unit interface.
pub mod filter;

/// The unit registry.
pub mod registry;

/// T2-unit interface.
pub mod t2;

/// T3-unit interface.
pub mod t3;

pub use channel::{AutoComplete, ChannelConfig};
pub use directive::{EligibilitySlice, LinkTarget, T2Directive};
pub use error::UnitError;
pub use filter::{FilterUnit, FilterVerdict};
pub use registry::{UnitKind, UnitRegistry};
pub use t2::{T2Payload, T2Unit};
pub use t3::{JournalUpdateRequest, SessionInfo, T3Unit};
