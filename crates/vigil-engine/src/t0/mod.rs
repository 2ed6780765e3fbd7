// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! T0: alert processing.

/// The ingester.
pub mod ingest;

/// The alert processor.
pub mod processor;

pub use ingest::{Ingester, OpsByCollection};
pub use processor::{AlertProcessor, ProcessorStats};
