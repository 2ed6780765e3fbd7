// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Collection names used by the pipeline.

/// Stock documents, one per transient.
pub const STOCK: &str = "stock";

/// Photo points (datapoints and upper limits).
pub const T0: &str = "t0";

/// Compounds.
pub const T1: &str = "t1";

/// Queued per-state computations.
pub const T2: &str = "t2";

/// Process-wide counters.
pub const COUNTER: &str = "counter";

/// Aggregated log records.
pub const LOGS: &str = "logs";

/// Event documents, one per scheduled run of a named process.
pub const EVENTS: &str = "events";

/// Diagnostic documents for non-fatal errors.
pub const TROUBLES: &str = "troubles";

/// Store account roles managed by the CLI.
pub const ACCOUNTS: &str = "accounts";

/// Shared rejected-alert log collection, when channels are not segregated.
pub const REJECTED_SHARED: &str = "rejected";

/// Per-channel rejected-alert log collection.
pub fn rejected(channel: &str) -> String {
    format!("rejected_{channel}")
}

/// The collection set created by `vigil init`.
pub fn all_fixed() -> [&'static str; 9] {
    [
        STOCK,
        T0,
        T1,
        T2,
        COUNTER,
        LOGS,
        EVENTS,
        TROUBLES,
        ACCOUNTS,
    ]
}
