// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for store operations.

/// Result type using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by store backends.
///
/// Per-operation bulk failures (duplicate keys included) are not errors at
/// this level; they are reported through
/// [`BulkSummary::errors`](crate::ops::BulkSummary).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or failed the request as a whole.
    #[error("store backend error during '{operation}': {details}")]
    Backend {
        /// The operation that failed.
        operation: String,
        /// Backend-reported details.
        details: String,
    },

    /// A stored document could not be interpreted.
    #[error("malformed document in '{collection}': {details}")]
    Malformed {
        /// Collection the document came from.
        collection: String,
        /// What was wrong.
        details: String,
    },

    /// A collection name outside the allowed character set.
    #[error("invalid collection name: '{0}'")]
    InvalidCollection(String),
}

impl StoreError {
    /// Shorthand for backend errors.
    pub fn backend(operation: &str, details: impl std::fmt::Display) -> Self {
        StoreError::Backend {
            operation: operation.to_string(),
            details: details.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
