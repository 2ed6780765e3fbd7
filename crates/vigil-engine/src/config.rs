// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::sync::Arc;
use std::time::Duration;

use vigil_store::{DocStore, MemStore, SqliteStore, StoreError};

/// How the pipeline was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    /// Fired by the scheduler.
    ScheduledRun,
    /// Started by an operator.
    ManualRun,
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store connection URI (`mem:` or `sqlite:<path>`).
    pub store_uri: String,
    /// Optional long-term archive URI, handed to suppliers.
    pub archive_uri: Option<String>,
    /// Run type stamped onto event documents.
    pub run_type: RunType,
    /// Merge window of the database logger.
    pub log_aggregation: Duration,
    /// Bulk-buffer push interval.
    pub push_interval: Duration,
    /// Bulk-buffer autopush threshold.
    pub autopush_size: usize,
    /// Bulk-buffer worker count.
    pub workers: usize,
    /// T2 controller poll interval.
    pub t2_poll_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `VIGIL_STORE_URI`: `mem:` or `sqlite:<path>`
    ///
    /// Optional (with defaults):
    /// - `VIGIL_ARCHIVE_URI`: archive connection string
    /// - `VIGIL_RUN_TYPE`: `scheduled` (default) or `manual`
    /// - `VIGIL_LOG_AGGREGATION_MS`: log merge window (default: 1000)
    /// - `VIGIL_PUSH_INTERVAL_MS`: buffer push interval (default: 10000)
    /// - `VIGIL_AUTOPUSH_SIZE`: buffer autopush threshold (default: 100)
    /// - `VIGIL_BULK_WORKERS`: buffer worker count (default: 8)
    /// - `VIGIL_T2_POLL_MS`: T2 poll interval (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_uri =
            std::env::var("VIGIL_STORE_URI").map_err(|_| ConfigError::Missing("VIGIL_STORE_URI"))?;

        let archive_uri = std::env::var("VIGIL_ARCHIVE_URI").ok();

        let run_type = match std::env::var("VIGIL_RUN_TYPE")
            .unwrap_or_else(|_| "scheduled".to_string())
            .as_str()
        {
            "scheduled" => RunType::ScheduledRun,
            "manual" => RunType::ManualRun,
            _ => {
                return Err(ConfigError::Invalid(
                    "VIGIL_RUN_TYPE",
                    "must be 'scheduled' or 'manual'",
                ));
            }
        };

        Ok(Self {
            store_uri,
            archive_uri,
            run_type,
            log_aggregation: millis_var("VIGIL_LOG_AGGREGATION_MS", 1000)?,
            push_interval: millis_var("VIGIL_PUSH_INTERVAL_MS", 10_000)?,
            autopush_size: int_var("VIGIL_AUTOPUSH_SIZE", 100)? as usize,
            workers: int_var("VIGIL_BULK_WORKERS", 8)? as usize,
            t2_poll_interval: millis_var("VIGIL_T2_POLL_MS", 5000)?,
        })
    }

    /// Open the store named by `store_uri`.
    pub async fn open_store(&self) -> Result<Arc<dyn DocStore>, StoreError> {
        if self.store_uri == "mem:" {
            return Ok(Arc::new(MemStore::new()));
        }
        if let Some(path) = self.store_uri.strip_prefix("sqlite:") {
            return Ok(Arc::new(SqliteStore::from_path(path).await?));
        }
        Err(StoreError::backend(
            "open_store",
            format!("unsupported store uri '{}'", self.store_uri),
        ))
    }
}

fn int_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(name, "must be a non-negative integer")),
    }
}

fn millis_var(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(int_var(name, default)?))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
