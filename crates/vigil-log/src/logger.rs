// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The aggregating database logger.
//!
//! Two consecutive emissions with identical `(level, extra)` within the
//! aggregation interval merge into one record whose `msg` becomes an
//! ordered list. The buffer flushes on overflow and on demand; records are
//! written in bulk with the same duplicate-key discipline as everything
//! else, except that a duplicate written by *this* run is silently
//! accepted while a foreign run id aborts the producer.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use vigil_store::{DocStore, OpErrorClass, TroubleWriter, WriteOp, cols};

use crate::error::LogError;
use crate::ident::RecordIdFactory;

/// Severity of a database log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic chatter.
    Debug,
    /// Normal progress.
    Info,
    /// Unexpected but handled.
    Warn,
    /// Faults.
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Logger tuning knobs.
#[derive(Debug, Clone)]
pub struct DbLoggerConfig {
    /// Merge window for consecutive identical emissions.
    pub aggregate_interval: Duration,
    /// Flush when this many records are buffered.
    pub flush_len: usize,
}

impl Default for DbLoggerConfig {
    fn default() -> Self {
        Self {
            aggregate_interval: Duration::from_secs(1),
            flush_len: 1000,
        }
    }
}

struct BufferedRecord {
    id: String,
    level: LogLevel,
    extra: Map<String, Value>,
    msgs: Vec<String>,
    emitted: Instant,
}

struct LoggerState {
    buffer: Vec<BufferedRecord>,
}

/// The store-backed logger of one tier instance.
///
/// Reserved `extra` keys `stock`, `channel` and `alert_id` are lifted onto
/// the record; everything else nests under `extra`.
pub struct DbLogger {
    store: Arc<dyn DocStore>,
    name: String,
    run_id: i64,
    ids: Arc<RecordIdFactory>,
    config: DbLoggerConfig,
    troubles: TroubleWriter,
    state: Mutex<LoggerState>,
}

impl DbLogger {
    /// A logger named after its tier component, stamped with `run_id`.
    pub fn new(
        store: Arc<dyn DocStore>,
        name: &str,
        run_id: i64,
        ids: Arc<RecordIdFactory>,
        config: DbLoggerConfig,
    ) -> Self {
        let troubles = TroubleWriter::new(store.clone());
        Self {
            store,
            name: name.to_string(),
            run_id,
            ids,
            config,
            troubles,
            state: Mutex::new(LoggerState { buffer: Vec::new() }),
        }
    }

    /// The run id stamped onto every record.
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Buffered record count.
    pub fn buffered(&self) -> usize {
        self.state.lock().expect("logger lock poisoned").buffer.len()
    }

    /// Emit one record; flushes when the buffer overflows.
    pub async fn log(
        &self,
        level: LogLevel,
        msg: &str,
        extra: Map<String, Value>,
    ) -> Result<(), LogError> {
        let overflow = {
            let mut state = self.state.lock().expect("logger lock poisoned");
            let now = Instant::now();

            let merged = match state.buffer.last_mut() {
                Some(last)
                    if last.level == level
                        && last.extra == extra
                        && now.duration_since(last.emitted) < self.config.aggregate_interval =>
                {
                    last.msgs.push(msg.to_string());
                    last.emitted = now;
                    true
                }
                _ => false,
            };

            if !merged {
                // The creation second lives in the id prefix.
                let id = self.ids.mint(Utc::now().timestamp() as u32).to_hex();
                state.buffer.push(BufferedRecord {
                    id,
                    level,
                    extra,
                    msgs: vec![msg.to_string()],
                    emitted: now,
                });
            }
            state.buffer.len() >= self.config.flush_len
        };

        if overflow {
            self.flush().await?;
        }
        Ok(())
    }

    /// Shorthand for [`LogLevel::Info`] with no extra.
    pub async fn info(&self, msg: &str) -> Result<(), LogError> {
        self.log(LogLevel::Info, msg, Map::new()).await
    }

    /// Write out all buffered records.
    pub async fn flush(&self) -> Result<(), LogError> {
        let records = {
            let mut state = self.state.lock().expect("logger lock poisoned");
            std::mem::take(&mut state.buffer)
        };
        if records.is_empty() {
            return Ok(());
        }
        debug!(count = records.len(), name = %self.name, "Flushing log records");

        let ops: Vec<WriteOp> = records
            .iter()
            .map(|rec| WriteOp::insert_one(self.to_doc(rec)))
            .collect();

        let summary = self.store.bulk_write(cols::LOGS, ops).await?;

        for err in summary.errors {
            match err.class {
                OpErrorClass::DuplicateKey => {
                    let record_id = match &err.op {
                        WriteOp::InsertOne { document } => document
                            .get("_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        _ => String::new(),
                    };
                    let stored = self
                        .store
                        .find_one(cols::LOGS, &json!({"_id": record_id}))
                        .await?;
                    let other_run = stored
                        .as_ref()
                        .and_then(|d| d.get("run_id"))
                        .and_then(Value::as_i64)
                        .unwrap_or(-1);
                    if other_run == self.run_id {
                        // Same run re-wrote its own record: same entry.
                        continue;
                    }
                    self.troubles
                        .report(
                            -1,
                            "db_logger",
                            "log id collision with foreign run",
                            json!({"record_id": record_id, "other_run": other_run}),
                        )
                        .await;
                    return Err(LogError::ForeignDuplicate {
                        record_id,
                        other_run,
                    });
                }
                OpErrorClass::Other => {
                    self.troubles
                        .report(-1, "db_logger", &err.message, json!({}))
                        .await;
                    return Err(LogError::Store(vigil_store::StoreError::Backend {
                        operation: "log_write".to_string(),
                        details: err.message,
                    }));
                }
            }
        }
        Ok(())
    }

    fn to_doc(&self, rec: &BufferedRecord) -> Value {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), Value::from(rec.id.clone()));
        doc.insert("run_id".to_string(), Value::from(self.run_id));
        doc.insert(
            "flags".to_string(),
            json!([rec.level.as_str(), self.name]),
        );
        let mut extra = Map::new();
        for (key, value) in &rec.extra {
            match key.as_str() {
                // Reserved keys live on the record itself.
                "stock" | "channel" | "alert_id" => {
                    doc.insert(key.clone(), value.clone());
                }
                _ => {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }
        if !extra.is_empty() {
            doc.insert("extra".to_string(), Value::Object(extra));
        }
        if rec.msgs.len() == 1 {
            doc.insert("msg".to_string(), Value::from(rec.msgs[0].clone()));
        } else {
            doc.insert("msgs".to_string(), json!(rec.msgs));
        }
        Value::Object(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_store::MemStore;

    fn logger_on(store: Arc<MemStore>, config: DbLoggerConfig) -> DbLogger {
        let ids = Arc::new(RecordIdFactory::with_host_name(7, "test-host"));
        DbLogger::new(store, "t0_processor", 7, ids, config)
    }

    #[tokio::test]
    async fn test_consecutive_identical_emissions_merge() {
        let store = Arc::new(MemStore::new());
        let logger = logger_on(store.clone(), DbLoggerConfig::default());

        let mut extra = Map::new();
        extra.insert("channel".to_string(), json!("C1"));
        logger
            .log(LogLevel::Info, "accepted", extra.clone())
            .await
            .unwrap();
        logger
            .log(LogLevel::Info, "ingested", extra.clone())
            .await
            .unwrap();
        assert_eq!(logger.buffered(), 1);

        logger.flush().await.unwrap();
        let docs = store.find(cols::LOGS, &json!({})).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["msgs"], json!(["accepted", "ingested"]));
        assert_eq!(docs[0]["channel"], json!("C1"));
        assert_eq!(docs[0]["run_id"], json!(7));
    }

    #[tokio::test]
    async fn test_differing_extra_does_not_merge() {
        let store = Arc::new(MemStore::new());
        let logger = logger_on(store.clone(), DbLoggerConfig::default());

        let mut extra = Map::new();
        extra.insert("channel".to_string(), json!("C1"));
        logger.log(LogLevel::Info, "a", extra).await.unwrap();
        let mut extra = Map::new();
        extra.insert("channel".to_string(), json!("C2"));
        logger.log(LogLevel::Info, "b", extra).await.unwrap();
        assert_eq!(logger.buffered(), 2);
    }

    #[tokio::test]
    async fn test_level_change_does_not_merge() {
        let store = Arc::new(MemStore::new());
        let logger = logger_on(store.clone(), DbLoggerConfig::default());
        logger.log(LogLevel::Info, "a", Map::new()).await.unwrap();
        logger.log(LogLevel::Warn, "b", Map::new()).await.unwrap();
        assert_eq!(logger.buffered(), 2);
    }

    #[tokio::test]
    async fn test_overflow_flushes() {
        let store = Arc::new(MemStore::new());
        let logger = logger_on(
            store.clone(),
            DbLoggerConfig {
                flush_len: 2,
                aggregate_interval: Duration::from_secs(0),
            },
        );
        logger.log(LogLevel::Info, "a", Map::new()).await.unwrap();
        logger.log(LogLevel::Info, "b", Map::new()).await.unwrap();
        assert_eq!(logger.buffered(), 0);
        assert_eq!(store.count(cols::LOGS, &json!({})).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_own_run_duplicate_is_accepted() {
        let store = Arc::new(MemStore::new());
        let ids = Arc::new(RecordIdFactory::with_host_name(7, "test-host"));
        let logger = DbLogger::new(
            store.clone(),
            "t0_processor",
            7,
            ids.clone(),
            DbLoggerConfig::default(),
        );

        // Pre-write the exact ids the logger may mint next, same run id;
        // cover both sides of a possible second boundary.
        let ts = Utc::now().timestamp() as u32;
        for second in [ts, ts + 1] {
            let preminted = RecordIdFactory::with_host_name(7, "test-host");
            let clash = preminted.mint(second).to_hex();
            store
                .bulk_write(
                    cols::LOGS,
                    vec![WriteOp::insert_one(json!({"_id": clash, "run_id": 7}))],
                )
                .await
                .unwrap();
        }

        logger.log(LogLevel::Info, "same run", Map::new()).await.unwrap();
        logger.flush().await.expect("own-run duplicate must be benign");
    }

    #[tokio::test]
    async fn test_foreign_run_duplicate_aborts() {
        let store = Arc::new(MemStore::new());
        let ids = Arc::new(RecordIdFactory::with_host_name(7, "test-host"));
        let logger = DbLogger::new(
            store.clone(),
            "t0_processor",
            7,
            ids,
            DbLoggerConfig::default(),
        );

        // Cover both sides of a possible second boundary.
        let ts = Utc::now().timestamp() as u32;
        for (i, second) in [ts, ts + 1].into_iter().enumerate() {
            let preminted = RecordIdFactory::with_host_name(7, "test-host");
            let clash = preminted.mint(second).to_hex();
            store
                .bulk_write(
                    cols::LOGS,
                    vec![WriteOp::insert_one(json!({"_id": clash, "run_id": 99 + i as i64}))],
                )
                .await
                .unwrap();
        }

        logger.log(LogLevel::Info, "foreign", Map::new()).await.unwrap();
        let err = logger.flush().await.unwrap_err();
        assert!(matches!(err, LogError::ForeignDuplicate { .. }));
        assert_eq!(store.count(cols::TROUBLES, &json!({})).await.unwrap(), 1);
    }
}
