// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The alert processor.
//!
//! One logical processor instance is single-threaded over alerts: per-stock
//! write order must match alert order. Multiple instances may run in
//! separate processes over disjoint streams.
//!
//! Per alert: drive every channel filter (timed), apply live auto-complete,
//! route rejection logs, ingest when at least one channel accepts, then let
//! the buffer decide whether to push.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use vigil_log::{DbLogger, DbLoggerConfig, LogLevel, RecordIdFactory, RejectedDest, RejectedLogs};
use vigil_model::AlertContent;
use vigil_store::{BulkUpdateBuffer, DocStore, TroubleWriter, UpdateDoc, WriteOp, cols};
use vigil_units::{AutoComplete, FilterVerdict};

use crate::channel::ChannelContext;
use crate::error::{EngineError, Result};
use crate::t0::ingest::Ingester;

/// Per-run statistics of one processor instance.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    /// Alerts consumed.
    pub alerts: u64,
    /// Channel acceptances (auto-completed ones included).
    pub accepted: u64,
    /// Channel rejections.
    pub rejected: u64,
    /// Acceptances synthesized by live auto-complete.
    pub auto_completed: u64,
    /// Alerts that produced write operations.
    pub ingested: u64,
    /// Filter wall time per channel, seconds.
    pub filter_secs: BTreeMap<String, f64>,
}

impl ProcessorStats {
    /// The statistics as an event-info payload.
    pub fn to_event_info(&self) -> Value {
        json!({
            "alerts": self.alerts,
            "accepted": self.accepted,
            "rejected": self.rejected,
            "auto_completed": self.auto_completed,
            "ingested": self.ingested,
        })
    }
}

enum ChannelOutcome {
    Verdict(FilterVerdict),
    Faulted(String),
}

/// The T0 orchestrator.
pub struct AlertProcessor {
    store: Arc<dyn DocStore>,
    buffer: BulkUpdateBuffer,
    channels: Vec<ChannelContext>,
    ingester: Ingester,
    logger: DbLogger,
    rejected: HashMap<String, RejectedLogs>,
    troubles: TroubleWriter,
    stats: ProcessorStats,
}

impl AlertProcessor {
    /// Assemble a processor over resolved channels.
    pub fn new(
        store: Arc<dyn DocStore>,
        buffer: BulkUpdateBuffer,
        channels: Vec<ChannelContext>,
        run_id: i64,
        ids: Arc<RecordIdFactory>,
        log_config: DbLoggerConfig,
    ) -> Self {
        let logger = DbLogger::new(store.clone(), "alert_processor", run_id, ids.clone(), log_config);
        let rejected = channels
            .iter()
            .map(|ch| {
                let dest = if ch.config.shared_rejected {
                    RejectedDest::Shared
                } else {
                    RejectedDest::PerChannel
                };
                (
                    ch.name().to_string(),
                    RejectedLogs::new(store.clone(), run_id, ids.clone(), dest),
                )
            })
            .collect();
        let ingester = Ingester::new(store.clone(), run_id);
        let troubles = TroubleWriter::new(store.clone());
        Self {
            store,
            buffer,
            channels,
            ingester,
            logger,
            rejected,
            troubles,
            stats: ProcessorStats::default(),
        }
    }

    /// Drive the supplier to exhaustion (or cancellation) and return the
    /// run statistics.
    pub async fn run(
        &mut self,
        supplier: impl IntoIterator<Item = AlertContent>,
    ) -> Result<ProcessorStats> {
        for alert in supplier {
            if self.buffer.is_cancelled() {
                // Unrecoverable store error: push what we have and stop.
                warn!("Cancellation flagged, draining alert loop");
                self.buffer.flush();
                self.logger.flush().await?;
                return Err(EngineError::Cancelled);
            }
            self.process_one(&alert).await?;
            self.stats.alerts += 1;
            self.buffer.flush_if_large();
        }
        self.logger.flush().await?;
        Ok(self.stats.clone())
    }

    /// The statistics so far.
    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    #[instrument(skip(self, alert), fields(alert_id = alert.alert_id))]
    async fn process_one(&mut self, alert: &AlertContent) -> Result<()> {
        let stock_val = alert.stock_id.to_value();

        // Filter chain, timed per channel. Filter code is sync and
        // CPU-bound; panics are contained here.
        let mut outcomes: Vec<ChannelOutcome> = Vec::with_capacity(self.channels.len());
        for ch in &self.channels {
            let started = Instant::now();
            let outcome = match catch_unwind(AssertUnwindSafe(|| ch.filter.apply(alert))) {
                Ok(Ok(verdict)) => ChannelOutcome::Verdict(verdict),
                Ok(Err(err)) => ChannelOutcome::Faulted(err.to_string()),
                Err(payload) => ChannelOutcome::Faulted(panic_message(payload)),
            };
            *self
                .stats
                .filter_secs
                .entry(ch.name().to_string())
                .or_default() += started.elapsed().as_secs_f64();
            outcomes.push(outcome);
        }

        let mut accepted: Vec<(usize, FilterVerdict, bool)> = Vec::new();

        for (idx, outcome) in outcomes.into_iter().enumerate() {
            let name = self.channels[idx].name().to_string();
            match outcome {
                ChannelOutcome::Verdict(verdict) if verdict.accepted() => {
                    self.stats.accepted += 1;
                    let mut extra = Map::new();
                    extra.insert("channel".to_string(), json!(name));
                    extra.insert("stock".to_string(), stock_val.clone());
                    extra.insert("alert_id".to_string(), json!(alert.alert_id));
                    self.logger.log(LogLevel::Info, "accepted", extra).await?;
                    accepted.push((idx, verdict, false));
                }
                ChannelOutcome::Verdict(_) => {
                    let mode = self.channels[idx].config.auto_complete;
                    if mode == AutoComplete::Live && self.stock_in_channel(&stock_val, &name).await?
                    {
                        // The stock already belongs to the channel: accept
                        // with the default T2 set, marked auto-completed.
                        self.stats.accepted += 1;
                        self.stats.auto_completed += 1;
                        let mut extra = Map::new();
                        extra.insert("autocomplete".to_string(), json!(true));
                        if let Some(rejected) = self.rejected.get(&name) {
                            rejected
                                .log_rejection(&name, &stock_val, alert.alert_id, extra)
                                .await?;
                        }
                        accepted.push((idx, FilterVerdict::Accept, true));
                        continue;
                    }
                    self.stats.rejected += 1;
                    if mode == AutoComplete::Next
                        && self.stock_in_channel(&stock_val, &name).await?
                    {
                        // Remembered for the next batch top-up over this
                        // channel.
                        self.buffer.add(
                            cols::STOCK,
                            vec![WriteOp::update_one(
                                json!({"_id": stock_val.clone()}),
                                UpdateDoc::new()
                                    .add_to_set("tags", json!(format!("AUTOCOMPLETE_NEXT_{name}"))),
                            )],
                        );
                    }
                    if let Some(rejected) = self.rejected.get(&name) {
                        rejected
                            .log_rejection(&name, &stock_val, alert.alert_id, Map::new())
                            .await?;
                    }
                }
                ChannelOutcome::Faulted(details) => {
                    // A faulty filter never takes the loop down; the alert
                    // is a rejection for this channel.
                    self.stats.rejected += 1;
                    warn!(channel = %name, %details, "Filter unit faulted");
                    self.troubles
                        .report(
                            0,
                            "alert_processor",
                            &details,
                            json!({
                                "channel": name,
                                "alert_id": alert.alert_id,
                                "alert": serde_json::to_value(alert).unwrap_or(Value::Null),
                            }),
                        )
                        .await;
                }
            }
        }

        if accepted.is_empty() {
            let mut extra = Map::new();
            extra.insert("stock".to_string(), stock_val.clone());
            extra.insert("alert_id".to_string(), json!(alert.alert_id));
            self.logger
                .log(LogLevel::Info, "all channels rejected", extra)
                .await?;
            return Ok(());
        }

        let pairs: Vec<(&ChannelContext, FilterVerdict)> = accepted
            .iter()
            .map(|(idx, verdict, _)| (&self.channels[*idx], verdict.clone()))
            .collect();
        let ops = self.ingester.ingest(alert, &pairs).await?;
        debug!(
            collections = ops.len(),
            channels = pairs.len(),
            "Alert ingested"
        );
        self.buffer.add_map(ops);
        self.stats.ingested += 1;
        Ok(())
    }

    async fn stock_in_channel(&self, stock_val: &Value, channel: &str) -> Result<bool> {
        let found = self
            .store
            .find_one(
                cols::STOCK,
                &json!({"_id": stock_val, "channels": channel}),
            )
            .await?;
        Ok(found.is_some())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "filter panicked".to_string()
    }
}
