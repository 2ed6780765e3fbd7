// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The T3 event engine.
//!
//! Executes one named batch event: select transients, stream chunked
//! views, drive each task unit's `add`/`done`, flush journal updates per
//! chunk, and write the event document whether the run succeeded or not.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_store::{DocStore, TroubleWriter, cols, new_run_id};
use vigil_units::{SessionInfo, T3Unit, UnitRegistry};

use crate::error::{EngineError, Result};
use crate::events::{EventEntry, alerts_since, last_run_of, record_event};
use crate::t3::journal::JournalUpdater;
use crate::t3::load::TransientLoader;
use crate::t3::select::{Selection, StateSelect};

/// One task of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    /// T3 unit name.
    pub unit: String,
    /// Unit configuration.
    #[serde(default)]
    pub config: Value,
}

/// Configuration of one named batch event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct T3EventConfig {
    /// Event name; also the key for last-run lookups.
    pub name: String,
    /// Transient selection clause.
    #[serde(default)]
    pub selection: Selection,
    /// Which states to load.
    #[serde(default)]
    pub state: StateSelect,
    /// Tasks, executed in order.
    pub tasks: Vec<TaskDef>,
    /// Stock ids per loaded chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Abort the event on the first unit failure instead of absorbing it.
    #[serde(default)]
    pub raise_exc: bool,
    /// Attach a lightcurve to every view.
    #[serde(default)]
    pub load_lightcurve: bool,
    /// Operator message surfaced to task units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_msg: Option<String>,
}

fn default_chunk_size() -> usize {
    1000
}

/// Executes one event configuration.
pub struct T3Event {
    config: T3EventConfig,
    store: Arc<dyn DocStore>,
    registry: Arc<UnitRegistry>,
    troubles: TroubleWriter,
    stop: CancellationToken,
}

impl T3Event {
    /// Assemble an event executor.
    pub fn new(
        config: T3EventConfig,
        store: Arc<dyn DocStore>,
        registry: Arc<UnitRegistry>,
        stop: CancellationToken,
    ) -> Self {
        let troubles = TroubleWriter::new(store.clone());
        Self {
            config,
            store,
            registry,
            troubles,
            stop,
        }
    }

    /// Run the event. The event document is written in every case; the
    /// result carries the event info on success.
    pub async fn run(&self) -> Result<Value> {
        let started_ts = Utc::now().timestamp();
        let clock = Instant::now();
        let run_id = new_run_id(self.store.as_ref()).await?;

        let last_run = last_run_of(self.store.as_ref(), &self.config.name).await?;
        let session = SessionInfo {
            event: self.config.name.clone(),
            last_run,
            processed_alerts: Some(alerts_since(self.store.as_ref(), last_run).await?),
            admin_msg: self.config.admin_msg.clone(),
        };

        let outcome = self.execute(run_id, &session).await;

        let entry = EventEntry {
            name: self.config.name.clone(),
            tier: json!(3),
            ts: started_ts,
            duration: clock.elapsed().as_secs_f64(),
            run_ids: vec![run_id],
            success: outcome.is_ok(),
            event_info: outcome.as_ref().cloned().unwrap_or(Value::Null),
        };
        record_event(self.store.as_ref(), &entry).await?;
        info!(event = %self.config.name, run_id, success = outcome.is_ok(), "Event finished");
        outcome
    }

    async fn execute(&self, run_id: i64, session: &SessionInfo) -> Result<Value> {
        let now = Utc::now().timestamp();

        // Resolve event-relative time bounds up front; the selection
        // compiler itself is sync.
        let mut referenced: Vec<String> = Vec::new();
        for window in [&self.config.selection.created, &self.config.selection.modified] {
            for bound in [&window.after, &window.before] {
                if let Some(vigil_model::TimeRef::LastRunOf(name)) = bound {
                    referenced.push(name.clone());
                }
            }
        }
        let mut resolved = std::collections::HashMap::new();
        for name in referenced {
            if let Some(ts) = last_run_of(self.store.as_ref(), &name).await? {
                resolved.insert(name, ts);
            }
        }
        let filter = self
            .config
            .selection
            .to_filter(now, &|name| resolved.get(name).copied());

        let stock_docs = self.store.find(cols::STOCK, &filter).await?;
        let ids: Vec<Value> = stock_docs
            .iter()
            .filter_map(|doc| doc.get("_id").cloned())
            .collect();

        if self.config.selection.for_each_channel {
            // `$forEach`: one pass per distinct channel present in the
            // matched stocks.
            let mut distinct: BTreeSet<String> = BTreeSet::new();
            for doc in &stock_docs {
                if let Some(channels) = doc.get("channels").and_then(Value::as_array) {
                    distinct.extend(
                        channels
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string),
                    );
                }
            }
            if let Some(logic) = &self.config.selection.channels {
                let allowed: BTreeSet<String> =
                    logic.channels().iter().map(|s| s.to_string()).collect();
                distinct.retain(|c| allowed.contains(c));
            }
            let mut info = serde_json::Map::new();
            for channel in distinct {
                let wanted: BTreeSet<String> = [channel.clone()].into();
                let pass = self
                    .pass(run_id, session, &ids, Some(&wanted))
                    .await?;
                info.insert(channel, pass);
            }
            return Ok(Value::Object(info));
        }

        let wanted: Option<BTreeSet<String>> = self
            .config
            .selection
            .channels
            .as_ref()
            .map(|logic| logic.channels().iter().map(|s| s.to_string()).collect());
        self.pass(run_id, session, &ids, wanted.as_ref()).await
    }

    /// One staged pass: instantiate tasks, stream chunks, finish.
    async fn pass(
        &self,
        run_id: i64,
        session: &SessionInfo,
        ids: &[Value],
        channels: Option<&BTreeSet<String>>,
    ) -> Result<Value> {
        let mut tasks: Vec<(String, Box<dyn T3Unit>)> = Vec::with_capacity(self.config.tasks.len());
        for def in &self.config.tasks {
            tasks.push((def.unit.clone(), self.registry.new_t3(&def.unit, &def.config)?));
        }

        let loader = TransientLoader::new(self.store.as_ref());
        let mut journal = JournalUpdater::new(self.store.clone(), &self.config.name, run_id);
        let mut chunks = 0usize;

        for chunk in ids.chunks(self.config.chunk_size.max(1)) {
            if self.stop.is_cancelled() {
                warn!(event = %self.config.name, "Stop signalled between chunks");
                break;
            }
            let views = loader
                .load_views(chunk, self.config.state, channels, self.config.load_lightcurve)
                .await?;
            chunks += 1;

            for (name, task) in tasks.iter_mut() {
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| task.add(session, &views)));
                self.absorb(name, outcome, &mut journal).await?;
            }
            journal.flush().await?;
        }

        for (name, task) in tasks.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| task.done()));
            self.absorb(name, outcome, &mut journal).await?;
        }
        journal.flush().await?;

        Ok(json!({"stocks": ids.len(), "chunks": chunks}))
    }

    /// Queue a unit's journal requests; faults are absorbed into troubles
    /// unless the event is configured to raise.
    async fn absorb(
        &self,
        task: &str,
        outcome: std::thread::Result<
            std::result::Result<Vec<vigil_units::JournalUpdateRequest>, vigil_units::UnitError>,
        >,
        journal: &mut JournalUpdater,
    ) -> Result<()> {
        let details = match outcome {
            Ok(Ok(requests)) => {
                for request in requests {
                    journal.queue(request);
                }
                return Ok(());
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => {
                if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "task panicked".to_string()
                }
            }
        };
        warn!(%task, %details, "Task unit failed");
        self.troubles
            .report(
                3,
                "t3_event",
                &details,
                json!({"event": self.config.name, "task": task}),
            )
            .await;
        if self.config.raise_exc {
            return Err(EngineError::TaskFailed {
                task: task.to_string(),
                details,
            });
        }
        Ok(())
    }
}
