// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! T2: the claim-and-run job controller.
//!
//! Repeatedly claims queued documents through an atomic
//! `find_one_and_update` (the one correctness-critical server-side write
//! in the pipeline), reconstructs the payload for the document's link
//! kind, runs the unit and appends a versioned result. Faults local to one
//! document become terminal statuses; store faults halt the controller.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use vigil_model::{CompoundRecord, JournalEntry, LinkCol, T2Record, T2Status};
use vigil_store::{DocStore, TroubleWriter, UpdateDoc, WriteOp, cols, new_run_id};
use vigil_units::{ChannelConfig, T2Payload, UnitKind, UnitRegistry};

use crate::error::{EngineError, Result};
use crate::lightcurve::lightcurve_for;

/// Controller tuning knobs.
#[derive(Debug, Clone)]
pub struct T2ControllerConfig {
    /// Units this controller serves; empty means every registered unit.
    pub units: Vec<String>,
    /// Failed attempts after which a document is parked.
    pub max_trials: usize,
}

impl Default for T2ControllerConfig {
    fn default() -> Self {
        Self {
            units: Vec::new(),
            max_trials: 3,
        }
    }
}

/// The queued-computation engine.
pub struct T2Controller {
    store: Arc<dyn DocStore>,
    registry: Arc<UnitRegistry>,
    /// Hashed config id to raw run configuration, resolved from channel
    /// directives at assembly time.
    configs: HashMap<String, Value>,
    config: T2ControllerConfig,
    troubles: TroubleWriter,
}

impl T2Controller {
    /// Assemble a controller; run configurations are collected from the
    /// channel directives so claimed documents can resolve them by id.
    pub fn new(
        store: Arc<dyn DocStore>,
        registry: Arc<UnitRegistry>,
        channels: &[ChannelConfig],
        config: T2ControllerConfig,
    ) -> Self {
        let mut configs = HashMap::new();
        for channel in channels {
            for directive in &channel.t2 {
                configs.insert(directive.config_id().to_hex(), directive.config.clone());
            }
        }
        let troubles = TroubleWriter::new(store.clone());
        Self {
            store,
            registry,
            configs,
            config,
            troubles,
        }
    }

    /// Claim and process queued documents until none match; returns the
    /// number processed.
    pub async fn run_once(&self) -> Result<u64> {
        let run_id = new_run_id(self.store.as_ref()).await?;
        let units = if self.config.units.is_empty() {
            self.registry.t2_names()
        } else {
            self.config.units.clone()
        };
        if units.is_empty() {
            return Ok(0);
        }

        let claim_filter = json!({
            "status": serde_json::to_value(T2Status::ToRun)?,
            "unit": {"$in": units},
        });

        let mut processed = 0u64;
        loop {
            let now = Utc::now().timestamp();
            let claim_entry = JournalEntry::new(2, now)
                .with_event("claim")
                .with_run_id(run_id);
            let claim_update = UpdateDoc::new()
                .set("status", serde_json::to_value(T2Status::Running)?)
                .push("meta", serde_json::to_value(&claim_entry)?);

            let Some(doc) = self
                .store
                .find_one_and_update(cols::T2, &claim_filter, &claim_update, false)
                .await?
            else {
                break;
            };
            processed += 1;
            self.process_claimed(doc, run_id).await?;
        }
        if processed > 0 {
            info!(processed, run_id, "T2 pass complete");
        }
        Ok(processed)
    }

    async fn process_claimed(&self, doc: Value, run_id: i64) -> Result<()> {
        let rec: T2Record = serde_json::from_value(doc)
            .map_err(|e| EngineError::Malformed(format!("t2 document: {e}")))?;
        let key = json!({
            "unit": rec.unit,
            "config": rec.config,
            "link": rec.link,
            "col": serde_json::to_value(rec.col)?,
        });

        // Parked after repeated failures; no further claims.
        if rec.error_count() >= self.config.max_trials {
            warn!(unit = %rec.unit, "Too many trials, parking document");
            return self.finish(&key, &rec, T2Status::TooManyTrials, run_id, None).await;
        }

        let Some(run_config) = self.configs.get(&rec.config.to_hex()).cloned() else {
            return self.finish(&key, &rec, T2Status::UnknownConfig, run_id, None).await;
        };

        let (kind, unit) = match self.registry.new_t2(&rec.unit, &run_config) {
            Ok(pair) => pair,
            Err(err) => {
                self.troubles
                    .report(2, "t2_controller", &err.to_string(), key.clone())
                    .await;
                return self.finish(&key, &rec, T2Status::MissingInfo, run_id, None).await;
            }
        };
        if !kind_matches(kind, rec.col) {
            return self.finish(&key, &rec, T2Status::MissingInfo, run_id, None).await;
        }

        let payload = match self.reconstruct(&rec).await? {
            Ok(payload) => payload,
            Err(status) => return self.finish(&key, &rec, status, run_id, None).await,
        };

        let deps = match self.resolve_deps(&rec, unit.dependencies()).await? {
            Some(deps) => deps,
            None => {
                return self
                    .finish(&key, &rec, T2Status::MissingDependency, run_id, None)
                    .await;
            }
        };

        // The unit gets its own deep copy of the configuration.
        let unit_config = run_config.clone();
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| unit.run(&payload, &unit_config, &deps)));
        let duration = started.elapsed().as_secs_f64();

        let mut result = json!({
            "run_id": run_id,
            "ts": Utc::now().timestamp(),
            "duration": duration,
            "versions": unit.versions(),
        });
        let status = match outcome {
            Ok(Ok(output)) => {
                result["output"] = output;
                T2Status::Completed
            }
            Ok(Err(err)) => {
                result["error"] = json!(err.to_string());
                T2Status::Error
            }
            Err(payload) => {
                let msg = panic_text(payload);
                self.troubles
                    .report(2, "t2_controller", &msg, key.clone())
                    .await;
                result["error"] = json!(msg);
                T2Status::Exception
            }
        };
        debug!(unit = %rec.unit, status = ?status, duration, "T2 unit finished");
        self.finish(&key, &rec, status, run_id, Some(result)).await
    }

    /// Write the final status (and result entry), then annotate the
    /// stock's journal.
    async fn finish(
        &self,
        key: &Value,
        rec: &T2Record,
        status: T2Status,
        run_id: i64,
        result: Option<Value>,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut update = UpdateDoc::new().set("status", serde_json::to_value(status)?);
        if let Some(result) = result {
            update = update.push("body", result);
        }
        let summary = self
            .store
            .bulk_write(cols::T2, vec![WriteOp::update_one(key.clone(), update)])
            .await?;
        if let Some(err) = summary.errors.into_iter().next() {
            return Err(EngineError::Store(vigil_store::StoreError::Backend {
                operation: "t2_result".to_string(),
                details: err.message,
            }));
        }

        let entry = JournalEntry::new(2, now)
            .with_run_id(run_id)
            .with_channels(rec.channel.iter().cloned())
            .with_extra("unit", json!(rec.unit))
            .with_extra("success", json!(status == T2Status::Completed));
        self.store
            .bulk_write(
                cols::STOCK,
                vec![WriteOp::update_one(
                    json!({"_id": rec.stock.to_value()}),
                    UpdateDoc::new().push("journal", serde_json::to_value(&entry)?),
                )],
            )
            .await?;
        Ok(())
    }

    /// Reconstruct the unit payload for the document's link kind; a
    /// terminal status is returned in the error position.
    async fn reconstruct(
        &self,
        rec: &T2Record,
    ) -> Result<std::result::Result<T2Payload, T2Status>> {
        match rec.col {
            LinkCol::State => {
                let Some(doc) = self
                    .store
                    .find_one(cols::T1, &json!({"_id": rec.link}))
                    .await?
                else {
                    return Ok(Err(T2Status::UnknownLink));
                };
                let compound: CompoundRecord = match serde_json::from_value(doc) {
                    Ok(compound) => compound,
                    Err(_) => return Ok(Err(T2Status::MissingInfo)),
                };
                match lightcurve_for(self.store.as_ref(), &compound).await? {
                    Some(lightcurve) => Ok(Ok(T2Payload::State(lightcurve))),
                    None => Ok(Err(T2Status::MissingInfo)),
                }
            }
            LinkCol::Point => {
                match self
                    .store
                    .find_one(cols::T0, &json!({"_id": rec.link}))
                    .await?
                {
                    Some(doc) => Ok(Ok(T2Payload::Point(doc))),
                    None => Ok(Err(T2Status::UnknownLink)),
                }
            }
            LinkCol::Stock => {
                match self
                    .store
                    .find_one(cols::STOCK, &json!({"_id": rec.link}))
                    .await?
                {
                    Some(doc) => Ok(Ok(T2Payload::Stock(doc))),
                    None => Ok(Err(T2Status::UnknownLink)),
                }
            }
        }
    }

    /// Latest completed outputs of the declared dependency units for the
    /// same link; `None` when any is absent.
    async fn resolve_deps(
        &self,
        rec: &T2Record,
        dep_units: Vec<String>,
    ) -> Result<Option<Vec<Value>>> {
        let mut deps = Vec::with_capacity(dep_units.len());
        for dep in dep_units {
            let filter = json!({
                "unit": dep,
                "link": rec.link,
                "col": serde_json::to_value(rec.col)?,
                "status": serde_json::to_value(T2Status::Completed)?,
            });
            let Some(doc) = self.store.find_one(cols::T2, &filter).await? else {
                return Ok(None);
            };
            let dep_rec: T2Record = serde_json::from_value(doc)
                .map_err(|e| EngineError::Malformed(format!("t2 dependency: {e}")))?;
            match dep_rec.latest_output() {
                Some(output) => deps.push(output.clone()),
                None => return Ok(None),
            }
        }
        Ok(Some(deps))
    }
}

/// Registered unit kinds and document link kinds must agree.
fn kind_matches(kind: UnitKind, col: LinkCol) -> bool {
    matches!(
        (kind, col),
        (UnitKind::StockBound, LinkCol::Stock)
            | (UnitKind::PointBound, LinkCol::Point)
            | (UnitKind::StateBound, LinkCol::State)
            | (UnitKind::CustomStateBound, LinkCol::State)
    )
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unit panicked".to_string()
    }
}
