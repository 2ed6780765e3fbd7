// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The ingester: filter verdicts to write operations.
//!
//! Exclusive producer of write operations for a given alert. Every
//! identifier used in a selector is a deterministic content hash or an
//! instrument id, so two workers ingesting the same alert produce the same
//! documents.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};

use vigil_model::{AlertContent, JournalEntry, LinkCol, T2Status, blueprint};
use vigil_store::{DocStore, UpdateDoc, WriteOp, cols};
use vigil_units::{FilterVerdict, LinkTarget};

use crate::channel::ChannelContext;
use crate::error::{EngineError, Result};

/// Write operations keyed by target collection.
pub type OpsByCollection = HashMap<String, Vec<WriteOp>>;

/// Translates one accepted alert into store operations.
pub struct Ingester {
    store: Arc<dyn DocStore>,
    run_id: i64,
}

impl Ingester {
    /// An ingester stamping `run_id` onto journal entries.
    pub fn new(store: Arc<dyn DocStore>, run_id: i64) -> Self {
        Self { store, run_id }
    }

    /// Produce the operation set for `alert` given the accepting channels
    /// and their verdicts.
    pub async fn ingest(
        &self,
        alert: &AlertContent,
        accepted: &[(&ChannelContext, FilterVerdict)],
    ) -> Result<OpsByCollection> {
        let now = Utc::now().timestamp();
        let stock_val = alert.stock_id.to_value();
        let mut ops: OpsByCollection = HashMap::new();

        self.point_ops(alert, &stock_val, &mut ops)?;
        self.supersession_ops(alert, &stock_val, &mut ops).await?;
        let effective = self.compound_ops(alert, accepted, &stock_val, now, &mut ops)?;
        self.t2_ops(alert, accepted, &effective, &stock_val, now, &mut ops)?;
        self.stock_ops(alert, accepted, &stock_val, now, &mut ops)?;

        Ok(ops)
    }

    /// Datapoint upserts: full body on insert, stock membership via set
    /// semantics (upper limits may be shared across stocks).
    fn point_ops(
        &self,
        alert: &AlertContent,
        stock_val: &Value,
        ops: &mut OpsByCollection,
    ) -> Result<()> {
        for point in alert.pps.iter().chain(alert.uls.iter()) {
            let body = serde_json::to_value(point)
                .map_err(|e| EngineError::Malformed(e.to_string()))?;
            let mut update = UpdateDoc::new();
            if let Some(map) = body.as_object() {
                for (key, value) in map {
                    if key != "_id" {
                        update.set_on_insert.insert(key.clone(), value.clone());
                    }
                }
            }
            let update = update.add_to_set("stock_ids", stock_val.clone());
            ops.entry(cols::T0.to_string())
                .or_default()
                .push(WriteOp::upsert_one(json!({"_id": point.id}), update));
        }
        Ok(())
    }

    /// Reprocessed photometry: a stored measurement sharing `(jd, rcid)`
    /// with an incoming one under a different id is marked superseded.
    async fn supersession_ops(
        &self,
        alert: &AlertContent,
        stock_val: &Value,
        ops: &mut OpsByCollection,
    ) -> Result<()> {
        if alert.pps.is_empty() {
            return Ok(());
        }
        let existing = self
            .store
            .find(cols::T0, &json!({"stock_ids": stock_val}))
            .await?;
        for point in &alert.pps {
            for stored in &existing {
                let stored_id = stored.get("_id").and_then(Value::as_i64);
                let same_position = stored.get("jd").and_then(Value::as_f64) == Some(point.jd)
                    && stored.get("rcid").and_then(Value::as_i64) == Some(point.rcid as i64);
                match stored_id {
                    Some(id) if id > 0 && id != point.id && same_position => {
                        ops.entry(cols::T0.to_string()).or_default().push(
                            WriteOp::update_one(
                                json!({"_id": id}),
                                UpdateDoc::new()
                                    .add_to_set("superseded_by", Value::from(point.id))
                                    .set("superseded", Value::Bool(true)),
                            ),
                        );
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Compound upserts from the blueprint; body immutable, channel and
    /// flavor membership via set semantics.
    fn compound_ops(
        &self,
        alert: &AlertContent,
        accepted: &[(&ChannelContext, FilterVerdict)],
        stock_val: &Value,
        now: i64,
        ops: &mut OpsByCollection,
    ) -> Result<BTreeMap<String, String>> {
        let points = alert.points_time_ordered();
        let views: Vec<_> = accepted.iter().map(|(ch, _)| ch.view()).collect();
        let bp = blueprint::build(&alert.stock_id, &points, &views);

        for effective_id in bp.effective_ids() {
            let body = bp.bodies[&effective_id].clone();
            let channels: Vec<Value> = bp
                .channels_of(&effective_id)
                .into_iter()
                .map(Value::from)
                .collect();
            let tags: Vec<Value> = bp
                .tags
                .get(&effective_id)
                .map(|t| t.iter().cloned().map(Value::from).collect())
                .unwrap_or_default();
            let flavors: Vec<Value> = bp
                .flavors
                .get(&effective_id)
                .map(|f| {
                    f.iter()
                        .map(|flavor| serde_json::to_value(flavor).unwrap_or(Value::Null))
                        .collect()
                })
                .unwrap_or_default();

            let mut update = UpdateDoc::new()
                .set_on_insert("stock", stock_val.clone())
                .set_on_insert("tier", json!(0))
                .set_on_insert("added", json!(now))
                .set_on_insert("len", json!(body.len()))
                .set_on_insert("body", Value::Array(body))
                .set_on_insert("run_id", json!(self.run_id))
                .add_to_set_each("channels", channels)
                .add_to_set_each("tags", tags)
                .add_to_set_each("flavors", flavors);
            let pp_id = bp.pp_ids[&effective_id];
            if pp_id != effective_id {
                update = update.set_on_insert("pp_id", json!(pp_id.to_hex()));
            }

            ops.entry(cols::T1.to_string())
                .or_default()
                .push(WriteOp::upsert_one(
                    json!({"_id": effective_id.to_hex()}),
                    update,
                ));
        }

        Ok(bp
            .effective
            .iter()
            .map(|(channel, id)| (channel.clone(), id.to_hex()))
            .collect())
    }

    /// T2 document upserts. Directives sharing (unit, config, link)
    /// across channels coalesce into one operation so a multi-channel
    /// document is written once with the channel union.
    fn t2_ops(
        &self,
        alert: &AlertContent,
        accepted: &[(&ChannelContext, FilterVerdict)],
        effective: &BTreeMap<String, String>,
        stock_val: &Value,
        now: i64,
        ops: &mut OpsByCollection,
    ) -> Result<()> {
        type Key = (String, String, String, String);
        let mut pending: BTreeMap<Key, (Value, BTreeSet<String>)> = BTreeMap::new();

        for (ch, verdict) in accepted {
            for directive in &ch.config.t2 {
                if !directive.matches_verdict(verdict) {
                    continue;
                }
                let targets: Vec<(Value, LinkCol)> = match &directive.link {
                    LinkTarget::Stock => vec![(stock_val.clone(), LinkCol::Stock)],
                    LinkTarget::State => {
                        let Some(id) = effective.get(ch.name()) else {
                            continue;
                        };
                        vec![(Value::from(id.clone()), LinkCol::State)]
                    }
                    LinkTarget::Point { slice } => slice
                        .select(alert.pps.len())
                        .into_iter()
                        .map(|i| (Value::from(alert.pps[i].id), LinkCol::Point))
                        .collect(),
                };
                for (link, link_col) in targets {
                    let col_tag = serde_json::to_value(link_col)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    let key = (
                        directive.unit.clone(),
                        directive.config_id().to_hex(),
                        link.to_string(),
                        col_tag,
                    );
                    pending
                        .entry(key)
                        .or_insert_with(|| (link.clone(), BTreeSet::new()))
                        .1
                        .insert(ch.name().to_string());
                }
            }
        }

        for ((unit, config, _, col_tag), (link, channels)) in pending {
            let entry = JournalEntry::new(0, now)
                .with_channels(channels.iter().cloned())
                .with_run_id(self.run_id);
            let update = UpdateDoc::new()
                .set_on_insert("status", serde_json::to_value(T2Status::ToRun).unwrap_or_default())
                .set_on_insert("stock", stock_val.clone())
                .set_on_insert("body", json!([]))
                .add_to_set_each(
                    "channel",
                    channels.iter().cloned().map(Value::from).collect(),
                )
                .push(
                    "meta",
                    serde_json::to_value(&entry)
                        .map_err(|e| EngineError::Malformed(e.to_string()))?,
                );
            let filter = json!({
                "unit": unit,
                "config": config,
                "link": link,
                "col": col_tag,
            });
            ops.entry(cols::T2.to_string())
                .or_default()
                .push(WriteOp::upsert_one(filter, update));
        }
        Ok(())
    }

    /// Stock upsert: base fields on insert, membership via set semantics,
    /// per-channel timestamps, one journal entry for this alert.
    fn stock_ops(
        &self,
        alert: &AlertContent,
        accepted: &[(&ChannelContext, FilterVerdict)],
        stock_val: &Value,
        now: i64,
        ops: &mut OpsByCollection,
    ) -> Result<()> {
        let names: Vec<Value> = accepted
            .iter()
            .map(|(ch, _)| Value::from(ch.name()))
            .collect();
        let tags: Vec<Value> = accepted
            .iter()
            .flat_map(|(ch, _)| ch.config.tags.iter().cloned().map(Value::from))
            .collect();

        let mut journal_extra = Map::new();
        journal_extra.insert("alert".to_string(), json!(alert.alert_id));
        let entry = JournalEntry {
            tier: 0,
            ts: now,
            event: None,
            run_id: Some(self.run_id),
            channels: Some(
                accepted
                    .iter()
                    .map(|(ch, _)| ch.name().to_string())
                    .collect(),
            ),
            extra: journal_extra,
        };

        let mut update = UpdateDoc::new()
            .set_on_insert("created", json!(now))
            .max("modified", json!(now))
            .add_to_set_each("channels", names)
            .add_to_set_each("tags", tags)
            .push(
                "journal",
                serde_json::to_value(&entry).map_err(|e| EngineError::Malformed(e.to_string()))?,
            );
        for (ch, _) in accepted {
            update = update
                .min(&format!("ts.{}.tied", ch.name()), json!(now))
                .max(&format!("ts.{}.upd", ch.name()), json!(now));
        }

        ops.entry(cols::STOCK.to_string())
            .or_default()
            .push(WriteOp::upsert_one(json!({"_id": stock_val}), update));
        Ok(())
    }
}
