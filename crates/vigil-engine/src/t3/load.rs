// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chunked transient-view loading.
//!
//! Stock ids stream out of the selection cursor in chunks; for each chunk
//! the loader resolves the requested states, the associated documents and
//! optionally a lightcurve, reduced to the channels the event asked for.
//!
//! Latest-state resolution is two-phase: stocks carrying only T0-tier
//! compounds resolve through the cheap longest-body rule, stocks with
//! higher-tier compounds through the full `(tier, added, len)` ordering.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Value, json};

use vigil_model::{CompoundRecord, PhotoPoint, StockRecord, T2Record, TransientView};
use vigil_store::{DocStore, cols};

use crate::error::Result;
use crate::lightcurve::lightcurve_for;
use crate::t3::select::StateSelect;

/// Loads frozen transient projections.
pub struct TransientLoader<'a> {
    store: &'a dyn DocStore,
}

impl<'a> TransientLoader<'a> {
    /// A loader over the given store.
    pub fn new(store: &'a dyn DocStore) -> Self {
        Self { store }
    }

    /// Load views for one chunk of stock ids.
    ///
    /// `channels`, when present, reduces every view to the intersection of
    /// the requested channels; stocks without a stock document are
    /// skipped.
    pub async fn load_views(
        &self,
        ids: &[Value],
        state: StateSelect,
        channels: Option<&BTreeSet<String>>,
        with_lightcurve: bool,
    ) -> Result<Vec<TransientView>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let stock_docs = self
            .store
            .find(cols::STOCK, &json!({"_id": {"$in": ids}}))
            .await?;
        let compound_docs = self
            .store
            .find(cols::T1, &json!({"stock": {"$in": ids}}))
            .await?;
        let t2_docs = self
            .store
            .find(cols::T2, &json!({"stock": {"$in": ids}}))
            .await?;

        let mut compounds_by_stock: HashMap<String, Vec<CompoundRecord>> = HashMap::new();
        for doc in compound_docs {
            if let Ok(compound) = serde_json::from_value::<CompoundRecord>(doc) {
                let visible = channels.is_none_or(|wanted| {
                    compound.channels.iter().any(|c| wanted.contains(c))
                });
                if visible {
                    compounds_by_stock
                        .entry(compound.stock.to_string())
                        .or_default()
                        .push(compound);
                }
            }
        }

        let mut t2_by_stock: HashMap<String, Vec<T2Record>> = HashMap::new();
        for doc in t2_docs {
            if let Ok(rec) = serde_json::from_value::<T2Record>(doc) {
                let visible =
                    channels.is_none_or(|wanted| rec.channel.iter().any(|c| wanted.contains(c)));
                if visible {
                    t2_by_stock
                        .entry(rec.stock.to_string())
                        .or_default()
                        .push(rec);
                }
            }
        }

        let mut views = Vec::with_capacity(stock_docs.len());
        for doc in stock_docs {
            let Ok(mut stock) = serde_json::from_value::<StockRecord>(doc) else {
                continue;
            };
            if let Some(wanted) = channels {
                stock.channels = stock.channels.intersection(wanted).cloned().collect();
                if stock.channels.is_empty() {
                    continue;
                }
                let visible: Vec<_> = stock.journal_for(wanted).cloned().collect();
                stock.journal = visible;
            }
            let key = stock.id.to_string();

            let all = compounds_by_stock.remove(&key).unwrap_or_default();
            let selected = match state {
                StateSelect::All => all,
                StateSelect::Latest => latest_of(all),
            };

            let point_ids: BTreeSet<i64> = selected
                .iter()
                .flat_map(|c| c.point_ids())
                .collect();
            let points = self.load_points(&point_ids).await?;

            let lightcurve = if with_lightcurve {
                match selected.first() {
                    Some(primary) => lightcurve_for(self.store, primary).await?,
                    None => None,
                }
            } else {
                None
            };

            views.push(TransientView {
                id: stock.id.clone(),
                stock: Some(stock),
                compounds: selected,
                t2: t2_by_stock.remove(&key).unwrap_or_default(),
                points,
                lightcurve,
            });
        }
        Ok(views)
    }

    async fn load_points(&self, ids: &BTreeSet<i64>) -> Result<Vec<PhotoPoint>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list: Vec<i64> = ids.iter().copied().collect();
        let docs = self
            .store
            .find(cols::T0, &json!({"_id": {"$in": id_list}}))
            .await?;
        let mut points = Vec::with_capacity(docs.len());
        for mut doc in docs {
            if let Some(map) = doc.as_object_mut() {
                map.remove("stock_ids");
            }
            if let Ok(point) = serde_json::from_value::<PhotoPoint>(doc) {
                points.push(point);
            }
        }
        points.sort_by_key(|p| p.id);
        Ok(points)
    }
}

/// Latest-state resolution over one stock's visible compounds.
fn latest_of(mut all: Vec<CompoundRecord>) -> Vec<CompoundRecord> {
    if all.is_empty() {
        return all;
    }
    if all.iter().all(|c| c.tier == 0) {
        // Fast path: pure T0 histories grow monotonically, the longest
        // body is the latest view.
        all.sort_by(|a, b| b.len.cmp(&a.len).then(b.added.cmp(&a.added)));
    } else {
        all.sort_by(|a, b| {
            b.tier
                .cmp(&a.tier)
                .then(b.added.cmp(&a.added))
                .then(b.len.cmp(&a.len))
        });
    }
    all.truncate(1);
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_model::Digest;
    use vigil_store::{MemStore, WriteOp};

    fn compound(id_byte: u8, stock: &str, tier: i32, added: i64, len: u32, body: Value) -> Value {
        json!({
            "_id": Digest([id_byte; 16]).to_hex(),
            "stock": stock,
            "tier": tier,
            "added": added,
            "len": len,
            "body": body,
            "channels": ["C1"],
        })
    }

    async fn seed(store: &MemStore) {
        store
            .bulk_write(
                cols::STOCK,
                vec![WriteOp::insert_one(json!({
                    "_id": "ST1",
                    "channels": ["C1", "C2"],
                    "created": 50,
                    "modified": 100,
                    "journal": [
                        {"tier": 0, "ts": 60, "channels": ["C1"]},
                        {"tier": 0, "ts": 61, "channels": ["C2"]},
                    ],
                }))],
            )
            .await
            .unwrap();
        store
            .bulk_write(
                cols::T0,
                vec![
                    WriteOp::insert_one(json!({"_id": 100, "jd": 100.0, "rcid": 3})),
                    WriteOp::insert_one(json!({"_id": 101, "jd": 101.0, "rcid": 3})),
                ],
            )
            .await
            .unwrap();
        store
            .bulk_write(
                cols::T1,
                vec![
                    WriteOp::insert_one(compound(1, "ST1", 0, 10, 1, json!([100]))),
                    WriteOp::insert_one(compound(2, "ST1", 0, 20, 2, json!([100, 101]))),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_latest_state_pure_t0_prefers_longest() {
        let store = Arc::new(MemStore::new());
        seed(&store).await;
        let loader = TransientLoader::new(store.as_ref());
        let views = loader
            .load_views(&[json!("ST1")], StateSelect::Latest, None, true)
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].compounds.len(), 1);
        assert_eq!(views[0].compounds[0].len, 2);
        assert_eq!(
            views[0].lightcurve.as_ref().unwrap().point_ids(),
            vec![100, 101]
        );
        assert_eq!(views[0].points.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_state_prefers_higher_tier() {
        let store = Arc::new(MemStore::new());
        seed(&store).await;
        store
            .bulk_write(
                cols::T1,
                vec![WriteOp::insert_one(compound(3, "ST1", 1, 5, 1, json!([100])))],
            )
            .await
            .unwrap();
        let loader = TransientLoader::new(store.as_ref());
        let views = loader
            .load_views(&[json!("ST1")], StateSelect::Latest, None, false)
            .await
            .unwrap();
        assert_eq!(views[0].compounds[0].tier, 1);
    }

    #[tokio::test]
    async fn test_all_states_loaded() {
        let store = Arc::new(MemStore::new());
        seed(&store).await;
        let loader = TransientLoader::new(store.as_ref());
        let views = loader
            .load_views(&[json!("ST1")], StateSelect::All, None, false)
            .await
            .unwrap();
        assert_eq!(views[0].compounds.len(), 2);
    }

    #[tokio::test]
    async fn test_channel_reduction() {
        let store = Arc::new(MemStore::new());
        seed(&store).await;
        let loader = TransientLoader::new(store.as_ref());
        let wanted: BTreeSet<String> = ["C2".to_string()].into();
        let views = loader
            .load_views(&[json!("ST1")], StateSelect::Latest, Some(&wanted), false)
            .await
            .unwrap();
        let stock = views[0].stock.as_ref().unwrap();
        assert_eq!(stock.channels.len(), 1);
        assert!(stock.channels.contains("C2"));
        // journal reduced to C2-visible entries
        assert_eq!(stock.journal.len(), 1);
        // compounds are C1-only, reduced away
        assert!(views[0].compounds.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_stock_skipped() {
        let store = Arc::new(MemStore::new());
        let loader = TransientLoader::new(store.as_ref());
        let views = loader
            .load_views(&[json!("GHOST")], StateSelect::Latest, None, false)
            .await
            .unwrap();
        assert!(views.is_empty());
    }
}
