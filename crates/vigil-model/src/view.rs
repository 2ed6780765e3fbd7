// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frozen transient projections for batch units.
//!
//! A view holds document snapshots and identities, never owning pointers
//! into other views; reconstruction from the store is a pure read, and
//! cross-references (journal entries naming compound ids) stay references.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::alert::PhotoPoint;
use crate::compound::CompoundRecord;
use crate::digest::Digest;
use crate::journal::JournalEntry;
use crate::stock::{StockId, StockRecord};
use crate::t2::T2Record;

/// A compound body resolved against its photo points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightCurve {
    /// The compound this lightcurve was built from.
    pub compound_id: Digest,
    /// Points in body order; upper limits included when the body names them.
    pub points: Vec<PhotoPoint>,
    /// Point ids the channel policy excluded from the effective view.
    #[serde(default)]
    pub excluded: Vec<i64>,
}

impl LightCurve {
    /// Point ids in body order.
    pub fn point_ids(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.id).collect()
    }
}

/// The frozen projection of one transient handed to T3 units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientView {
    /// The transient's identifier.
    pub id: StockId,
    /// Stock document snapshot, reduced to the requested channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<StockRecord>,
    /// Selected compound documents.
    #[serde(default)]
    pub compounds: Vec<CompoundRecord>,
    /// Selected T2 documents.
    #[serde(default)]
    pub t2: Vec<T2Record>,
    /// Photo points referenced by the selected compounds.
    #[serde(default)]
    pub points: Vec<PhotoPoint>,
    /// Lightcurve for the primary (latest) state, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lightcurve: Option<LightCurve>,
}

impl TransientView {
    /// Journal entries visible to the given channels, merged from the
    /// stock snapshot.
    pub fn journal<'a>(
        &'a self,
        channels: &'a BTreeSet<String>,
    ) -> Box<dyn Iterator<Item = &'a JournalEntry> + 'a> {
        match &self.stock {
            Some(stock) => Box::new(stock.journal_for(channels)),
            None => Box::new(std::iter::empty()),
        }
    }

    /// The latest state (compound id) present in the view, preferring
    /// higher tiers, then recency, then length.
    pub fn latest_state(&self) -> Option<Digest> {
        self.compounds
            .iter()
            .max_by(|a, b| {
                a.tier
                    .cmp(&b.tier)
                    .then(a.added.cmp(&b.added))
                    .then(a.len.cmp(&b.len))
            })
            .map(|c| c.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compound(id_byte: u8, tier: i32, added: i64, len: u32) -> CompoundRecord {
        CompoundRecord {
            id: Digest([id_byte; 16]),
            stock: StockId::from("ST1"),
            tier,
            added,
            len,
            body: vec![],
            channels: BTreeSet::new(),
            tags: BTreeSet::new(),
            flavors: vec![],
            pp_id: None,
            run_id: None,
        }
    }

    #[test]
    fn test_latest_state_prefers_tier_then_added_then_len() {
        let view = TransientView {
            id: StockId::from("ST1"),
            stock: None,
            compounds: vec![
                compound(1, 0, 100, 5),
                compound(2, 1, 50, 2),
                compound(3, 1, 50, 4),
            ],
            t2: vec![],
            points: vec![],
            lightcurve: None,
        };
        assert_eq!(view.latest_state(), Some(Digest([3; 16])));
    }

    #[test]
    fn test_wire_round_trip() {
        let view = TransientView {
            id: StockId::from("ST1"),
            stock: serde_json::from_value(json!({
                "_id": "ST1",
                "channels": ["C1"],
                "journal": [{"tier": 0, "ts": 9, "channels": ["C1"]}],
            }))
            .unwrap(),
            compounds: vec![compound(7, 0, 123, 1)],
            t2: vec![],
            points: vec![PhotoPoint {
                id: 100,
                jd: 100.0,
                rcid: 3,
                body: serde_json::Map::new(),
            }],
            lightcurve: Some(LightCurve {
                compound_id: Digest([7; 16]),
                points: vec![],
                excluded: vec![],
            }),
        };

        let bytes = serde_json::to_vec(&view).unwrap();
        let back: TransientView = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.id, view.id);
        assert_eq!(back.compounds[0].id, view.compounds[0].id);
        assert_eq!(back.points[0].id, 100);
        assert_eq!(
            back.stock.as_ref().unwrap().journal.len(),
            view.stock.as_ref().unwrap().journal.len()
        );
        assert_eq!(back.lightcurve.unwrap().compound_id, Digest([7; 16]));
    }
}
