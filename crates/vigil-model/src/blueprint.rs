// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The pure compound blueprint builder.
//!
//! Given a stock, a timely-ordered sequence of photo points and a set of
//! channels, compute each channel's effective and strict content-addressed
//! compound. The builder never sorts: ordering is the caller's
//! responsibility, and the digests depend on it.
//!
//! Per channel, the policy maps every point to a verdict: the raw point id,
//! an annotated dict, or an exclusion. The strict payload always includes
//! the verdict's canonical form; the effective payload includes it only
//! when the point is not excluded. Policy deviations that change the
//! measured value therefore count towards the effective id, exclusions do
//! not. Channels producing equal effective payloads share one compound.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value, json};

use crate::alert::PhotoPoint;
use crate::canon::to_canon_bytes;
use crate::compound::CompoundFlavor;
use crate::digest::Digest;
use crate::stock::StockId;

/// Verdict of a channel policy for one photo point.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyVerdict {
    /// Use the point as delivered.
    Raw(i64),
    /// Use the point with policy annotations; must contain an `id` field.
    Annotated(Map<String, Value>),
    /// Exclude the point from the effective view.
    Excluded {
        /// The point id.
        id: i64,
        /// Exclusion reason, recorded in the strict body.
        reason: String,
    },
}

/// Per-channel photo point policy.
///
/// Implementations must be pure: the same point yields the same verdict in
/// every process, or the content addressing breaks.
pub trait ChannelPolicy: Send + Sync {
    /// Map one photo point to its per-channel verdict.
    fn verdict(&self, point: &PhotoPoint) -> PolicyVerdict;
}

/// The default policy: every point passes through as its raw id.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPolicy;

impl ChannelPolicy for IdentityPolicy {
    fn verdict(&self, point: &PhotoPoint) -> PolicyVerdict {
        PolicyVerdict::Raw(point.id)
    }
}

/// One channel's view as input to the builder.
pub struct ChannelView<'a> {
    /// Channel name.
    pub name: &'a str,
    /// The channel's point policy.
    pub policy: &'a dyn ChannelPolicy,
    /// Tags the channel contributes to its compounds.
    pub tags: &'a [String],
}

/// The computed per-channel compounds for one stock.
#[derive(Debug, Clone, Default)]
pub struct CompoundBlueprint {
    /// Channel name to effective compound id.
    pub effective: BTreeMap<String, Digest>,
    /// Effective compound id to ordered body.
    pub bodies: BTreeMap<Digest, Vec<Value>>,
    /// Strict compound id to ordered body, for flavored channels.
    pub strict_bodies: BTreeMap<Digest, Vec<Value>>,
    /// Effective compound id to tag union.
    pub tags: BTreeMap<Digest, BTreeSet<String>>,
    /// Effective compound id to per-channel flavors.
    pub flavors: BTreeMap<Digest, Vec<CompoundFlavor>>,
    /// Effective compound id to measurement-only digest.
    pub pp_ids: BTreeMap<Digest, Digest>,
}

impl CompoundBlueprint {
    /// Distinct effective compound ids.
    pub fn effective_ids(&self) -> BTreeSet<Digest> {
        self.effective.values().copied().collect()
    }

    /// Channels mapped to a given effective id.
    pub fn channels_of(&self, id: &Digest) -> BTreeSet<String> {
        self.effective
            .iter()
            .filter(|(_, eff)| *eff == id)
            .map(|(channel, _)| channel.clone())
            .collect()
    }
}

/// Build the blueprint for `points` (timely-ordered by the caller) over
/// the given channels.
pub fn build(stock: &StockId, points: &[&PhotoPoint], channels: &[ChannelView<'_>]) -> CompoundBlueprint {
    let stock_str = stock.to_string();
    let mut blueprint = CompoundBlueprint::default();

    for channel in channels {
        let mut effective_payload: Vec<u8> = Vec::new();
        let mut strict_payload: Vec<u8> = Vec::new();
        let mut pp_payload: Vec<u8> = Vec::new();
        let mut effective_body: Vec<Value> = Vec::new();
        let mut strict_body: Vec<Value> = Vec::new();
        let mut omitted: u32 = 0;

        for point in points {
            let verdict = channel.policy.verdict(point);
            let (element, excluded) = match verdict {
                PolicyVerdict::Raw(id) => (Value::from(id), false),
                PolicyVerdict::Annotated(map) => (Value::Object(map), false),
                PolicyVerdict::Excluded { id, reason } => {
                    (json!({"id": id, "excl": reason}), true)
                }
            };
            let piece = to_canon_bytes(&element);

            strict_payload.extend_from_slice(&piece);
            strict_body.push(element.clone());

            if excluded {
                omitted += 1;
            } else {
                effective_payload.extend_from_slice(&piece);
                effective_body.push(element);
                if !point.is_upper_limit() {
                    pp_payload.extend_from_slice(&piece);
                }
            }
        }

        let effective_id = Digest::of_parts(&stock_str, &effective_payload);
        let strict_id = Digest::of_parts(&stock_str, &strict_payload);
        let pp_id = Digest::of_parts(&stock_str, &pp_payload);

        blueprint
            .effective
            .insert(channel.name.to_string(), effective_id);
        blueprint.bodies.entry(effective_id).or_insert(effective_body);
        blueprint
            .tags
            .entry(effective_id)
            .or_default()
            .extend(channel.tags.iter().cloned());
        blueprint.pp_ids.entry(effective_id).or_insert(pp_id);

        if strict_id != effective_id {
            blueprint
                .flavors
                .entry(effective_id)
                .or_default()
                .push(CompoundFlavor {
                    channel: channel.name.to_string(),
                    strict: strict_id,
                    omitted,
                });
            blueprint.strict_bodies.entry(strict_id).or_insert(strict_body);
        }
    }

    blueprint
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: i64, jd: f64) -> PhotoPoint {
        PhotoPoint {
            id,
            jd,
            rcid: 3,
            body: Map::new(),
        }
    }

    /// Excludes points whose id is in the block list.
    struct BlockList(Vec<i64>);

    impl ChannelPolicy for BlockList {
        fn verdict(&self, point: &PhotoPoint) -> PolicyVerdict {
            if self.0.contains(&point.id) {
                PolicyVerdict::Excluded {
                    id: point.id,
                    reason: "blocked".to_string(),
                }
            } else {
                PolicyVerdict::Raw(point.id)
            }
        }
    }

    /// Annotates every point with a zero-point correction.
    struct Corrected;

    impl ChannelPolicy for Corrected {
        fn verdict(&self, point: &PhotoPoint) -> PolicyVerdict {
            let mut map = Map::new();
            map.insert("id".to_string(), Value::from(point.id));
            map.insert("zp_corr".to_string(), Value::from(0.03));
            PolicyVerdict::Annotated(map)
        }
    }

    #[test]
    fn test_identity_channels_share_one_compound() {
        let stock = StockId::from("ST1");
        let p1 = point(100, 100.0);
        let p2 = point(101, 101.0);
        let points = vec![&p1, &p2];
        let tags: Vec<String> = vec![];
        let channels = [
            ChannelView { name: "C1", policy: &IdentityPolicy, tags: &tags },
            ChannelView { name: "C2", policy: &IdentityPolicy, tags: &tags },
        ];

        let bp = build(&stock, &points, &channels);
        assert_eq!(bp.effective_ids().len(), 1);
        assert_eq!(bp.effective["C1"], bp.effective["C2"]);
        let id = bp.effective["C1"];
        assert_eq!(bp.bodies[&id], vec![Value::from(100), Value::from(101)]);
        assert!(bp.flavors.get(&id).is_none());
        assert_eq!(bp.channels_of(&id).len(), 2);
    }

    #[test]
    fn test_determinism_across_invocations() {
        let stock = StockId::from("ST1");
        let p1 = point(100, 100.0);
        let points = vec![&p1];
        let tags: Vec<String> = vec![];
        let channels = [ChannelView { name: "C1", policy: &IdentityPolicy, tags: &tags }];
        let a = build(&stock, &points, &channels);
        let b = build(&stock, &points, &channels);
        assert_eq!(a.effective["C1"], b.effective["C1"]);
    }

    #[test]
    fn test_exclusion_creates_flavor() {
        let stock = StockId::from("ST1");
        let p1 = point(100, 100.0);
        let p2 = point(101, 101.0);
        let points = vec![&p1, &p2];
        let tags: Vec<String> = vec![];
        let block = BlockList(vec![101]);
        let channels = [
            ChannelView { name: "C1", policy: &IdentityPolicy, tags: &tags },
            ChannelView { name: "C2", policy: &block, tags: &tags },
        ];

        let bp = build(&stock, &points, &channels);
        // C2's effective view drops point 101 entirely
        let c2_eff = bp.effective["C2"];
        assert_eq!(bp.bodies[&c2_eff], vec![Value::from(100)]);
        assert_ne!(bp.effective["C1"], c2_eff);

        let flavors = &bp.flavors[&c2_eff];
        assert_eq!(flavors.len(), 1);
        assert_eq!(flavors[0].channel, "C2");
        assert_eq!(flavors[0].omitted, 1);
        // The strict body retains the exclusion dict
        let strict = &bp.strict_bodies[&flavors[0].strict];
        assert_eq!(strict[1]["excl"], Value::from("blocked"));
    }

    #[test]
    fn test_annotation_changes_effective_id() {
        let stock = StockId::from("ST1");
        let p1 = point(100, 100.0);
        let points = vec![&p1];
        let tags: Vec<String> = vec![];
        let channels = [
            ChannelView { name: "C1", policy: &IdentityPolicy, tags: &tags },
            ChannelView { name: "C2", policy: &Corrected, tags: &tags },
        ];

        let bp = build(&stock, &points, &channels);
        // A value-changing annotation is a different view, not a flavor
        assert_ne!(bp.effective["C1"], bp.effective["C2"]);
        assert!(bp.flavors.is_empty());
        let c2_body = &bp.bodies[&bp.effective["C2"]];
        assert_eq!(c2_body[0]["zp_corr"], Value::from(0.03));
    }

    #[test]
    fn test_pp_id_ignores_upper_limits() {
        let stock = StockId::from("ST1");
        let p1 = point(100, 100.0);
        let ul = point(-5, 100.5);
        let p2 = point(101, 101.0);
        let with_ul = vec![&p1, &ul, &p2];
        let without_ul = vec![&p1, &p2];
        let tags: Vec<String> = vec![];
        let channels = [ChannelView { name: "C1", policy: &IdentityPolicy, tags: &tags }];

        let a = build(&stock, &with_ul, &channels);
        let b = build(&stock, &without_ul, &channels);
        // Different effective ids (bodies differ), same photometry-only id
        assert_ne!(a.effective["C1"], b.effective["C1"]);
        assert_eq!(a.pp_ids[&a.effective["C1"]], b.pp_ids[&b.effective["C1"]]);
    }

    #[test]
    fn test_tag_union_per_compound() {
        let stock = StockId::from("ST1");
        let p1 = point(100, 100.0);
        let points = vec![&p1];
        let t1 = vec!["ZTF".to_string()];
        let t2 = vec!["ZTF_PRIV".to_string()];
        let channels = [
            ChannelView { name: "C1", policy: &IdentityPolicy, tags: &t1 },
            ChannelView { name: "C2", policy: &IdentityPolicy, tags: &t2 },
        ];
        let bp = build(&stock, &points, &channels);
        let id = bp.effective["C1"];
        assert_eq!(bp.tags[&id].len(), 2);
    }

    #[test]
    fn test_order_sensitivity() {
        let stock = StockId::from("ST1");
        let p1 = point(100, 100.0);
        let p2 = point(101, 101.0);
        let fwd = vec![&p1, &p2];
        let rev = vec![&p2, &p1];
        let tags: Vec<String> = vec![];
        let channels = [ChannelView { name: "C1", policy: &IdentityPolicy, tags: &tags }];
        let a = build(&stock, &fwd, &channels);
        let b = build(&stock, &rev, &channels);
        assert_ne!(a.effective["C1"], b.effective["C1"]);
    }
}
