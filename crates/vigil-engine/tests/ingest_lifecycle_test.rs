// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end ingestion scenarios: alert in, documents out.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Value, json};

use common::{alert, point, processor_over, state_channel, test_registry};
use vigil_engine::ChannelContext;
use vigil_store::{DocStore, MemStore, cols};
use vigil_units::ChannelConfig;

/// Scenario: one alert, two accepting channels, state-bound UnitA.
#[tokio::test]
async fn test_single_alert_two_channels_merges_documents() {
    let registry = test_registry();
    let store = Arc::new(MemStore::new());
    let channels = vec![
        state_channel(&registry, "C1", "AcceptAll"),
        state_channel(&registry, "C2", "AcceptAll"),
    ];
    let (buffer, mut processor) = processor_over(store.clone(), channels);

    let stats = processor
        .run(vec![alert(9001, "ST1", vec![point(100, 100.0, 3)])])
        .await
        .unwrap();
    buffer.close().await;

    assert_eq!(stats.alerts, 1);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.ingested, 1);

    // One stock document carrying both channels
    let stocks = store.find(cols::STOCK, &json!({})).await.unwrap();
    assert_eq!(stocks.len(), 1);
    assert_eq!(stocks[0]["_id"], json!("ST1"));
    assert_eq!(stocks[0]["channels"], json!(["C1", "C2"]));
    assert_eq!(stocks[0]["journal"].as_array().unwrap().len(), 1);
    assert!(stocks[0]["ts"]["C1"]["upd"].is_i64());

    // One datapoint, member of ST1
    let points = store.find(cols::T0, &json!({})).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["_id"], json!(100));
    assert_eq!(points[0]["stock_ids"], json!(["ST1"]));

    // Identity policies share one compound
    let compounds = store.find(cols::T1, &json!({})).await.unwrap();
    assert_eq!(compounds.len(), 1);
    assert_eq!(compounds[0]["body"], json!([100]));
    assert_eq!(compounds[0]["channels"], json!(["C1", "C2"]));
    assert_eq!(compounds[0]["len"], json!(1));

    // One merged T2 document, queued
    let t2 = store.find(cols::T2, &json!({})).await.unwrap();
    assert_eq!(t2.len(), 1);
    assert_eq!(t2[0]["unit"], json!("UnitA"));
    assert_eq!(t2[0]["status"], json!("TO_RUN"));
    assert_eq!(t2[0]["channel"], json!(["C1", "C2"]));
    assert_eq!(t2[0]["col"], json!("t1"));
    assert_eq!(t2[0]["link"], compounds[0]["_id"]);
}

/// Scenario: group-restricted verdicts gate directives.
#[tokio::test]
async fn test_group_verdict_restricts_t2_documents() {
    let registry = test_registry();
    let store = Arc::new(MemStore::new());

    let channel_with_units = |name: &str, filter: &str| -> ChannelContext {
        let config: ChannelConfig = serde_json::from_value(json!({
            "name": name,
            "filter": filter,
            "t2": [
                {"unit": "UnitA", "link": "state", "group": [3, 5]},
                {"unit": "UnitB", "link": "state", "group": []},
            ],
        }))
        .unwrap();
        ChannelContext::build(config, &registry).unwrap()
    };

    let channels = vec![
        channel_with_units("C1", "AcceptAll"),
        channel_with_units("C2", "Group5"),
    ];
    let (buffer, mut processor) = processor_over(store.clone(), channels);
    processor
        .run(vec![alert(9002, "ST1", vec![point(100, 100.0, 3)])])
        .await
        .unwrap();
    buffer.close().await;

    let t2 = store.find(cols::T2, &json!({})).await.unwrap();
    assert_eq!(t2.len(), 2);

    let unit_a = t2.iter().find(|d| d["unit"] == json!("UnitA")).unwrap();
    let unit_b = t2.iter().find(|d| d["unit"] == json!("UnitB")).unwrap();
    // UnitA matched C1's full-set verdict and C2's group 5
    assert_eq!(unit_a["channel"], json!(["C1", "C2"]));
    // UnitB declares no groups: full-set verdicts only
    assert_eq!(unit_b["channel"], json!(["C1"]));
}

/// Scenario: reprocessed photometry supersedes the stored point.
#[tokio::test]
async fn test_reprocessed_point_superseded_and_compounds_retained() {
    let registry = test_registry();
    let store = Arc::new(MemStore::new());
    let channels = vec![state_channel(&registry, "C1", "AcceptAll")];
    let (buffer, mut processor) = processor_over(store.clone(), channels);

    processor
        .run(vec![alert(9003, "ST1", vec![point(100, 100.0, 3)])])
        .await
        .unwrap();
    buffer.flush();
    buffer.close().await;

    // Second alert carries the history plus a reprocessed point sharing
    // (jd, rcid) under a new id.
    processor
        .run(vec![alert(
            9004,
            "ST1",
            vec![point(100, 100.0, 3), point(101, 100.0, 3)],
        )])
        .await
        .unwrap();
    buffer.close().await;

    let old = store
        .find_one(cols::T0, &json!({"_id": 100}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old["superseded_by"], json!([101]));
    assert_eq!(old["superseded"], json!(true));

    let fresh = store
        .find_one(cols::T0, &json!({"_id": 101}))
        .await
        .unwrap()
        .unwrap();
    assert!(fresh.get("superseded").is_none());

    // Both compounds retained, distinct ids
    let compounds = store.find(cols::T1, &json!({})).await.unwrap();
    assert_eq!(compounds.len(), 2);
    assert_ne!(compounds[0]["_id"], compounds[1]["_id"]);
}

/// Property: re-running the same alerts against a fresh store produces the
/// same content-addressed documents.
#[tokio::test]
async fn test_ingestion_idempotent_under_content_addressing() {
    async fn run_pipeline() -> (BTreeSet<String>, BTreeSet<i64>, BTreeSet<String>) {
        let registry = test_registry();
        let store = Arc::new(MemStore::new());
        let channels = vec![
            state_channel(&registry, "C1", "AcceptAll"),
            state_channel(&registry, "C2", "AcceptAll"),
        ];
        let (buffer, mut processor) = processor_over(store.clone(), channels);
        processor
            .run(vec![
                alert(1, "ST1", vec![point(100, 100.0, 3)]),
                alert(2, "ST1", vec![point(100, 100.0, 3), point(102, 102.0, 4)]),
                alert(3, "ST2", vec![point(200, 99.0, 1)]),
            ])
            .await
            .unwrap();
        buffer.close().await;

        let compound_ids = store
            .find(cols::T1, &json!({}))
            .await
            .unwrap()
            .iter()
            .filter_map(|d| d["_id"].as_str().map(str::to_string))
            .collect();
        let point_ids = store
            .find(cols::T0, &json!({}))
            .await
            .unwrap()
            .iter()
            .filter_map(|d| d["_id"].as_i64())
            .collect();
        let t2_keys = store
            .find(cols::T2, &json!({}))
            .await
            .unwrap()
            .iter()
            .map(|d| {
                format!(
                    "{}/{}/{}",
                    d["unit"].as_str().unwrap_or(""),
                    d["config"].as_str().unwrap_or(""),
                    d["link"]
                )
            })
            .collect();
        (compound_ids, point_ids, t2_keys)
    }

    let first = run_pipeline().await;
    let second = run_pipeline().await;
    assert_eq!(first, second);
    assert!(!first.0.is_empty());
    assert!(!first.2.is_empty());
}

/// Acceptance marks per-channel timestamps and appends exactly one journal
/// entry per alert.
#[tokio::test]
async fn test_journal_grows_per_alert() {
    let registry = test_registry();
    let store = Arc::new(MemStore::new());
    let channels = vec![state_channel(&registry, "C1", "AcceptAll")];
    let (buffer, mut processor) = processor_over(store.clone(), channels);

    processor
        .run(vec![
            alert(1, "ST1", vec![point(100, 100.0, 3)]),
            alert(2, "ST1", vec![point(101, 101.0, 3)]),
        ])
        .await
        .unwrap();
    buffer.close().await;

    let stock: Value = store
        .find_one(cols::STOCK, &json!({"_id": "ST1"}))
        .await
        .unwrap()
        .unwrap();
    let journal = stock["journal"].as_array().unwrap();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal[0]["alert"], json!(1));
    assert_eq!(journal[1]["alert"], json!(2));
    assert!(stock["ts"]["C1"]["tied"].as_i64() <= stock["ts"]["C1"]["upd"].as_i64());
}
