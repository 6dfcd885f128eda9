//! End-to-end flows through a fully wired context.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use depot_core::{DepotError, MovementKind};
use depot_realtime::{FrameSink, SinkError, status_frame};
use depot_service::{
    BackendConfig, CatalogueItem, DepotConfig, DepotContext, ORDER_SOURCE, OrderLine,
};

#[derive(Default)]
struct RecordingSink {
    frames: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&self, frame: &str) -> Result<(), SinkError> {
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }
}

fn catalogue(entries: &[(&str, i64)]) -> Vec<CatalogueItem> {
    entries
        .iter()
        .map(|(name, amount)| CatalogueItem {
            name: name.to_string(),
            amount: *amount,
            tag: None,
        })
        .collect()
}

fn slot_map(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(slot, item)| (slot.to_string(), item.to_string()))
        .collect()
}

#[tokio::test]
async fn stock_lifecycle_matches_the_reference_scenario() {
    depot_service::init_tracing();
    let context = DepotContext::init(DepotConfig::default()).await.unwrap();

    let outcome = context
        .apply_movement(MovementKind::In, "widget", 10, "app")
        .await
        .unwrap();
    assert_eq!(outcome.new_amount, 10);
    assert!(!outcome.removed);

    let err = context
        .apply_movement(MovementKind::Out, "widget", 15, "app")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DepotError::InsufficientStock {
            current: 10,
            requested: 15,
            ..
        }
    ));
    assert_eq!(context.get_inventory().await.unwrap()["widget"], 10);

    let outcome = context
        .apply_movement(MovementKind::Set, "widget", 3, "app")
        .await
        .unwrap();
    assert_eq!(outcome.new_amount, 3);

    let days = context.list_partitions().await.unwrap();
    assert_eq!(days.len(), 1);

    // The rejected Out never reached the ledger.
    let records = context.find_records(&days[0].to_string()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, MovementKind::In);
    assert_eq!(records[0].quantity, 10);
    assert_eq!(records[1].kind, MovementKind::Set);
    assert_eq!(records[1].quantity, 3);

    assert!(matches!(
        context.find_records("never-a-date").await.unwrap_err(),
        DepotError::NotFound(_)
    ));
}

#[tokio::test]
async fn final_false_frames_relay_but_move_nothing() {
    let config = DepotConfig {
        device_slots: slot_map(&[("0", "widget")]),
        ..DepotConfig::default()
    };
    let context = DepotContext::init(config).await.unwrap();

    let sink = Arc::new(RecordingSink::default());
    context.register_subscriber(sink.clone()).await.unwrap();

    let token = context.device_connect().await;

    let outcome = context
        .device_frame(token, r#"{"0": 4}"#)
        .await
        .unwrap();
    assert_eq!(outcome.broadcast.delivered, 1);
    assert_eq!(outcome.derived, 0);
    assert!(context.get_inventory().await.unwrap().is_empty());

    let outcome = context
        .device_frame(token, r#"{"0": 4, "final": true}"#)
        .await
        .unwrap();
    assert_eq!(outcome.derived, 1);
    assert_eq!(context.get_inventory().await.unwrap()["widget"], 4);

    // Subscribers saw the initial status, the connect, and both raw frames.
    assert_eq!(
        sink.frames(),
        vec![
            status_frame(false),
            status_frame(true),
            r#"{"0": 4}"#.to_string(),
            r#"{"0": 4, "final": true}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn device_deltas_update_stock_and_prune_zero_rows() {
    let config = DepotConfig {
        device_slots: slot_map(&[("0", "widget")]),
        ..DepotConfig::default()
    };
    let context = DepotContext::init(config).await.unwrap();
    let token = context.device_connect().await;

    let outcome = context
        .device_frame(token, r#"{"0": 5, "final": true}"#)
        .await
        .unwrap();
    assert_eq!(outcome.derived, 1);
    assert_eq!(context.get_inventory().await.unwrap()["widget"], 5);

    let outcome = context
        .device_frame(token, r#"{"0": 0, "final": true}"#)
        .await
        .unwrap();
    assert_eq!(outcome.derived, 1);
    // Stock hit zero and the row was auto-removed.
    assert!(context.get_inventory().await.unwrap().is_empty());

    let days = context.list_partitions().await.unwrap();
    let records = context.find_records(&days[0].to_string()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.source == "device"));
    assert_eq!(records[1].kind, MovementKind::Out);
    assert_eq!(records[1].quantity, 5);
}

#[tokio::test]
async fn tagged_items_survive_at_zero() {
    let mut config = DepotConfig::default();
    config.catalogue = vec![
        CatalogueItem {
            name: "widget".to_string(),
            amount: 5,
            tag: Some(depot_core::ItemTag {
                no_auto_remove: true,
                ..depot_core::ItemTag::default()
            }),
        },
        CatalogueItem {
            name: "gadget".to_string(),
            amount: 5,
            tag: None,
        },
    ];
    let context = DepotContext::init(config).await.unwrap();

    context
        .apply_movement(MovementKind::Out, "widget", 5, "app")
        .await
        .unwrap();
    context
        .apply_movement(MovementKind::Out, "gadget", 5, "app")
        .await
        .unwrap();

    let inventory = context.get_inventory().await.unwrap();
    assert_eq!(inventory.get("widget"), Some(&0));
    assert_eq!(inventory.get("gadget"), None);
}

#[tokio::test]
async fn orders_apply_per_line_with_partial_failures() {
    let config = DepotConfig {
        catalogue: catalogue(&[("widget", 10), ("gadget", 2)]),
        ..DepotConfig::default()
    };
    let context = DepotContext::init(config).await.unwrap();

    let lines = vec![
        OrderLine {
            item: "widget".to_string(),
            quantity: 3,
        },
        OrderLine {
            item: "gadget".to_string(),
            quantity: 5,
        },
    ];
    let report = context.apply_order(&lines, ORDER_SOURCE).await;
    assert_eq!(report.applied, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item, "gadget");

    let inventory = context.get_inventory().await.unwrap();
    assert_eq!(inventory["widget"], 7);
    assert_eq!(inventory["gadget"], 2);

    let days = context.list_partitions().await.unwrap();
    let records = context.find_records(&days[0].to_string()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, ORDER_SOURCE);
    assert_eq!(records[0].item, "widget");
}

#[tokio::test]
async fn sqlite_restart_preserves_stock_and_skips_reseeding() {
    let path = std::env::temp_dir().join(format!("depot-flow-{}.db", std::process::id()));
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }

    let config = DepotConfig {
        catalogue: catalogue(&[("widget", 5)]),
        backend: BackendConfig::Sqlite {
            path: path.display().to_string(),
        },
        ..DepotConfig::default()
    };

    let context = DepotContext::init(config.clone()).await.unwrap();
    context
        .apply_movement(MovementKind::In, "widget", 10, "app")
        .await
        .unwrap();
    assert_eq!(context.get_inventory().await.unwrap()["widget"], 15);
    context.shutdown().await;

    // Same file, same catalogue: live stock wins over the seed amount.
    let context = DepotContext::init(config).await.unwrap();
    assert_eq!(context.get_inventory().await.unwrap()["widget"], 15);

    let days = context.list_partitions().await.unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(
        context.find_records(&days[0].to_string()).await.unwrap().len(),
        1
    );
    context.shutdown().await;

    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}
