// ABOUTME: Integration tests for the differential sync protocol
// ABOUTME: Drives SyncCoordinator against the in-memory store and recording transport

use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use whitelist_sync::message::{Channel, Topics};
use whitelist_sync::store::{MemorySnapshotStore, SnapshotStore};
use whitelist_sync::subscriber::{ApplyOutcome, WatchState};
use whitelist_sync::transport::RecordingTransport;
use whitelist_sync::{
    ItemRecord, MessageKind, SyncCoordinator, SyncError, SyncMode, UpdatePublisher, Whitelist,
};

const CHAIN: &str = "ethereum";

struct Harness {
    coordinator: SyncCoordinator,
    store: Arc<MemorySnapshotStore>,
    transport: Arc<RecordingTransport>,
}

fn harness() -> Harness {
    let store = Arc::new(MemorySnapshotStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let publisher = UpdatePublisher::new(transport.clone(), Topics::default());
    Harness {
        coordinator: SyncCoordinator::new(store.clone(), publisher),
        store,
        transport,
    }
}

fn pool(key: &str) -> ItemRecord {
    ItemRecord::from_value(json!({
        "address": key,
        "protocol": "UniswapV2",
        "token0": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
        "token1": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
        "factory": "0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f"
    }))
    .unwrap()
}

fn whitelist(keys: &[&str]) -> Whitelist {
    keys.iter().map(|k| pool(k)).collect()
}

fn key_set(whitelist: &Whitelist) -> BTreeSet<String> {
    whitelist.keys().map(str::to_string).collect()
}

async fn messages(transport: &RecordingTransport, channel: &str) -> Vec<serde_json::Value> {
    transport
        .published_json(&format!("whitelist.pools.{}.{}", CHAIN, channel))
        .await
}

#[tokio::test]
async fn test_scenarios_a_through_e() {
    let h = harness();

    // A: first publish is full
    let a = h
        .coordinator
        .sync(CHAIN, whitelist(&["0xp1", "0xp2", "0xp3"]), false)
        .await
        .unwrap();
    assert_eq!(a.mode, SyncMode::Full);
    assert_eq!((a.total, a.added, a.removed), (3, 0, 0));

    // B: two pools appear
    let b = h
        .coordinator
        .sync(
            CHAIN,
            whitelist(&["0xp1", "0xp2", "0xp3", "0xp4", "0xp5"]),
            false,
        )
        .await
        .unwrap();
    assert_eq!(b.mode, SyncMode::Differential);
    assert_eq!((b.added, b.removed), (2, 0));

    // C: one pool drops out
    let c = h
        .coordinator
        .sync(CHAIN, whitelist(&["0xp1", "0xp2", "0xp4", "0xp5"]), false)
        .await
        .unwrap();
    assert_eq!(c.mode, SyncMode::Differential);
    assert_eq!((c.added, c.removed), (0, 1));

    // D: forced full regardless of history
    let d = h
        .coordinator
        .sync(CHAIN, whitelist(&["0xp1", "0xp2", "0xp4", "0xp5"]), true)
        .await
        .unwrap();
    assert_eq!(d.mode, SyncMode::Full);
    assert_eq!((d.total, d.added, d.removed), (4, 0, 0));

    // E: everything removed, store shows an empty latest whitelist
    let e = h
        .coordinator
        .sync(CHAIN, Whitelist::new(), false)
        .await
        .unwrap();
    assert_eq!(e.mode, SyncMode::Differential);
    assert_eq!((e.total, e.added, e.removed), (0, 0, 4));

    let latest = h.store.load_latest(CHAIN).await.unwrap().unwrap();
    assert_eq!(latest.snapshot_id, e.snapshot_id);
    assert!(latest.items.is_empty());

    let ids = [a.snapshot_id, b.snapshot_id, c.snapshot_id, d.snapshot_id, e.snapshot_id];
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    let kinds: Vec<String> = messages(&h.transport, "minimal")
        .await
        .iter()
        .map(|m| m["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["full", "add", "remove", "full", "remove"]);
}

#[tokio::test]
async fn test_differential_messages_carry_exact_changes() {
    let h = harness();
    h.coordinator
        .sync(CHAIN, whitelist(&["0x01", "0x02"]), false)
        .await
        .unwrap();
    let result = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x02", "0x03"]), false)
        .await
        .unwrap();

    let minimal = messages(&h.transport, "minimal").await;
    let full = messages(&h.transport, "full").await;

    assert_eq!(minimal[1]["type"], "add");
    assert_eq!(minimal[1]["pools"], json!(["0x03"]));
    assert_eq!(full[1]["pools"][0]["address"], "0x03");
    assert_eq!(full[1]["pools"][0]["protocol"], "UniswapV2");

    assert_eq!(minimal[2]["type"], "remove");
    assert_eq!(minimal[2]["pools"], json!(["0x01"]));
    assert_eq!(full[2]["pool_addresses"], json!(["0x01"]));

    for message in minimal[1..].iter().chain(full[1..].iter()) {
        assert_eq!(message["snapshot_id"], json!(result.snapshot_id));
        assert_eq!(message["chain"], CHAIN);
    }
    assert_eq!(minimal[1]["timestamp"], full[2]["timestamp"]);
}

#[tokio::test]
async fn test_unchanged_whitelist_emits_nothing_but_advances_snapshot() {
    let h = harness();
    let first = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x01"]), false)
        .await
        .unwrap();

    // Attribute-only changes are not detected
    let changed = Whitelist::from_values(vec![json!({"address": "0x01", "fee": 100})]).unwrap();
    let second = h.coordinator.sync(CHAIN, changed, false).await.unwrap();

    assert_eq!(second.mode, SyncMode::Differential);
    assert_eq!((second.added, second.removed), (0, 0));
    assert!(second.snapshot_id > first.snapshot_id);
    assert_eq!(h.transport.published().await.len(), 2);
    assert_eq!(h.store.snapshot_count(CHAIN).await, 2);
}

#[tokio::test]
async fn test_round_trip_through_store() {
    let h = harness();
    let pools = whitelist(&["0xaa", "0xbb", "0xcc"]);
    h.coordinator.sync(CHAIN, pools.clone(), false).await.unwrap();

    let latest = h.store.load_latest(CHAIN).await.unwrap().unwrap();
    assert_eq!(key_set(&latest.items), key_set(&pools));
    assert_eq!(latest.items.get("0xbb").unwrap().attributes()["protocol"], "UniswapV2");
}

#[tokio::test]
async fn test_repeated_identical_syncs_keep_ids_increasing() {
    let h = harness();
    let mut last = 0;
    for _ in 0..5 {
        let result = h
            .coordinator
            .sync(CHAIN, whitelist(&["0x01", "0x02"]), false)
            .await
            .unwrap();
        assert!(result.snapshot_id > last);
        last = result.snapshot_id;
    }
}

#[tokio::test]
async fn test_chains_are_independent() {
    let h = harness();
    h.coordinator
        .sync("ethereum", whitelist(&["0x01"]), false)
        .await
        .unwrap();
    let base = h
        .coordinator
        .sync("base", whitelist(&["0x01", "0x02"]), false)
        .await
        .unwrap();

    assert_eq!(base.mode, SyncMode::Full);
    assert_eq!(
        h.transport
            .published_json("whitelist.pools.base.full")
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_load_failure_aborts_before_publishing() {
    let h = harness();
    h.store.set_fail_loads(true);

    let err = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x01"]), false)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::StoreUnavailable { .. }));
    assert!(!err.requires_full_resync());
    assert!(h.transport.published().await.is_empty());
}

#[tokio::test]
async fn test_transport_failure_leaves_store_untouched() {
    let h = harness();
    h.transport
        .fail_subject("whitelist.pools.ethereum.minimal")
        .await;

    let err = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x01"]), false)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TransportUnavailable { .. }));
    assert_eq!(h.store.snapshot_count(CHAIN).await, 0);

    // Next attempt still starts from scratch
    h.transport.clear_failures().await;
    let retry = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x01"]), false)
        .await
        .unwrap();
    assert_eq!(retry.mode, SyncMode::Full);
}

#[tokio::test]
async fn test_partial_publish_is_surfaced() {
    let h = harness();
    h.transport.fail_subject("whitelist.pools.ethereum.full").await;

    let err = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x01"]), false)
        .await
        .unwrap_err();

    match &err {
        SyncError::PartialPublish {
            kind,
            succeeded,
            failed,
            ..
        } => {
            assert_eq!(*kind, MessageKind::Full);
            assert_eq!(*succeeded, Channel::Minimal);
            assert_eq!(*failed, Channel::Full);
        }
        other => panic!("expected partial publish, got {other:?}"),
    }
    assert!(err.requires_full_resync());
    assert_eq!(h.store.snapshot_count(CHAIN).await, 0);
}

#[tokio::test]
async fn test_persist_failure_reports_what_was_published() {
    let h = harness();
    h.store.set_fail_appends(true);

    let err = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x01", "0x02"]), false)
        .await
        .unwrap_err();

    match &err {
        SyncError::SnapshotNotPersisted { result, .. } => {
            assert_eq!(result.mode, SyncMode::Full);
            assert_eq!(result.total, 2);
        }
        other => panic!("expected unpersisted snapshot, got {other:?}"),
    }
    assert!(err.requires_full_resync());
    assert_eq!(h.transport.published().await.len(), 2);

    // Without a stored snapshot the next cycle falls back to full, with a newer id
    h.store.set_fail_appends(false);
    let next = h
        .coordinator
        .sync(CHAIN, whitelist(&["0x01", "0x02"]), false)
        .await
        .unwrap();
    assert_eq!(next.mode, SyncMode::Full);
    if let SyncError::SnapshotNotPersisted { result, .. } = err {
        assert!(next.snapshot_id > result.snapshot_id);
    }
}

#[tokio::test]
async fn test_malformed_input_is_rejected_before_any_io() {
    let h = harness();
    let err = h
        .coordinator
        .sync_values(
            CHAIN,
            vec![
                json!({"address": "0x01"}),
                json!({"protocol": "UniswapV3"}),
            ],
            false,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MalformedInput { index: 1, .. }));
    assert!(h.transport.published().await.is_empty());

    let duplicate = h
        .coordinator
        .sync_values(
            CHAIN,
            vec![json!({"address": "0xAB"}), json!({"address": "0xab"})],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(duplicate, SyncError::MalformedInput { index: 1, .. }));
}

#[tokio::test]
async fn test_subscribers_converge_on_published_state() {
    let h = harness();
    let steps = [
        whitelist(&["0x01", "0x02", "0x03"]),
        whitelist(&["0x01", "0x02", "0x03", "0x04"]),
        whitelist(&["0x02", "0x04", "0x05"]),
        Whitelist::new(),
        whitelist(&["0x06"]),
    ];
    for step in &steps {
        h.coordinator.sync(CHAIN, step.clone(), false).await.unwrap();
    }

    let mut state = WatchState::new(Topics::default(), CHAIN, &Channel::ALL);
    for (subject, payload) in h.transport.published().await {
        let (_, outcome) = state.handle(&subject, &payload).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    let expected: Vec<&str> = vec!["0x06"];
    for channel in Channel::ALL {
        let tracker = state.tracker(channel).unwrap();
        assert_eq!(tracker.keys().collect::<Vec<_>>(), expected);
    }
    let full = state.tracker(Channel::Full).unwrap();
    assert_eq!(full.get("0x06").unwrap().attributes()["protocol"], "UniswapV2");

    // Redelivery of the whole stream changes nothing
    for (subject, payload) in h.transport.published().await {
        let (_, outcome) = state.handle(&subject, &payload).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Stale { .. }));
    }
}
