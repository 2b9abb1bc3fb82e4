//! End-to-end tests for the sync orchestration.
//!
//! These drive whole passes against in-memory remotes: direction
//! decisions, record-level merging, the circuit breaker, mutual
//! exclusion, and the event stream.

use parking_lot::RwLock;
use satchel_engine::{Bundle, Record, Store, Timestamp};
use satchel_sync::{
    BlobStore, DriveAdapter, MemoryAdapter, MemoryBlobStore, PassOutcome, RemoteAdapter,
    RemoteHandle, SyncConfig, SyncError, SyncEvent, SyncOrchestrator,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn record(id: &str, updated_at: Timestamp) -> Record {
    let mut payload = serde_json::Map::new();
    payload.insert("label".to_string(), json!(id));
    Record::new(id, updated_at, payload)
}

fn record_with(id: &str, updated_at: Timestamp, key: &str, value: serde_json::Value) -> Record {
    let mut payload = serde_json::Map::new();
    payload.insert(key.to_string(), value);
    Record::new(id, updated_at, payload)
}

fn shared_store() -> Arc<RwLock<Store>> {
    Arc::new(RwLock::new(Store::new()))
}

fn orchestrator_with(
    adapter: Arc<MemoryAdapter>,
    store: Arc<RwLock<Store>>,
    config: SyncConfig,
) -> SyncOrchestrator {
    SyncOrchestrator::new(config, store, adapter as Arc<dyn RemoteAdapter>)
}

#[tokio::test]
async fn newer_local_snapshot_is_pushed_exactly_once() {
    let t = 1_000_000;
    let store = shared_store();
    store.write().put("quotes", record("q-1", t + 10)).unwrap();

    let adapter = Arc::new(MemoryAdapter::new());
    let mut remote = Bundle::new(t);
    remote.add_record("quotes", record("q-1", t));
    adapter.set_bundle(remote);

    let orchestrator = orchestrator_with(adapter.clone(), store.clone(), SyncConfig::default());
    let report = orchestrator.sync_all().await.unwrap().unwrap();

    assert!(matches!(report.outcome, PassOutcome::Pushed { .. }));
    assert_eq!(report.last_sync_time, t + 10);
    assert_eq!(adapter.upload_count(), 1);
    assert_eq!(adapter.bundle().unwrap().created_at, t + 10);

    // Watermark persisted in the settings collection
    assert_eq!(store.read().last_sync_time(), Some(t + 10));
}

#[tokio::test]
async fn newer_remote_snapshot_replaces_the_local_store() {
    let store = shared_store();
    store.write().put("quotes", record("q1", 100)).unwrap();
    store.write().put("quotes", record("stale", 150)).unwrap();

    let adapter = Arc::new(MemoryAdapter::new());
    let mut remote = Bundle::new(2000);
    remote.add_record("quotes", record_with("q1", 200, "amount", json!(50)));
    let mut gone = record("c9", 180);
    gone.mark_deleted(190);
    remote.add_record("contacts", gone);
    adapter.set_bundle(remote);

    let orchestrator = orchestrator_with(adapter.clone(), store.clone(), SyncConfig::default());
    let report = orchestrator.sync_all().await.unwrap().unwrap();

    assert_eq!(report.last_sync_time, 2000);
    assert!(matches!(report.outcome, PassOutcome::Pulled { records: 2 }));
    assert_eq!(adapter.upload_count(), 0);

    let store = store.read();
    // The merged record equals the remote version
    let q1 = store.get("quotes", "q1").unwrap();
    assert_eq!(q1.updated_at, 200);
    assert_eq!(q1.payload["amount"], json!(50));
    // Everything the remote never heard of is gone
    assert!(store.get("quotes", "stale").is_none());
    // Remote tombstones stay invisible but present
    assert!(store.get("contacts", "c9").is_none());
    assert!(store.get_including_deleted("contacts", "c9").is_some());
}

#[tokio::test]
async fn matching_snapshots_transfer_nothing() {
    let store = shared_store();
    store.write().put("invoices", record("inv-1", 1000)).unwrap();

    let adapter = Arc::new(MemoryAdapter::new());
    let mut remote = Bundle::new(1000);
    remote.add_record("invoices", record("inv-1", 1000));
    adapter.set_bundle(remote);

    let orchestrator = orchestrator_with(adapter.clone(), store.clone(), SyncConfig::default());
    let report = orchestrator.sync_all().await.unwrap().unwrap();

    assert_eq!(report.outcome, PassOutcome::NoChange);
    assert_eq!(report.last_sync_time, 1000);
    assert_eq!(adapter.upload_count(), 0);
    assert_eq!(store.read().last_sync_time(), Some(1000));
}

#[tokio::test]
async fn offline_pass_is_a_noop() {
    let adapter = Arc::new(MemoryAdapter::new());
    let orchestrator = orchestrator_with(adapter.clone(), shared_store(), SyncConfig::default());

    orchestrator.set_online(false);
    let result = orchestrator.sync_all().await.unwrap();

    assert!(result.is_none());
    assert_eq!(adapter.download_count(), 0);
}

#[tokio::test]
async fn breaker_opens_after_five_failures_and_recovers_after_cooldown() {
    let config = SyncConfig {
        failure_threshold: 5,
        breaker_cooldown: Duration::from_millis(50),
        ..Default::default()
    };
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.fail_next(100);

    let orchestrator = orchestrator_with(adapter.clone(), shared_store(), config);

    for attempt in 1u32..=5 {
        let err = orchestrator.sync_all().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(orchestrator.status().consecutive_failures, attempt);
    }
    assert!(orchestrator.status().circuit_open);

    // Suppressed while the circuit is open
    assert!(orchestrator.sync_all().await.unwrap().is_none());

    // After the cooldown one probe is allowed; let it succeed
    tokio::time::sleep(Duration::from_millis(70)).await;
    adapter.fail_next(0);
    let report = orchestrator.sync_all().await.unwrap();

    assert!(report.is_some());
    assert_eq!(orchestrator.status().consecutive_failures, 0);
    assert!(!orchestrator.status().circuit_open);
}

#[tokio::test]
async fn manual_reset_closes_the_circuit_immediately() {
    let config = SyncConfig {
        failure_threshold: 2,
        breaker_cooldown: Duration::from_secs(3600),
        ..Default::default()
    };
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.fail_next(2);

    let orchestrator = orchestrator_with(adapter.clone(), shared_store(), config);
    for _ in 0..2 {
        let _ = orchestrator.sync_all().await;
    }
    assert!(orchestrator.status().circuit_open);

    orchestrator.reset_breaker();
    assert!(!orchestrator.status().circuit_open);
    assert!(orchestrator.sync_all().await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn concurrent_triggers_run_exactly_one_pass() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.set_download_delay(Duration::from_millis(200));

    let orchestrator = orchestrator_with(adapter.clone(), shared_store(), SyncConfig::default());

    // Simulate the timer and a reconnect firing at the same moment
    let (first, second) = tokio::join!(orchestrator.sync_all(), orchestrator.sync_all());

    let reports = [first.unwrap(), second.unwrap()];
    assert_eq!(reports.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(reports.iter().filter(|r| r.is_none()).count(), 1);
    assert_eq!(adapter.download_count(), 1);
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let store = shared_store();
    store.write().put("quotes", record("q-1", 500)).unwrap();

    let adapter = Arc::new(MemoryAdapter::new());
    let orchestrator = orchestrator_with(adapter, store, SyncConfig::default());
    let mut events = orchestrator.subscribe();

    orchestrator.sync_all().await.unwrap();

    assert_eq!(events.recv().await.unwrap(), SyncEvent::SyncStarted);
    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::SyncCompleted { last_sync_time: 500 }
    );
}

#[tokio::test]
async fn failure_events_carry_the_retry_count() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.fail_next(2);

    let orchestrator = orchestrator_with(adapter, shared_store(), SyncConfig::default());
    let mut events = orchestrator.subscribe();

    let _ = orchestrator.sync_all().await;
    let _ = orchestrator.sync_all().await;

    assert_eq!(events.recv().await.unwrap(), SyncEvent::SyncStarted);
    assert!(matches!(
        events.recv().await.unwrap(),
        SyncEvent::SyncError { retries: 1, .. }
    ));
    assert_eq!(events.recv().await.unwrap(), SyncEvent::SyncStarted);
    assert!(matches!(
        events.recv().await.unwrap(),
        SyncEvent::SyncError { retries: 2, .. }
    ));
}

#[tokio::test]
async fn per_collection_remote_merges_record_by_record() {
    let store = shared_store();
    {
        let mut store = store.write();
        store.put("quotes", record("q1", 100)).unwrap();
        store.put("invoices", record("inv-new", 400)).unwrap();
        store.put("contacts", record("c1", 250)).unwrap();
        store.delete("contacts", "c1", 300).unwrap();
    }

    let adapter = Arc::new(MemoryAdapter::per_collection());
    let mut remote = Bundle::new(0);
    remote.add_record("quotes", record_with("q1", 200, "amount", json!(50)));
    remote.add_record("contacts", record("c1", 50));
    remote.add_record("suppliers", record("s1", 75));
    adapter.set_bundle(remote);

    let orchestrator = orchestrator_with(adapter.clone(), store.clone(), SyncConfig::default());
    let report = orchestrator.sync_all().await.unwrap().unwrap();

    let PassOutcome::Merged { stats, .. } = report.outcome else {
        panic!("expected a merged outcome, got {:?}", report.outcome);
    };
    assert_eq!(stats.remote_wins, 1);
    assert_eq!(stats.deletions_propagated, 1);
    assert!(stats.local_creates >= 1);
    assert_eq!(stats.remote_creates, 1);

    {
        let store = store.read();
        // Newer remote edit won
        assert_eq!(
            store.get("quotes", "q1").unwrap().payload["amount"],
            json!(50)
        );
        // Local deletion beat the remote copy
        assert!(store.get("contacts", "c1").is_none());
        assert!(store
            .get_including_deleted("contacts", "c1")
            .unwrap()
            .deleted);
        // New records survived on both sides
        assert!(store.get("invoices", "inv-new").is_some());
        assert!(store.get("suppliers", "s1").is_some());
    }

    // Every merged collection was written back to the remote
    let saved = adapter.saved_collections();
    let quotes = saved
        .iter()
        .find(|(name, _)| name == "quotes")
        .map(|(_, records)| records)
        .unwrap();
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].payload["amount"], json!(50));

    let contacts = saved
        .iter()
        .find(|(name, _)| name == "contacts")
        .map(|(_, records)| records)
        .unwrap();
    assert!(contacts.iter().any(|r| r.id == "c1" && r.deleted));
}

#[tokio::test]
async fn two_devices_converge_through_a_drive_file() {
    let blobs = Arc::new(MemoryBlobStore::new());

    // Device A pushes its data
    let store_a = shared_store();
    store_a.write().put("quotes", record("q-1", 1000)).unwrap();
    let orchestrator_a = SyncOrchestrator::new(
        SyncConfig::default(),
        store_a,
        Arc::new(DriveAdapter::new(blobs.clone(), "satchel-data.json")),
    );
    let report = orchestrator_a.sync_all().await.unwrap().unwrap();
    assert!(matches!(report.outcome, PassOutcome::Pushed { .. }));

    // Device B starts empty and pulls the same file
    let store_b = shared_store();
    let orchestrator_b = SyncOrchestrator::new(
        SyncConfig::default(),
        store_b.clone(),
        Arc::new(DriveAdapter::new(blobs, "satchel-data.json")),
    );
    let report = orchestrator_b.sync_all().await.unwrap().unwrap();

    assert!(matches!(report.outcome, PassOutcome::Pulled { .. }));
    assert!(store_b.read().get("quotes", "q-1").is_some());
}

#[tokio::test]
async fn id_less_remote_rows_are_skipped_not_fatal() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let adapter = DriveAdapter::new(blobs.clone(), "satchel-data.json");
    let handle = adapter.ensure_handle().await.unwrap();
    blobs
        .write(
            &handle.0,
            &json!({
                "createdAt": 5000,
                "collections": {
                    "quotes": [
                        {"customer": "no id here", "updatedAt": 4000},
                        {"id": "q-ok", "updatedAt": 4500}
                    ]
                }
            })
            .to_string(),
        )
        .await
        .unwrap();

    let store = shared_store();
    let orchestrator =
        SyncOrchestrator::new(SyncConfig::default(), store.clone(), Arc::new(adapter));
    let report = orchestrator.sync_all().await.unwrap().unwrap();

    assert!(matches!(report.outcome, PassOutcome::Pulled { records: 1 }));
    assert!(store.read().get("quotes", "q-ok").is_some());
}

#[tokio::test]
async fn authorization_failures_bypass_the_breaker() {
    struct RejectingRemote;

    #[async_trait::async_trait]
    impl RemoteAdapter for RejectingRemote {
        async fn ensure_handle(&self) -> satchel_sync::Result<RemoteHandle> {
            Ok(RemoteHandle("remote".into()))
        }
        async fn download(&self, _: &RemoteHandle) -> satchel_sync::Result<Option<Bundle>> {
            Err(SyncError::Unauthorized)
        }
        async fn upload(&self, _: &RemoteHandle, _: &Bundle) -> satchel_sync::Result<()> {
            Err(SyncError::Unauthorized)
        }
    }

    let orchestrator = SyncOrchestrator::new(
        SyncConfig::default(),
        shared_store(),
        Arc::new(RejectingRemote),
    );

    let err = orchestrator.sync_all().await.unwrap_err();
    assert!(err.is_auth());

    // Needs re-authentication, not retries: the breaker is untouched
    assert_eq!(orchestrator.status().consecutive_failures, 0);
    assert!(!orchestrator.status().circuit_open);
}
