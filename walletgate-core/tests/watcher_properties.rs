//! End-to-end behaviour of registration, reconciliation, callback relay and
//! provider sync against the in-memory stores and the mock provider.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use walletgate_core::callback::{CallbackForwarder, CallbackHandler};
use walletgate_core::model::{NewUser, NewWatcher};
use walletgate_core::provider::{CallbackPayload, MockProvider, VcSummary};
use walletgate_core::store::{
    MemoryUserStore, MemoryVcStore, MemoryWatcherStore, UserStore, WatcherStore,
};
use walletgate_core::{
    GatewayConfig, HousekeepingService, ReconciliationJob, WatcherRegistrationService,
    TRIGGER_CRON, TRIGGER_MANUAL,
};

const BASE_URL: &str = "https://gw.example";

fn config() -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig::new(BASE_URL, "watcher@gw.example"))
}

fn unregistered(public_id: &str) -> NewWatcher {
    NewWatcher {
        vc_public_id: public_id.into(),
        user_id: None,
        provider: "mock".into(),
        watcher_registered: false,
        watcher_email: "watcher@gw.example".into(),
        watcher_callback_url: None,
        forward_watcher_callback_url: None,
        created_by: None,
    }
}

async fn seed_unregistered(store: &MemoryWatcherStore, count: usize) {
    for i in 0..count {
        store
            .find_or_create(unregistered(&format!("vc-{i}")))
            .await
            .unwrap();
    }
}

#[derive(Default)]
struct RecordingForwarder {
    targets: Mutex<Vec<String>>,
}

impl RecordingForwarder {
    fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallbackForwarder for RecordingForwarder {
    async fn forward(
        &self,
        url: &str,
        _payload: &CallbackPayload,
    ) -> walletgate_core::Result<u16> {
        self.targets.lock().unwrap().push(url.to_string());
        Ok(200)
    }
}

fn callback_handler(
    store: Arc<MemoryWatcherStore>,
    forwarder: Arc<RecordingForwarder>,
) -> CallbackHandler {
    CallbackHandler::new(
        store,
        MockProvider::builder().build().adapter(),
        forwarder,
        config(),
    )
}

fn callback(public_id: Option<&str>) -> CallbackPayload {
    CallbackPayload {
        record_public_id: public_id.map(Into::into),
        message_id: Some("msg-1".into()),
        ..Default::default()
    }
}

// ── Registration ────────────────────────────────────────────────────────

#[tokio::test]
async fn registration_is_idempotent() {
    let mock = MockProvider::builder().build();
    let store = Arc::new(MemoryWatcherStore::new());
    let service = WatcherRegistrationService::new(mock.adapter(), store.clone(), config());

    let first = service
        .register_watcher_for_vc("vc-1", "mock", TRIGGER_MANUAL, None)
        .await;
    let second = service
        .register_watcher_for_vc("vc-1", "mock", TRIGGER_MANUAL, None)
        .await;

    assert!(first.success);
    assert!(second.success);
    assert_eq!(second.message, "Watcher already registered");
    assert_eq!(mock.watch_calls(), 1);
    assert_eq!(store.count(None).await.unwrap(), 1);
}

// ── Callback relay ──────────────────────────────────────────────────────

#[tokio::test]
async fn callback_never_forwards_to_self() {
    let store = Arc::new(MemoryWatcherStore::new());
    let mut watcher = unregistered("pub-self");
    watcher.watcher_registered = true;
    watcher.watcher_callback_url = Some(format!("{BASE_URL}/api/wallet/vcs/watch/callback"));
    store.find_or_create(watcher).await.unwrap();
    let forwarder = Arc::new(RecordingForwarder::default());

    let response = callback_handler(store, forwarder.clone())
        .process_watch_callback(&callback(Some("pub-self")))
        .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.data.forwarded_callbacks, 0);
    assert_eq!(response.data.skipped_callbacks, 1);
    assert!(forwarder.targets().is_empty());
}

#[tokio::test]
async fn callback_fans_out_to_external_targets() {
    let store = Arc::new(MemoryWatcherStore::new());
    let targets = [
        ("a@x", Some("https://one.example/hook")),
        ("b@x", Some("https://two.example/hook")),
        ("c@x", None),
    ];
    for (email, forward) in targets {
        let mut watcher = unregistered("pub-fan");
        watcher.watcher_email = email.into();
        watcher.watcher_registered = true;
        watcher.watcher_callback_url = Some(format!("{BASE_URL}/api/wallet/vcs/watch/callback"));
        watcher.forward_watcher_callback_url = forward.map(Into::into);
        store.find_or_create(watcher).await.unwrap();
    }
    let forwarder = Arc::new(RecordingForwarder::default());

    let response = callback_handler(store, forwarder.clone())
        .process_watch_callback(&callback(Some("pub-fan")))
        .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.data.total_records, 3);
    assert_eq!(response.data.forwarded_callbacks, 2);
    assert_eq!(response.data.failed_callbacks, 0);
    assert_eq!(
        forwarder.targets(),
        vec![
            "https://one.example/hook".to_string(),
            "https://two.example/hook".to_string()
        ]
    );
}

#[tokio::test]
async fn callback_missing_id_is_400_unknown_id_is_404() {
    let store = Arc::new(MemoryWatcherStore::new());
    let handler = callback_handler(store, Arc::new(RecordingForwarder::default()));

    let missing = handler.process_watch_callback(&callback(None)).await;
    assert_eq!(missing.status_code, 400);
    assert!(!missing.data.processed);

    let blank = handler.process_watch_callback(&callback(Some("  "))).await;
    assert_eq!(blank.status_code, 400);

    let unknown = handler.process_watch_callback(&callback(Some("nope"))).await;
    assert_eq!(unknown.status_code, 404);
    assert_eq!(unknown.data.record_public_id.as_deref(), Some("nope"));
}

// ── Reconciliation ──────────────────────────────────────────────────────

fn sorted(ids: &[String]) -> Vec<String> {
    let mut ids = ids.to_vec();
    ids.sort_by_key(|id| id.trim_start_matches("vc-").parse::<usize>().unwrap_or(usize::MAX));
    ids
}

fn ids(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("vc-{i}")).collect()
}

#[tokio::test(start_paused = true)]
async fn reconciliation_runs_sequential_batches_of_five() {
    let mock = MockProvider::builder()
        .watch_delay(Duration::from_millis(50))
        .build();
    let store = Arc::new(MemoryWatcherStore::new());
    seed_unregistered(&store, 12).await;

    let registration = WatcherRegistrationService::new(mock.adapter(), store.clone(), config());
    let job = ReconciliationJob::new(registration, store.clone());
    let run = tokio::spawn(async move { job.register_watchers_for_multiple_vcs(TRIGGER_CRON).await });

    // Batch 1 is in flight until t=50ms
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert_eq!(mock.watch_calls(), 5);
    assert!(mock.watched().is_empty());

    // Batch 2 starts only once batch 1 has drained
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.watch_calls(), 10);
    assert_eq!(sorted(&mock.watched()), ids(0..5));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.watch_calls(), 12);
    assert_eq!(mock.watched().len(), 10);

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.total_processed, 12);
    assert_eq!(summary.success_count, 12);
    assert_eq!(mock.peak_in_flight(), 5);
    assert_eq!(store.count(Some(false)).await.unwrap(), 0);

    let watched = mock.watched();
    assert_eq!(sorted(&watched[..5]), ids(0..5));
    assert_eq!(sorted(&watched[5..10]), ids(5..10));
    assert_eq!(sorted(&watched[10..]), ids(10..12));
}

#[tokio::test]
async fn reconciliation_aggregates_partial_failures() {
    let mock = MockProvider::builder().fail_watch_calls([2, 4]).build();
    let store = Arc::new(MemoryWatcherStore::new());
    seed_unregistered(&store, 4).await;

    let registration = WatcherRegistrationService::new(mock.adapter(), store.clone(), config());
    let summary = ReconciliationJob::new(registration, store.clone())
        .register_watchers_for_multiple_vcs(TRIGGER_MANUAL)
        .await
        .unwrap();

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 2);
    assert_eq!(summary.total_processed, 4);
    assert_eq!(store.count(Some(false)).await.unwrap(), 2);
    assert!(summary
        .results
        .iter()
        .filter(|r| !r.result.success)
        .all(|r| r.result.status_code == 502));
}

// ── Provider sync ───────────────────────────────────────────────────────

#[tokio::test]
async fn provider_sync_is_idempotent() {
    let mock = MockProvider::builder().build();
    let summary = |id: &str| VcSummary {
        id: id.into(),
        name: "Credential".into(),
        active: true,
        issued_at: String::new(),
        expires_at: String::new(),
        document_title: "Degree".into(),
        identifier: Some(id.into()),
        public_id: Some(id.into()),
    };
    mock.set_vcs("tok-ada", vec![summary("pub-a"), summary("pub-b")]);
    mock.set_vcs("tok-grace", vec![summary("pub-c")]);

    let users = Arc::new(MemoryUserStore::new());
    for (name, token) in [("ada", Some("tok-ada")), ("grace", Some("tok-grace")), ("idle", None)] {
        users
            .create(NewUser {
                first_name: name.into(),
                last_name: "Test".into(),
                account_id: format!("acc-{name}"),
                username: name.into(),
                password_hash: String::new(),
                token: token.map(Into::into),
                did: None,
                phone: None,
                email: None,
            })
            .await
            .unwrap();
    }
    let watchers = Arc::new(MemoryWatcherStore::new());
    let service = HousekeepingService::new(
        watchers.clone(),
        Arc::new(MemoryVcStore::new()),
        users,
        mock.adapter(),
        config(),
    );

    let first = service
        .sync_vcs_and_add_watchers_for_all_users("mock", 1)
        .await
        .unwrap();
    assert_eq!(first.total_users, 3);
    assert_eq!(first.users_processed, 2);
    assert_eq!(first.total_vcs_from_provider, 3);
    assert_eq!(first.new_vcs_added, 3);
    assert_eq!(first.new_watchers_created, 3);
    assert_eq!(first.errors, 0);

    let second = service
        .sync_vcs_and_add_watchers_for_all_users("mock", 1)
        .await
        .unwrap();
    assert_eq!(second.new_vcs_added, 0);
    assert_eq!(second.existing_vcs_found, first.new_vcs_added);
    assert_eq!(second.new_watchers_created, 0);
    assert_eq!(second.existing_watchers_found, 3);
    assert_eq!(watchers.count(Some(false)).await.unwrap(), 3);
}
