//! End-to-end registration flows against the in-memory registry.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use beacon_core::{LocaleSnapshot, Platform};
use beacon_store::{KeyValueStore, MemoryStore, SqliteStore, StoreConfig, PENDING_PAYLOAD_KEY};
use beacon_sync::{
    EngineSettings, FlushOutcome, InMemoryRegistry, LifecycleDispatcher, ManualClock,
    RemoteErrorKind, StaticEnvironment, SyncConfig, SyncEngine, SyncError, SyncEventEmitter,
    SyncStatus, TokenOutcome,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Fixtures
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
}

#[derive(Default)]
struct RecordingEmitter {
    errors: Mutex<Vec<(String, bool)>>,
    statuses: Mutex<Vec<SyncStatus>>,
}

impl SyncEventEmitter for RecordingEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        self.statuses.lock().unwrap().push(status.clone());
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        self.errors.lock().unwrap().push((message.to_string(), retryable));
    }
}

struct Fixture {
    engine: Arc<SyncEngine>,
    store: Arc<MemoryStore>,
    registry: Arc<InMemoryRegistry>,
    clock: Arc<ManualClock>,
    environment: Arc<StaticEnvironment>,
    emitter: Arc<RecordingEmitter>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    fn with_store(store: Arc<MemoryStore>) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(t0()));
        let registry = Arc::new(InMemoryRegistry::with_clock(clock.clone()));
        let environment = Arc::new(
            StaticEnvironment::new(LocaleSnapshot::new("America/New_York", -300), Platform::Ios)
                .with_app_version("3.2.1"),
        );
        let emitter = Arc::new(RecordingEmitter::default());

        let engine = SyncEngine::builder()
            .with_store(store.clone())
            .with_registry(registry.clone())
            .with_environment(environment.clone())
            .with_clock(clock.clone())
            .with_emitter(emitter.clone())
            .with_settings(EngineSettings::default())
            .build()
            .unwrap();

        Fixture {
            engine: Arc::new(engine),
            store,
            registry,
            clock,
            environment,
            emitter,
        }
    }

    async fn bound(self) -> (Self, LifecycleDispatcher) {
        let lifecycle = LifecycleDispatcher::new(StdDuration::from_secs(5));
        self.engine.bind(&lifecycle, 0).await;
        (self, lifecycle)
    }

    async fn registered(self) -> Self {
        self.engine.handle_authenticated("user-1").await.unwrap();
        self.engine.register_device().await.unwrap();
        self
    }

    async fn device_id(&self) -> String {
        self.engine.device_id().await.unwrap()
    }
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn first_login_creates_record_without_token() {
    let (fx, lifecycle) = Fixture::new().bound().await;

    let report = lifecycle.sign_in("user-1").await;
    assert_eq!(report.completed, 1);

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.owner_id.as_deref(), Some("user-1"));
    assert_eq!(record.timezone, "America/New_York");
    assert_eq!(record.timezone_offset_minutes, -300);
    assert_eq!(record.platform, Some(Platform::Ios));
    assert_eq!(record.app_version.as_deref(), Some("3.2.1"));
    assert_eq!(record.fcm_token, None);
    assert_eq!(record.created_at, Some(t0()));

    let status = fx.engine.status().await.unwrap();
    assert!(status.registered);
    assert!(!status.has_pending);
    assert!(fx.emitter.statuses.lock().unwrap().iter().any(|s| s.registered));
}

#[tokio::test]
async fn register_without_session_is_rejected() {
    let fx = Fixture::new();

    let err = fx.engine.register_device().await.unwrap_err();
    assert!(matches!(err, SyncError::NotAuthenticated));
    assert!(fx.registry.is_empty().await);
}

#[tokio::test]
async fn offline_registration_is_flushed_later() {
    let fx = Fixture::new();
    fx.engine.handle_authenticated("user-1").await.unwrap();

    fx.registry.set_online(false);
    let err = fx.engine.register_device().await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Network));
    assert!(err.is_retryable());

    let status = fx.engine.status().await.unwrap();
    assert!(status.has_pending);
    assert!(!status.registered);
    assert!(status.last_error.is_some());
    assert_eq!(fx.emitter.errors.lock().unwrap().len(), 1);
    assert!(fx.emitter.errors.lock().unwrap()[0].1);

    fx.registry.set_online(true);
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.owner_id.as_deref(), Some("user-1"));
    assert_eq!(record.last_active_at, Some(t0()));

    let status = fx.engine.status().await.unwrap();
    assert!(status.registered);
    assert!(!status.has_pending);
    assert_eq!(status.last_error, None);
}

#[tokio::test]
async fn pending_registration_waits_for_sign_in() {
    let fx = Fixture::new();

    // First locale check always runs; with no record yet it is deferred
    assert!(fx.engine.update_timezone_or_offset_if_changed().await.unwrap());
    assert_eq!(
        fx.engine.flush_pending_payload().await.unwrap(),
        FlushOutcome::AwaitingAuthentication
    );
    assert!(fx.registry.is_empty().await);

    fx.engine.handle_authenticated("user-1").await.unwrap();
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.owner_id.as_deref(), Some("user-1"));
    assert!(fx.engine.status().await.unwrap().registered);
}

#[tokio::test]
async fn list_owner_devices_returns_registered_record() {
    let fx = Fixture::new().registered().await;

    let devices = fx.engine.list_owner_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_id, fx.device_id().await);
}

// =============================================================================
// Unregister
// =============================================================================

#[tokio::test]
async fn offline_logout_records_pending_unregister() {
    let (fx, lifecycle) = Fixture::new().bound().await;
    lifecycle.sign_in("user-1").await;
    let device_id = fx.device_id().await;
    assert!(fx.registry.get(&device_id).await.is_some());

    fx.registry.set_online(false);
    let report = lifecycle.sign_out(async {}).await;
    assert_eq!(report.completed, 1);

    let raw = fx.store.get(PENDING_PAYLOAD_KEY).await.unwrap().unwrap();
    let pending: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(pending["pendingUnregister"], true);

    let status = fx.engine.status().await.unwrap();
    assert_eq!(status.owner_id, None);
    assert!(!status.registered);

    fx.registry.set_online(true);
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);
    assert!(fx.registry.get(&device_id).await.is_none());
    assert!(fx.store.get(PENDING_PAYLOAD_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn pending_unregister_overrides_pending_fields() {
    let (fx, lifecycle) = Fixture::new().bound().await;
    lifecycle.sign_in("user-1").await;
    let device_id = fx.device_id().await;
    let writes_after_register = fx.registry.write_count();

    fx.registry.set_online(false);
    assert_eq!(
        fx.engine.persist_fcm_token(Some("token-offline".into())).await.unwrap(),
        TokenOutcome::Deferred
    );
    fx.clock.advance(Duration::hours(2));
    assert!(fx.engine.touch_device().await.unwrap());
    lifecycle.sign_out(async {}).await;

    let raw = fx.store.get(PENDING_PAYLOAD_KEY).await.unwrap().unwrap();
    let pending: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(pending["fcmToken"], "token-offline");
    assert_eq!(pending["pendingUnregister"], true);

    fx.registry.set_online(true);
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);

    // One delete, no patch carrying the token or the touch
    assert_eq!(fx.registry.write_count(), writes_after_register + 1);
    assert!(fx.registry.get(&device_id).await.is_none());
    assert!(fx.store.get(PENDING_PAYLOAD_KEY).await.unwrap().is_none());
    assert!(!fx.engine.status().await.unwrap().has_pending);
}

#[tokio::test]
async fn online_logout_deletes_record() {
    let fx = Fixture::new().registered().await;

    fx.engine.unregister_device().await.unwrap();

    assert!(fx.registry.is_empty().await);
    let status = fx.engine.status().await.unwrap();
    assert!(!status.registered);
    assert!(!status.has_pending);
}

#[tokio::test]
async fn login_after_offline_logout_cancels_unregister() {
    let fx = Fixture::new().registered().await;

    fx.registry.set_online(false);
    assert!(fx.engine.unregister_device().await.is_err());
    fx.engine.handle_authenticated("user-2").await.unwrap();
    assert!(fx.engine.register_device().await.is_err());

    fx.registry.set_online(true);
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.owner_id.as_deref(), Some("user-2"));
}

// =============================================================================
// Flush
// =============================================================================

#[tokio::test]
async fn concurrent_flushes_write_once() {
    let fx = Fixture::new();
    fx.engine.handle_authenticated("user-1").await.unwrap();
    fx.registry.set_online(false);
    assert!(fx.engine.register_device().await.is_err());

    fx.registry.set_online(true);
    fx.registry.set_latency(Some(StdDuration::from_millis(50))).await;
    let before = fx.registry.write_count();

    let (a, b, c) = tokio::join!(
        fx.engine.flush_pending_payload(),
        fx.engine.flush_pending_payload(),
        fx.engine.flush_pending_payload(),
    );
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

    let flushed = outcomes.iter().filter(|o| **o == FlushOutcome::Flushed).count();
    let skipped = outcomes
        .iter()
        .filter(|o| **o == FlushOutcome::AlreadyInFlight)
        .count();
    assert_eq!(flushed, 1);
    assert_eq!(skipped, 2);
    assert_eq!(fx.registry.write_count(), before + 1);
    assert!(!fx.engine.status().await.unwrap().has_pending);
}

#[tokio::test]
async fn unchanged_retry_backs_off() {
    let fx = Fixture::new().registered().await;
    fx.clock.advance(Duration::hours(2));

    fx.registry.set_online(false);
    assert!(fx.engine.touch_device().await.unwrap());
    assert!(fx.engine.flush_pending_payload().await.is_err());

    fx.registry.set_online(true);
    assert_eq!(
        fx.engine.flush_pending_payload().await.unwrap(),
        FlushOutcome::BackedOff
    );

    fx.clock.advance(EngineSettings::default().retry_interval);
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.last_active_at, Some(t0() + Duration::hours(2) + Duration::minutes(5)));
}

#[tokio::test]
async fn changed_fields_bypass_backoff() {
    let (fx, lifecycle) = Fixture::new().bound().await;
    lifecycle.sign_in("user-1").await;

    fx.registry.set_online(false);
    fx.clock.advance(Duration::hours(2));
    assert!(fx.engine.touch_device().await.unwrap());
    assert!(fx.engine.flush_pending_payload().await.is_err());

    assert_eq!(
        fx.engine.persist_fcm_token(Some("token-1".into())).await.unwrap(),
        TokenOutcome::Deferred
    );

    fx.registry.set_online(true);
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);
    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.fcm_token.as_deref(), Some("token-1"));
}

#[tokio::test]
async fn malformed_pending_payload_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    store.insert_raw(PENDING_PAYLOAD_KEY, "{not json").await;
    let fx = Fixture::with_store(store);

    assert_eq!(
        fx.engine.flush_pending_payload().await.unwrap(),
        FlushOutcome::NothingPending
    );
    assert_eq!(fx.registry.write_count(), 0);
}

#[tokio::test]
async fn auth_failure_is_not_retryable() {
    let fx = Fixture::new().registered().await;
    fx.registry.fail_with(Some(RemoteErrorKind::Auth)).await;

    let err = fx.engine.unregister_device().await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Auth));
    assert!(!err.is_retryable());
    assert!(fx.engine.status().await.unwrap().has_pending);
}

// =============================================================================
// Locale & Touch
// =============================================================================

#[tokio::test]
async fn dst_transition_respects_change_debounce() {
    let fx = Fixture::new().registered().await;

    fx.environment
        .set_locale(LocaleSnapshot::new("America/New_York", -240));

    fx.clock.advance(Duration::minutes(5));
    assert!(!fx.engine.update_timezone_or_offset_if_changed().await.unwrap());

    fx.clock.advance(Duration::minutes(6));
    assert!(fx.engine.update_timezone_or_offset_if_changed().await.unwrap());

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.timezone_offset_minutes, -240);

    // Cached locale now matches: the unchanged interval applies again
    fx.clock.advance(Duration::minutes(30));
    assert!(!fx.engine.update_timezone_or_offset_if_changed().await.unwrap());
}

#[tokio::test]
async fn unchanged_locale_refreshes_daily() {
    let fx = Fixture::new().registered().await;
    let writes = fx.registry.write_count();

    fx.clock.advance(Duration::hours(23));
    assert!(!fx.engine.update_timezone_or_offset_if_changed().await.unwrap());

    fx.clock.advance(Duration::hours(1));
    assert!(fx.engine.update_timezone_or_offset_if_changed().await.unwrap());
    assert_eq!(fx.registry.write_count(), writes + 1);
}

#[tokio::test]
async fn locale_change_before_registration_is_deferred() {
    let fx = Fixture::new();
    fx.environment.set_locale(LocaleSnapshot::new("Asia/Kolkata", 330));

    assert!(fx.engine.update_timezone_or_offset_if_changed().await.unwrap());
    assert!(fx.engine.status().await.unwrap().has_pending);

    fx.engine.handle_authenticated("user-1").await.unwrap();
    let record = fx.engine.register_device().await.unwrap();
    assert_eq!(record.timezone, "Asia/Kolkata");
    assert_eq!(record.timezone_offset_minutes, 330);
    assert!(!fx.engine.status().await.unwrap().has_pending);
}

#[tokio::test]
async fn touch_is_throttled() {
    let fx = Fixture::new().registered().await;

    assert!(!fx.engine.touch_device().await.unwrap());

    fx.clock.advance(Duration::minutes(59));
    assert!(!fx.engine.touch_device().await.unwrap());

    fx.clock.advance(Duration::minutes(1));
    assert!(fx.engine.touch_device().await.unwrap());

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.last_active_at, Some(t0() + Duration::hours(1)));
}

#[tokio::test]
async fn touch_before_registration_is_skipped() {
    let fx = Fixture::new();
    assert!(!fx.engine.touch_device().await.unwrap());
    assert!(!fx.engine.status().await.unwrap().has_pending);
}

// =============================================================================
// Push Token
// =============================================================================

#[tokio::test]
async fn token_before_binding_stays_local() {
    let fx = Fixture::new().registered().await;

    let outcome = fx.engine.persist_fcm_token(Some("token-1".into())).await.unwrap();
    assert_eq!(outcome, TokenOutcome::LocalOnly);

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.fcm_token, None);
    assert!(!fx.engine.status().await.unwrap().has_pending);
}

#[tokio::test]
async fn token_before_registration_joins_registration() {
    let (fx, lifecycle) = Fixture::new().bound().await;

    let outcome = fx.engine.persist_fcm_token(Some("token-1".into())).await.unwrap();
    assert_eq!(outcome, TokenOutcome::Deferred);

    lifecycle.sign_in("user-1").await;

    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.fcm_token.as_deref(), Some("token-1"));
    assert_eq!(record.fcm_token_updated_at, Some(t0()));
    assert!(!fx.engine.status().await.unwrap().has_pending);
}

#[tokio::test]
async fn token_set_and_clear_on_registered_device() {
    let (fx, lifecycle) = Fixture::new().bound().await;
    lifecycle.sign_in("user-1").await;
    let device_id = fx.device_id().await;

    fx.clock.advance(Duration::minutes(1));
    let outcome = fx.engine.persist_fcm_token(Some("token-1".into())).await.unwrap();
    assert_eq!(outcome, TokenOutcome::Sent);
    let record = fx.registry.get(&device_id).await.unwrap();
    assert_eq!(record.fcm_token.as_deref(), Some("token-1"));
    assert_eq!(record.fcm_token_updated_at, Some(t0() + Duration::minutes(1)));

    // Permission revoked: blank token clears the remote value
    fx.clock.advance(Duration::minutes(1));
    let outcome = fx.engine.persist_fcm_token(Some("   ".into())).await.unwrap();
    assert_eq!(outcome, TokenOutcome::Sent);
    let record = fx.registry.get(&device_id).await.unwrap();
    assert_eq!(record.fcm_token, None);
    assert_eq!(record.fcm_token_updated_at, Some(t0() + Duration::minutes(2)));
}

#[tokio::test]
async fn token_clear_survives_offline_flush() {
    let (fx, lifecycle) = Fixture::new().bound().await;
    lifecycle.sign_in("user-1").await;
    fx.engine.persist_fcm_token(Some("token-1".into())).await.unwrap();

    fx.registry.set_online(false);
    let outcome = fx.engine.persist_fcm_token(None).await.unwrap();
    assert_eq!(outcome, TokenOutcome::Deferred);

    let raw = fx.store.get(PENDING_PAYLOAD_KEY).await.unwrap().unwrap();
    let pending: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(pending["fcmToken"], "");

    fx.registry.set_online(true);
    assert_eq!(fx.engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);
    let record = fx.registry.get(&fx.device_id().await).await.unwrap();
    assert_eq!(record.fcm_token, None);
}

#[tokio::test]
async fn oversized_token_is_rejected() {
    let (fx, _lifecycle) = Fixture::new().bound().await;

    let err = fx
        .engine
        .persist_fcm_token(Some("x".repeat(beacon_core::MAX_TOKEN_LEN + 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beacon.db");
    let registry = Arc::new(InMemoryRegistry::new());
    let environment = Arc::new(StaticEnvironment::new(
        LocaleSnapshot::new("Europe/Lisbon", 0),
        Platform::Android,
    ));

    let build = |store: Arc<SqliteStore>| {
        SyncEngine::builder()
            .with_store(store)
            .with_registry(registry.clone())
            .with_environment(environment.clone())
            .build()
            .unwrap()
    };

    let store = Arc::new(SqliteStore::open(StoreConfig::new(&path)).await.unwrap());
    let engine = build(store.clone());
    engine.handle_authenticated("user-1").await.unwrap();
    registry.set_online(false);
    assert!(engine.register_device().await.is_err());
    let device_id = engine.device_id().await.unwrap();
    drop(engine);
    store.close().await;

    let store = Arc::new(SqliteStore::open(StoreConfig::new(&path)).await.unwrap());
    let engine = build(store);
    assert_eq!(engine.device_id().await.unwrap(), device_id);
    assert!(engine.status().await.unwrap().has_pending);

    registry.set_online(true);
    assert_eq!(engine.flush_pending_payload().await.unwrap(), FlushOutcome::Flushed);
    assert!(registry.get(&device_id).await.is_some());
}

#[tokio::test]
async fn open_uses_configured_database_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SyncConfig::default();
    config.storage.path = Some(dir.path().join("nested").join("beacon.db"));
    config.device.timezone = Some("Europe/Oslo".into());

    let registry = Arc::new(InMemoryRegistry::new());
    let engine = SyncEngine::open(&config, registry.clone()).await.unwrap();
    engine.handle_authenticated("user-1").await.unwrap();
    let record = engine.register_device().await.unwrap();

    assert_eq!(record.timezone, "Europe/Oslo");
    assert!(dir.path().join("nested").join("beacon.db").exists());
}
