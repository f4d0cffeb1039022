//! # Sync Engine
//!
//! Owns the device's registration with the remote registry. Every public
//! operation tries the registry first and, when that fails, folds the intent
//! into the pending write so nothing is lost.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine Architecture                          │
//! │                                                                         │
//! │   AuthLifecycle ──► register / unregister                              │
//! │   platform      ──► persist_fcm_token / update_timezone / touch         │
//! │   FlushWorker   ──► flush_pending_payload                               │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                          SyncEngine                              │  │
//! │  │                                                                  │  │
//! │  │  ThrottlePolicy / BackoffPolicy   (beacon-core, pure)            │  │
//! │  │  DeviceIdentity / PendingWriteStore / SyncStateStore             │  │
//! │  │                                   (beacon-store)                 │  │
//! │  └──────────────┬──────────────────────────────────┬────────────────┘  │
//! │                 ▼                                  ▼                    │
//! │        RemoteRegistry                      SyncEventEmitter            │
//! │        upsert / patch / delete / list      status + error events       │
//! │                                                                         │
//! │  FLUSH DISPATCH:                                                       │
//! │  ───────────────                                                       │
//! │  pending_unregister ─────────────► delete_device                       │
//! │  not registered (owner known) ───► upsert_device(full record)          │
//! │  registered ─────────────────────► patch_device(pending fields)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beacon_core::backoff::should_backoff;
use beacon_core::throttle::{should_touch, LocaleThrottle};
use beacon_core::validation::{normalize_token, validate_offset_minutes, validate_timezone};
use beacon_core::{
    DevicePatch, DeviceRecord, LocaleSnapshot, PendingUpdate, PendingWrite, TokenUpdate,
    ValidationError,
};
use beacon_store::{
    DeviceIdentity, KeyValueStore, PendingWriteStore, SqliteStore, StoreConfig, StoreError,
    SyncState, SyncStateStore,
};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{DeviceSettings, SyncConfig};
use crate::environment::{DeviceEnvironment, SystemEnvironment};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::lifecycle::{AuthLifecycle, AuthenticatedHook, LogoutHook, Session};
use crate::registry::RemoteRegistry;

// =============================================================================
// Sync Status
// =============================================================================

/// Current registration status for external queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Installation id, once generated.
    pub device_id: Option<String>,

    /// Signed-in user the device is registered to.
    pub owner_id: Option<String>,

    /// Whether the registry has confirmed the record.
    pub registered: bool,

    /// Whether a pending write is waiting to be flushed.
    pub has_pending: bool,

    /// Last registry error (cleared on the next success).
    pub last_error: Option<String>,
}

/// How a token change was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Patched onto the live record.
    Sent,
    /// Folded into the pending write.
    Deferred,
    /// Cached locally only; the engine is not bound to a lifecycle.
    LocalOnly,
}

/// Result of a flush call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed,
    NothingPending,
    /// Another flush was running; this call did nothing.
    AlreadyInFlight,
    /// Last attempt is too recent and nothing material changed since.
    BackedOff,
    /// The device needs registering but no user is signed in.
    AwaitingAuthentication,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives engine events (status changes, errors).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits an error event.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Throttle and retry windows used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub locale_throttle: LocaleThrottle,
    pub touch_interval: chrono::Duration,
    pub retry_interval: chrono::Duration,
}

impl EngineSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        EngineSettings {
            locale_throttle: config.locale_throttle(),
            touch_interval: config.touch_interval(),
            retry_interval: config.retry_interval(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Resets the in-flight flag when the flush ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Dispatch {
    Delete,
    Upsert(DeviceRecord),
    Patch(DevicePatch),
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Device-registration sync engine.
pub struct SyncEngine {
    identity: DeviceIdentity,
    pending: PendingWriteStore,
    state: SyncStateStore,
    registry: Arc<dyn RemoteRegistry>,
    environment: Arc<dyn DeviceEnvironment>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    emitter: Arc<dyn SyncEventEmitter>,
    flush_in_flight: AtomicBool,
    bound: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::default()
    }

    /// Opens the engine on the configured SQLite file.
    ///
    /// Falls back to an in-memory store (state lost on restart) when the
    /// file cannot be opened.
    pub async fn open(config: &SyncConfig, registry: Arc<dyn RemoteRegistry>) -> SyncResult<Self> {
        config.validate()?;

        let store: Arc<dyn KeyValueStore> = match config.database_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
                }
                match SqliteStore::open(StoreConfig::new(path.clone())).await {
                    Ok(store) => Arc::new(store),
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "Could not open device store, falling back to memory"
                        );
                        Arc::new(SqliteStore::in_memory().await?)
                    }
                }
            }
            None => {
                warn!("No data directory available, device state will not survive restarts");
                Arc::new(SqliteStore::in_memory().await?)
            }
        };

        Self::builder()
            .with_store(store)
            .with_registry(registry)
            .with_config(config)
            .build()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Records the signed-in user. A different user resets registration.
    pub async fn handle_authenticated(&self, user_id: &str) -> SyncResult<()> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::required("user_id").into());
        }

        self.state
            .update(|state| {
                if state.owner_id.as_deref() != Some(user_id) {
                    state.owner_id = Some(user_id.to_string());
                    state.registered = false;
                }
            })
            .await?;

        debug!(user_id = %user_id, "Owner recorded");
        Ok(())
    }

    /// Registers the engine's hooks on `lifecycle`.
    ///
    /// Authenticated: record the owner and register the device.
    /// About to log out: unregister the device.
    pub async fn bind(self: &Arc<Self>, lifecycle: &dyn AuthLifecycle, priority: i32) {
        self.bound.store(true, Ordering::SeqCst);

        let engine = Arc::clone(self);
        let on_authenticated: AuthenticatedHook = Arc::new(move |session: Session| {
            let engine = Arc::clone(&engine);
            async move {
                if let Err(err) = engine.handle_authenticated(&session.user_id).await {
                    warn!(error = %err, "Ignoring authenticated event");
                    return;
                }
                if let Err(err) = engine.register_device().await {
                    warn!(error = %err, retryable = err.is_retryable(), "Registration deferred");
                }
            }
            .boxed()
        });

        let engine = Arc::clone(self);
        let on_logout: LogoutHook = Arc::new(move || {
            let engine = Arc::clone(&engine);
            async move {
                if let Err(err) = engine.unregister_device().await {
                    warn!(error = %err, retryable = err.is_retryable(), "Unregister deferred");
                }
            }
            .boxed()
        });

        lifecycle.on_authenticated(on_authenticated, priority).await;
        lifecycle.on_about_to_log_out(on_logout, priority).await;

        info!(priority, "Sync engine bound to auth lifecycle");
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Creates or replaces the remote record from local state.
    ///
    /// On failure the full snapshot plus a touch is kept as the pending
    /// write and the remote error is returned.
    pub async fn register_device(&self) -> SyncResult<DeviceRecord> {
        let device_id = self.identity.get_or_create().await?;
        let state = self.state.load().await?;
        let owner_id = state.owner_id.clone().ok_or(SyncError::NotAuthenticated)?;

        let now = self.clock.now();
        let locale = self.current_locale()?;
        let pending = self
            .pending
            .load()
            .await?
            .filter(|pending| pending.device_id == device_id);
        let record = self.build_record(&device_id, &owner_id, &locale, &state, pending.as_ref(), now);

        match self.registry.upsert_device(&record).await {
            Ok(()) => {
                if let Some(ref snapshot) = pending {
                    self.pending.clear_if_unchanged(snapshot).await?;
                }
                self.state
                    .update(|state| {
                        state.registered = true;
                        state.set_locale(&locale);
                        state.fcm_token = record.fcm_token.clone();
                        state.last_locale_sync_at = Some(now);
                        state.last_touch_at = Some(now);
                    })
                    .await?;

                info!(device_id = %device_id, owner_id = %owner_id, "Device registered");
                self.record_success().await;
                Ok(record)
            }
            Err(err) => {
                let mut update = PendingUpdate::touch()
                    .with_locale(locale.timezone.clone(), locale.timezone_offset_minutes)
                    .with_platform(self.environment.platform());
                if let Some(version) = self.environment.app_version() {
                    update = update.with_app_version(version);
                }
                if let Some(ref token) = state.fcm_token {
                    update = update.with_token(TokenUpdate::Set(token.clone()));
                }
                update.unregister = Some(false);

                self.defer(&device_id, update, now).await;
                warn!(device_id = %device_id, error = %err, "Registration failed, kept for retry");
                self.record_failure(&err).await;
                Err(err.into())
            }
        }
    }

    /// Deletes the remote record and drops local registration state.
    ///
    /// On failure a pending unregister is recorded for the next flush.
    pub async fn unregister_device(&self) -> SyncResult<()> {
        let device_id = self.identity.get_or_create().await?;
        let now = self.clock.now();

        let result = self.registry.delete_device(&device_id).await;
        self.state.update(SyncState::sign_out).await?;

        match result {
            Ok(()) => {
                self.pending.clear().await?;
                info!(device_id = %device_id, "Device unregistered");
                self.record_success().await;
                Ok(())
            }
            Err(err) => {
                self.defer(&device_id, PendingUpdate::unregister(), now).await;
                warn!(device_id = %device_id, error = %err, "Unregister failed, kept for retry");
                self.record_failure(&err).await;
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // Field Updates
    // =========================================================================

    /// Stores a new push token (`None` or blank clears it).
    pub async fn persist_fcm_token(&self, token: Option<String>) -> SyncResult<TokenOutcome> {
        let update = normalize_token(token.as_deref())?;
        let cached = update.as_token().map(str::to_string);
        let state = self.state.update(|state| state.fcm_token = cached).await?;

        if !self.is_bound() {
            warn!(
                category = "integration_bug",
                "Push token changed before the sync engine was bound to the auth lifecycle"
            );
            return Ok(TokenOutcome::LocalOnly);
        }

        let device_id = self.identity.get_or_create().await?;
        let now = self.clock.now();
        let pending_update = PendingUpdate::default().with_token(update.clone());

        if state.registered {
            let patch = DevicePatch::token(update, now);
            match self.registry.patch_device(&device_id, &patch).await {
                Ok(()) => {
                    self.supersede_pending(&device_id, pending_update, now, |p| p.fcm_token.is_some())
                        .await?;
                    debug!(
                        device_id = %device_id,
                        cleared = patch.fcm_token.as_ref().is_some_and(TokenUpdate::is_clear),
                        "Push token sent"
                    );
                    self.record_success().await;
                    return Ok(TokenOutcome::Sent);
                }
                Err(err) => {
                    warn!(device_id = %device_id, error = %err, "Push token patch failed, deferring");
                    self.record_failure(&err).await;
                }
            }
        }

        self.pending.merge(&device_id, pending_update, now).await?;
        Ok(TokenOutcome::Deferred)
    }

    /// Sends the current locale if it changed (or is due) per the throttle.
    ///
    /// Returns true when an update was sent or deferred.
    pub async fn update_timezone_or_offset_if_changed(&self) -> SyncResult<bool> {
        let state = self.state.load().await?;
        let locale = self.current_locale()?;
        let now = self.clock.now();
        let did_change = state.locale_changed(&locale);

        if !self
            .settings
            .locale_throttle
            .should_sync(state.last_locale_sync_at, now, did_change)
        {
            debug!(did_change, "Locale update throttled");
            return Ok(false);
        }

        let device_id = self.identity.get_or_create().await?;
        let update = PendingUpdate::default()
            .with_locale(locale.timezone.clone(), locale.timezone_offset_minutes);

        if state.registered {
            match self.registry.patch_device(&device_id, &DevicePatch::locale(&locale)).await {
                Ok(()) => {
                    self.supersede_pending(&device_id, update, now, |p| p.timezone.is_some())
                        .await?;
                    self.record_success().await;
                }
                Err(err) => {
                    warn!(device_id = %device_id, error = %err, "Locale patch failed, deferring");
                    self.pending.merge(&device_id, update, now).await?;
                    self.record_failure(&err).await;
                }
            }
        } else {
            self.pending.merge(&device_id, update, now).await?;
        }

        self.state
            .update(|state| {
                state.set_locale(&locale);
                state.last_locale_sync_at = Some(now);
            })
            .await?;

        info!(
            timezone = %locale.timezone,
            offset_minutes = locale.timezone_offset_minutes,
            did_change,
            "Locale updated"
        );
        Ok(true)
    }

    /// Bumps `last_active_at` if the touch throttle allows it.
    pub async fn touch_device(&self) -> SyncResult<bool> {
        let state = self.state.load().await?;
        if !state.registered {
            debug!("Touch skipped, device not registered");
            return Ok(false);
        }

        let now = self.clock.now();
        if !should_touch(state.last_touch_at, now, self.settings.touch_interval) {
            debug!("Touch throttled");
            return Ok(false);
        }

        let device_id = self.identity.get_or_create().await?;
        match self.registry.patch_device(&device_id, &DevicePatch::touch(now)).await {
            Ok(()) => self.record_success().await,
            Err(err) => {
                warn!(device_id = %device_id, error = %err, "Touch failed, deferring");
                self.pending.merge(&device_id, PendingUpdate::touch(), now).await?;
                self.record_failure(&err).await;
            }
        }

        self.state.update(|state| state.last_touch_at = Some(now)).await?;
        Ok(true)
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Sends the pending write, if any. Single-flight.
    pub async fn flush_pending_payload(&self) -> SyncResult<FlushOutcome> {
        let Some(_guard) = FlightGuard::acquire(&self.flush_in_flight) else {
            debug!("Flush already in flight");
            return Ok(FlushOutcome::AlreadyInFlight);
        };

        let Some(snapshot) = self.pending.load().await? else {
            return Ok(FlushOutcome::NothingPending);
        };
        if !snapshot.has_data_to_sync() {
            self.pending.clear_if_unchanged(&snapshot).await?;
            return Ok(FlushOutcome::NothingPending);
        }

        let now = self.clock.now();
        if should_backoff(
            snapshot.last_attempt_at,
            now,
            snapshot.has_changed_fields.is_set(),
            self.settings.retry_interval,
        ) {
            debug!(last_attempt_at = ?snapshot.last_attempt_at, "Flush backed off");
            return Ok(FlushOutcome::BackedOff);
        }

        let device_id = self.identity.get_or_create().await?;
        if snapshot.device_id != device_id {
            warn!(
                stored_device_id = %snapshot.device_id,
                device_id = %device_id,
                "Dropping pending write for another installation"
            );
            self.pending.clear_if_unchanged(&snapshot).await?;
            return Ok(FlushOutcome::NothingPending);
        }

        let state = self.state.load().await?;
        let dispatch = if snapshot.pending_unregister {
            Dispatch::Delete
        } else if state.registered {
            Dispatch::Patch(snapshot.to_patch(now))
        } else {
            let Some(ref owner_id) = state.owner_id else {
                debug!("Pending registration waits for sign-in");
                return Ok(FlushOutcome::AwaitingAuthentication);
            };
            let locale = self.current_locale()?;
            Dispatch::Upsert(self.build_record(&device_id, owner_id, &locale, &state, Some(&snapshot), now))
        };

        let result = match dispatch {
            Dispatch::Delete => self.registry.delete_device(&device_id).await,
            Dispatch::Upsert(ref record) => self.registry.upsert_device(record).await,
            Dispatch::Patch(ref patch) => self.registry.patch_device(&device_id, patch).await,
        };

        if let Err(err) = result {
            self.pending.record_attempt(now).await?;
            warn!(device_id = %device_id, error = %err, "Flush failed");
            self.record_failure(&err).await;
            return Err(err.into());
        }

        let cleared = self.pending.clear_if_unchanged(&snapshot).await?;
        self.state
            .update(|state| apply_flush(state, &dispatch, &snapshot, now))
            .await?;

        info!(device_id = %device_id, cleared, "Pending write flushed");
        self.record_success().await;
        Ok(FlushOutcome::Flushed)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Lists every device registered to the signed-in user.
    pub async fn list_owner_devices(&self) -> SyncResult<Vec<DeviceRecord>> {
        let owner_id = self
            .state
            .load()
            .await?
            .owner_id
            .ok_or(SyncError::NotAuthenticated)?;

        Ok(self.registry.list_devices_for_owner(&owner_id).await?)
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let state = self.state.load().await?;

        Ok(SyncStatus {
            device_id: self.identity.peek().map(str::to_string),
            owner_id: state.owner_id,
            registered: state.registered,
            has_pending: self.pending.has_pending().await?,
            last_error: self.last_error.read().await.clone(),
        })
    }

    /// Returns the installation id, generating it on first use.
    pub async fn device_id(&self) -> SyncResult<String> {
        Ok(self.identity.get_or_create().await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn current_locale(&self) -> SyncResult<LocaleSnapshot> {
        let locale = self.environment.locale();
        validate_timezone(&locale.timezone)?;
        validate_offset_minutes(locale.timezone_offset_minutes)?;
        Ok(locale)
    }

    /// Full record: cached state, then pending overrides, then the live
    /// environment on top.
    fn build_record(
        &self,
        device_id: &str,
        owner_id: &str,
        locale: &LocaleSnapshot,
        state: &SyncState,
        pending: Option<&PendingWrite>,
        now: DateTime<Utc>,
    ) -> DeviceRecord {
        let mut record = DeviceRecord::new(device_id, locale);
        record.fcm_token = state.fcm_token.clone();

        if let Some(pending) = pending {
            pending.apply_to(&mut record, now);
        }

        record.owner_id = Some(owner_id.to_string());
        record.timezone = locale.timezone.clone();
        record.timezone_offset_minutes = locale.timezone_offset_minutes;
        record.platform = Some(self.environment.platform());
        if let Some(version) = self.environment.app_version() {
            record.app_version = Some(version);
        }
        record.last_active_at = Some(now);
        if record.fcm_token.is_some() && record.fcm_token_updated_at.is_none() {
            record.fcm_token_updated_at = Some(now);
        }
        record
    }

    /// Merges `update` into the pending write; a storage failure is logged
    /// because the caller is already reporting a remote failure.
    async fn defer(&self, device_id: &str, update: PendingUpdate, now: DateTime<Utc>) {
        if let Err(err) = self.pending.merge(device_id, update, now).await {
            error!(device_id = %device_id, error = %err, "Could not persist pending write");
        }
    }

    /// After a direct write, overwrite an older pending value for the same
    /// field so a later flush cannot resend it.
    async fn supersede_pending(
        &self,
        device_id: &str,
        update: PendingUpdate,
        now: DateTime<Utc>,
        carries_field: impl Fn(&PendingWrite) -> bool,
    ) -> SyncResult<()> {
        let stale = self
            .pending
            .load()
            .await?
            .is_some_and(|pending| pending.device_id == device_id && carries_field(&pending));
        if stale {
            self.pending.merge(device_id, update, now).await?;
        }
        Ok(())
    }

    async fn record_success(&self) {
        *self.last_error.write().await = None;
        self.publish_status().await;
    }

    async fn record_failure(&self, err: &RemoteError) {
        let message = err.to_string();
        *self.last_error.write().await = Some(message.clone());
        self.emitter.emit_error(&message, err.is_retryable());
        self.publish_status().await;
    }

    async fn publish_status(&self) {
        match self.status().await {
            Ok(status) => self.emitter.emit_status(&status),
            Err(err) => debug!(error = %err, "Status unavailable"),
        }
    }
}

fn apply_flush(state: &mut SyncState, dispatch: &Dispatch, sent: &PendingWrite, now: DateTime<Utc>) {
    match dispatch {
        Dispatch::Delete => state.registered = false,
        Dispatch::Upsert(record) => {
            state.registered = true;
            state.set_locale(&record.locale());
            state.last_locale_sync_at = Some(now);
            state.last_touch_at = Some(now);
        }
        Dispatch::Patch(_) => {
            if let (Some(tz), Some(offset)) = (sent.timezone.as_ref(), sent.timezone_offset_minutes) {
                state.set_locale(&LocaleSnapshot::new(tz.clone(), offset));
                state.last_locale_sync_at = Some(now);
            }
            if sent.touch.is_set() {
                state.last_touch_at = Some(now);
            }
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncEngine with injected collaborators.
#[derive(Default)]
pub struct SyncEngineBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    registry: Option<Arc<dyn RemoteRegistry>>,
    environment: Option<Arc<dyn DeviceEnvironment>>,
    clock: Option<Arc<dyn Clock>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    device: DeviceSettings,
    settings: EngineSettings,
}

impl SyncEngineBuilder {
    /// Sets the local key-value store.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the remote registry client.
    pub fn with_registry(mut self, registry: Arc<dyn RemoteRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn DeviceEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Takes throttle windows and device overrides from `config`.
    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.device = config.device.clone();
        self.settings = EngineSettings::from_config(config);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the SyncEngine.
    pub fn build(self) -> SyncResult<SyncEngine> {
        let store = self
            .store
            .ok_or_else(|| SyncError::InvalidConfig("Store required".into()))?;
        let registry = self
            .registry
            .ok_or_else(|| SyncError::InvalidConfig("Registry required".into()))?;

        let device = self.device;
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(SystemEnvironment::from_settings(&device)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(SyncEngine {
            identity: DeviceIdentity::new(store.clone()),
            pending: PendingWriteStore::new(store.clone()),
            state: SyncStateStore::new(store),
            registry,
            environment,
            clock,
            settings: self.settings,
            emitter,
            flush_in_flight: AtomicBool::new(false),
            bound: AtomicBool::new(false),
            last_error: RwLock::new(None),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
