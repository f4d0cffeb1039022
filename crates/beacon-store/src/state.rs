//! # Persisted Sync State
//!
//! The engine's caches that must survive a restart: who owns the device,
//! whether the registry knows about it, the last locale and token sent,
//! and the throttle timestamps.
//!
//! Stored as camelCase JSON under `device_sync_state`:
//! ```text
//! {
//!   "ownerId": "user-42",
//!   "registered": true,
//!   "timezone": "America/New_York",
//!   "timezoneOffsetMinutes": -300,
//!   "fcmToken": "f3k...",
//!   "lastLocaleSyncAt": "2024-03-10T06:55:00Z",
//!   "lastTouchAt": "2024-03-10T06:00:00Z"
//! }
//! ```

use std::sync::Arc;

use beacon_core::LocaleSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::StoreResult;
use crate::kv::KeyValueStore;
use crate::SYNC_STATE_KEY;

/// Registration cache and throttle timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// The registry holds a record for this device (as far as we know).
    pub registered: bool,

    /// Last locale confirmed by the registry, or queued for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone_offset_minutes: Option<i32>,

    /// Most recent push token handed over by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_locale_sync_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_touch_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Last known locale, if both halves are present.
    pub fn locale(&self) -> Option<LocaleSnapshot> {
        match (&self.timezone, self.timezone_offset_minutes) {
            (Some(tz), Some(offset)) => Some(LocaleSnapshot::new(tz.clone(), offset)),
            _ => None,
        }
    }

    pub fn set_locale(&mut self, locale: &LocaleSnapshot) {
        self.timezone = Some(locale.timezone.clone());
        self.timezone_offset_minutes = Some(locale.timezone_offset_minutes);
    }

    /// True if `current` differs from the cached locale (or none is cached).
    pub fn locale_changed(&self, current: &LocaleSnapshot) -> bool {
        self.locale()
            .map_or(true, |cached| current.differs_from(&cached))
    }

    /// Forgets the owner and registration; throttle timestamps are kept.
    pub fn sign_out(&mut self) {
        self.owner_id = None;
        self.registered = false;
    }
}

// =============================================================================
// SyncStateStore
// =============================================================================

/// Serialised access to the persisted [`SyncState`].
pub struct SyncStateStore {
    store: Arc<dyn KeyValueStore>,
    slot: Mutex<()>,
}

impl SyncStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        SyncStateStore {
            store,
            slot: Mutex::new(()),
        }
    }

    /// Loads the state. Missing or malformed data yields the default.
    pub async fn load(&self) -> StoreResult<SyncState> {
        let _guard = self.slot.lock().await;
        self.read().await
    }

    /// Applies `f` to the stored state and persists the result.
    pub async fn update<F>(&self, f: F) -> StoreResult<SyncState>
    where
        F: FnOnce(&mut SyncState),
    {
        let _guard = self.slot.lock().await;
        let mut state = self.read().await?;
        f(&mut state);
        let json = serde_json::to_string(&state)?;
        self.store.set(SYNC_STATE_KEY, &json).await?;
        Ok(state)
    }

    async fn read(&self) -> StoreResult<SyncState> {
        let Some(raw) = self.store.get(SYNC_STATE_KEY).await? else {
            return Ok(SyncState::default());
        };

        Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(error = %err, "Malformed sync state, starting from defaults");
            SyncState::default()
        }))
    }
}

impl std::fmt::Debug for SyncStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use chrono::TimeZone;

    #[test]
    fn test_locale_changed() {
        let mut state = SyncState::default();
        let ny = LocaleSnapshot::new("America/New_York", -300);
        assert!(state.locale_changed(&ny));

        state.set_locale(&ny);
        assert!(!state.locale_changed(&ny));
        assert!(state.locale_changed(&LocaleSnapshot::new("America/New_York", -240)));
    }

    #[test]
    fn test_json_shape() {
        let state = SyncState {
            owner_id: Some("user-42".into()),
            registered: true,
            last_touch_at: Some(Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()),
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["ownerId"], "user-42");
        assert_eq!(json["registered"], true);
        assert!(json.get("lastTouchAt").is_some());
        assert!(json.get("timezone").is_none());
    }

    #[tokio::test]
    async fn test_update_and_reload() {
        let kv = Arc::new(MemoryStore::new());
        let store = SyncStateStore::new(kv.clone());

        store
            .update(|s| {
                s.owner_id = Some("user-1".into());
                s.registered = true;
            })
            .await
            .unwrap();

        let reloaded = SyncStateStore::new(kv).load().await.unwrap();
        assert_eq!(reloaded.owner_id.as_deref(), Some("user-1"));
        assert!(reloaded.registered);

        store.update(SyncState::sign_out).await.unwrap();
        assert!(!store.load().await.unwrap().registered);
    }

    #[tokio::test]
    async fn test_malformed_state_defaults() {
        let kv = Arc::new(MemoryStore::new());
        kv.insert_raw(SYNC_STATE_KEY, "[1,2,3]").await;

        let store = SyncStateStore::new(kv);
        assert_eq!(store.load().await.unwrap(), SyncState::default());
    }
}
