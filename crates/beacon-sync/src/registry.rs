//! # Remote Registry
//!
//! The server-side device registry as seen by the engine, plus an in-memory
//! implementation that behaves like the real one.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  trait RemoteRegistry                                                   │
//! │                                                                         │
//! │  upsert_device(record)            create or replace the whole record   │
//! │  patch_device(device_id, patch)   update only the fields present       │
//! │  delete_device(device_id)         remove; deleting twice is fine       │
//! │  list_devices_for_owner(owner)    all records of one account           │
//! │                                                                         │
//! │  Every call resolves to Ok or a typed RemoteError                      │
//! │  (network | auth | server | unknown). Calls are bounded by the         │
//! │  implementation's own timeout; the engine adds none.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{DevicePatch, DeviceRecord};
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{RemoteError, RemoteErrorKind, RemoteResult};

/// Remote device registry client.
#[async_trait]
pub trait RemoteRegistry: Send + Sync {
    async fn upsert_device(&self, record: &DeviceRecord) -> RemoteResult<()>;

    async fn delete_device(&self, device_id: &str) -> RemoteResult<()>;

    async fn patch_device(&self, device_id: &str, patch: &DevicePatch) -> RemoteResult<()>;

    async fn list_devices_for_owner(&self, owner_id: &str) -> RemoteResult<Vec<DeviceRecord>>;
}

// =============================================================================
// InMemoryRegistry
// =============================================================================

/// Registry kept in process memory.
///
/// Stamps `created_at` on first insert and `updated_at` on every write, like
/// the hosted registry. Connectivity, failures and latency are controllable
/// for tests.
pub struct InMemoryRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
    clock: Arc<dyn Clock>,
    online: AtomicBool,
    failure: RwLock<Option<RemoteErrorKind>>,
    latency: RwLock<Option<Duration>>,
    writes: AtomicUsize,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryRegistry {
            devices: RwLock::new(HashMap::new()),
            clock,
            online: AtomicBool::new(true),
            failure: RwLock::new(None),
            latency: RwLock::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// Offline registries fail every call with a network error.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes every call fail with `kind` until cleared with `None`.
    pub async fn fail_with(&self, kind: Option<RemoteErrorKind>) {
        *self.failure.write().await = kind;
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Number of successful writes (upsert, patch, delete).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    async fn enter(&self) -> RemoteResult<()> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::network("registry unreachable"));
        }

        if let Some(kind) = *self.failure.read().await {
            return Err(RemoteError::new(kind, "injected failure"));
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteRegistry for InMemoryRegistry {
    async fn upsert_device(&self, record: &DeviceRecord) -> RemoteResult<()> {
        self.enter().await?;
        let now = self.clock.now();

        let mut devices = self.devices.write().await;
        let created_at = devices
            .get(&record.device_id)
            .and_then(|existing| existing.created_at)
            .unwrap_or(now);

        let mut stored = record.clone();
        stored.created_at = Some(created_at);
        stored.updated_at = Some(now);
        devices.insert(stored.device_id.clone(), stored);

        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(device_id = %record.device_id, "Registry upsert");
        Ok(())
    }

    async fn delete_device(&self, device_id: &str) -> RemoteResult<()> {
        self.enter().await?;

        self.devices.write().await.remove(device_id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(device_id = %device_id, "Registry delete");
        Ok(())
    }

    async fn patch_device(&self, device_id: &str, patch: &DevicePatch) -> RemoteResult<()> {
        self.enter().await?;
        let now = self.clock.now();

        let mut devices = self.devices.write().await;
        let Some(record) = devices.get_mut(device_id) else {
            return Err(RemoteError::server(format!("device {device_id} is not registered")));
        };

        patch.apply_to(record);
        record.updated_at = Some(now);

        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(device_id = %device_id, "Registry patch");
        Ok(())
    }

    async fn list_devices_for_owner(&self, owner_id: &str) -> RemoteResult<Vec<DeviceRecord>> {
        self.enter().await?;

        let mut owned: Vec<DeviceRecord> = self
            .devices
            .read()
            .await
            .values()
            .filter(|record| record.owner_id.as_deref() == Some(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(owned)
    }
}

impl std::fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRegistry")
            .field("online", &self.online.load(Ordering::SeqCst))
            .field("writes", &self.write_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use beacon_core::{LocaleSnapshot, TokenUpdate};
    use chrono::{TimeZone, Utc};

    fn record(id: &str, owner: &str) -> DeviceRecord {
        let mut record = DeviceRecord::new(id, &LocaleSnapshot::new("UTC", 0));
        record.owner_id = Some(owner.to_string());
        record
    }

    #[tokio::test]
    async fn test_upsert_stamps_timestamps() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let registry = InMemoryRegistry::with_clock(clock.clone());

        registry.upsert_device(&record("d1", "u1")).await.unwrap();
        clock.advance(chrono::Duration::hours(1));
        registry.upsert_device(&record("d1", "u1")).await.unwrap();

        let stored = registry.get("d1").await.unwrap();
        assert_eq!(stored.created_at, Some(start));
        assert_eq!(stored.updated_at, Some(start + chrono::Duration::hours(1)));
        assert_eq!(registry.write_count(), 2);
    }

    #[tokio::test]
    async fn test_patch_applies_fields() {
        let registry = InMemoryRegistry::new();
        registry.upsert_device(&record("d1", "u1")).await.unwrap();

        let patch = DevicePatch::token(TokenUpdate::Set("tok".into()), Utc::now());
        registry.patch_device("d1", &patch).await.unwrap();
        assert_eq!(registry.get("d1").await.unwrap().fcm_token.as_deref(), Some("tok"));

        let clear = DevicePatch::token(TokenUpdate::Clear, Utc::now());
        registry.patch_device("d1", &clear).await.unwrap();
        assert_eq!(registry.get("d1").await.unwrap().fcm_token, None);

        let missing = registry.patch_device("nope", &clear).await.unwrap_err();
        assert_eq!(missing.kind, RemoteErrorKind::Server);
    }

    #[tokio::test]
    async fn test_offline_and_injected_failures() {
        let registry = InMemoryRegistry::new();

        registry.set_online(false);
        let err = registry.delete_device("d1").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Network);

        registry.set_online(true);
        registry.fail_with(Some(RemoteErrorKind::Auth)).await;
        let err = registry.upsert_device(&record("d1", "u1")).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Auth);
        assert!(!err.is_retryable());

        registry.fail_with(None).await;
        registry.upsert_device(&record("d1", "u1")).await.unwrap();
        assert_eq!(registry.write_count(), 1);
    }

    #[tokio::test]
    async fn test_list_devices_for_owner() {
        let registry = InMemoryRegistry::new();
        registry.upsert_device(&record("b", "u1")).await.unwrap();
        registry.upsert_device(&record("a", "u1")).await.unwrap();
        registry.upsert_device(&record("c", "u2")).await.unwrap();

        let owned = registry.list_devices_for_owner("u1").await.unwrap();
        let ids: Vec<_> = owned.iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
