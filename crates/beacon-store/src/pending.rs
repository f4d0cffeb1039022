//! # Pending Write Store
//!
//! Durable single slot holding the merged [`PendingWrite`] for this device.
//!
//! ## Read-Modify-Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    PendingWriteStore::merge()                           │
//! │                                                                         │
//! │  ┌──────── slot mutex held ──────────────────────────────────────┐     │
//! │  │                                                                │     │
//! │  │  1. load "device_pending_payload"                              │     │
//! │  │        missing / malformed / other device → start empty        │     │
//! │  │  2. PendingWrite::merge(update, now)   (beacon-core rules)     │     │
//! │  │  3. store the merged JSON                                      │     │
//! │  │                                                                │     │
//! │  └────────────────────────────────────────────────────────────────┘     │
//! │                                                                         │
//! │  Concurrent callers queue on the mutex, so no merge is lost.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Clearing After a Flush
//! A flush reads a snapshot, talks to the network, then calls
//! [`PendingWriteStore::clear_if_unchanged`]. If a merge landed while the
//! request was in flight the stored intent no longer equals the snapshot and
//! is kept for the next flush.

use std::sync::Arc;

use beacon_core::{PendingUpdate, PendingWrite};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::kv::KeyValueStore;
use crate::PENDING_PAYLOAD_KEY;

/// Durable, field-merging write-intent buffer.
pub struct PendingWriteStore {
    store: Arc<dyn KeyValueStore>,
    slot: Mutex<()>,
}

impl PendingWriteStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        PendingWriteStore {
            store,
            slot: Mutex::new(()),
        }
    }

    /// Loads the pending write, if any.
    ///
    /// Malformed JSON is logged and treated as absent.
    pub async fn load(&self) -> StoreResult<Option<PendingWrite>> {
        let _guard = self.slot.lock().await;
        self.read().await
    }

    /// Merges `update` into the pending write for `device_id`.
    ///
    /// Returns the merged result as stored.
    pub async fn merge(
        &self,
        device_id: &str,
        update: PendingUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<PendingWrite> {
        let _guard = self.slot.lock().await;

        let base = match self.read().await? {
            Some(existing) if existing.device_id == device_id => existing,
            Some(existing) => {
                warn!(
                    stored_device_id = %existing.device_id,
                    device_id = %device_id,
                    "Discarding pending write for a different device"
                );
                PendingWrite::empty(device_id, now)
            }
            None => PendingWrite::empty(device_id, now),
        };

        let merged = base.merged(update, now);
        self.write(&merged).await?;

        debug!(
            device_id = %device_id,
            has_changed_fields = merged.has_changed_fields.is_set(),
            pending_unregister = merged.pending_unregister,
            "Merged pending write"
        );
        Ok(merged)
    }

    /// Removes the pending write.
    pub async fn clear(&self) -> StoreResult<()> {
        let _guard = self.slot.lock().await;
        self.store.remove(PENDING_PAYLOAD_KEY).await
    }

    /// Removes the pending write only if it still equals `snapshot`.
    ///
    /// Returns true if the slot is now empty.
    pub async fn clear_if_unchanged(&self, snapshot: &PendingWrite) -> StoreResult<bool> {
        let _guard = self.slot.lock().await;

        match self.read().await? {
            Some(current) if current != *snapshot => {
                debug!(
                    device_id = %current.device_id,
                    "Pending write changed during flush, keeping newer intent"
                );
                Ok(false)
            }
            _ => {
                self.store.remove(PENDING_PAYLOAD_KEY).await?;
                Ok(true)
            }
        }
    }

    /// Stamps `last_attempt_at` on the stored intent, if one exists.
    pub async fn record_attempt(&self, now: DateTime<Utc>) -> StoreResult<Option<PendingWrite>> {
        let _guard = self.slot.lock().await;

        let Some(mut current) = self.read().await? else {
            return Ok(None);
        };
        current.record_attempt(now);
        self.write(&current).await?;
        Ok(Some(current))
    }

    /// Returns true if a pending write with data exists.
    pub async fn has_pending(&self) -> StoreResult<bool> {
        Ok(self
            .load()
            .await?
            .is_some_and(|pending| pending.has_data_to_sync()))
    }

    async fn read(&self) -> StoreResult<Option<PendingWrite>> {
        let Some(raw) = self.store.get(PENDING_PAYLOAD_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<PendingWrite>(&raw) {
            Ok(pending) => Ok(Some(pending)),
            Err(err) => {
                warn!(error = %err, "Malformed pending payload, treating as empty");
                Ok(None)
            }
        }
    }

    async fn write(&self, pending: &PendingWrite) -> StoreResult<()> {
        let json = serde_json::to_string(pending)?;
        self.store.set(PENDING_PAYLOAD_KEY, &json).await
    }
}

impl std::fmt::Debug for PendingWriteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWriteStore").finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
