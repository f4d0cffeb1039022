//! # Device Identity
//!
//! Lazily generated, persisted, never-regenerated device identifier.
//!
//! ```text
//! get_or_create()
//!    │
//!    ├── cached in memory? ────────────────────────► return it
//!    │
//!    ├── stored under "device_id" and valid? ──────► cache, return it
//!    │
//!    └── generate UUID v4 ─► persist ─► cache ─► return it
//! ```

use std::sync::Arc;

use beacon_core::validation::validate_device_id;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;
use crate::DEVICE_ID_KEY;

/// Owner of the stable device identifier.
pub struct DeviceIdentity {
    store: Arc<dyn KeyValueStore>,
    cached: OnceCell<String>,
}

impl DeviceIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        DeviceIdentity {
            store,
            cached: OnceCell::new(),
        }
    }

    /// Returns the device id, generating and persisting one on first use.
    ///
    /// Concurrent first calls resolve to the same id.
    pub async fn get_or_create(&self) -> StoreResult<String> {
        let id = self
            .cached
            .get_or_try_init(|| async {
                if let Some(existing) = self.store.get(DEVICE_ID_KEY).await? {
                    match validate_device_id(&existing) {
                        Ok(()) => return Ok(existing),
                        Err(err) if !existing.trim().is_empty() => {
                            warn!(error = %err, "Stored device id is malformed, replacing it");
                        }
                        Err(_) => {}
                    }
                }

                let generated = Uuid::new_v4().to_string();
                self.store.set(DEVICE_ID_KEY, &generated).await?;
                info!(device_id = %generated, "Generated new device id");
                Ok::<_, StoreError>(generated)
            })
            .await?;

        Ok(id.clone())
    }

    /// Returns the id if it has already been loaded.
    pub fn peek(&self) -> Option<&str> {
        self.cached.get().map(String::as_str)
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.peek())
            .finish()
    }
}
