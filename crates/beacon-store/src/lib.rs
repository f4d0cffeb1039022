//! # beacon-store: Local Persistence for Beacon
//!
//! Durable storage for the three documents Beacon keeps on the device.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Data Flow                                 │
//! │                                                                         │
//! │  SyncEngine (beacon-sync)                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   beacon-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌──────────────────┐  ┌───────────────┐   │   │
//! │  │   │DeviceIdentity │  │PendingWriteStore │  │SyncStateStore │   │   │
//! │  │   │ device_id     │  │ device_pending_  │  │ device_sync_  │   │   │
//! │  │   │               │  │ payload          │  │ state         │   │   │
//! │  │   └───────┬───────┘  └────────┬─────────┘  └───────┬───────┘   │   │
//! │  │           └───────────────────┼────────────────────┘           │   │
//! │  │                               ▼                                │   │
//! │  │                  dyn KeyValueStore (kv.rs)                     │   │
//! │  │              MemoryStore  │  SqliteStore (sqlite.rs)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               SQLite database (kv_store table)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`kv`] - The key-value trait and the in-memory backend
//! - [`sqlite`] - SQLite backend, pool configuration and migrations
//! - [`identity`] - Stable device identifier
//! - [`pending`] - Serialised read-modify-write of the pending write
//! - [`state`] - Registration cache and throttle timestamps
//! - [`error`] - Storage error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_store::{SqliteStore, StoreConfig, PendingWriteStore};
//!
//! let kv = Arc::new(SqliteStore::open(StoreConfig::new("beacon.db")).await?);
//! let pending = PendingWriteStore::new(kv.clone());
//! let intent = pending.load().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod identity;
pub mod kv;
pub mod pending;
pub mod sqlite;
pub mod state;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use identity::DeviceIdentity;
pub use kv::{KeyValueStore, MemoryStore};
pub use pending::PendingWriteStore;
pub use sqlite::{SqliteStore, StoreConfig};
pub use state::{SyncState, SyncStateStore};

// =============================================================================
// Storage Keys
// =============================================================================

/// Key holding the stable device identifier.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Key holding the serialized [`beacon_core::PendingWrite`].
pub const PENDING_PAYLOAD_KEY: &str = "device_pending_payload";

/// Key holding the serialized [`SyncState`].
pub const SYNC_STATE_KEY: &str = "device_sync_state";
