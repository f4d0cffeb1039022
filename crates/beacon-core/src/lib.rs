//! # beacon-core: Pure Device-Registration Logic
//!
//! This crate holds the data model and every decision the sync engine makes,
//! expressed as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            App lifecycle (login, logout, token refresh)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 beacon-sync (SyncEngine)                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ beacon-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  pending  │  │ throttle  │  │  backoff  │  │   │
//! │  │   │ Device-   │  │ Pending-  │  │ locale /  │  │ retry     │  │   │
//! │  │   │ Record    │  │ Write     │  │ touch     │  │ gating    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORAGE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 beacon-store (local persistence)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - DeviceRecord, Platform, TokenUpdate, DevicePatch
//! - [`pending`] - PendingWrite and its field-merge rules
//! - [`throttle`] - Locale and touch throttle decisions
//! - [`backoff`] - Retry suppression decision
//! - [`validation`] - Input validation
//! - [`error`] - Validation error types
//!
//! ## Example Usage
//!
//! ```rust
//! use beacon_core::throttle::should_touch;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let last = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
//! let now = last + Duration::hours(1);
//!
//! assert!(should_touch(Some(last), now, Duration::hours(1)));
//! assert!(!should_touch(Some(last), now, Duration::hours(2)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backoff;
pub mod error;
pub mod pending;
pub mod throttle;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::ValidationError;
pub use pending::{PendingUpdate, PendingWrite, Sticky};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Smallest UTC offset in use anywhere (UTC-12:00).
pub const MIN_OFFSET_MINUTES: i32 = -12 * 60;

/// Largest UTC offset in use anywhere (UTC+14:00, Line Islands).
pub const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Upper bound on push-token length accepted from the platform.
///
/// FCM tokens are ~163 characters today; the bound only rejects garbage.
pub const MAX_TOKEN_LEN: usize = 4096;
