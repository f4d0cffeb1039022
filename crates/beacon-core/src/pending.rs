//! # Pending Write
//!
//! The single, merged, not-yet-confirmed write intent for one device.
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     PendingWrite ⊕ PendingUpdate                        │
//! │                                                                         │
//! │  VALUE FIELDS (last-write-wins)                                        │
//! │  ──────────────────────────────                                        │
//! │  timezone, offset, fcm_token,       incoming Some(v) → replaces        │
//! │  platform, app_version,             incoming None    → kept as is      │
//! │  pending_unregister                                                    │
//! │                                                                         │
//! │  STICKY FLAGS (OR monoid, identity = false)                            │
//! │  ──────────────────────────────────────────                            │
//! │  touch               stored ∨ incoming.touch                           │
//! │  has_changed_fields  stored ∨ incoming.carries_changes()               │
//! │                                                                         │
//! │  Flags only go back to false when the whole record is cleared after    │
//! │  a confirmed flush.                                                    │
//! │                                                                         │
//! │  STAMPS                                                                │
//! │  ──────                                                                │
//! │  pending_updated_at = now on every merge                               │
//! │  last_attempt_at    = set only by record_attempt()                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stored JSON Shape
//! ```json
//! {
//!   "deviceId": "0b6e...",
//!   "timezone": "America/New_York",
//!   "timezoneOffsetMinutes": -240,
//!   "fcmToken": "",
//!   "touch": true,
//!   "platform": "ios",
//!   "appVersion": "2.3.1",
//!   "pendingUpdatedAt": "2024-03-10T12:00:00Z",
//!   "lastAttemptAt": null,
//!   "hasChangedFields": true,
//!   "pendingUnregister": false
//! }
//! ```
//! An empty `fcmToken` is the explicit clear; an omitted one means "no
//! token change pending".

use std::ops::{BitOr, BitOrAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DevicePatch, DeviceRecord, Platform, TokenUpdate};

// =============================================================================
// Sticky Flag
// =============================================================================

/// A boolean that, once set by any merge, stays set until a full reset.
///
/// Combining is logical OR with `false` as identity, so the result of any
/// sequence of merges is independent of their order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sticky(bool);

impl Sticky {
    pub const UNSET: Sticky = Sticky(false);
    pub const SET: Sticky = Sticky(true);

    #[inline]
    pub const fn new(value: bool) -> Self {
        Sticky(value)
    }

    #[inline]
    pub const fn is_set(self) -> bool {
        self.0
    }

    /// Monoid combine.
    #[inline]
    pub const fn combine(self, other: Sticky) -> Sticky {
        Sticky(self.0 || other.0)
    }
}

impl BitOr for Sticky {
    type Output = Sticky;

    fn bitor(self, rhs: Sticky) -> Sticky {
        self.combine(rhs)
    }
}

impl BitOrAssign for Sticky {
    fn bitor_assign(&mut self, rhs: Sticky) {
        *self = self.combine(rhs);
    }
}

impl From<bool> for Sticky {
    fn from(value: bool) -> Self {
        Sticky(value)
    }
}

impl FromIterator<Sticky> for Sticky {
    fn from_iter<I: IntoIterator<Item = Sticky>>(iter: I) -> Self {
        iter.into_iter().fold(Sticky::UNSET, Sticky::combine)
    }
}

/// Last-write-wins for one optional field.
#[inline]
fn lww<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value);
    }
}

// =============================================================================
// Pending Update (incoming intent)
// =============================================================================

/// One write intent to be merged into the pending write.
///
/// ## Example
/// ```rust
/// use beacon_core::{PendingUpdate, TokenUpdate};
///
/// let update = PendingUpdate::default()
///     .with_token(TokenUpdate::Clear)
///     .with_touch();
/// assert!(update.carries_changes());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingUpdate {
    pub timezone: Option<String>,
    pub timezone_offset_minutes: Option<i32>,
    pub fcm_token: Option<TokenUpdate>,
    pub platform: Option<Platform>,
    pub app_version: Option<String>,
    pub touch: bool,
    /// `Some(true)` records a pending unregister, `Some(false)` cancels one.
    pub unregister: Option<bool>,
}

impl PendingUpdate {
    /// Liveness-only intent.
    pub fn touch() -> Self {
        PendingUpdate {
            touch: true,
            ..Default::default()
        }
    }

    /// Intent to delete the remote record.
    pub fn unregister() -> Self {
        PendingUpdate {
            unregister: Some(true),
            ..Default::default()
        }
    }

    pub fn with_locale(mut self, timezone: impl Into<String>, offset_minutes: i32) -> Self {
        self.timezone = Some(timezone.into());
        self.timezone_offset_minutes = Some(offset_minutes);
        self
    }

    pub fn with_token(mut self, token: TokenUpdate) -> Self {
        self.fcm_token = Some(token);
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    pub fn with_touch(mut self) -> Self {
        self.touch = true;
        self
    }

    /// Returns true if this intent is more than a liveness ping.
    ///
    /// A pending unregister counts as a change: deleting the record must
    /// not wait out a retry window.
    pub fn carries_changes(&self) -> bool {
        self.timezone.is_some()
            || self.timezone_offset_minutes.is_some()
            || self.fcm_token.is_some()
            || self.platform.is_some()
            || self.app_version.is_some()
            || self.unregister == Some(true)
    }
}

// =============================================================================
// Pending Write (stored state)
// =============================================================================

/// Merged write intent for one device. At most one exists per device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset_minutes: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<TokenUpdate>,

    #[serde(default)]
    pub touch: Sticky,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Time of the most recent merge.
    pub pending_updated_at: DateTime<Utc>,

    /// Time of the most recent flush attempt, successful or not.
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Set when any merge carried a substantive change; bypasses backoff.
    #[serde(default)]
    pub has_changed_fields: Sticky,

    /// Delete the remote record before (instead of) any update.
    #[serde(default)]
    pub pending_unregister: bool,
}

impl PendingWrite {
    /// Creates an empty intent keyed by `device_id`.
    pub fn empty(device_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        PendingWrite {
            device_id: device_id.into(),
            timezone: None,
            timezone_offset_minutes: None,
            fcm_token: None,
            touch: Sticky::UNSET,
            platform: None,
            app_version: None,
            pending_updated_at: now,
            last_attempt_at: None,
            has_changed_fields: Sticky::UNSET,
            pending_unregister: false,
        }
    }

    /// Merges `update` into this intent and stamps `pending_updated_at`.
    pub fn merge(&mut self, update: PendingUpdate, now: DateTime<Utc>) {
        let changed = Sticky::new(update.carries_changes());

        lww(&mut self.timezone, update.timezone);
        lww(&mut self.timezone_offset_minutes, update.timezone_offset_minutes);
        lww(&mut self.fcm_token, update.fcm_token);
        lww(&mut self.platform, update.platform);
        lww(&mut self.app_version, update.app_version);

        if let Some(unregister) = update.unregister {
            self.pending_unregister = unregister;
        }

        self.touch |= Sticky::new(update.touch);
        self.has_changed_fields |= changed;
        self.pending_updated_at = now;
    }

    /// Returns a copy with `update` merged in.
    pub fn merged(mut self, update: PendingUpdate, now: DateTime<Utc>) -> Self {
        self.merge(update, now);
        self
    }

    /// Stamps a flush attempt.
    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.last_attempt_at = Some(now);
    }

    /// Returns true if there is anything worth transmitting.
    ///
    /// A token clear counts even though it carries no value.
    pub fn has_data_to_sync(&self) -> bool {
        self.timezone.is_some()
            || self.timezone_offset_minutes.is_some()
            || self.fcm_token.is_some()
            || self.platform.is_some()
            || self.app_version.is_some()
            || self.touch.is_set()
            || self.pending_unregister
    }

    /// Builds the registry patch for this intent.
    ///
    /// `touch` becomes `last_active_at = now`; a token change is stamped
    /// with `fcm_token_updated_at = now`.
    pub fn to_patch(&self, now: DateTime<Utc>) -> DevicePatch {
        DevicePatch {
            timezone: self.timezone.clone(),
            timezone_offset_minutes: self.timezone_offset_minutes,
            fcm_token: self.fcm_token.clone(),
            fcm_token_updated_at: self.fcm_token.as_ref().map(|_| now),
            platform: self.platform.clone(),
            app_version: self.app_version.clone(),
            last_active_at: self.touch.is_set().then_some(now),
        }
    }

    /// Overlays this intent onto a full record (used for registration).
    pub fn apply_to(&self, record: &mut DeviceRecord, now: DateTime<Utc>) {
        self.to_patch(now).apply_to(record);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
