//! # Domain Types
//!
//! Core domain types shared by the store and the sync engine.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DeviceRecord   │   │   DevicePatch   │   │  TokenUpdate    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  device_id      │   │  partial fields │   │  Clear  ("")    │       │
//! │  │  owner_id       │   │  sent by patch  │   │  Set(token)     │       │
//! │  │  timezone       │   │                 │   │                 │       │
//! │  │  offset         │   └─────────────────┘   └─────────────────┘       │
//! │  │  fcm_token      │                                                    │
//! │  │  platform ...   │   ┌─────────────────┐   ┌─────────────────┐       │
//! │  └─────────────────┘   │    Platform     │   │ LocaleSnapshot  │       │
//! │                        │  ─────────────  │   │  ─────────────  │       │
//! │                        │  Ios / Android  │   │  timezone       │       │
//! │                        │  Web / Macos .. │   │  offset_minutes │       │
//! │                        │  Unknown(wire)  │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Push-Token Tri-State
//! A token field in a write intent is one of:
//! - absent: `None`, nothing to say about the token
//! - `Some(TokenUpdate::Clear)`: the user disabled push, tell the server
//! - `Some(TokenUpdate::Set(token))`: a fresh token
//!
//! On the wire `Clear` is the empty string, so it survives a JSON round trip
//! distinctly from an omitted field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;

// =============================================================================
// Platform
// =============================================================================

/// Operating system the app is running on.
///
/// Values arriving from the registry that this build does not know are kept
/// verbatim in [`Platform::Unknown`] instead of being rejected or guessed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Ios,
    Android,
    Web,
    Macos,
    Windows,
    Linux,
    /// Unrecognized wire value, preserved as-is.
    Unknown(String),
}

impl Platform {
    /// Returns the platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_family = "wasm") {
            return Platform::Web;
        }

        match std::env::consts::OS {
            "ios" => Platform::Ios,
            "android" => Platform::Android,
            "macos" => Platform::Macos,
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            other => Platform::Unknown(other.to_string()),
        }
    }

    /// Parses a wire value. Never fails: unknown values map to `Unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "ios" => Platform::Ios,
            "android" => Platform::Android,
            "web" => Platform::Web,
            "macos" => Platform::Macos,
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            _ => Platform::Unknown(value.to_string()),
        }
    }

    /// Returns the wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Unknown(raw) => raw,
        }
    }

    /// Returns true if this value was recognized.
    pub fn is_known(&self) -> bool {
        !matches!(self, Platform::Unknown(_))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Platform::from_wire(&raw))
    }
}

// =============================================================================
// Token Update
// =============================================================================

/// A push-token change carried by a write intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenUpdate {
    /// Explicitly remove the token server-side.
    Clear,
    /// Store this token.
    Set(String),
}

impl TokenUpdate {
    /// Builds an update from an optional platform token.
    ///
    /// `None` and blank strings both mean "no token", which is a clear.
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some(t) if !t.is_empty() => TokenUpdate::Set(t.to_string()),
            _ => TokenUpdate::Clear,
        }
    }

    /// Returns the token value, or `None` for a clear.
    pub fn as_token(&self) -> Option<&str> {
        match self {
            TokenUpdate::Clear => None,
            TokenUpdate::Set(token) => Some(token),
        }
    }

    /// Returns true for the sentinel clear.
    pub fn is_clear(&self) -> bool {
        matches!(self, TokenUpdate::Clear)
    }
}

impl Serialize for TokenUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_token().unwrap_or(""))
    }
}

impl<'de> Deserialize<'de> for TokenUpdate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            Ok(TokenUpdate::Clear)
        } else {
            Ok(TokenUpdate::Set(raw))
        }
    }
}

// =============================================================================
// Locale Snapshot
// =============================================================================

/// The device's locale as last observed.
///
/// The offset is tracked separately from the zone name because it moves on
/// daylight-saving transitions while the name stays put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleSnapshot {
    pub timezone: String,
    pub timezone_offset_minutes: i32,
}

impl LocaleSnapshot {
    pub fn new(timezone: impl Into<String>, timezone_offset_minutes: i32) -> Self {
        LocaleSnapshot {
            timezone: timezone.into(),
            timezone_offset_minutes,
        }
    }

    /// Returns true if either the zone name or the offset differs.
    pub fn differs_from(&self, other: &LocaleSnapshot) -> bool {
        self != other
    }
}

// =============================================================================
// Device Record
// =============================================================================

/// The server-visible registration record for one device.
///
/// ## Lifecycle
/// - Created by the first successful registration upsert
/// - Mutated by every successful patch
/// - Removed on unregister; the `device_id` survives locally and may be
///   registered again under another owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Stable per-installation identifier.
    pub device_id: String,

    /// Account the device is registered under.
    pub owner_id: Option<String>,

    /// IANA zone name, e.g. "America/New_York".
    pub timezone: String,

    /// Current offset from UTC in minutes (-300 for EST).
    pub timezone_offset_minutes: i32,

    /// Push-messaging token; `None` when never set or cleared.
    pub fcm_token: Option<String>,

    #[ts(as = "Option<String>")]
    pub platform: Option<Platform>,

    pub app_version: Option<String>,

    #[ts(as = "Option<String>")]
    pub last_active_at: Option<DateTime<Utc>>,

    /// Stamped by the registry on first insert.
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,

    /// Stamped by the registry on every write.
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub fcm_token_updated_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Creates a record with the mandatory fields; everything else empty.
    pub fn new(device_id: impl Into<String>, locale: &LocaleSnapshot) -> Self {
        DeviceRecord {
            device_id: device_id.into(),
            owner_id: None,
            timezone: locale.timezone.clone(),
            timezone_offset_minutes: locale.timezone_offset_minutes,
            fcm_token: None,
            platform: None,
            app_version: None,
            last_active_at: None,
            created_at: None,
            updated_at: None,
            fcm_token_updated_at: None,
        }
    }

    /// Returns the record's locale.
    pub fn locale(&self) -> LocaleSnapshot {
        LocaleSnapshot::new(self.timezone.clone(), self.timezone_offset_minutes)
    }
}

// =============================================================================
// Device Patch
// =============================================================================

/// Partial update sent to the registry for an existing record.
///
/// `None` means "leave unchanged". The token uses [`TokenUpdate`] so that a
/// clear is expressible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset_minutes: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<TokenUpdate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token_updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<DateTime<Utc>>,
}

impl DevicePatch {
    /// Patch that only bumps liveness.
    pub fn touch(now: DateTime<Utc>) -> Self {
        DevicePatch {
            last_active_at: Some(now),
            ..Default::default()
        }
    }

    /// Patch that updates the locale.
    pub fn locale(locale: &LocaleSnapshot) -> Self {
        DevicePatch {
            timezone: Some(locale.timezone.clone()),
            timezone_offset_minutes: Some(locale.timezone_offset_minutes),
            ..Default::default()
        }
    }

    /// Patch that sets or clears the push token.
    pub fn token(update: TokenUpdate, now: DateTime<Utc>) -> Self {
        DevicePatch {
            fcm_token: Some(update),
            fcm_token_updated_at: Some(now),
            ..Default::default()
        }
    }

    /// Returns true if the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == DevicePatch::default()
    }

    /// Applies every present field onto `record`.
    ///
    /// `updated_at` and `created_at` are left alone; those belong to the
    /// registry.
    pub fn apply_to(&self, record: &mut DeviceRecord) {
        if let Some(ref tz) = self.timezone {
            record.timezone = tz.clone();
        }
        if let Some(offset) = self.timezone_offset_minutes {
            record.timezone_offset_minutes = offset;
        }
        if let Some(ref token) = self.fcm_token {
            record.fcm_token = token.as_token().map(str::to_string);
        }
        if let Some(at) = self.fcm_token_updated_at {
            record.fcm_token_updated_at = Some(at);
        }
        if let Some(ref platform) = self.platform {
            record.platform = Some(platform.clone());
        }
        if let Some(ref version) = self.app_version {
            record.app_version = Some(version.clone());
        }
        if let Some(at) = self.last_active_at {
            record.last_active_at = Some(at);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
