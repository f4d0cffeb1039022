//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BEACON_TIMEZONE=Europe/Paris                                       │
//! │     BEACON_TOUCH_INTERVAL_SECS=600                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/beacon/sync.toml (Linux)                                 │
//! │     ~/Library/Application Support/dev.beacon.beacon/sync.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! app_version = "3.2.1"
//! timezone = "Europe/Paris"          # optional override
//!
//! [throttle]
//! locale_min_interval_secs = 86400   # heartbeat when nothing changed
//! locale_max_interval_secs = 604800  # forced-sync ceiling
//! locale_change_debounce_secs = 600  # spacing of changed-value writes
//! touch_interval_secs = 3600
//!
//! [backoff]
//! retry_interval_secs = 300
//!
//! [flush]
//! poll_interval_secs = 60
//! initial_backoff_ms = 1000
//! max_backoff_secs = 900
//!
//! [lifecycle]
//! callback_timeout_secs = 10
//!
//! [storage]
//! path = "/var/lib/beacon/beacon.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use beacon_core::throttle::LocaleThrottle;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Settings
// =============================================================================

/// Values describing this installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// App version reported to the registry.
    #[serde(default)]
    pub app_version: Option<String>,

    /// IANA zone name overriding what the OS reports.
    #[serde(default)]
    pub timezone: Option<String>,
}

// =============================================================================
// Throttle Settings
// =============================================================================

/// Locale and touch throttle windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSettings {
    /// Re-send an unchanged locale after this long.
    #[serde(default = "default_locale_min_interval")]
    pub locale_min_interval_secs: u64,

    /// Force a locale write after this long no matter what.
    /// Values below the minimum are clamped up to it.
    #[serde(default = "default_locale_max_interval")]
    pub locale_max_interval_secs: u64,

    /// Minimum spacing between writes of a changed locale.
    #[serde(default = "default_locale_change_debounce")]
    pub locale_change_debounce_secs: u64,

    /// Minimum spacing between liveness touches.
    #[serde(default = "default_touch_interval")]
    pub touch_interval_secs: u64,
}

fn default_locale_min_interval() -> u64 {
    86_400
}
fn default_locale_max_interval() -> u64 {
    604_800
}
fn default_locale_change_debounce() -> u64 {
    600
}
fn default_touch_interval() -> u64 {
    3_600
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        ThrottleSettings {
            locale_min_interval_secs: default_locale_min_interval(),
            locale_max_interval_secs: default_locale_max_interval(),
            locale_change_debounce_secs: default_locale_change_debounce(),
            touch_interval_secs: default_touch_interval(),
        }
    }
}

// =============================================================================
// Backoff Settings
// =============================================================================

/// Suppression window for blind retries of unchanged intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSettings {
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

fn default_retry_interval() -> u64 {
    300
}

impl Default for BackoffSettings {
    fn default() -> Self {
        BackoffSettings {
            retry_interval_secs: default_retry_interval(),
        }
    }
}

// =============================================================================
// Flush Worker Settings
// =============================================================================

/// Background flush worker timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushSettings {
    /// Interval between flush attempts (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// First retry delay after a failed flush (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound of the retry delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}
fn default_initial_backoff() -> u64 {
    1_000
}
fn default_max_backoff() -> u64 {
    900
}

impl Default for FlushSettings {
    fn default() -> Self {
        FlushSettings {
            poll_interval_secs: default_poll_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl FlushSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Lifecycle Settings
// =============================================================================

/// Auth lifecycle dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Deadline shared by every priority tier of one dispatch.
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

fn default_callback_timeout() -> u64 {
    10
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        LifecycleSettings {
            callback_timeout_secs: default_callback_timeout(),
        }
    }
}

impl LifecycleSettings {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local database location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub throttle: ThrottleSettings,

    #[serde(default)]
    pub backoff: BackoffSettings,

    #[serde(default)]
    pub flush: FlushSettings,

    #[serde(default)]
    pub lifecycle: LifecycleSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// [`SyncConfig::load`] with overrides read from `lookup`.
    fn load_with(
        config_path: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(lookup);
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load sync config, using defaults");
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// Every interval must be positive. A ceiling below the minimum is
    /// accepted (the throttle clamps it) but reported.
    pub fn validate(&self) -> SyncResult<()> {
        let intervals = [
            ("throttle.locale_min_interval_secs", self.throttle.locale_min_interval_secs),
            ("throttle.locale_max_interval_secs", self.throttle.locale_max_interval_secs),
            ("throttle.locale_change_debounce_secs", self.throttle.locale_change_debounce_secs),
            ("throttle.touch_interval_secs", self.throttle.touch_interval_secs),
            ("backoff.retry_interval_secs", self.backoff.retry_interval_secs),
            ("flush.poll_interval_secs", self.flush.poll_interval_secs),
            ("flush.initial_backoff_ms", self.flush.initial_backoff_ms),
            ("flush.max_backoff_secs", self.flush.max_backoff_secs),
            ("lifecycle.callback_timeout_secs", self.lifecycle.callback_timeout_secs),
        ];

        for (name, value) in intervals {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.throttle.locale_max_interval_secs < self.throttle.locale_min_interval_secs {
            warn!(
                min = self.throttle.locale_min_interval_secs,
                max = self.throttle.locale_max_interval_secs,
                "locale_max_interval_secs is below the minimum; the minimum will be used"
            );
        }

        if let Some(ref tz) = self.device.timezone {
            beacon_core::validation::validate_timezone(tz)
                .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        }

        Ok(())
    }

    /// Applies overrides from `lookup` (environment variable names).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(version) = lookup("BEACON_APP_VERSION") {
            self.device.app_version = Some(version);
        }

        if let Some(tz) = lookup("BEACON_TIMEZONE") {
            debug!(timezone = %tz, "Overriding timezone from environment");
            self.device.timezone = Some(tz);
        }

        let numeric = [
            ("BEACON_LOCALE_MIN_INTERVAL_SECS", &mut self.throttle.locale_min_interval_secs),
            ("BEACON_LOCALE_MAX_INTERVAL_SECS", &mut self.throttle.locale_max_interval_secs),
            ("BEACON_LOCALE_DEBOUNCE_SECS", &mut self.throttle.locale_change_debounce_secs),
            ("BEACON_TOUCH_INTERVAL_SECS", &mut self.throttle.touch_interval_secs),
            ("BEACON_RETRY_INTERVAL_SECS", &mut self.backoff.retry_interval_secs),
            ("BEACON_FLUSH_POLL_SECS", &mut self.flush.poll_interval_secs),
            ("BEACON_CALLBACK_TIMEOUT_SECS", &mut self.lifecycle.callback_timeout_secs),
        ];

        for (key, slot) in numeric {
            if let Some(raw) = lookup(key) {
                match raw.parse::<u64>() {
                    Ok(value) => *slot = value,
                    Err(_) => warn!(key, value = %raw, "Ignoring non-numeric override"),
                }
            }
        }

        if let Some(path) = lookup("BEACON_DB_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "beacon", "beacon")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database file: configured path, else `<data dir>/beacon.db`.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.path.clone().or_else(|| {
            directories::ProjectDirs::from("dev", "beacon", "beacon")
                .map(|dirs| dirs.data_dir().join("beacon.db"))
        })
    }

    pub fn locale_throttle(&self) -> LocaleThrottle {
        LocaleThrottle {
            min_interval_unchanged: secs(self.throttle.locale_min_interval_secs),
            max_interval_ceiling: secs(self.throttle.locale_max_interval_secs),
            change_debounce: secs(self.throttle.locale_change_debounce_secs),
        }
    }

    pub fn touch_interval(&self) -> chrono::Duration {
        secs(self.throttle.touch_interval_secs)
    }

    pub fn retry_interval(&self) -> chrono::Duration {
        secs(self.backoff.retry_interval_secs)
    }
}

/// Upper bound for configured intervals (about a century).
const MAX_INTERVAL_SECS: u64 = 3_153_600_000;

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(value.min(MAX_INTERVAL_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.throttle.locale_min_interval_secs, 86_400);
        assert_eq!(config.throttle.locale_change_debounce_secs, 600);
        assert_eq!(config.backoff.retry_interval_secs, 300);
        assert_eq!(config.lifecycle.callback_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [device]
            app_version = "3.2.1"

            [throttle]
            touch_interval_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.device.app_version.as_deref(), Some("3.2.1"));
        assert_eq!(config.throttle.touch_interval_secs, 120);
        assert_eq!(config.throttle.locale_max_interval_secs, 604_800);
        assert_eq!(config.flush.poll_interval_secs, 60);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        config.throttle.touch_interval_secs = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        // Ceiling below minimum is accepted and clamped at decision time
        let mut config = SyncConfig::default();
        config.throttle.locale_min_interval_secs = 60;
        config.throttle.locale_max_interval_secs = 30;
        assert!(config.validate().is_ok());
        assert_eq!(config.locale_throttle().ceiling(), chrono::Duration::seconds(60));

        let mut config = SyncConfig::default();
        config.device.timezone = Some("not a zone".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BEACON_TIMEZONE", "Asia/Tokyo"),
            ("BEACON_TOUCH_INTERVAL_SECS", "90"),
            ("BEACON_RETRY_INTERVAL_SECS", "soon"),
            ("BEACON_DB_PATH", "/tmp/beacon-test.db"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.device.timezone.as_deref(), Some("Asia/Tokyo"));
        assert_eq!(config.throttle.touch_interval_secs, 90);
        assert_eq!(config.backoff.retry_interval_secs, 300);
        assert_eq!(
            config.database_path(),
            Some(PathBuf::from("/tmp/beacon-test.db"))
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sync.toml");

        let mut config = SyncConfig::default();
        config.device.app_version = Some("9.9.9".into());
        config.save(Some(path.clone())).unwrap();

        let loaded = SyncConfig::load_with(Some(path.clone()), |_| None).unwrap();
        assert_eq!(loaded.device.app_version.as_deref(), Some("9.9.9"));

        // Overrides still win over the file
        let loaded = SyncConfig::load_with(Some(path), |key| {
            (key == "BEACON_APP_VERSION").then(|| "10.0.0".to_string())
        })
        .unwrap();
        assert_eq!(loaded.device.app_version.as_deref(), Some("10.0.0"));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&SyncConfig::default()).unwrap();
        assert!(toml_str.contains("[throttle]"));
        assert!(toml_str.contains("[flush]"));
    }
}
