//! # Device Environment
//!
//! What the device currently looks like: locale, platform, app version.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SystemEnvironment timezone resolution                                  │
//! │                                                                         │
//! │   [device] timezone (config / BEACON_TIMEZONE)                         │
//! │        │ unset                                                          │
//! │        ▼                                                                │
//! │   TZ environment variable (leading ':' and zoneinfo path stripped)     │
//! │        │ unset / blank                                                  │
//! │        ▼                                                                │
//! │   OS zone name (iana-time-zone, e.g. /etc/localtime on Linux)          │
//! │        │ unresolved                                                     │
//! │        ▼                                                                │
//! │   name derived from the offset: "UTC", "Etc/GMT+5", "UTC+0530"         │
//! │                                                                         │
//! │   Offset always comes from the OS local time (chrono::Local), so the   │
//! │   name never contradicts it.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Mutex, PoisonError};

use beacon_core::validation::validate_timezone;
use beacon_core::{LocaleSnapshot, Platform};
use chrono::{Local, Offset};
use tracing::debug;

use crate::config::DeviceSettings;

/// Read-only view of the device the engine runs on.
pub trait DeviceEnvironment: Send + Sync {
    fn locale(&self) -> LocaleSnapshot;
    fn platform(&self) -> Platform;
    fn app_version(&self) -> Option<String>;
}

// =============================================================================
// SystemEnvironment
// =============================================================================

/// Environment backed by the operating system.
#[derive(Debug, Clone, Default)]
pub struct SystemEnvironment {
    timezone_override: Option<String>,
    app_version: Option<String>,
}

impl SystemEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &DeviceSettings) -> Self {
        SystemEnvironment {
            timezone_override: settings.timezone.clone(),
            app_version: settings.app_version.clone(),
        }
    }

    fn os_timezone() -> Option<String> {
        match iana_time_zone::get_timezone() {
            Ok(name) => Some(name),
            Err(err) => {
                debug!(error = %err, "OS time zone name unavailable");
                None
            }
        }
    }
}

impl DeviceEnvironment for SystemEnvironment {
    fn locale(&self) -> LocaleSnapshot {
        let offset_minutes = Local::now().offset().fix().local_minus_utc() / 60;
        let timezone = resolve_timezone(
            self.timezone_override.as_deref(),
            std::env::var("TZ").ok().as_deref(),
            Self::os_timezone,
            offset_minutes,
        );
        LocaleSnapshot::new(timezone, offset_minutes)
    }

    fn platform(&self) -> Platform {
        Platform::current()
    }

    fn app_version(&self) -> Option<String> {
        self.app_version.clone()
    }
}

/// Picks the zone name: override, then `TZ`, then the OS zone, then a name
/// derived from `offset_minutes`. Names that fail validation are skipped.
fn resolve_timezone(
    override_name: Option<&str>,
    tz_var: Option<&str>,
    os_zone: impl FnOnce() -> Option<String>,
    offset_minutes: i32,
) -> String {
    let usable = |name: &str| {
        let name = name.trim();
        validate_timezone(name).is_ok().then(|| name.to_string())
    };

    override_name
        .and_then(usable)
        .or_else(|| tz_var.map(strip_tz_prefix).and_then(usable))
        .or_else(|| os_zone().as_deref().and_then(usable))
        .unwrap_or_else(|| offset_zone_name(offset_minutes))
}

/// `TZ=:Europe/Paris` and `TZ=/usr/share/zoneinfo/Europe/Paris` both name
/// `Europe/Paris`.
fn strip_tz_prefix(tz: &str) -> &str {
    let tz = tz.trim().trim_start_matches(':');
    match tz.find("zoneinfo/") {
        Some(at) => &tz[at + "zoneinfo/".len()..],
        None => tz,
    }
}

/// Zone name for a bare UTC offset.
///
/// Whole hours map to the IANA `Etc/GMT` zones, whose sign is inverted
/// (UTC-5 is `Etc/GMT+5`). Other offsets get a `UTC+HHMM` label.
fn offset_zone_name(offset_minutes: i32) -> String {
    if offset_minutes == 0 {
        return "UTC".to_string();
    }

    let sign = if offset_minutes < 0 { '-' } else { '+' };
    let hours = offset_minutes.unsigned_abs() / 60;
    let minutes = offset_minutes.unsigned_abs() % 60;

    if minutes == 0 {
        let etc_sign = if offset_minutes < 0 { '+' } else { '-' };
        format!("Etc/GMT{etc_sign}{hours}")
    } else {
        format!("UTC{sign}{hours:02}{minutes:02}")
    }
}

// =============================================================================
// StaticEnvironment
// =============================================================================

#[derive(Debug, Clone)]
struct StaticValues {
    locale: LocaleSnapshot,
    platform: Platform,
    app_version: Option<String>,
}

/// Settable environment for tests and embedders that push values in.
#[derive(Debug)]
pub struct StaticEnvironment {
    values: Mutex<StaticValues>,
}

impl StaticEnvironment {
    pub fn new(locale: LocaleSnapshot, platform: Platform) -> Self {
        StaticEnvironment {
            values: Mutex::new(StaticValues {
                locale,
                platform,
                app_version: None,
            }),
        }
    }

    pub fn with_app_version(self, version: impl Into<String>) -> Self {
        self.update(|v| v.app_version = Some(version.into()));
        self
    }

    pub fn set_locale(&self, locale: LocaleSnapshot) {
        self.update(|v| v.locale = locale);
    }

    pub fn set_platform(&self, platform: Platform) {
        self.update(|v| v.platform = platform);
    }

    fn update(&self, f: impl FnOnce(&mut StaticValues)) {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut values);
    }

    fn snapshot(&self) -> StaticValues {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeviceEnvironment for StaticEnvironment {
    fn locale(&self) -> LocaleSnapshot {
        self.snapshot().locale
    }

    fn platform(&self) -> Platform {
        self.snapshot().platform
    }

    fn app_version(&self) -> Option<String> {
        self.snapshot().app_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let env = SystemEnvironment::from_settings(&DeviceSettings {
            app_version: Some("1.2.3".into()),
            timezone: Some("Europe/Paris".into()),
        });

        let locale = env.locale();
        assert_eq!(locale.timezone, "Europe/Paris");
        assert!((-720..=840).contains(&locale.timezone_offset_minutes));
        assert_eq!(env.app_version().as_deref(), Some("1.2.3"));
        assert_eq!(env.platform(), Platform::current());
    }

    #[test]
    fn test_unresolved_zone_agrees_with_offset() {
        // New York in winter with no override, no TZ and no OS zone name
        assert_eq!(resolve_timezone(None, None, || None, -300), "Etc/GMT+5");
        assert_eq!(resolve_timezone(None, None, || None, 0), "UTC");
        assert_eq!(resolve_timezone(None, None, || None, 540), "Etc/GMT-9");
        assert_eq!(resolve_timezone(None, None, || None, 330), "UTC+0530");
        assert_eq!(resolve_timezone(None, None, || None, -210), "UTC-0330");

        for offset in [-720, -570, -300, 0, 345, 840] {
            let name = resolve_timezone(None, None, || None, offset);
            assert!(validate_timezone(&name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_zone_resolution_order() {
        let os = || Some("America/New_York".to_string());

        assert_eq!(resolve_timezone(Some("Asia/Tokyo"), Some(":Europe/Paris"), os, 540), "Asia/Tokyo");
        assert_eq!(resolve_timezone(None, Some(":Europe/Paris"), os, 60), "Europe/Paris");
        assert_eq!(
            resolve_timezone(None, Some("/usr/share/zoneinfo/Europe/Lisbon"), os, 0),
            "Europe/Lisbon"
        );
        assert_eq!(resolve_timezone(None, None, os, -300), "America/New_York");
        assert_eq!(resolve_timezone(None, Some("  "), os, -300), "America/New_York");
    }

    #[test]
    fn test_invalid_names_fall_through() {
        let os = || Some("not a zone!".to_string());
        assert_eq!(resolve_timezone(Some(""), None, os, -300), "Etc/GMT+5");
    }

    #[test]
    fn test_static_environment_updates() {
        let env = StaticEnvironment::new(LocaleSnapshot::new("America/New_York", -300), Platform::Ios)
            .with_app_version("5.0");

        env.set_locale(LocaleSnapshot::new("America/New_York", -240));
        env.set_platform(Platform::Android);

        assert_eq!(env.locale().timezone_offset_minutes, -240);
        assert_eq!(env.platform(), Platform::Android);
        assert_eq!(env.app_version().as_deref(), Some("5.0"));
    }
}
