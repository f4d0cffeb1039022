//! # Throttle Policy
//!
//! Pure decisions on whether a locale sync or a liveness touch is due.
//!
//! ## Locale Sync Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     should_sync_locale()                                │
//! │                                                                         │
//! │  last_server_sync_at absent? ───────────────────────────► SYNC         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  elapsed >= max(ceiling, min_interval)? ────────────────► SYNC         │
//! │           │            (safety net for a stuck timestamp)               │
//! │           ▼                                                             │
//! │  locale changed?                                                       │
//! │     ├── yes: elapsed >= change_debounce ? SYNC : WAIT                  │
//! │     │        (stops flapping near zone borders)                        │
//! │     └── no:  elapsed >= min_interval    ? SYNC : WAIT                  │
//! │              (periodic freshness heartbeat)                            │
//! │                                                                         │
//! │  All comparisons are inclusive: hitting the interval exactly syncs.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Clock Skew
//! A `last` timestamp later than `now` cannot be waited out (the device
//! clock moved backwards, or the stored value is corrupt). It is treated as
//! fully elapsed so the device heals itself on the next call.

use chrono::{DateTime, Duration, Utc};

/// Time elapsed since `last`, or `None` if `last` lies in the future.
#[inline]
pub fn elapsed_since(last: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    let elapsed = now.signed_duration_since(last);
    (elapsed >= Duration::zero()).then_some(elapsed)
}

/// Returns true if at least `interval` has passed since `last`.
///
/// Future timestamps count as elapsed; see the module docs.
#[inline]
pub fn has_elapsed(last: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
    match elapsed_since(last, now) {
        Some(elapsed) => elapsed >= interval,
        None => true,
    }
}

// =============================================================================
// Locale Throttle
// =============================================================================

/// Ceiling actually applied: never below the unchanged-minimum interval.
#[inline]
pub fn effective_ceiling(min_interval_unchanged: Duration, max_interval_ceiling: Duration) -> Duration {
    max_interval_ceiling.max(min_interval_unchanged)
}

/// Decides whether the locale (timezone name / offset) should be written.
///
/// ## Arguments
/// * `last_server_sync_at` - last confirmed locale write, if any
/// * `did_change` - zone name or offset differs from the last known value
/// * `min_interval_unchanged` - heartbeat interval when nothing changed
/// * `max_interval_ceiling` - forced-sync ceiling (clamped to the minimum)
/// * `change_debounce` - minimum spacing between writes of changed values
///
/// ## Example
/// ```rust
/// use beacon_core::throttle::should_sync_locale;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap();
/// let debounce = Duration::minutes(10);
/// let day = Duration::days(1);
///
/// // DST moved the offset 5 minutes after the last sync: wait
/// assert!(!should_sync_locale(Some(now - Duration::minutes(5)), now, true, day, day, debounce));
/// // ...and 11 minutes after: go
/// assert!(should_sync_locale(Some(now - Duration::minutes(11)), now, true, day, day, debounce));
/// ```
pub fn should_sync_locale(
    last_server_sync_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    did_change: bool,
    min_interval_unchanged: Duration,
    max_interval_ceiling: Duration,
    change_debounce: Duration,
) -> bool {
    let Some(last) = last_server_sync_at else {
        return true;
    };

    let ceiling = effective_ceiling(min_interval_unchanged, max_interval_ceiling);
    if has_elapsed(last, now, ceiling) {
        return true;
    }

    if did_change {
        has_elapsed(last, now, change_debounce)
    } else {
        has_elapsed(last, now, min_interval_unchanged)
    }
}

/// Bundled locale throttle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleThrottle {
    pub min_interval_unchanged: Duration,
    pub max_interval_ceiling: Duration,
    pub change_debounce: Duration,
}

impl LocaleThrottle {
    /// See [`should_sync_locale`].
    pub fn should_sync(
        &self,
        last_server_sync_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        did_change: bool,
    ) -> bool {
        should_sync_locale(
            last_server_sync_at,
            now,
            did_change,
            self.min_interval_unchanged,
            self.max_interval_ceiling,
            self.change_debounce,
        )
    }

    /// Returns the ceiling after clamping.
    pub fn ceiling(&self) -> Duration {
        effective_ceiling(self.min_interval_unchanged, self.max_interval_ceiling)
    }
}

impl Default for LocaleThrottle {
    fn default() -> Self {
        LocaleThrottle {
            min_interval_unchanged: Duration::days(1),
            max_interval_ceiling: Duration::days(7),
            change_debounce: Duration::minutes(10),
        }
    }
}

// =============================================================================
// Touch Throttle
// =============================================================================

/// Returns true if a liveness touch is due.
#[inline]
pub fn should_touch(last_touch_at: Option<DateTime<Utc>>, now: DateTime<Utc>, throttle_interval: Duration) -> bool {
    match last_touch_at {
        None => true,
        Some(last) => has_elapsed(last, now, throttle_interval),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
