//! # Backoff Policy
//!
//! Decides whether a flush attempt should be suppressed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        should_backoff()                                 │
//! │                                                                         │
//! │  never attempted?          ──► attempt now                             │
//! │  has_changed_fields?       ──► attempt now (urgent, bypass)            │
//! │  now - last < interval?    ──► back off                                │
//! │  otherwise                 ──► attempt now                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Material changes always go out immediately; blind retries of touch-only
//! intents are spaced by `backoff_interval`.

use chrono::{DateTime, Duration, Utc};

use crate::throttle::elapsed_since;

/// Returns true if the flush attempt should be skipped for now.
///
/// ## Example
/// ```rust
/// use beacon_core::backoff::should_backoff;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
/// let last = Some(now - Duration::seconds(10));
///
/// assert!(should_backoff(last, now, false, Duration::minutes(5)));
/// assert!(!should_backoff(last, now, true, Duration::minutes(5)));
/// ```
pub fn should_backoff(
    last_attempt_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    has_changed_fields: bool,
    backoff_interval: Duration,
) -> bool {
    let Some(last) = last_attempt_at else {
        return false;
    };

    if has_changed_fields {
        return false;
    }

    match elapsed_since(last, now) {
        Some(elapsed) => elapsed < backoff_interval,
        // Attempt stamp in the future: nothing sensible to wait for
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_prior_attempt_never_backs_off() {
        assert!(!should_backoff(None, now(), false, Duration::hours(1)));
    }

    #[test]
    fn test_changed_fields_bypass_backoff() {
        let last = Some(now() - Duration::milliseconds(1));
        assert!(!should_backoff(last, now(), true, Duration::days(1)));
    }

    #[test]
    fn test_backoff_window_boundary() {
        let interval = Duration::seconds(300);
        assert!(should_backoff(Some(now() - Duration::seconds(299)), now(), false, interval));
        assert!(!should_backoff(Some(now() - Duration::seconds(300)), now(), false, interval));
    }

    #[test]
    fn test_future_attempt_does_not_block() {
        let future = Some(now() + Duration::hours(1));
        assert!(!should_backoff(future, now(), false, Duration::minutes(5)));
    }
}
