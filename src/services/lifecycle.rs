//! Gallery lifecycle: phase classification, cache TTL derivation, transition
//! detection for the scheduler and the reminder date rule.
//!
//! Everything here is a pure function of timestamps so that HTTP handlers,
//! repositories and the scheduler agree on a single definition of "live".

use chrono::{DateTime, Days, Duration, TimeZone, Utc};
use serde::Serialize;

use crate::db::Gallery;

/// Reminder emails go out this many days before expiration.
pub const REMINDER_DAYS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GalleryPhase {
    /// `now < live`
    Pending,
    /// `live <= now < expiration`
    Live,
    /// `now >= expiration`
    Expired,
}

/// Boundary a gallery crossed during the most recent polling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    WentLive,
    Expired,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::WentLive => "went live",
            Transition::Expired => "expired",
        }
    }
}

/// Classify `now` against the live window `[live, expiration)`.
///
/// Expiration wins when both bounds have passed, so a gallery stored with
/// `live >= expiration` is never reported as live.
pub fn phase_at(now: DateTime<Utc>, live: DateTime<Utc>, expiration: DateTime<Utc>) -> GalleryPhase {
    if now >= expiration {
        GalleryPhase::Expired
    } else if now >= live {
        GalleryPhase::Live
    } else {
        GalleryPhase::Pending
    }
}

/// Seconds a response may be cached for: `max(0, expiration - now)`.
pub fn cache_ttl_seconds(now: DateTime<Utc>, expiration: DateTime<Utc>) -> u64 {
    (expiration - now).num_seconds().max(0) as u64
}

/// True when `boundary` falls inside the window `(now - window, now]`.
pub fn entered_within(boundary: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    boundary <= now && boundary > now - window
}

/// Edge-triggered transition check: reports a gallery only during the one
/// polling window in which it crossed `live` or `expiration`.
pub fn transition_within(
    now: DateTime<Utc>,
    live: DateTime<Utc>,
    expiration: DateTime<Utc>,
    window: Duration,
) -> Option<Transition> {
    match phase_at(now, live, expiration) {
        GalleryPhase::Live if entered_within(live, now, window) => Some(Transition::WentLive),
        GalleryPhase::Expired if entered_within(expiration, now, window) => {
            Some(Transition::Expired)
        }
        _ => None,
    }
}

/// Whether the reminder for a gallery expiring at `expiration` is due on
/// the calendar day of `now`, in `now`'s time zone.
pub fn reminder_due<Tz: TimeZone>(expiration: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
    let local_expiration = expiration.with_timezone(&now.timezone());
    match local_expiration.checked_sub_days(Days::new(REMINDER_DAYS)) {
        Some(reminder) => reminder.date_naive() == now.date_naive(),
        None => false,
    }
}

/// A pre-built zip may be served only when the flag is set and the file is
/// actually on disk; anything else means building on demand.
pub fn zip_usable(zips_ready: bool, file_present: bool) -> bool {
    zips_ready && file_present
}

impl Gallery {
    pub fn phase_at(&self, now: DateTime<Utc>) -> GalleryPhase {
        phase_at(now, self.live, self.expiration)
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.phase_at(now) == GalleryPhase::Live
    }

    pub fn cache_ttl_at(&self, now: DateTime<Utc>) -> u64 {
        cache_ttl_seconds(now, self.expiration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn phase_boundaries_are_closed_below_open_above() {
        let live = at(10, 0);
        let expiration = at(12, 0);

        assert_eq!(phase_at(at(9, 59), live, expiration), GalleryPhase::Pending);
        assert_eq!(phase_at(live, live, expiration), GalleryPhase::Live);
        assert_eq!(phase_at(at(11, 59), live, expiration), GalleryPhase::Live);
        assert_eq!(phase_at(expiration, live, expiration), GalleryPhase::Expired);
        assert_eq!(phase_at(at(23, 0), live, expiration), GalleryPhase::Expired);
    }

    #[test]
    fn inverted_window_is_never_live() {
        let live = at(12, 0);
        let expiration = at(10, 0);
        for now in [at(9, 0), at(11, 0), at(13, 0)] {
            assert_ne!(phase_at(now, live, expiration), GalleryPhase::Live);
        }
    }

    #[test]
    fn cache_ttl_never_negative() {
        let expiration = at(12, 0);
        assert_eq!(cache_ttl_seconds(at(11, 0), expiration), 3600);
        assert_eq!(cache_ttl_seconds(expiration, expiration), 0);
        assert_eq!(cache_ttl_seconds(at(13, 0), expiration), 0);
    }

    #[test]
    fn transition_detected_once_per_window() {
        let window = Duration::minutes(10);
        let live = at(10, 0);
        let expiration = at(18, 0);

        // live one minute ago
        assert_eq!(
            transition_within(at(10, 1), live, expiration, window),
            Some(Transition::WentLive)
        );
        // next pass, still live: no re-trigger
        assert_eq!(transition_within(at(10, 11), live, expiration, window), None);
        // pending galleries never trigger
        assert_eq!(transition_within(at(9, 55), live, expiration, window), None);
        // expired in the last window
        assert_eq!(
            transition_within(at(18, 5), live, expiration, window),
            Some(Transition::Expired)
        );
        assert_eq!(transition_within(at(18, 30), live, expiration, window), None);
    }

    #[test]
    fn window_bounds() {
        let window = Duration::minutes(10);
        let now = at(10, 10);
        assert!(entered_within(now, now, window));
        assert!(!entered_within(at(10, 0), now, window));
        assert!(entered_within(at(10, 0) + Duration::seconds(1), now, window));
        assert!(!entered_within(at(10, 11), now, window));
    }

    #[test]
    fn reminder_matches_calendar_day_not_timestamp() {
        let now = at(8, 0);
        let expiration = Utc.with_ymd_and_hms(2024, 6, 6, 23, 30, 0).unwrap();
        assert!(reminder_due(expiration, &now));

        let too_late = Utc.with_ymd_and_hms(2024, 6, 7, 0, 30, 0).unwrap();
        assert!(!reminder_due(too_late, &now));
    }

    #[test]
    fn reminder_uses_local_calendar() {
        // 2024-06-06 02:00 UTC is still 2024-06-05 in UTC-5
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let expiration = Utc.with_ymd_and_hms(2024, 6, 6, 2, 0, 0).unwrap();
        let local_now = offset.with_ymd_and_hms(2024, 5, 31, 8, 0, 0).unwrap();
        assert!(reminder_due(expiration, &local_now));

        let utc_now = Utc.with_ymd_and_hms(2024, 5, 31, 8, 0, 0).unwrap();
        assert!(!reminder_due(expiration, &utc_now));
    }

    #[test]
    fn zip_requires_flag_and_file() {
        assert!(zip_usable(true, true));
        assert!(!zip_usable(true, false));
        assert!(!zip_usable(false, true));
    }
}
