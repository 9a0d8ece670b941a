//! Monotonic wall-time predicates for the event loop's hourly/daily/midnight
//! triggers, plus the small set of date helpers the rest of the crate needs.
//!
//! All triggers are one-shot: firing advances the next-fire stamp by exactly
//! one period (ground: `mimix/server.py::EventTimer`). A `Clock` trait lets
//! tests supply a fixed or stepped notion of "now" without sleeping.

use chrono::{DateTime, Days, NaiveDate, Utc};

/// Source of the current time. The real implementation reads the system
/// clock; tests substitute a controllable fake.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// `Clock` backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Today's date, per spec.md's `timing.today()`.
pub fn today(clock: &dyn Clock) -> NaiveDate {
    clock.now().date_naive()
}

/// Days since the Unix epoch, per `timing.epoch_days()`. Used for the
/// daily-housekeeping once-per-UTC-day gate in `KeyDirectory::daily_events`.
pub fn epoch_days(clock: &dyn Clock) -> i64 {
    clock.now().timestamp() / 86_400
}

/// Parse a `YYYY-MM-DD` date string, per `timing.dateobj`.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

/// Format a date as `YYYY-MM-DD`, per `timing.datestamp`.
pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// `date + days`, saturating rather than panicking on overflow.
pub fn date_plus_days(d: NaiveDate, days: u64) -> NaiveDate {
    d.checked_add_days(Days::new(days)).unwrap_or(d)
}

// ---------------------------------------------------------------------------
// EventTimer: one-shot hourly / daily / midnight triggers
// ---------------------------------------------------------------------------

/// Tracks the next-fire timestamps for the event loop's three triggers.
///
/// Ground: `mimix/server.py::EventTimer`. Each `*_trigger` call is one-shot —
/// a fired trigger immediately advances to the next period, so a tick that
/// arrives late only fires once, not once per missed period.
pub struct EventTimer {
    hour_stamp: DateTime<Utc>,
    day_stamp: DateTime<Utc>,
    midnight: DateTime<Utc>,
}

impl EventTimer {
    pub fn new(clock: &dyn Clock) -> Self {
        let now = clock.now();
        EventTimer {
            hour_stamp: now + chrono::Duration::hours(1),
            day_stamp: now + chrono::Duration::days(1),
            midnight: next_midnight(now),
        }
    }

    pub fn daily_trigger(&mut self, clock: &dyn Clock) -> bool {
        if clock.now() > self.day_stamp {
            self.day_stamp += chrono::Duration::days(1);
            return true;
        }
        false
    }

    pub fn hourly_trigger(&mut self, clock: &dyn Clock) -> bool {
        if clock.now() > self.hour_stamp {
            self.hour_stamp += chrono::Duration::hours(1);
            return true;
        }
        false
    }

    pub fn midnight_trigger(&mut self, clock: &dyn Clock) -> bool {
        if clock.now() > self.midnight {
            self.midnight = next_midnight(self.midnight);
            return true;
        }
        false
    }
}

fn last_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn next_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    last_midnight(at) + chrono::Duration::days(1)
}

#[cfg(test)]
pub mod test_support {
    use super::Clock;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A `Clock` whose value can be advanced explicitly by tests.
    pub struct FakeClock {
        micros: AtomicI64,
    }

    impl FakeClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            FakeClock {
                micros: AtomicI64::new(start.timestamp_micros()),
            }
        }

        pub fn advance(&self, delta: chrono::Duration) {
            self.micros
                .fetch_add(delta.num_microseconds().unwrap_or(0), Ordering::SeqCst);
        }

        pub fn set(&self, at: DateTime<Utc>) {
            self.micros.store(at.timestamp_micros(), Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst)).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeClock;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hourly_trigger_fires_once_per_period() {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let mut timer = EventTimer::new(&clock);

        assert!(!timer.hourly_trigger(&clock));
        clock.advance(chrono::Duration::minutes(61));
        assert!(timer.hourly_trigger(&clock));
        assert!(!timer.hourly_trigger(&clock));
    }

    #[test]
    fn midnight_trigger_fires_once_per_day_boundary() {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap());
        let mut timer = EventTimer::new(&clock);

        assert!(!timer.midnight_trigger(&clock));
        clock.advance(chrono::Duration::hours(2));
        assert!(timer.midnight_trigger(&clock));
        assert!(!timer.midnight_trigger(&clock));
    }

    #[test]
    fn parse_and_format_date_round_trip() {
        let d = parse_date("2026-03-05").unwrap();
        assert_eq!(format_date(d), "2026-03-05");
    }

    #[test]
    fn epoch_days_matches_known_instant() {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(1970, 1, 3, 1, 0, 0).unwrap());
        assert_eq!(epoch_days(&clock), 2);
    }
}
