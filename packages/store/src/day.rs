//! Calendar-day resolution for daily records.
//!
//! A record is keyed by a day, not an instant. [`DayPolicy`] decides which
//! calendar the wall-clock instant is sliced with: the user's local timezone
//! (default) or UTC. The instant comes from an injected [`Clock`].

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
#[derive(Clone, Debug)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Clock fixed at noon UTC on the given day.
    pub fn at_day(year: i32, month: u32, day: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default();
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc();
        Self::new(noon)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Which calendar "today" is computed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPolicy {
    /// The timezone of the machine running the client.
    #[default]
    Local,
    Utc,
}

impl DayPolicy {
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            DayPolicy::Local => instant.with_timezone(&Local).date_naive(),
            DayPolicy::Utc => instant.date_naive(),
        }
    }

    pub fn today(&self, clock: &dyn Clock) -> NaiveDate {
        self.day_of(clock.now())
    }
}

impl fmt::Display for DayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayPolicy::Local => write!(f, "local"),
            DayPolicy::Utc => write!(f, "utc"),
        }
    }
}

/// A clock paired with the policy that slices its instants into days.
#[derive(Clone)]
pub struct Calendar {
    clock: Arc<dyn Clock>,
    policy: DayPolicy,
}

impl Calendar {
    pub fn new(clock: Arc<dyn Clock>, policy: DayPolicy) -> Self {
        Self { clock, policy }
    }

    /// Wall clock with the given policy.
    pub fn system(policy: DayPolicy) -> Self {
        Self::new(Arc::new(SystemClock), policy)
    }

    pub fn policy(&self) -> DayPolicy {
        self.policy
    }

    /// Today's date; computed afresh on every call.
    pub fn today(&self) -> NaiveDate {
        self.policy.today(self.clock.as_ref())
    }
}

impl fmt::Debug for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calendar")
            .field("policy", &self.policy)
            .field("now", &self.clock.now())
            .finish()
    }
}

/// Format a day the way record tables store it.
pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_utc_policy_slices_on_utc_midnight() {
        let before = Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap();

        assert_eq!(iso_date(DayPolicy::Utc.day_of(before)), "2024-01-15");
        assert_eq!(iso_date(DayPolicy::Utc.day_of(after)), "2024-01-16");
    }

    #[test]
    fn test_fixed_clock_can_advance() {
        let clock = FixedClock::at_day(2024, 1, 15);
        assert_eq!(iso_date(DayPolicy::Utc.today(&clock)), "2024-01-15");

        clock.set(Utc.with_ymd_and_hms(2024, 1, 16, 8, 0, 0).unwrap());
        assert_eq!(iso_date(DayPolicy::Utc.today(&clock)), "2024-01-16");
    }

    #[test]
    fn test_calendar_reads_clock_each_call() {
        let clock = FixedClock::at_day(2024, 1, 15);
        let calendar = Calendar::new(Arc::new(clock.clone()), DayPolicy::Utc);
        assert_eq!(iso_date(calendar.today()), "2024-01-15");

        clock.set(Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 1).unwrap());
        assert_eq!(iso_date(calendar.today()), "2024-01-16");
    }

    #[test]
    fn test_policy_parses_from_lowercase() {
        let policy: DayPolicy = serde_json::from_str("\"utc\"").unwrap();
        assert_eq!(policy, DayPolicy::Utc);
        assert_eq!(DayPolicy::default().to_string(), "local");
    }
}
