//! Injectable time source.
//!
//! Term-window checks and record timestamps read "now" through [`Clock`] so
//! tests can pin the date instead of depending on the wall clock.

use chrono::{NaiveDate, NaiveDateTime, Utc};

/// Source of the current date and time
pub trait Clock: Send + Sync {
    /// Current UTC timestamp
    fn now(&self) -> NaiveDateTime;

    /// Current UTC date
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// A clock stopped at a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Clock fixed at midnight of `date`
    #[must_use]
    pub fn on(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::MIN))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_fixed_clock_reports_its_date() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let clock = FixedClock::on(date);
        assert_eq!(clock.today(), date);
        assert_eq!(clock.now(), clock.now());
    }
}
