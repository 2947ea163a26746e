use chrono::{DateTime, Local, NaiveDate, Utc};

use subsplit_core::Clock;

/// Real-time clock. Timestamps are UTC; the calendar date follows the
/// machine's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
