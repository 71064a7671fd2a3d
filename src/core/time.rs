//! Clock abstraction and calendar helpers for streak and week-boundary math.
//!
//! Streak transitions and leaderboard bucketing both depend on "what day is
//! it", so the engine never reads the system clock directly. Operations take
//! a `&dyn Clock`; production callers pass [`SystemClock`], tests pass
//! [`FixedClock`].

use chrono::{Datelike, Duration, Local, NaiveDate};
use ulid::Ulid;

/// Date/time source injected into every engine operation.
pub trait Clock: Send + Sync {
    /// Current calendar date in the platform's local timezone.
    fn today(&self) -> NaiveDate;
    /// Current instant as an RFC 3339 timestamp, used for `created_at` /
    /// `unlocked_at` columns.
    fn now_iso(&self) -> String;
}

/// Real wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_iso(&self) -> String {
        Local::now().to_rfc3339()
    }
}

/// Clock pinned to a single date, for deterministic streak/week tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn now_iso(&self) -> String {
        format!("{}T00:00:00+00:00", self.date.format("%Y-%m-%d"))
    }
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}
