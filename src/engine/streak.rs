//! Daily streak state machine.
//!
//! Pure transition from the previous activity date to the next streak value.
//! Invoked once per login/first-activity-of-day, never per XP grant, so
//! finishing several lessons in one day cannot inflate the streak.

use chrono::{Duration, NaiveDate};

/// Next streak value given the stored state and today's date.
///
/// Returns `(new_streak_days, changed)`:
/// - no previous activity → streak starts at 1
/// - already counted today → unchanged (same-day idempotence)
/// - active yesterday → streak + 1
/// - any longer gap → reset to 1
///
/// A `last_activity` in the future (clock skew, restored backup) is treated
/// as already-counted rather than a broken streak.
pub fn advance_streak(
    previous_streak: i64,
    last_activity: Option<NaiveDate>,
    today: NaiveDate,
) -> (i64, bool) {
    match last_activity {
        None => (1, true),
        Some(d) if d >= today => (previous_streak, false),
        Some(d) if d == today - Duration::days(1) => (previous_streak + 1, true),
        Some(_) => (1, true),
    }
}
