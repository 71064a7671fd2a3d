//! Weekly leaderboard aggregator: per (user, ISO-week) running XP totals.
//!
//! One row per user per Monday-keyed ISO week, upserted as awards land. Old
//! weeks are retained for history and never touched again, which is what
//! gives week-over-week isolation.

use crate::core::error::QuestlineError;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

pub const LEADERBOARD_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS weekly_leaderboard (
        user_id TEXT NOT NULL,
        week_start TEXT NOT NULL,
        xp_earned INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, week_start)
    )
";
pub const LEADERBOARD_SCHEMA_INDEX_WEEK: &str =
    "CREATE INDEX IF NOT EXISTS idx_weekly_leaderboard_week ON weekly_leaderboard(week_start)";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WeeklyLeaderboardEntry {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub xp_earned: i64,
}

/// Add a positive XP grant to the user's entry for `week_start`.
/// Non-positive amounts (corrections) are not ranking signal and are skipped.
pub fn add_weekly_xp(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    week_start: NaiveDate,
) -> Result<(), QuestlineError> {
    if amount <= 0 {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO weekly_leaderboard(user_id, week_start, xp_earned)
         VALUES(?1, ?2, ?3)
         ON CONFLICT(user_id, week_start) DO UPDATE SET
            xp_earned = xp_earned + excluded.xp_earned",
        params![user_id, week_start.format("%Y-%m-%d").to_string(), amount],
    )?;
    Ok(())
}

fn row_to_entry(row: &rusqlite::Row) -> Result<WeeklyLeaderboardEntry, rusqlite::Error> {
    let raw_date: String = row.get(1)?;
    let week_start = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(WeeklyLeaderboardEntry {
        user_id: row.get(0)?,
        week_start,
        xp_earned: row.get(2)?,
    })
}

/// Ranking for one week: `xp_earned` descending, ties broken by `user_id`
/// ascending for determinism.
pub fn top_weekly(
    conn: &Connection,
    week_start: NaiveDate,
    limit: usize,
) -> Result<Vec<WeeklyLeaderboardEntry>, QuestlineError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, week_start, xp_earned
         FROM weekly_leaderboard WHERE week_start = ?1
         ORDER BY xp_earned DESC, user_id ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![week_start.format("%Y-%m-%d").to_string(), limit as i64],
        row_to_entry,
    )?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// XP accumulated by one user in one week, zero if no entry.
pub fn weekly_total(
    conn: &Connection,
    user_id: &str,
    week_start: NaiveDate,
) -> Result<i64, QuestlineError> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(xp_earned), 0) FROM weekly_leaderboard
         WHERE user_id = ?1 AND week_start = ?2",
        params![user_id, week_start.format("%Y-%m-%d").to_string()],
        |row| row.get(0),
    )?;
    Ok(total)
}
