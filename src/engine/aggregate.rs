//! Per-user progression aggregate: cached totals derived from the ledger.
//!
//! One row per user holding `xp_total`, stored `level`, `coins`,
//! `streak_days`, and `last_activity`. The aggregate is only ever mutated
//! inside the same transaction as the ledger append that justifies it.

use crate::core::error::QuestlineError;
use crate::core::time::Clock;
use crate::engine::ledger::{self, ActionType, Reference};
use crate::engine::levels::{LevelDefinition, LevelTable};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

pub const AGGREGATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS progression_aggregates (
        user_id TEXT PRIMARY KEY,
        xp_total INTEGER NOT NULL DEFAULT 0,
        level INTEGER NOT NULL DEFAULT 1,
        coins INTEGER NOT NULL DEFAULT 0,
        streak_days INTEGER NOT NULL DEFAULT 0,
        last_activity TEXT,
        updated_at TEXT NOT NULL
    )
";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProgressionAggregate {
    pub user_id: String,
    pub xp_total: i64,
    pub level: i64,
    pub coins: i64,
    pub streak_days: i64,
    pub last_activity: Option<NaiveDate>,
}

impl ProgressionAggregate {
    pub fn fresh(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            xp_total: 0,
            level: 1,
            coins: 0,
            streak_days: 0,
            last_activity: None,
        }
    }
}

fn row_to_aggregate(row: &rusqlite::Row) -> Result<ProgressionAggregate, rusqlite::Error> {
    let raw_date: Option<String> = row.get(5)?;
    let last_activity = match raw_date {
        Some(s) => Some(NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };
    Ok(ProgressionAggregate {
        user_id: row.get(0)?,
        xp_total: row.get(1)?,
        level: row.get(2)?,
        coins: row.get(3)?,
        streak_days: row.get(4)?,
        last_activity,
    })
}

pub fn load(conn: &Connection, user_id: &str) -> Result<Option<ProgressionAggregate>, QuestlineError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, xp_total, level, coins, streak_days, last_activity
         FROM progression_aggregates WHERE user_id = ?1",
    )?;
    let result = stmt.query_row(params![user_id], row_to_aggregate);
    match result {
        Ok(agg) => Ok(Some(agg)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(QuestlineError::Rusqlite(e)),
    }
}

/// Load the stored aggregate, or a fresh zero row for a user seen for the
/// first time. The fresh row is not persisted until the first upsert.
pub fn load_or_default(
    conn: &Connection,
    user_id: &str,
) -> Result<ProgressionAggregate, QuestlineError> {
    Ok(load(conn, user_id)?.unwrap_or_else(|| ProgressionAggregate::fresh(user_id)))
}

pub fn upsert(
    conn: &Connection,
    agg: &ProgressionAggregate,
    now_iso: &str,
) -> Result<(), QuestlineError> {
    conn.execute(
        "INSERT INTO progression_aggregates(user_id, xp_total, level, coins, streak_days, last_activity, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
            xp_total = excluded.xp_total,
            level = excluded.level,
            coins = excluded.coins,
            streak_days = excluded.streak_days,
            last_activity = excluded.last_activity,
            updated_at = excluded.updated_at",
        params![
            agg.user_id,
            agg.xp_total,
            agg.level,
            agg.coins,
            agg.streak_days,
            agg.last_activity.map(|d| d.format("%Y-%m-%d").to_string()),
            now_iso
        ],
    )?;
    Ok(())
}

/// Ledger append plus aggregate accumulation as one unit.
///
/// Inserts the ledger row, adds `amount` to `xp_total` clamped at zero, and
/// re-resolves the level — upward only. A stored level never shrinks, even
/// when a negative correction drops `xp_total` below its threshold. Returns
/// the new level definition when the stored level rose.
///
/// Deliberately does not touch achievements, streaks, or the leaderboard;
/// the orchestrator composes those so evaluation re-entry stays bounded.
pub fn append_and_accumulate(
    conn: &Connection,
    table: &LevelTable,
    agg: &mut ProgressionAggregate,
    amount: i64,
    action_type: ActionType,
    description: Option<&str>,
    reference: &Reference,
    clock: &dyn Clock,
) -> Result<Option<LevelDefinition>, QuestlineError> {
    let now = clock.now_iso();
    ledger::append(conn, &agg.user_id, amount, action_type, description, reference, &now)?;

    agg.xp_total = (agg.xp_total + amount).max(0);
    let resolved = table.resolve(agg.xp_total);
    let leveled_up = if resolved.level_number > agg.level {
        agg.level = resolved.level_number;
        Some(resolved.clone())
    } else {
        None
    };
    upsert(conn, agg, &now)?;
    Ok(leveled_up)
}
