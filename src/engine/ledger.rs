//! Append-only XP ledger: every grant and deduction as an immutable event.
//!
//! The ledger is the source of truth for `xp_total`; the per-user aggregate
//! is a materialized cache of it. Rows are never updated or deleted, and
//! corrections are recorded as new negative entries.

use crate::core::error::QuestlineError;
use crate::core::time;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LEDGER_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS xp_ledger (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        action_type TEXT NOT NULL,
        description TEXT,
        reference_id TEXT,
        reference_type TEXT,
        created_at TEXT NOT NULL
    )
";
pub const LEDGER_SCHEMA_INDEX_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_xp_ledger_user ON xp_ledger(user_id, created_at)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    LessonComplete,
    CourseComplete,
    Achievement,
    StreakBonus,
    ManualAdjustment,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LessonComplete => "lesson_complete",
            Self::CourseComplete => "course_complete",
            Self::Achievement => "achievement",
            Self::StreakBonus => "streak_bonus",
            Self::ManualAdjustment => "manual_adjustment",
        }
    }

    pub fn parse(s: &str) -> Result<Self, QuestlineError> {
        match s {
            "lesson_complete" => Ok(Self::LessonComplete),
            "course_complete" => Ok(Self::CourseComplete),
            "achievement" => Ok(Self::Achievement),
            "streak_bonus" => Ok(Self::StreakBonus),
            "manual_adjustment" => Ok(Self::ManualAdjustment),
            other => Err(QuestlineError::Validation(format!(
                "unknown action type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional link from a ledger entry to the domain object that caused it
/// (lesson id, course id, achievement id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reference {
    pub id: Option<String>,
    pub kind: Option<String>,
}

impl Reference {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to(kind: &str, id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            kind: Some(kind.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct XpLedgerEntry {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub action_type: ActionType,
    pub description: Option<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub created_at: String,
}

pub fn append(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    action_type: ActionType,
    description: Option<&str>,
    reference: &Reference,
    now_iso: &str,
) -> Result<XpLedgerEntry, QuestlineError> {
    let entry = XpLedgerEntry {
        id: time::new_event_id(),
        user_id: user_id.to_string(),
        amount,
        action_type,
        description: description.map(|s| s.to_string()),
        reference_id: reference.id.clone(),
        reference_type: reference.kind.clone(),
        created_at: now_iso.to_string(),
    };
    conn.execute(
        "INSERT INTO xp_ledger(id, user_id, amount, action_type, description, reference_id, reference_type, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.user_id,
            entry.amount,
            entry.action_type.as_str(),
            entry.description,
            entry.reference_id,
            entry.reference_type,
            entry.created_at
        ],
    )?;
    Ok(entry)
}

/// Ledger sum for one user. Matches `xp_total` only before clamping; the
/// consistency invariant holds whenever no clamped deduction has occurred.
pub fn sum_for_user(conn: &Connection, user_id: &str) -> Result<i64, QuestlineError> {
    let sum = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM xp_ledger WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(sum)
}

pub fn count_actions(
    conn: &Connection,
    user_id: &str,
    action_type: ActionType,
) -> Result<i64, QuestlineError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM xp_ledger WHERE user_id = ?1 AND action_type = ?2",
        params![user_id, action_type.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn row_to_entry(row: &rusqlite::Row) -> Result<XpLedgerEntry, rusqlite::Error> {
    let raw_action: String = row.get(3)?;
    let action_type = ActionType::parse(&raw_action).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(XpLedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        action_type,
        description: row.get(4)?,
        reference_id: row.get(5)?,
        reference_type: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Most recent entries first.
pub fn entries_for_user(
    conn: &Connection,
    user_id: &str,
    limit: usize,
) -> Result<Vec<XpLedgerEntry>, QuestlineError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, amount, action_type, description, reference_id, reference_type, created_at
         FROM xp_ledger WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit as i64], row_to_entry)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
