//! Achievement rule engine: catalog, unlock store, and evaluation.
//!
//! Definitions are static reference data; unlocks are per-user facts created
//! at most once and never revoked. The UNIQUE constraint on
//! `achievement_unlocks` is the real guard against double-awards — the
//! in-memory pending set is only a fast path. Reward XP is granted through
//! the same ledger/aggregate path as any other grant, inside the caller's
//! transaction; the orchestrator bounds evaluation to two passes so reward
//! cascades terminate.

use crate::core::error::QuestlineError;
use crate::core::time::{self, Clock};
use crate::engine::aggregate;
use crate::engine::leaderboard;
use crate::engine::ledger::{self, ActionType, Reference};
use crate::engine::levels::LevelTable;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ACHIEVEMENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS achievements (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        requirement_type TEXT NOT NULL,
        requirement_value INTEGER NOT NULL,
        xp_reward INTEGER NOT NULL DEFAULT 0,
        coin_reward INTEGER NOT NULL DEFAULT 0,
        is_secret INTEGER NOT NULL DEFAULT 0
    )
";

pub const UNLOCKS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS achievement_unlocks (
        user_id TEXT NOT NULL,
        achievement_id TEXT NOT NULL,
        unlocked_at TEXT NOT NULL,
        PRIMARY KEY (user_id, achievement_id),
        FOREIGN KEY(achievement_id) REFERENCES achievements(id)
    )
";
pub const UNLOCKS_SCHEMA_INDEX_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_achievement_unlocks_user ON achievement_unlocks(user_id)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    LessonsCompleted,
    CoursesCompleted,
    Streak,
    XpEarned,
}

impl RequirementType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LessonsCompleted => "lessons_completed",
            Self::CoursesCompleted => "courses_completed",
            Self::Streak => "streak",
            Self::XpEarned => "xp_earned",
        }
    }

    /// Unknown kinds are a reference-data defect, caught at load, not
    /// per-call.
    pub fn parse(s: &str) -> Result<Self, QuestlineError> {
        match s {
            "lessons_completed" => Ok(Self::LessonsCompleted),
            "courses_completed" => Ok(Self::CoursesCompleted),
            "streak" => Ok(Self::Streak),
            "xp_earned" => Ok(Self::XpEarned),
            other => Err(QuestlineError::Configuration(format!(
                "unknown requirement type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub requirement_type: RequirementType,
    pub requirement_value: i64,
    pub xp_reward: i64,
    pub coin_reward: i64,
    pub is_secret: bool,
}

/// Definition plus the user's unlock timestamp, for dashboard listings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AchievementStatus {
    pub definition: AchievementDefinition,
    pub unlocked_at: Option<String>,
}

/// Stats the predicates compare against, computed fresh at evaluation time
/// from the ledger and aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lessons_completed: i64,
    pub courses_completed: i64,
    pub streak_days: i64,
    pub xp_total: i64,
}

impl StatsSnapshot {
    pub fn satisfies(&self, def: &AchievementDefinition) -> bool {
        let stat = match def.requirement_type {
            RequirementType::LessonsCompleted => self.lessons_completed,
            RequirementType::CoursesCompleted => self.courses_completed,
            RequirementType::Streak => self.streak_days,
            RequirementType::XpEarned => self.xp_total,
        };
        stat >= def.requirement_value
    }
}

#[allow(clippy::type_complexity)]
const DEFAULT_ACHIEVEMENTS: &[(&str, &str, &str, RequirementType, i64, i64, i64, bool)] = &[
    (
        "first-lesson",
        "First Steps",
        "Complete your first lesson",
        RequirementType::LessonsCompleted,
        1,
        10,
        5,
        false,
    ),
    (
        "five-lessons",
        "Getting Serious",
        "Complete 5 lessons",
        RequirementType::LessonsCompleted,
        5,
        50,
        20,
        false,
    ),
    (
        "twenty-lessons",
        "Lesson Devourer",
        "Complete 20 lessons",
        RequirementType::LessonsCompleted,
        20,
        150,
        50,
        false,
    ),
    (
        "first-course",
        "Course Clear",
        "Finish your first course",
        RequirementType::CoursesCompleted,
        1,
        100,
        40,
        false,
    ),
    (
        "five-courses",
        "Curriculum Crusher",
        "Finish 5 courses",
        RequirementType::CoursesCompleted,
        5,
        400,
        150,
        false,
    ),
    (
        "week-streak",
        "Seven in a Row",
        "Stay active 7 days in a row",
        RequirementType::Streak,
        7,
        70,
        25,
        false,
    ),
    (
        "month-streak",
        "Iron Habit",
        "Stay active 30 days in a row",
        RequirementType::Streak,
        30,
        300,
        100,
        false,
    ),
    (
        "xp-1000",
        "Kilojoule",
        "Earn 1,000 XP",
        RequirementType::XpEarned,
        1_000,
        100,
        50,
        false,
    ),
    (
        "xp-5000",
        "Powerhouse",
        "Earn 5,000 XP",
        RequirementType::XpEarned,
        5_000,
        250,
        100,
        true,
    ),
];

pub fn seed_default_achievements(conn: &Connection) -> Result<(), QuestlineError> {
    for (id, name, desc, req_type, req_value, xp, coins, secret) in DEFAULT_ACHIEVEMENTS {
        conn.execute(
            "INSERT OR IGNORE INTO achievements(id, name, description, requirement_type, requirement_value, xp_reward, coin_reward, is_secret)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                name,
                desc,
                req_type.as_str(),
                req_value,
                xp,
                coins,
                *secret as i64
            ],
        )?;
    }
    Ok(())
}

pub fn upsert_achievement(
    conn: &Connection,
    def: &AchievementDefinition,
) -> Result<(), QuestlineError> {
    conn.execute(
        "INSERT INTO achievements(id, name, description, requirement_type, requirement_value, xp_reward, coin_reward, is_secret)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            requirement_type = excluded.requirement_type,
            requirement_value = excluded.requirement_value,
            xp_reward = excluded.xp_reward,
            coin_reward = excluded.coin_reward,
            is_secret = excluded.is_secret",
        params![
            def.id,
            def.name,
            def.description,
            def.requirement_type.as_str(),
            def.requirement_value,
            def.xp_reward,
            def.coin_reward,
            def.is_secret as i64
        ],
    )?;
    Ok(())
}

fn row_to_definition(row: &rusqlite::Row) -> Result<AchievementDefinition, rusqlite::Error> {
    let raw_type: String = row.get(3)?;
    let requirement_type = RequirementType::parse(&raw_type).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(AchievementDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        requirement_type,
        requirement_value: row.get(4)?,
        xp_reward: row.get(5)?,
        coin_reward: row.get(6)?,
        is_secret: row.get::<_, i64>(7)? != 0,
    })
}

/// Fresh stats for predicate evaluation. Lessons/courses come from the
/// ledger (one completion event each), streak and XP from the aggregate.
pub fn snapshot(conn: &Connection, user_id: &str) -> Result<StatsSnapshot, QuestlineError> {
    let agg = aggregate::load_or_default(conn, user_id)?;
    Ok(StatsSnapshot {
        lessons_completed: ledger::count_actions(conn, user_id, ActionType::LessonComplete)?,
        courses_completed: ledger::count_actions(conn, user_id, ActionType::CourseComplete)?,
        streak_days: agg.streak_days,
        xp_total: agg.xp_total,
    })
}

/// Definitions the user has not unlocked yet, in stable id order.
pub fn pending_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<AchievementDefinition>, QuestlineError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, requirement_type, requirement_value, xp_reward, coin_reward, is_secret
         FROM achievements
         WHERE id NOT IN (SELECT achievement_id FROM achievement_unlocks WHERE user_id = ?1)
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user_id], row_to_definition)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Insert the unlock row, guarded by the (user_id, achievement_id) primary
/// key. Returns false when the row already existed — a concurrent evaluation
/// won the race and the caller must skip rewards.
pub fn try_unlock(
    conn: &Connection,
    user_id: &str,
    achievement_id: &str,
    now_iso: &str,
) -> Result<bool, QuestlineError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO achievement_unlocks(user_id, achievement_id, unlocked_at)
         VALUES(?1, ?2, ?3)",
        params![user_id, achievement_id, now_iso],
    )?;
    Ok(changed > 0)
}

/// One evaluation pass: unlock every not-yet-unlocked achievement whose
/// predicate holds against a fresh snapshot, granting rewards for each new
/// unlock. Reward XP goes through the ledger/aggregate path and counts
/// toward the current week's leaderboard; coins go straight to the
/// aggregate. Returns the definitions newly unlocked by this pass.
///
/// The snapshot is taken once per pass, so an unlock whose reward XP crosses
/// another XP threshold is picked up by the orchestrator's second pass, not
/// by re-entering here.
pub fn evaluate_and_unlock(
    conn: &Connection,
    table: &LevelTable,
    user_id: &str,
    clock: &dyn Clock,
) -> Result<Vec<AchievementDefinition>, QuestlineError> {
    let stats = snapshot(conn, user_id)?;
    let mut unlocked = Vec::new();

    for def in pending_for_user(conn, user_id)? {
        if !stats.satisfies(&def) {
            continue;
        }
        if !try_unlock(conn, user_id, &def.id, &clock.now_iso())? {
            continue;
        }

        let mut agg = aggregate::load_or_default(conn, user_id)?;
        if def.xp_reward > 0 {
            aggregate::append_and_accumulate(
                conn,
                table,
                &mut agg,
                def.xp_reward,
                ActionType::Achievement,
                Some(&def.name),
                &Reference::to("achievement", &def.id),
                clock,
            )?;
            leaderboard::add_weekly_xp(
                conn,
                user_id,
                def.xp_reward,
                time::week_start(clock.today()),
            )?;
        }
        if def.coin_reward > 0 {
            agg.coins += def.coin_reward;
            aggregate::upsert(conn, &agg, &clock.now_iso())?;
        }
        unlocked.push(def);
    }
    Ok(unlocked)
}

/// All definitions with the user's unlock state, unlocked first, then by id.
pub fn list_with_status(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<AchievementStatus>, QuestlineError> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, a.description, a.requirement_type, a.requirement_value,
                a.xp_reward, a.coin_reward, a.is_secret, u.unlocked_at
         FROM achievements a
         LEFT JOIN achievement_unlocks u
           ON u.achievement_id = a.id AND u.user_id = ?1
         ORDER BY u.unlocked_at IS NULL, a.id",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(AchievementStatus {
            definition: row_to_definition(row)?,
            unlocked_at: row.get(8)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Load and validate the full catalog; parse failures surface as
/// `Configuration` errors.
pub fn load_catalog(conn: &Connection) -> Result<Vec<AchievementDefinition>, QuestlineError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, requirement_type, requirement_value, xp_reward, coin_reward, is_secret
         FROM achievements ORDER BY id",
    )?;
    let rows = stmt.query_map([], row_to_definition)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
