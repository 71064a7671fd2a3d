//! Progression service: the only entry point external callers use.
//!
//! Composes the ledger, aggregate, level resolver, achievement evaluator,
//! streak tracker, and weekly leaderboard into two mutations (`award_xp`,
//! `record_activity`) and three read surfaces. Each mutation is one
//! per-user-serialized immediate transaction: either everything lands
//! (ledger row, aggregate, leaderboard, unlocks, rewards) or nothing does.

use crate::core::audit;
use crate::core::db;
use crate::core::error::QuestlineError;
use crate::core::store::Store;
use crate::core::time::{self, Clock};
use crate::engine::achievements::{self, AchievementDefinition, AchievementStatus};
use crate::engine::aggregate::{self, ProgressionAggregate};
use crate::engine::leaderboard::{self, WeeklyLeaderboardEntry};
use crate::engine::ledger::{self, ActionType, Reference, XpLedgerEntry};
use crate::engine::levels::{LevelDefinition, LevelTable};
use crate::engine::streak;
use serde::Serialize;

/// Outcome of one `award_xp` call, for UI notification.
#[derive(Debug, Serialize, Clone)]
pub struct AwardResult {
    pub aggregate: ProgressionAggregate,
    /// Highest level reached during the call (including achievement-reward
    /// XP), `None` if the stored level did not move.
    pub leveled_up: Option<LevelDefinition>,
    /// Newly unlocked achievements from both evaluation passes, in unlock
    /// order.
    pub unlocked: Vec<AchievementDefinition>,
}

/// Outcome of one `record_activity` call.
#[derive(Debug, Serialize, Clone)]
pub struct StreakResult {
    pub streak_days: i64,
    pub changed: bool,
    pub unlocked: Vec<AchievementDefinition>,
}

/// Dashboard view of a user's level progress.
#[derive(Debug, Serialize, Clone)]
pub struct ProgressView {
    pub xp_total: i64,
    pub level: LevelDefinition,
    pub next_level: Option<LevelDefinition>,
    pub progress_percent_to_next: i64,
    pub is_max_level: bool,
}

fn require_user(user_id: &str) -> Result<(), QuestlineError> {
    if user_id.trim().is_empty() {
        return Err(QuestlineError::Validation("user_id must not be empty".to_string()));
    }
    Ok(())
}

/// Grant (or deduct) XP for a user and run the full progression cascade.
///
/// Within a single per-user transaction: ledger append + aggregate + level
/// check, weekly leaderboard update for positive amounts, achievement
/// evaluation, and — only if the first pass unlocked something — exactly one
/// more pass to catch XP-threshold cascades from reward XP. Safe to retry on
/// storage errors; nothing partial is ever visible.
pub fn award_xp(
    store: &Store,
    clock: &dyn Clock,
    user_id: &str,
    amount: i64,
    action_type: ActionType,
    description: Option<&str>,
    reference: &Reference,
) -> Result<AwardResult, QuestlineError> {
    require_user(user_id)?;

    let result = db::with_user_txn(store, user_id, |txn| {
        let table = LevelTable::load(txn)?;
        let mut agg = aggregate::load_or_default(txn, user_id)?;
        let initial_level = agg.level;

        aggregate::append_and_accumulate(
            txn,
            &table,
            &mut agg,
            amount,
            action_type,
            description,
            reference,
            clock,
        )?;
        leaderboard::add_weekly_xp(txn, user_id, amount, time::week_start(clock.today()))?;

        let mut unlocked = achievements::evaluate_and_unlock(txn, &table, user_id, clock)?;
        if !unlocked.is_empty() {
            // Bounded re-entry: reward XP may have crossed further
            // xp_earned thresholds. One extra pass, then stop regardless.
            unlocked.extend(achievements::evaluate_and_unlock(txn, &table, user_id, clock)?);
        }

        let final_agg = aggregate::load_or_default(txn, user_id)?;
        let leveled_up = if final_agg.level > initial_level {
            table.by_number(final_agg.level).cloned()
        } else {
            None
        };
        Ok(AwardResult {
            aggregate: final_agg,
            leveled_up,
            unlocked,
        })
    });

    let status = if result.is_ok() { "success" } else { "error" };
    // Telemetry only; a failed append must not undo a committed award.
    let _ = audit::log_event(store, clock, user_id, "award_xp", status);
    result
}

/// Record the user's first activity of the day and advance the streak.
///
/// Separate from `award_xp` because activity has no XP amount of its own and
/// must be idempotent within a calendar day. When the streak changes,
/// streak-gated achievements are evaluated in the same transaction.
pub fn record_activity(
    store: &Store,
    clock: &dyn Clock,
    user_id: &str,
) -> Result<StreakResult, QuestlineError> {
    require_user(user_id)?;

    let result = db::with_user_txn(store, user_id, |txn| {
        let table = LevelTable::load(txn)?;
        let mut agg = aggregate::load_or_default(txn, user_id)?;
        let (streak_days, changed) =
            streak::advance_streak(agg.streak_days, agg.last_activity, clock.today());

        let mut unlocked = Vec::new();
        if changed {
            agg.streak_days = streak_days;
            agg.last_activity = Some(clock.today());
            aggregate::upsert(txn, &agg, &clock.now_iso())?;
            unlocked = achievements::evaluate_and_unlock(txn, &table, user_id, clock)?;
        }
        Ok(StreakResult {
            streak_days,
            changed,
            unlocked,
        })
    });

    let status = if result.is_ok() { "success" } else { "error" };
    let _ = audit::log_event(store, clock, user_id, "record_activity", status);
    result
}

/// Level progress for dashboards. Percent is measured between the current
/// and next thresholds, clamped to 0..=100 (a negative correction can pull
/// `xp_total` below the stored level's threshold).
pub fn get_progress(store: &Store, user_id: &str) -> Result<ProgressView, QuestlineError> {
    require_user(user_id)?;
    db::with_read(store, |conn| {
        let table = LevelTable::load(conn)?;
        let agg = aggregate::load_or_default(conn, user_id)?;
        let level = table.by_number(agg.level).cloned().ok_or_else(|| {
            QuestlineError::Configuration(format!(
                "stored level {} missing from level table",
                agg.level
            ))
        })?;
        let next_level = table.next_after(agg.level).cloned();
        let progress_percent_to_next = match &next_level {
            None => 100,
            Some(next) => {
                let span = next.xp_required - level.xp_required;
                let into = agg.xp_total - level.xp_required;
                (into * 100 / span).clamp(0, 100)
            }
        };
        Ok(ProgressView {
            xp_total: agg.xp_total,
            is_max_level: next_level.is_none(),
            level,
            next_level,
            progress_percent_to_next,
        })
    })
}

/// Every achievement with the user's unlock timestamp, unlocked first.
pub fn get_achievements(
    store: &Store,
    user_id: &str,
) -> Result<Vec<AchievementStatus>, QuestlineError> {
    require_user(user_id)?;
    db::with_read(store, |conn| achievements::list_with_status(conn, user_id))
}

/// Current ISO week's ranking.
pub fn weekly_leaderboard(
    store: &Store,
    clock: &dyn Clock,
    limit: usize,
) -> Result<Vec<WeeklyLeaderboardEntry>, QuestlineError> {
    db::with_read(store, |conn| {
        leaderboard::top_weekly(conn, time::week_start(clock.today()), limit)
    })
}

/// Recent ledger entries for one user, newest first.
pub fn ledger_history(
    store: &Store,
    user_id: &str,
    limit: usize,
) -> Result<Vec<XpLedgerEntry>, QuestlineError> {
    require_user(user_id)?;
    db::with_read(store, |conn| ledger::entries_for_user(conn, user_id, limit))
}
