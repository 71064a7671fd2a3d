//! SQLite connection setup, schema initialization, and transaction scope.
//!
//! The engine keeps all state in one database, `progression.db`. Each engine
//! module owns its table definitions as `CREATE TABLE IF NOT EXISTS`
//! constants; [`initialize_progression_db`] runs them all plus the default
//! reference-data seed, and is idempotent.

use crate::core::error::QuestlineError;
use crate::core::locks;
use crate::core::store::Store;
use crate::engine::{achievements, aggregate, leaderboard, ledger, levels};
use rusqlite::{Connection, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};

pub const PROGRESSION_DB_NAME: &str = "progression.db";

pub fn db_connect(db_path: &str) -> Result<Connection, QuestlineError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(QuestlineError::Rusqlite)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(QuestlineError::Rusqlite)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(QuestlineError::Rusqlite)?;
    Ok(conn)
}

pub fn progression_db_path(root: &Path) -> PathBuf {
    root.join(PROGRESSION_DB_NAME)
}

/// Create all engine tables and seed the default level table and achievement
/// catalog. Safe to call on every startup.
pub fn initialize_progression_db(root: &Path) -> Result<(), QuestlineError> {
    fs::create_dir_all(root).map_err(QuestlineError::Io)?;
    let db_path = progression_db_path(root);
    let conn = db_connect(&db_path.to_string_lossy())?;

    conn.execute(levels::LEVELS_SCHEMA, [])?;
    conn.execute(ledger::LEDGER_SCHEMA, [])?;
    conn.execute(ledger::LEDGER_SCHEMA_INDEX_USER, [])?;
    conn.execute(aggregate::AGGREGATE_SCHEMA, [])?;
    conn.execute(achievements::ACHIEVEMENTS_SCHEMA, [])?;
    conn.execute(achievements::UNLOCKS_SCHEMA, [])?;
    conn.execute(achievements::UNLOCKS_SCHEMA_INDEX_USER, [])?;
    conn.execute(leaderboard::LEADERBOARD_SCHEMA, [])?;
    conn.execute(leaderboard::LEADERBOARD_SCHEMA_INDEX_WEEK, [])?;

    levels::seed_default_levels(&conn)?;
    achievements::seed_default_achievements(&conn)?;
    Ok(())
}

/// Execute `f` inside an immediate transaction serialized on `user_id`.
///
/// The per-user lock is held from before `BEGIN` until after commit, so the
/// ledger append, aggregate update, unlock checks, and leaderboard upsert all
/// observe a consistent snapshot. Any error rolls the whole transaction back;
/// busy/locked errors re-run the closure from scratch.
pub fn with_user_txn<F, R>(store: &Store, user_id: &str, f: F) -> Result<R, QuestlineError>
where
    F: Fn(&rusqlite::Transaction) -> Result<R, QuestlineError>,
{
    let _guard = locks::lock_user(user_id)?;
    let db_path = progression_db_path(&store.root);
    locks::retry_on_busy(|| {
        let mut conn = db_connect(&db_path.to_string_lossy())?;
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&txn)?;
        txn.commit()?;
        Ok(out)
    })
}

/// Execute `f` with a plain read connection. No user lock; WAL allows these
/// to run concurrently with writers.
pub fn with_read<F, R>(store: &Store, f: F) -> Result<R, QuestlineError>
where
    F: FnOnce(&Connection) -> Result<R, QuestlineError>,
{
    let db_path = progression_db_path(&store.root);
    let conn = db_connect(&db_path.to_string_lossy())?;
    f(&conn)
}
