//! Per-user serialization and busy-retry for progression transactions.
//!
//! Two concurrent awards for the same user are a read-modify-write race on
//! `xp_total`/`level`/`streak_days`. The engine serializes them with a
//! process-wide registry of per-user mutexes acquired before the transaction
//! opens and held until commit. Different users never share a lock, so their
//! awards proceed in parallel (WAL handles the SQLite side).
//!
//! Lock acquisition uses bounded try-lock attempts with a fixed delay so
//! contention surfaces as `Conflict` instead of deadlocking a request thread.
//! Cross-process contention on the database itself is handled separately by
//! [`retry_on_busy`] with exponential backoff.

use crate::core::error::QuestlineError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock, TryLockError};
use std::thread;
use std::time::Duration;

/// Maximum try-lock attempts before a user lock times out.
const MAX_LOCK_ATTEMPTS: u32 = 50;
/// Delay between try-lock attempts (milliseconds).
const LOCK_RETRY_DELAY_MS: u64 = 20;

/// Maximum retry attempts for SQLite busy/locked errors.
const MAX_BUSY_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 100;
/// Maximum backoff delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 5_000;

/// Registry of per-user mutexes. Entries are leaked intentionally: the set of
/// active users is bounded and locks must outlive every guard handed out.
struct UserLocks {
    entries: Mutex<HashMap<String, &'static Mutex<()>>>,
}

impl UserLocks {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, user_id: &str) -> Result<&'static Mutex<()>, QuestlineError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| QuestlineError::Conflict("user lock registry poisoned".to_string()))?;
        if let Some(lock) = entries.get(user_id) {
            return Ok(*lock);
        }
        let lock: &'static Mutex<()> = Box::leak(Box::new(Mutex::new(())));
        entries.insert(user_id.to_string(), lock);
        Ok(lock)
    }
}

fn registry() -> &'static UserLocks {
    static LOCKS: OnceLock<UserLocks> = OnceLock::new();
    LOCKS.get_or_init(UserLocks::new)
}

/// Acquire the exclusive progression lock for `user_id`.
///
/// Blocks for at most `MAX_LOCK_ATTEMPTS * LOCK_RETRY_DELAY_MS` (one second)
/// before surfacing `Conflict`. The guard must be held across the whole
/// transaction, lock-then-begin, commit-then-release.
pub fn lock_user(user_id: &str) -> Result<MutexGuard<'static, ()>, QuestlineError> {
    let lock = registry().entry(user_id)?;
    let mut attempt = 0u32;
    loop {
        match lock.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::WouldBlock) => {
                if attempt >= MAX_LOCK_ATTEMPTS {
                    return Err(QuestlineError::Conflict(format!(
                        "timed out waiting for progression lock on user '{}'",
                        user_id
                    )));
                }
                attempt += 1;
                thread::sleep(Duration::from_millis(LOCK_RETRY_DELAY_MS));
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(QuestlineError::Conflict(format!(
                    "progression lock poisoned for user '{}'",
                    user_id
                )));
            }
        }
    }
}

/// Re-run `f` on SQLite busy/locked errors with exponential backoff.
///
/// Safe for whole-transaction closures: a busy failure rolls the transaction
/// back, so re-running starts from a clean slate.
pub fn retry_on_busy<F, R>(mut f: F) -> Result<R, QuestlineError>
where
    F: FnMut() -> Result<R, QuestlineError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) && attempt < MAX_BUSY_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_busy_error(err: &QuestlineError) -> bool {
    match err {
        QuestlineError::Rusqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
