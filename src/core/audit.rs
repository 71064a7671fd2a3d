//! JSONL audit trail for engine mutations.
//!
//! Every `award_xp` / `record_activity` call appends one event to
//! `progression.events.jsonl` in the store root, success or failure. The
//! trail is operational telemetry, not state: the XP ledger remains the
//! source of truth, and a failed audit append never aborts a committed
//! transaction.

use crate::core::error::QuestlineError;
use crate::core::store::Store;
use crate::core::time::{self, Clock};
use serde::{Deserialize, Serialize};

pub const AUDIT_LOG_NAME: &str = "progression.events.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditEvent {
    pub ts: String,
    pub event_id: String,
    pub user_id: String,
    pub op: String,
    pub status: String,
}

pub fn log_event(
    store: &Store,
    clock: &dyn Clock,
    user_id: &str,
    op: &str,
    status: &str,
) -> Result<(), QuestlineError> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let ev = AuditEvent {
        ts: clock.now_iso(),
        event_id: time::new_event_id(),
        user_id: user_id.to_string(),
        op: op.to_string(),
        status: status.to_string(),
    };

    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(store.root.join(AUDIT_LOG_NAME))
        .map_err(QuestlineError::Io)?;
    let line = serde_json::to_string(&ev).map_err(|e| QuestlineError::Validation(e.to_string()))?;
    writeln!(f, "{}", line).map_err(QuestlineError::Io)?;
    Ok(())
}
