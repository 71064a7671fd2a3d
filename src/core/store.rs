//! Store handle for the engine's data workspace.
//!
//! A `Store` is a logical container for the progression database and its
//! audit log. All engine state is scoped to a store root; callers that host
//! the engine (request handlers, admin tools) construct one per data
//! directory and pass it to every operation.

use std::path::PathBuf;

/// Handle to a progression data workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Path to the store root directory.
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}
