use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuestlineError {
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Concurrency conflict: {0}")]
    Conflict(String),
    #[error("Validation error: {0}")]
    Validation(String),
}
