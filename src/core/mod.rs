//! Shared primitives for the progression engine: storage, errors, time, and
//! per-user transaction scope.

pub mod audit;
pub mod db;
pub mod error;
pub mod locks;
pub mod store;
pub mod time;
