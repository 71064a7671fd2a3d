//! The progression & rewards engine: ledger, aggregate, levels,
//! achievements, streaks, weekly leaderboard, and the orchestrating service.

pub mod achievements;
pub mod aggregate;
pub mod leaderboard;
pub mod ledger;
pub mod levels;
pub mod seed;
pub mod service;
pub mod streak;
