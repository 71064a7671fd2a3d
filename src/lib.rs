//! Questline: the progression & rewards engine for a learning platform.
//!
//! Everything gamified in the platform funnels through this crate: an
//! append-only XP ledger with a per-user materialized aggregate, a level
//! resolver over a validated threshold table, an achievement rule engine
//! with a bounded two-pass cascade, a daily streak state machine, and a
//! weekly ISO-week leaderboard.
//!
//! # Design
//!
//! - **Ledger-first**: every XP change is an immutable `xp_ledger` row; the
//!   aggregate is a cache of it, updated in the same transaction.
//! - **Per-user serialization**: concurrent awards for one user are
//!   serialized by a process-wide lock registry plus an immediate SQLite
//!   transaction; different users proceed in parallel.
//! - **Bounded cascades**: achievement rewards can unlock further
//!   achievements, but evaluation runs at most twice per award.
//! - **Injected time**: all date-sensitive logic (streaks, week bucketing)
//!   goes through the [`core::time::Clock`] trait.
//!
//! # Library surface
//!
//! External callers (lesson/course completion handlers, login handlers,
//! admin tools) use [`engine::service`]:
//!
//! ```no_run
//! use questline::core::store::Store;
//! use questline::core::time::SystemClock;
//! use questline::engine::ledger::{ActionType, Reference};
//! use questline::engine::service;
//!
//! # fn main() -> Result<(), questline::core::error::QuestlineError> {
//! let store = Store::new("./.questline/data");
//! questline::core::db::initialize_progression_db(&store.root)?;
//!
//! let result = service::award_xp(
//!     &store,
//!     &SystemClock,
//!     "user-42",
//!     10,
//!     ActionType::LessonComplete,
//!     Some("Intro to Ownership"),
//!     &Reference::to("lesson", "lesson-101"),
//! )?;
//! if let Some(level) = result.leveled_up {
//!     println!("reached level {}: {}", level.level_number, level.title);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The binary wraps the same surface as an operator CLI (`questline award`,
//! `questline progress`, ...).

pub mod core;
pub mod engine;

use crate::core::db;
use crate::core::error::QuestlineError;
use crate::core::store::Store;
use crate::core::time::SystemClock;
use crate::engine::ledger::{ActionType, Reference};
use crate::engine::{seed, service};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "questline",
    version = env!("CARGO_PKG_VERSION"),
    about = "Progression & rewards engine: XP, levels, achievements, streaks, leaderboards"
)]
struct Cli {
    /// Data directory (defaults to $QUESTLINE_DATA or ./.questline/data).
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the progression database and seed default reference data
    Init,
    /// Upsert levels and achievements from a TOML catalog file
    Seed {
        /// Path to the catalog file
        #[clap(long)]
        config: PathBuf,
    },
    /// Grant (or deduct, with a negative amount) XP for a user
    Award {
        #[clap(long)]
        user: String,
        /// XP amount; negative values are corrections
        #[clap(long, allow_hyphen_values = true)]
        amount: i64,
        /// Action type: lesson_complete, course_complete, streak_bonus, manual_adjustment
        #[clap(long, default_value = "manual_adjustment")]
        action: String,
        #[clap(long)]
        description: Option<String>,
        /// Id of the lesson/course this award refers to
        #[clap(long)]
        reference_id: Option<String>,
        /// Kind of the referenced object (e.g. lesson, course)
        #[clap(long)]
        reference_type: Option<String>,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Record a user's first activity of the day (advances the streak)
    Activity {
        #[clap(long)]
        user: String,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show a user's level progress
    Progress {
        #[clap(long)]
        user: String,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// List achievements with the user's unlock state
    Achievements {
        #[clap(long)]
        user: String,
        /// Include locked secret achievements
        #[clap(long)]
        all: bool,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show the current week's leaderboard
    Leaderboard {
        #[clap(long, default_value_t = 10)]
        limit: usize,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show recent XP ledger entries for a user
    Ledger {
        #[clap(long)]
        user: String,
        #[clap(long, default_value_t = 20)]
        limit: usize,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Print the engine version
    Version,
}

fn resolve_store(data_dir: Option<PathBuf>) -> Store {
    let root = data_dir
        .or_else(|| std::env::var_os("QUESTLINE_DATA").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./.questline/data"));
    Store::new(root)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, QuestlineError> {
    serde_json::to_string_pretty(value).map_err(|e| QuestlineError::Validation(e.to_string()))
}

pub fn run() -> Result<(), QuestlineError> {
    let cli = Cli::parse();
    let store = resolve_store(cli.data_dir);
    let clock = SystemClock;

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Init => {
            db::initialize_progression_db(&store.root)?;
            println!(
                "Progression database initialized at {}",
                db::progression_db_path(&store.root).display()
            );
            return Ok(());
        }
        _ => {}
    }

    // Every other command wants an initialized store; init is idempotent.
    db::initialize_progression_db(&store.root)?;

    match cli.command {
        Command::Version | Command::Init => unreachable!("handled above"),
        Command::Seed { config } => {
            let summary = seed::seed_from_file(&store, &config)?;
            println!(
                "✓ Seeded {} level(s) and {} achievement(s) from {}",
                summary.levels,
                summary.achievements,
                config.display()
            );
        }
        Command::Award {
            user,
            amount,
            action,
            description,
            reference_id,
            reference_type,
            format,
        } => {
            let action_type = ActionType::parse(&action)?;
            let reference = Reference {
                id: reference_id,
                kind: reference_type,
            };
            let result = service::award_xp(
                &store,
                &clock,
                &user,
                amount,
                action_type,
                description.as_deref(),
                &reference,
            )?;
            if format == "json" {
                println!("{}", to_json(&result)?);
            } else {
                println!(
                    "✓ {} {} XP → total {} (level {})",
                    user,
                    if amount >= 0 {
                        format!("+{}", amount)
                    } else {
                        amount.to_string()
                    },
                    result.aggregate.xp_total,
                    result.aggregate.level
                );
                if let Some(level) = &result.leveled_up {
                    println!(
                        "  {} level {} — {}",
                        "Level up!".green().bold(),
                        level.level_number,
                        level.title
                    );
                }
                for def in &result.unlocked {
                    println!(
                        "  {} {} (+{} XP, +{} coins)",
                        "Achievement unlocked:".yellow().bold(),
                        def.name,
                        def.xp_reward,
                        def.coin_reward
                    );
                }
            }
        }
        Command::Activity { user, format } => {
            let result = service::record_activity(&store, &clock, &user)?;
            if format == "json" {
                println!("{}", to_json(&result)?);
            } else if result.changed {
                println!("✓ {} streak is now {} day(s)", user, result.streak_days);
                for def in &result.unlocked {
                    println!(
                        "  {} {}",
                        "Achievement unlocked:".yellow().bold(),
                        def.name
                    );
                }
            } else {
                println!(
                    "Already counted today; {} streak stays at {} day(s)",
                    user, result.streak_days
                );
            }
        }
        Command::Progress { user, format } => {
            let view = service::get_progress(&store, &user)?;
            if format == "json" {
                println!("{}", to_json(&view)?);
            } else {
                println!(
                    "{} — level {} ({}), {} XP",
                    user.bold(),
                    view.level.level_number,
                    view.level.title,
                    view.xp_total
                );
                match &view.next_level {
                    Some(next) => println!(
                        "  {}% toward level {} ({} XP required)",
                        view.progress_percent_to_next, next.level_number, next.xp_required
                    ),
                    None => println!("  Max level reached"),
                }
            }
        }
        Command::Achievements { user, all, format } => {
            let mut statuses = service::get_achievements(&store, &user)?;
            if !all {
                // Secret achievements stay hidden until unlocked.
                statuses.retain(|s| !s.definition.is_secret || s.unlocked_at.is_some());
            }
            if format == "json" {
                println!("{}", to_json(&statuses)?);
            } else if statuses.is_empty() {
                println!("No achievements defined.");
            } else {
                for status in &statuses {
                    match &status.unlocked_at {
                        Some(ts) => println!(
                            "  {} {} — {} (unlocked {})",
                            "✓".green(),
                            status.definition.name.bold(),
                            status.definition.description,
                            ts
                        ),
                        None => println!(
                            "  {} {} — {}",
                            "○".dimmed(),
                            status.definition.name,
                            status.definition.description
                        ),
                    }
                }
            }
        }
        Command::Leaderboard { limit, format } => {
            let entries = service::weekly_leaderboard(&store, &clock, limit)?;
            if format == "json" {
                println!("{}", to_json(&entries)?);
            } else if entries.is_empty() {
                println!("No XP recorded this week yet.");
            } else {
                for (rank, entry) in entries.iter().enumerate() {
                    println!(
                        "  {:>2}. {} — {} XP",
                        rank + 1,
                        entry.user_id,
                        entry.xp_earned
                    );
                }
            }
        }
        Command::Ledger {
            user,
            limit,
            format,
        } => {
            let entries = service::ledger_history(&store, &user, limit)?;
            if format == "json" {
                println!("{}", to_json(&entries)?);
            } else if entries.is_empty() {
                println!("No ledger entries for {}.", user);
            } else {
                for entry in &entries {
                    println!(
                        "  {} {:>6} {} {}",
                        entry.created_at,
                        entry.amount,
                        entry.action_type,
                        entry.description.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }

    Ok(())
}
