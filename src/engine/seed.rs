//! Operator-driven reference-data seeding from a TOML catalog file.
//!
//! Levels and achievements are provisioned out-of-band; the engine only
//! reads them. `seed_from_file` upserts the catalog and validates the
//! resulting tables inside one transaction, so a malformed file leaves the
//! previous catalog intact.

use crate::core::db;
use crate::core::error::QuestlineError;
use crate::core::store::Store;
use crate::engine::achievements::{self, AchievementDefinition, RequirementType};
use crate::engine::levels::{self, LevelDefinition, LevelTable};
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub levels: Vec<LevelSeed>,
    #[serde(default)]
    pub achievements: Vec<AchievementSeed>,
}

#[derive(Debug, Deserialize)]
pub struct LevelSeed {
    pub level_number: i64,
    pub title: String,
    #[serde(default)]
    pub badge_icon: Option<String>,
    pub xp_required: i64,
}

#[derive(Debug, Deserialize)]
pub struct AchievementSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub requirement_type: String,
    pub requirement_value: i64,
    #[serde(default)]
    pub xp_reward: i64,
    #[serde(default)]
    pub coin_reward: i64,
    #[serde(default)]
    pub is_secret: bool,
}

#[derive(Debug)]
pub struct SeedSummary {
    pub levels: usize,
    pub achievements: usize,
}

pub fn seed_from_file(store: &Store, path: &Path) -> Result<SeedSummary, QuestlineError> {
    let raw = fs::read_to_string(path).map_err(QuestlineError::Io)?;
    let config: CatalogConfig =
        toml::from_str(&raw).map_err(|e| QuestlineError::Configuration(e.to_string()))?;

    // Parse requirement kinds up front so nothing is written for a bad file.
    let mut achievement_defs = Vec::with_capacity(config.achievements.len());
    for seed in &config.achievements {
        let requirement_type = RequirementType::parse(&seed.requirement_type)?;
        if seed.xp_reward < 0 || seed.coin_reward < 0 {
            return Err(QuestlineError::Configuration(format!(
                "achievement '{}' has negative rewards",
                seed.id
            )));
        }
        achievement_defs.push(AchievementDefinition {
            id: seed.id.clone(),
            name: seed.name.clone(),
            description: seed.description.clone(),
            requirement_type,
            requirement_value: seed.requirement_value,
            xp_reward: seed.xp_reward,
            coin_reward: seed.coin_reward,
            is_secret: seed.is_secret,
        });
    }

    let db_path = db::progression_db_path(&store.root);
    let mut conn = db::db_connect(&db_path.to_string_lossy())?;
    let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for seed in &config.levels {
        levels::upsert_level(
            &txn,
            &LevelDefinition {
                level_number: seed.level_number,
                title: seed.title.clone(),
                badge_icon: seed
                    .badge_icon
                    .clone()
                    .unwrap_or_else(|| format!("badge-level-{}", seed.level_number)),
                xp_required: seed.xp_required,
            },
        )?;
    }
    for def in &achievement_defs {
        achievements::upsert_achievement(&txn, def)?;
    }

    // Validate the post-seed tables; an error here rolls everything back.
    LevelTable::load(&txn)?;
    achievements::load_catalog(&txn)?;
    txn.commit()?;

    Ok(SeedSummary {
        levels: config.levels.len(),
        achievements: achievement_defs.len(),
    })
}
