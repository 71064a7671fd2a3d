//! Level table: ordered XP thresholds mapping cumulative XP to a level.
//!
//! Reference data, provisioned by seeding and only read here. The table is
//! loaded and validated once per transaction; resolution itself is a pure
//! lookup over the sorted thresholds.

use crate::core::error::QuestlineError;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

pub const LEVELS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS levels (
        level_number INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        badge_icon TEXT NOT NULL,
        xp_required INTEGER NOT NULL
    )
";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LevelDefinition {
    pub level_number: i64,
    pub title: String,
    pub badge_icon: String,
    pub xp_required: i64,
}

/// Default progression curve, inserted with `INSERT OR IGNORE` so operator
/// seeds always win.
const DEFAULT_LEVELS: &[(i64, &str, &str, i64)] = &[
    (1, "Novice", "badge-novice", 0),
    (2, "Apprentice", "badge-apprentice", 100),
    (3, "Scholar", "badge-scholar", 300),
    (4, "Adept", "badge-adept", 600),
    (5, "Expert", "badge-expert", 1000),
    (6, "Mentor", "badge-mentor", 1500),
    (7, "Master", "badge-master", 2200),
    (8, "Grandmaster", "badge-grandmaster", 3000),
    (9, "Sage", "badge-sage", 4000),
    (10, "Luminary", "badge-luminary", 5200),
];

pub fn seed_default_levels(conn: &Connection) -> Result<(), QuestlineError> {
    for (number, title, badge, xp) in DEFAULT_LEVELS {
        conn.execute(
            "INSERT OR IGNORE INTO levels(level_number, title, badge_icon, xp_required)
             VALUES(?1, ?2, ?3, ?4)",
            params![number, title, badge, xp],
        )?;
    }
    Ok(())
}

pub fn upsert_level(conn: &Connection, def: &LevelDefinition) -> Result<(), QuestlineError> {
    conn.execute(
        "INSERT INTO levels(level_number, title, badge_icon, xp_required)
         VALUES(?1, ?2, ?3, ?4)
         ON CONFLICT(level_number) DO UPDATE SET
            title = excluded.title,
            badge_icon = excluded.badge_icon,
            xp_required = excluded.xp_required",
        params![def.level_number, def.title, def.badge_icon, def.xp_required],
    )?;
    Ok(())
}

/// Validated, sorted level table.
#[derive(Debug, Clone)]
pub struct LevelTable {
    levels: Vec<LevelDefinition>,
}

impl LevelTable {
    /// Load the table and fail fast on malformed reference data: the table
    /// must be non-empty, start at level 1 with `xp_required = 0`, be
    /// consecutively numbered, and have strictly increasing thresholds.
    pub fn load(conn: &Connection) -> Result<Self, QuestlineError> {
        let mut stmt = conn.prepare(
            "SELECT level_number, title, badge_icon, xp_required
             FROM levels ORDER BY level_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LevelDefinition {
                level_number: row.get(0)?,
                title: row.get(1)?,
                badge_icon: row.get(2)?,
                xp_required: row.get(3)?,
            })
        })?;
        let mut levels = Vec::new();
        for r in rows {
            levels.push(r?);
        }
        Self::from_definitions(levels)
    }

    pub fn from_definitions(levels: Vec<LevelDefinition>) -> Result<Self, QuestlineError> {
        let first = levels.first().ok_or_else(|| {
            QuestlineError::Configuration("level table is empty".to_string())
        })?;
        if first.level_number != 1 || first.xp_required != 0 {
            return Err(QuestlineError::Configuration(
                "level table must start at level 1 with xp_required = 0".to_string(),
            ));
        }
        for pair in levels.windows(2) {
            if pair[1].level_number != pair[0].level_number + 1 {
                return Err(QuestlineError::Configuration(format!(
                    "level numbers must be consecutive: {} follows {}",
                    pair[1].level_number, pair[0].level_number
                )));
            }
            if pair[1].xp_required <= pair[0].xp_required {
                return Err(QuestlineError::Configuration(format!(
                    "xp_required must be strictly increasing: level {} has {} after {}",
                    pair[1].level_number, pair[1].xp_required, pair[0].xp_required
                )));
            }
        }
        Ok(Self { levels })
    }

    /// Highest level whose threshold is within `xp_total`. Level 1 covers
    /// everything below the second threshold, including clamped zero.
    pub fn resolve(&self, xp_total: i64) -> &LevelDefinition {
        self.levels
            .iter()
            .rev()
            .find(|l| l.xp_required <= xp_total)
            .unwrap_or(&self.levels[0])
    }

    pub fn by_number(&self, level_number: i64) -> Option<&LevelDefinition> {
        self.levels.iter().find(|l| l.level_number == level_number)
    }

    /// Definition one level above `level_number`, or `None` at max level.
    pub fn next_after(&self, level_number: i64) -> Option<&LevelDefinition> {
        self.by_number(level_number + 1)
    }

    pub fn max_level(&self) -> &LevelDefinition {
        // Non-empty is guaranteed by the constructors.
        &self.levels[self.levels.len() - 1]
    }
}
