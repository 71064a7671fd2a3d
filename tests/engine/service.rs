use chrono::NaiveDate;
use questline::core::db::{db_connect, initialize_progression_db, progression_db_path};
use questline::core::store::Store;
use questline::core::time::{FixedClock, SystemClock};
use questline::engine::achievements::{self, AchievementDefinition, RequirementType};
use questline::engine::ledger::{self, ActionType, Reference};
use questline::engine::service;
use std::thread;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    initialize_progression_db(&store.root).unwrap();
    (tmp, store)
}

fn clear_achievements(store: &Store) {
    let conn = db_connect(&progression_db_path(&store.root).to_string_lossy()).unwrap();
    conn.execute("DELETE FROM achievement_unlocks", []).unwrap();
    conn.execute("DELETE FROM achievements", []).unwrap();
}

fn add_achievement(
    store: &Store,
    id: &str,
    requirement_type: RequirementType,
    requirement_value: i64,
    xp_reward: i64,
    coin_reward: i64,
) {
    let conn = db_connect(&progression_db_path(&store.root).to_string_lossy()).unwrap();
    achievements::upsert_achievement(
        &conn,
        &AchievementDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: format!("{} test achievement", id),
            requirement_type,
            requirement_value,
            xp_reward,
            coin_reward,
            is_secret: false,
        },
    )
    .unwrap();
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_level_up_when_crossing_threshold() {
    // Level table: 1 at 0, 2 at 100, 3 at 300 (defaults).
    let (_tmp, store) = setup();
    clear_achievements(&store);
    let clock = SystemClock;

    service::award_xp(
        &store,
        &clock,
        "ada",
        90,
        ActionType::LessonComplete,
        None,
        &Reference::none(),
    )
    .unwrap();
    let result = service::award_xp(
        &store,
        &clock,
        "ada",
        20,
        ActionType::LessonComplete,
        None,
        &Reference::none(),
    )
    .unwrap();

    assert_eq!(result.aggregate.xp_total, 110);
    assert_eq!(result.aggregate.level, 2);
    let leveled = result.leveled_up.expect("crossing 100 XP must level up");
    assert_eq!(leveled.level_number, 2);
}

#[test]
fn test_no_level_up_within_same_band() {
    let (_tmp, store) = setup();
    clear_achievements(&store);
    let result = service::award_xp(
        &store,
        &SystemClock,
        "ada",
        50,
        ActionType::LessonComplete,
        None,
        &Reference::none(),
    )
    .unwrap();
    assert_eq!(result.aggregate.level, 1);
    assert!(result.leveled_up.is_none());
}

#[test]
fn test_negative_award_clamps_at_zero() {
    let (_tmp, store) = setup();
    clear_achievements(&store);
    let result = service::award_xp(
        &store,
        &SystemClock,
        "newbie",
        -50,
        ActionType::ManualAdjustment,
        None,
        &Reference::none(),
    )
    .unwrap();
    assert_eq!(result.aggregate.xp_total, 0);
    assert_eq!(result.aggregate.level, 1);
}

#[test]
fn test_fifth_lesson_unlocks_achievement_with_reward_in_same_result() {
    let (_tmp, store) = setup();
    clear_achievements(&store);
    add_achievement(&store, "five-lessons", RequirementType::LessonsCompleted, 5, 50, 20);
    let clock = SystemClock;

    for _ in 0..4 {
        let result = service::award_xp(
            &store,
            &clock,
            "ada",
            10,
            ActionType::LessonComplete,
            None,
            &Reference::to("lesson", "lesson-1"),
        )
        .unwrap();
        assert!(result.unlocked.is_empty());
    }
    let result = service::award_xp(
        &store,
        &clock,
        "ada",
        10,
        ActionType::LessonComplete,
        None,
        &Reference::to("lesson", "lesson-5"),
    )
    .unwrap();

    assert_eq!(result.unlocked.len(), 1);
    assert_eq!(result.unlocked[0].id, "five-lessons");
    // 5 lessons x 10 XP + 50 XP reward, all inside one call.
    assert_eq!(result.aggregate.xp_total, 100);
    assert_eq!(result.aggregate.coins, 20);
    // The reward landed as its own ledger entry of action_type achievement.
    let conn = db_connect(&progression_db_path(&store.root).to_string_lossy()).unwrap();
    assert_eq!(
        ledger::count_actions(&conn, "ada", ActionType::Achievement).unwrap(),
        1
    );
    let entries = ledger::entries_for_user(&conn, "ada", 10).unwrap();
    assert_eq!(entries.len(), 6);
    let reward = entries
        .iter()
        .find(|e| e.action_type == ActionType::Achievement)
        .unwrap();
    assert_eq!(reward.amount, 50);
    assert_eq!(reward.reference_id.as_deref(), Some("five-lessons"));
}

#[test]
fn test_reward_cascade_is_caught_by_second_pass() {
    let (_tmp, store) = setup();
    clear_achievements(&store);
    // Unlocking the first achievement pushes the user past the second's
    // XP threshold within the same award call.
    add_achievement(&store, "big-bonus", RequirementType::LessonsCompleted, 1, 900, 0);
    add_achievement(&store, "xp-1000", RequirementType::XpEarned, 1_000, 0, 0);
    let clock = SystemClock;

    service::award_xp(
        &store,
        &clock,
        "ada",
        940,
        ActionType::ManualAdjustment,
        Some("migrated balance"),
        &Reference::none(),
    )
    .unwrap();
    let result = service::award_xp(
        &store,
        &clock,
        "ada",
        10,
        ActionType::LessonComplete,
        None,
        &Reference::none(),
    )
    .unwrap();

    let ids: Vec<&str> = result.unlocked.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["big-bonus", "xp-1000"]);
    assert_eq!(result.aggregate.xp_total, 1_850);
}

#[test]
fn test_streak_increments_and_resets() {
    let (_tmp, store) = setup();
    clear_achievements(&store);

    let day1 = FixedClock::new(d(2026, 8, 24));
    let r1 = service::record_activity(&store, &day1, "ada").unwrap();
    assert_eq!(r1.streak_days, 1);
    assert!(r1.changed);

    let day2 = FixedClock::new(d(2026, 8, 25));
    let r2 = service::record_activity(&store, &day2, "ada").unwrap();
    assert_eq!(r2.streak_days, 2);

    let day3 = FixedClock::new(d(2026, 8, 26));
    let r3 = service::record_activity(&store, &day3, "ada").unwrap();
    assert_eq!(r3.streak_days, 3);

    // Two-day gap: streak breaks back to 1, no matter how long it was.
    let day6 = FixedClock::new(d(2026, 8, 29));
    let r4 = service::record_activity(&store, &day6, "ada").unwrap();
    assert_eq!(r4.streak_days, 1);
    assert!(r4.changed);
}

#[test]
fn test_same_day_activity_is_idempotent() {
    let (_tmp, store) = setup();
    clear_achievements(&store);
    let clock = FixedClock::new(d(2026, 8, 24));

    let first = service::record_activity(&store, &clock, "ada").unwrap();
    assert_eq!(first.streak_days, 1);
    assert!(first.changed);

    let second = service::record_activity(&store, &clock, "ada").unwrap();
    assert_eq!(second.streak_days, 1);
    assert!(!second.changed);
    assert!(second.unlocked.is_empty());
}

#[test]
fn test_progress_view_between_levels() {
    let (_tmp, store) = setup();
    clear_achievements(&store);
    service::award_xp(
        &store,
        &SystemClock,
        "ada",
        150,
        ActionType::ManualAdjustment,
        None,
        &Reference::none(),
    )
    .unwrap();

    let view = service::get_progress(&store, "ada").unwrap();
    assert_eq!(view.xp_total, 150);
    assert_eq!(view.level.level_number, 2);
    let next = view.next_level.unwrap();
    assert_eq!(next.level_number, 3);
    // 50 XP into the 200 XP band between levels 2 and 3.
    assert_eq!(view.progress_percent_to_next, 25);
    assert!(!view.is_max_level);
}

#[test]
fn test_progress_view_at_max_level() {
    let (_tmp, store) = setup();
    clear_achievements(&store);
    service::award_xp(
        &store,
        &SystemClock,
        "ada",
        6_000,
        ActionType::ManualAdjustment,
        None,
        &Reference::none(),
    )
    .unwrap();

    let view = service::get_progress(&store, "ada").unwrap();
    assert_eq!(view.level.level_number, 10);
    assert!(view.next_level.is_none());
    assert!(view.is_max_level);
    assert_eq!(view.progress_percent_to_next, 100);
}

#[test]
fn test_progress_for_unknown_user_is_fresh() {
    let (_tmp, store) = setup();
    let view = service::get_progress(&store, "nobody-yet").unwrap();
    assert_eq!(view.xp_total, 0);
    assert_eq!(view.level.level_number, 1);
}

#[test]
fn test_concurrent_awards_for_same_user_both_commit() {
    let (_tmp, store) = setup();
    clear_achievements(&store);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            service::award_xp(
                &store,
                &SystemClock,
                "racer",
                10,
                ActionType::LessonComplete,
                None,
                &Reference::none(),
            )
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let conn = db_connect(&progression_db_path(&store.root).to_string_lossy()).unwrap();
    let sum = ledger::sum_for_user(&conn, "racer").unwrap();
    assert_eq!(sum, 20);
    let entries = ledger::entries_for_user(&conn, "racer", 10).unwrap();
    assert_eq!(entries.len(), 2);
    let view = service::get_progress(&store, "racer").unwrap();
    assert_eq!(view.xp_total, 20);
}
