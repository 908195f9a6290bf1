//! Tests for the combat log and its JSON export
//!
//! These tests verify that the CombatLog correctly:
//! - Filters entries by event type and returns recent entries in order
//! - Stamps entries with the match clock
//! - Records what the engine does during a match
//! - Exports a summary plus entries that parse back as JSON

use std::time::Duration;

use classarena::combat::log::{CombatLog, CombatLogEventType, MatchSummary, ParticipantSummary};
use classarena::settings::{ArenaLayout, Location};
use classarena::states::play_match::{AbilityId, EntityId, KitRegistry, MatchEngine, MatchOutcome};
use classarena::states::{Ballot, ClassKind, MatchSettings};

fn create_test_log() -> CombatLog {
    CombatLog::default()
}

fn summary() -> MatchSummary {
    MatchSummary {
        map: Some("Ring".to_string()),
        banned_class: Some("Rogue".to_string()),
        outcome: Some(MatchOutcome::Winner(EntityId(1))),
        duration_secs: 42.5,
        random_seed: Some(9),
        participants: vec![
            ParticipantSummary {
                entity: EntityId(1),
                class_name: Some("Warrior".to_string()),
                side: None,
                eliminated: false,
            },
            ParticipantSummary {
                entity: EntityId(2),
                class_name: Some("Mage".to_string()),
                side: None,
                eliminated: true,
            },
        ],
    }
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_filter_by_type_empty_log() {
    let log = create_test_log();
    assert!(log.filter_by_type(CombatLogEventType::Death).is_empty());
    assert!(log.recent(5).is_empty());
}

#[test]
fn test_filter_by_type_keeps_order() {
    let mut log = create_test_log();
    log.log(CombatLogEventType::Vote, "Map chosen: Ring".to_string());
    log.log(CombatLogEventType::Death, "#2 was eliminated".to_string());
    log.log(CombatLogEventType::Vote, "Class banned: Rogue".to_string());

    let votes: Vec<&str> = log
        .filter_by_type(CombatLogEventType::Vote)
        .iter()
        .map(|entry| entry.message.as_str())
        .collect();
    assert_eq!(votes, vec!["Map chosen: Ring", "Class banned: Rogue"]);
    assert_eq!(log.filter_by_type(CombatLogEventType::Death).len(), 1);
    assert!(log.filter_by_type(CombatLogEventType::Draft).is_empty());
}

#[test]
fn test_recent_returns_tail_in_chronological_order() {
    let mut log = create_test_log();
    for i in 0..5 {
        log.log(CombatLogEventType::MatchEvent, format!("event {}", i));
    }
    let recent: Vec<&str> = log.recent(2).iter().map(|entry| entry.message.as_str()).collect();
    assert_eq!(recent, vec!["event 3", "event 4"]);
    assert_eq!(log.recent(50).len(), 5);
}

#[test]
fn test_entries_are_stamped_with_match_time() {
    let mut log = create_test_log();
    log.match_time = 1.5;
    log.log(CombatLogEventType::Phase, "Idle -> LobbyGather".to_string());
    log.match_time = 4.0;
    log.log(CombatLogEventType::Phase, "LobbyGather -> ClassBanVote".to_string());

    assert_eq!(log.entries[0].timestamp, 1.5);
    assert_eq!(log.entries[1].timestamp, 4.0);
}

#[test]
fn test_clear_keeps_clock() {
    let mut log = create_test_log();
    log.match_time = 3.0;
    log.log(CombatLogEventType::MatchEvent, "start".to_string());
    log.clear();
    assert!(log.entries.is_empty());
    assert_eq!(log.match_time, 3.0);
}

// =============================================================================
// Engine Records
// =============================================================================

fn layout() -> ArenaLayout {
    let mut layout = ArenaLayout::default();
    layout.set_lobby(Location::new("arena", 0.0, 64.0, 0.0));
    layout.add_map("Ring").unwrap();
    layout
        .set_map_location("Ring", Location::new("arena", 100.0, 64.0, 0.0))
        .unwrap();
    layout
        .add_map_spawn("Ring", Location::new("arena", 100.0, 64.0, 5.0))
        .unwrap();
    layout
}

#[test]
fn test_engine_logs_the_whole_match() {
    let settings = MatchSettings {
        lobby_gather_secs: 0.5,
        freeze_secs: 0.0,
        random_seed: Some(1),
        ..MatchSettings::default()
    };
    let mut engine = MatchEngine::new(settings, layout(), KitRegistry::builtin().unwrap());
    let (a, b) = (EntityId(1), EntityId(2));
    engine.on_entity_join(a);
    engine.on_entity_join(b);
    engine.start().unwrap();
    engine.tick(Duration::ZERO);
    engine.tick(Duration::from_millis(500));

    engine.cast_vote(a, Ballot::Ban(ClassKind::Rogue)).unwrap();
    engine.cast_vote(b, Ballot::Ban(ClassKind::Rogue)).unwrap();
    engine.request_assign(a, ClassKind::Warrior).unwrap();
    engine.request_assign(b, ClassKind::Mage).unwrap();
    engine
        .use_ability(a, &AbilityId::new("mortal_strike"), Some(b))
        .unwrap();
    engine.on_eliminated(b).unwrap();

    let log = engine.combat_log();
    assert!(log.filter_by_type(CombatLogEventType::Phase).len() >= 5);
    assert_eq!(log.filter_by_type(CombatLogEventType::Vote).len(), 2);
    assert_eq!(log.filter_by_type(CombatLogEventType::ClassChange).len(), 2);
    assert_eq!(log.filter_by_type(CombatLogEventType::AbilityUsed).len(), 1);
    assert_eq!(log.filter_by_type(CombatLogEventType::Death).len(), 1);

    let last = log.recent(1)[0];
    assert_eq!(last.event_type, CombatLogEventType::MatchEvent);
    assert!(last.message.starts_with("Match ended"));
    assert_eq!(last.timestamp, 0.5);
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn test_to_json_contains_summary_and_entries() {
    let mut log = create_test_log();
    log.log(CombatLogEventType::Death, "#2 was eliminated".to_string());

    let json = log.to_json(&summary()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["summary"]["map"], "Ring");
    assert_eq!(value["summary"]["banned_class"], "Rogue");
    assert_eq!(value["summary"]["participants"].as_array().unwrap().len(), 2);
    assert_eq!(value["entries"][0]["event_type"], "Death");
    assert_eq!(value["entries"][0]["message"], "#2 was eliminated");
}

#[test]
fn test_summary_survives_json_round_trip() {
    let json = serde_json::to_string(&summary()).unwrap();
    let parsed: MatchSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, summary());
}

#[test]
fn test_save_to_file_creates_parent_directories() {
    let dir = std::env::temp_dir()
        .join(format!("classarena_log_test_{}", std::process::id()))
        .join("nested");
    let path = dir.join("match.json");
    let _ = std::fs::remove_dir_all(&dir);

    let mut log = create_test_log();
    log.log(CombatLogEventType::MatchEvent, "Match started".to_string());
    let written = log.save_to_file(&summary(), Some(&path)).unwrap();

    assert_eq!(written, path);
    let contents = std::fs::read_to_string(&written).unwrap();
    assert!(contents.contains("Match started"));
    let _ = std::fs::remove_dir_all(&dir);
}
