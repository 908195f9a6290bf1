//! Combat logging
//!
//! Records match events for display and post-match analysis. A finished
//! match can be exported as a JSON summary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::states::play_match::{EntityId, MatchOutcome};

/// A single entry in the combat log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    /// Timestamp in match time (seconds since the engine's first tick)
    pub timestamp: f32,
    /// The type of event
    pub event_type: CombatLogEventType,
    /// Human-readable description of the event
    pub message: String,
}

/// Types of combat log events for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatLogEventType {
    /// Phase transition
    Phase,
    /// Vote result
    Vote,
    /// Draft pick
    Draft,
    /// Class assigned or cleared
    ClassChange,
    /// Ability used
    AbilityUsed,
    /// Participant eliminated
    Death,
    /// Join, leave, reconnect
    Connection,
    /// Match event (start, end, etc.)
    MatchEvent,
}

/// Per-participant summary written with the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub entity: EntityId,
    pub class_name: Option<String>,
    pub side: Option<String>,
    pub eliminated: bool,
}

/// Match-level summary written with the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub map: Option<String>,
    pub banned_class: Option<String>,
    pub outcome: Option<MatchOutcome>,
    pub duration_secs: f32,
    pub random_seed: Option<u64>,
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Serialize)]
struct SavedLog<'a> {
    summary: &'a MatchSummary,
    entries: &'a [CombatLogEntry],
}

#[derive(Debug, Default, Clone)]
pub struct CombatLog {
    /// All log entries in chronological order
    pub entries: Vec<CombatLogEntry>,
    /// Current match time
    pub match_time: f32,
}

impl CombatLog {
    /// Clear the log for a new match
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Add a new entry to the log
    pub fn log(&mut self, event_type: CombatLogEventType, message: String) {
        self.entries.push(CombatLogEntry {
            timestamp: self.match_time,
            event_type,
            message,
        });
    }

    /// Get entries filtered by event type
    pub fn filter_by_type(&self, event_type: CombatLogEventType) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Get the last N entries
    pub fn recent(&self, count: usize) -> Vec<&CombatLogEntry> {
        self.entries.iter().rev().take(count).rev().collect()
    }

    pub fn to_json(&self, summary: &MatchSummary) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&SavedLog {
            summary,
            entries: &self.entries,
        })
        .map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Write the log and summary as JSON. Without an explicit path the file
    /// goes to `match_logs/match_<seconds since epoch>.json`.
    pub fn save_to_file(&self, summary: &MatchSummary, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let stamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                PathBuf::from("match_logs").join(format!("match_{}.json", stamp))
            }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = self.to_json(summary)?;
        fs::write(&path, contents).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "combat log saved");
        Ok(path)
    }
}
