//! JSON configuration parsing for headless mode
//!
//! Describes a roster of bot players and the arena they fight in, and turns
//! it into the engine's settings and layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::settings::{ArenaLayout, Location, MapSlot};
use crate::states::match_config::{ClassKind, MatchMode, MatchSettings, Side};

const ARENA_WORLD: &str = "arena";
/// Distance of spawn points from the arena centre.
const SPAWN_RING: f64 = 5.0;

/// One bot participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    /// Class names in order of preference
    pub classes: Vec<String>,
    /// Map slot this bot votes for (default: the first map)
    #[serde(default)]
    pub map_vote: Option<String>,
    /// Class this bot votes to ban (default: the first class it does not want)
    #[serde(default)]
    pub ban_vote: Option<String>,
    /// Side to join in team mode (default: alternate by roster order)
    #[serde(default)]
    pub side: Option<Side>,
}

/// Headless match configuration loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessMatchConfig {
    #[serde(default)]
    pub mode: MatchMode,
    pub players: Vec<BotConfig>,
    /// Map slot names (default: ["Ring"])
    #[serde(default = "default_maps")]
    pub maps: Vec<String>,
    #[serde(default = "default_settings")]
    pub settings: MatchSettings,
    /// Class kit file to use instead of the built-in kits
    #[serde(default)]
    pub classes_path: Option<PathBuf>,
    /// Custom output path for match log (optional)
    #[serde(default)]
    pub output_path: Option<String>,
    /// Simulated seconds before the match is force-ended (default: 300)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f32,
    /// Random seed for deterministic match reproduction. Overrides the
    /// seed in `settings` when both are set.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

fn default_maps() -> Vec<String> {
    vec!["Ring".to_string()]
}

fn default_settings() -> MatchSettings {
    MatchSettings {
        lobby_gather_secs: 1.0,
        freeze_secs: 3.0,
        ..MatchSettings::default()
    }
}

fn default_max_duration() -> f32 {
    300.0
}

impl HeadlessMatchConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents, path)
    }

    /// Parse and validate. `origin` is only used in error messages.
    pub fn from_json_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: HeadlessMatchConfig = serde_json::from_str(contents).map_err(|source| ConfigError::Json {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid(message));

        let required = self.mode.min_players().max(2);
        if self.players.len() < required {
            return invalid(format!(
                "{:?} mode needs at least {} players, got {}",
                self.mode,
                required,
                self.players.len()
            ));
        }

        if self.maps.is_empty() {
            return invalid("at least one map is required".to_string());
        }
        for (i, map) in self.maps.iter().enumerate() {
            if map.trim().is_empty() {
                return invalid("map names must not be empty".to_string());
            }
            if self.maps[..i].contains(map) {
                return invalid(format!("duplicate map '{}'", map));
            }
        }

        for (i, player) in self.players.iter().enumerate() {
            if self.players[..i].iter().any(|other| other.name == player.name) {
                return invalid(format!("duplicate player name '{}'", player.name));
            }
            if player.classes.is_empty() {
                return invalid(format!("player '{}' has no class preferences", player.name));
            }
            for class_name in &player.classes {
                Self::parse_class(class_name)?;
            }
            if let Some(ban) = &player.ban_vote {
                Self::parse_class(ban)?;
            }
            if let Some(map) = &player.map_vote {
                if !self.maps.contains(map) {
                    return invalid(format!("player '{}' votes for unknown map '{}'", player.name, map));
                }
            }
        }

        if !self.max_duration_secs.is_finite() || self.max_duration_secs <= 0.0 {
            return invalid("max_duration_secs must be positive".to_string());
        }

        self.settings.validate()
    }

    /// Parse a class name string into ClassKind
    pub fn parse_class(name: &str) -> Result<ClassKind, ConfigError> {
        ClassKind::from_name(name).ok_or_else(|| {
            let valid: Vec<&str> = ClassKind::all().iter().map(|kind| kind.name()).collect();
            ConfigError::Invalid(format!("Unknown class: '{}'. Valid classes: {}", name, valid.join(", ")))
        })
    }

    /// Engine settings with the mode and seed from this config.
    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            mode: self.mode,
            random_seed: self.random_seed.or(self.settings.random_seed),
            ..self.settings.clone()
        }
    }

    /// Lobby at the origin, one arena per map laid out along x, with one
    /// spawn per player on a ring around each arena centre.
    pub fn arena_layout(&self) -> ArenaLayout {
        let spawn_count = self.players.len().max(1);
        let maps = self
            .maps
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let centre_x = (i as f64 + 1.0) * 100.0;
                let spawns = (0..spawn_count)
                    .map(|slot| {
                        let angle = slot as f64 / spawn_count as f64 * std::f64::consts::TAU;
                        Location::new(
                            ARENA_WORLD,
                            centre_x + SPAWN_RING * angle.cos(),
                            64.0,
                            SPAWN_RING * angle.sin(),
                        )
                    })
                    .collect();
                MapSlot {
                    name: name.clone(),
                    location: Some(Location::new(ARENA_WORLD, centre_x, 64.0, 0.0)),
                    spawns,
                }
            })
            .collect();
        ArenaLayout {
            lobby: Some(Location::new(ARENA_WORLD, 0.0, 64.0, 0.0)),
            maps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<HeadlessMatchConfig, ConfigError> {
        HeadlessMatchConfig::from_json_str(json, Path::new("test.json"))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"{ "players": [
                { "name": "a", "classes": ["Warrior"] },
                { "name": "b", "classes": ["mage"] }
            ] }"#,
        )
        .unwrap();
        assert_eq!(config.mode, MatchMode::Solo);
        assert_eq!(config.maps, vec!["Ring".to_string()]);
        assert_eq!(config.max_duration_secs, 300.0);
        assert_eq!(config.settings.freeze_secs, 3.0);
    }

    #[test]
    fn test_rejects_unknown_class() {
        let result = parse(
            r#"{ "players": [
                { "name": "a", "classes": ["Druid"] },
                { "name": "b", "classes": ["Mage"] }
            ] }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(message)) if message.contains("Druid")));
    }

    #[test]
    fn test_rejects_vote_for_unknown_map() {
        let result = parse(
            r#"{ "maps": ["Ring"], "players": [
                { "name": "a", "classes": ["Warrior"], "map_vote": "Pit" },
                { "name": "b", "classes": ["Mage"] }
            ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_single_player() {
        let result = parse(r#"{ "players": [ { "name": "a", "classes": ["Warrior"] } ] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_json_reports_path() {
        let result = parse("{ not json");
        assert!(matches!(result, Err(ConfigError::Json { path, .. }) if path == Path::new("test.json")));
    }

    #[test]
    fn test_layout_has_spawn_per_player() {
        let config = parse(
            r#"{ "maps": ["Ring", "Pit"], "players": [
                { "name": "a", "classes": ["Warrior"] },
                { "name": "b", "classes": ["Mage"] },
                { "name": "c", "classes": ["Rogue"] }
            ] }"#,
        )
        .unwrap();
        let layout = config.arena_layout();
        assert!(layout.check().is_ok());
        assert_eq!(layout.maps.len(), 2);
        assert!(layout.maps.iter().all(|map| map.spawns.len() == 3));
    }

    #[test]
    fn test_seed_override() {
        let config = parse(
            r#"{ "random_seed": 7, "settings": { "random_seed": 3 }, "players": [
                { "name": "a", "classes": ["Warrior"] },
                { "name": "b", "classes": ["Mage"] }
            ] }"#,
        )
        .unwrap();
        assert_eq!(config.match_settings().random_seed, Some(7));
    }
}
