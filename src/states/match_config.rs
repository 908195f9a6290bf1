//! Match configuration data structures
//!
//! Class kinds, match mode, team sides and the `MatchSettings` that tune
//! phase timers. Settings are loaded from RON; every field has a default so a
//! partial file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Available character classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassKind {
    Warrior,
    Mage,
    Rogue,
    Priest,
    Warlock,
    Paladin,
    Hunter,
}

impl ClassKind {
    /// Get all available character classes
    pub fn all() -> &'static [ClassKind] {
        &[
            ClassKind::Warrior,
            ClassKind::Mage,
            ClassKind::Rogue,
            ClassKind::Priest,
            ClassKind::Warlock,
            ClassKind::Paladin,
            ClassKind::Hunter,
        ]
    }

    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            ClassKind::Warrior => "Warrior",
            ClassKind::Mage => "Mage",
            ClassKind::Rogue => "Rogue",
            ClassKind::Priest => "Priest",
            ClassKind::Warlock => "Warlock",
            ClassKind::Paladin => "Paladin",
            ClassKind::Hunter => "Hunter",
        }
    }

    /// Parse a display name, case-insensitively.
    pub fn from_name(name: &str) -> Option<ClassKind> {
        ClassKind::all()
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

/// Free-for-all or two-sided match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchMode {
    #[default]
    Solo,
    Team,
}

impl MatchMode {
    /// Online entities required before a match may leave Idle.
    pub fn min_players(&self) -> usize {
        match self {
            MatchMode::Solo => 1,
            MatchMode::Team => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

fn default_tick_ms() -> u64 {
    50
}

fn default_lobby_gather_secs() -> f32 {
    3.0
}

fn default_freeze_secs() -> f32 {
    5.0
}

/// Tunables for a match instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSettings {
    #[serde(default)]
    pub mode: MatchMode,
    /// Fixed simulation quantum in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Delay between the lobby teleport and the first vote
    #[serde(default = "default_lobby_gather_secs")]
    pub lobby_gather_secs: f32,
    /// Length of the freeze countdown before combat (0 = straight to Active)
    #[serde(default = "default_freeze_secs")]
    pub freeze_secs: f32,
    /// Reset to Idle this long after the match ends (None = wait for an explicit reset)
    #[serde(default)]
    pub auto_reset_secs: Option<f32>,
    /// Seed for tie-breaks, team shuffles and draft order
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            mode: MatchMode::Solo,
            tick_ms: default_tick_ms(),
            lobby_gather_secs: default_lobby_gather_secs(),
            freeze_secs: default_freeze_secs(),
            auto_reset_secs: None,
            random_seed: None,
        }
    }
}

impl MatchSettings {
    /// Load settings from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: MatchSettings = ron::from_str(&contents).map_err(|source| ConfigError::Ron {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        tracing::info!(path = %path.display(), mode = ?settings.mode, "loaded match settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be greater than 0".to_string()));
        }
        for (name, value) in [
            ("lobby_gather_secs", Some(self.lobby_gather_secs)),
            ("freeze_secs", Some(self.freeze_secs)),
            ("auto_reset_secs", self.auto_reset_secs),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(ConfigError::Invalid(format!("{} must be a non-negative number", name)));
                }
            }
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn lobby_gather(&self) -> Duration {
        crate::states::play_match::secs(self.lobby_gather_secs)
    }

    pub fn freeze(&self) -> Duration {
        crate::states::play_match::secs(self.freeze_secs)
    }

    pub fn auto_reset(&self) -> Option<Duration> {
        self.auto_reset_secs.map(crate::states::play_match::secs)
    }
}
