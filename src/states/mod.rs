//! Match state management
//!
//! Defines the match phases and the protocols that move a roster from the
//! lobby into combat: voting, side selection and the draft.

use serde::{Deserialize, Serialize};

pub mod draft;
pub mod inputs;
pub mod match_config;
pub mod play_match;
pub mod teams;
pub mod voting;

pub use inputs::{Ballot, MatchInput, MatchNotice};
pub use match_config::{ClassKind, MatchMode, MatchSettings, Side};

/// The phases of one match. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    /// No match running; layout may be edited
    #[default]
    Idle,
    /// Participants teleported to the lobby anchor
    LobbyGather,
    /// Everyone votes for a map slot
    MapVote,
    /// Everyone votes for a class to ban
    ClassBanVote,
    /// Team mode: pick sides, then draft classes
    TeamOrDraftSelect,
    /// Solo mode: everyone picks a class
    ClassSelect,
    /// Participants placed at spawns, waiting for the gates
    FreezeCountdown,
    /// Combat is live
    Active,
    /// Match over; waiting for reset
    Ended,
}

impl MatchPhase {
    /// Phases between leaving Idle and entering combat.
    pub fn is_pre_combat(&self) -> bool {
        matches!(
            self,
            MatchPhase::LobbyGather
                | MatchPhase::MapVote
                | MatchPhase::ClassBanVote
                | MatchPhase::TeamOrDraftSelect
                | MatchPhase::ClassSelect
        )
    }

    /// Phases where participants are placed in the arena.
    pub fn is_in_arena(&self) -> bool {
        matches!(self, MatchPhase::FreezeCountdown | MatchPhase::Active)
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, MatchPhase::Idle | MatchPhase::Ended)
    }
}
