//! ClassArena - round-based class arena match core
//!
//! Drives one arena match from lobby to result: map and ban votes, class
//! selection or a team draft, a freeze countdown, then combat until one
//! participant or side is left standing. Classes are data-driven kits whose
//! passives and pulses run on a tick-driven scheduler.
//!
//! This library exposes the match engine, its bevy host plugin and the
//! headless bot runner.

pub mod cli;
pub mod combat;
pub mod error;
pub mod headless;
pub mod settings;
pub mod states;

// Re-export commonly used types
pub use combat::log::{CombatLog, CombatLogEventType};
pub use error::{ConfigError, HeadlessError, Rejection, StartRefusal};
pub use headless::HeadlessMatchConfig;
pub use settings::{ArenaLayout, Location};
pub use states::match_config::{ClassKind, MatchMode, MatchSettings, Side};
pub use states::play_match::{MatchEngine, MatchHostPlugin, MatchOutcome};
pub use states::{MatchInput, MatchNotice, MatchPhase};
