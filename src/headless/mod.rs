//! Headless mode for automated testing
//!
//! Runs a complete match with scripted bot players and no host world, for
//! balance checks and regression tests.
//!
//! ## Usage
//!
//! ```bash
//! # Run a headless match
//! cargo run --release -- --headless demos/solo_match.json
//! ```
//!
//! ## JSON Configuration
//!
//! ```json
//! {
//!   "mode": "Solo",
//!   "maps": ["Ring", "Pit"],
//!   "players": [
//!     { "name": "alice", "classes": ["Warrior", "Paladin"], "map_vote": "Pit" },
//!     { "name": "bob", "classes": ["Mage"], "ban_vote": "Rogue" }
//!   ],
//!   "max_duration_secs": 120
//! }
//! ```

pub mod config;
pub mod runner;

pub use config::{BotConfig, HeadlessMatchConfig};
pub use runner::{run_headless_match, ArenaSim, MatchResult, PlayerResult};
