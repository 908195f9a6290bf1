//! Play Match - ability engine and match flow
//!
//! This module holds everything that runs once a roster is in a match:
//!
//! ## Ability Engine
//! - **Cooldowns**: per-(entity, ability) last-use timestamps
//! - **Resources**: per-(entity, kind) counters gating ultimates
//! - **Scheduler**: keyed delayed/periodic tasks with cancel conditions
//! - **Class Registry**: entity → class assignment, owns teardown
//! - **Kits**: data-driven class definitions plus hook functions
//!
//! ## Flow
//! 1. The host feeds [`MatchInput`](crate::states::MatchInput)s into the
//!    [`MatchEngine`] (directly or through the bevy `MatchHostPlugin`)
//! 2. `MatchEngine::tick` applies queued inputs, then advances the scheduler,
//!    which drives both class passives and phase timers
//! 3. Eliminations are checked by [`win_conditions::evaluate`]
//! 4. Notices are drained by the host after each tick

// Submodules
pub mod abilities;
pub mod ability_config;
pub mod class_registry;
pub mod components;
pub mod cooldowns;
pub mod match_flow;
pub mod ports;
pub mod resources;
pub mod scheduler;
pub mod systems;
pub mod win_conditions;

// Re-exports
pub use abilities::*;
pub use ability_config::{ClassDefinition, ClassHandlers, ClassKit, ClassesConfig, KitRegistry};
pub use class_registry::{AbilityTables, AssignOutcome, AssignmentMode, ClassAssignment, ClassAssignmentRegistry};
pub use components::*;
pub use cooldowns::CooldownTable;
pub use match_flow::{JoinStatus, MatchEngine, VoteTally};
pub use ports::{AbilityContext, CooldownPort, ResourcePort, SchedulerPort};
pub use resources::ResourceLedger;
pub use scheduler::{
    AbilityScheduler, CancelView, CancelWhen, Fired, PhaseTimer, Repeat, TaskAction, TaskHook, TaskKey, TaskOwner,
    TaskSpec,
};
pub use systems::MatchHostPlugin;
pub use win_conditions::MatchOutcome;
