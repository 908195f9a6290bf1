//! Match inputs and notices
//!
//! Inputs are what participants and the host ask the engine to do. They may
//! be produced anywhere and are applied in order at the start of the next
//! tick. Notices are what the engine tells the host afterwards.

use bevy::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{Rejection, StartRefusal};

use super::match_config::{ClassKind, Side};
use super::play_match::{AbilityId, AbilityOutcome, EntityId, MatchOutcome};
use super::MatchPhase;

/// One vote, for whichever round is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ballot {
    Map(String),
    Ban(ClassKind),
}

#[derive(Event, Debug, Clone, PartialEq)]
pub enum MatchInput {
    Join(EntityId),
    Leave(EntityId),
    Eliminated(EntityId),
    Assign { entity: EntityId, kind: ClassKind },
    Clear(EntityId),
    Vote { entity: EntityId, ballot: Ballot },
    DraftPick { entity: EntityId, kind: ClassKind },
    ChooseSide { entity: EntityId, side: Side },
    AcceptRandomTeams(EntityId),
    UseAbility {
        entity: EntityId,
        ability: AbilityId,
        target: Option<EntityId>,
    },
    StartPractice { entity: EntityId, kind: ClassKind },
    EndPractice(EntityId),
    Start,
    ForceEnd { reason: String },
    Reset,
}

#[derive(Event, Debug, Clone, PartialEq)]
pub enum MatchNotice {
    PhaseChanged { from: MatchPhase, to: MatchPhase },
    StartRefused(StartRefusal),
    MapChosen { map: String, tie_broken: bool },
    ClassBanned { kind: ClassKind, tie_broken: bool },
    /// One side was empty after side selection; sides were cleared.
    TeamsRolledBack,
    RandomTeamsOffered,
    DraftTurn { entity: EntityId, side: Side },
    CountdownTick { seconds_left: u64 },
    ClassRestored(EntityId),
    BecameSpectator(EntityId),
    Eliminated(EntityId),
    AbilityUsed {
        entity: EntityId,
        ability: AbilityId,
        outcome: AbilityOutcome,
    },
    MatchEnded(MatchOutcome),
    InputRejected { input: MatchInput, reason: Rejection },
}

/// Cloneable handle for queueing inputs from other threads. Everything
/// pushed here is applied at the start of the engine's next tick.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    inputs: Arc<Mutex<VecDeque<MatchInput>>>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, input: MatchInput) {
        match self.inputs.lock() {
            Ok(mut inputs) => inputs.push_back(input),
            Err(poisoned) => poisoned.into_inner().push_back(input),
        }
    }

    pub fn drain(&self) -> Vec<MatchInput> {
        match self.inputs.lock() {
            Ok(mut inputs) => inputs.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.lock().map(|inputs| inputs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
