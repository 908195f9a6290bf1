//! Error types
//!
//! Gameplay calls return [`Rejection`] and leave state untouched. Starting a
//! match returns [`StartRefusal`] naming the missing precondition. Loading
//! configuration returns [`ConfigError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::states::match_config::{ClassKind, Side};
use crate::states::play_match::EntityId;
use crate::states::MatchPhase;

/// A gameplay action that was refused. Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0} is not online")]
    NotOnline(EntityId),
    #[error("{0} is not a participant in this match")]
    NotParticipant(EntityId),
    #[error("not allowed during {0:?}")]
    WrongPhase(MatchPhase),
    #[error("{0} may not vote in this round")]
    NotEligible(EntityId),
    #[error("{0} has already voted")]
    AlreadyVoted(EntityId),
    #[error("choice is not on the ballot")]
    UnknownChoice,
    #[error("no vote is open")]
    VotingClosed,
    #[error("it is not {0}'s turn to pick")]
    NotYourTurn(EntityId),
    #[error("the draft is complete")]
    DraftComplete,
    #[error("{kind:?} is already taken on side {side:?} by {holder}")]
    ClassTaken {
        kind: ClassKind,
        side: Side,
        holder: EntityId,
    },
    #[error("{0:?} is banned for this match")]
    ClassBanned(ClassKind),
    #[error("no kit is registered for {0:?}")]
    UnknownClass(ClassKind),
    #[error("{0} has no class")]
    NoClass(EntityId),
    #[error("{0} has been eliminated")]
    Eliminated(EntityId),
    #[error("{0} is in a practice session")]
    InPractice(EntityId),
    #[error("{0} is not in a practice session")]
    NotPracticing(EntityId),
    #[error("{0} has no side")]
    NoSide(EntityId),
    #[error("no random team reassignment is on offer")]
    NoReassignmentOffer,
    #[error("unknown map slot '{0}'")]
    UnknownMap(String),
    #[error("map slot '{0}' already exists")]
    DuplicateMap(String),
    #[error("the layout store refused the write")]
    PersistFailed,
}

/// Reason a match could not leave Idle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartRefusal {
    #[error("a match is already running ({0:?})")]
    AlreadyRunning(MatchPhase),
    #[error("no lobby anchor is set")]
    NoLobby,
    #[error("no map slots are configured")]
    NoMaps,
    #[error("map slot '{0}' has no location")]
    MapWithoutLocation(String),
    #[error("map slot '{0}' has no spawn points")]
    MapWithoutSpawns(String),
    #[error("need at least {required} players online, have {present}")]
    NotEnoughPlayers { required: usize, present: usize },
    #[error("lobby teleport failed for every participant")]
    TeleportFailed,
}

/// Failure reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Ron {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize: {0}")]
    Serialize(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a headless run.
#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("match refused to start: {0}")]
    Start(#[from] StartRefusal),
    #[error("simulation stopped before the match ended")]
    Incomplete,
}
