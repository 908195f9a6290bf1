//! Match Flow
//!
//! [`MatchEngine`] owns every table and protocol of one match instance and
//! drives the phase machine:
//!
//! ```text
//! Idle -> LobbyGather -> MapVote -> ClassBanVote -> TeamOrDraftSelect (team) -> FreezeCountdown -> Active -> Ended
//!                        (skipped with one map)   \-> ClassSelect (solo) ----/
//! any phase but Ended --force_end--> Ended;  Ended --reset--> Idle
//! ```
//!
//! ## Tick order
//! 1. The match clock and the cooldown table move to `now`
//! 2. The scheduler advances and collects due tasks (no actions run yet)
//! 3. Queued inputs are applied in arrival order
//! 4. Due tasks are re-validated and dispatched: phase timers to the engine,
//!    kit tasks to the class registry
//!
//! Every transition happens inside the call that observed its trigger (the
//! last vote, the last draft pick, the elimination), so each fires exactly
//! once. Rejected calls return a [`Rejection`] and change nothing.

use bevy::prelude::Resource;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::combat::log::{CombatLog, CombatLogEventType, MatchSummary, ParticipantSummary};
use crate::combat::{EffectSink, NullSink, WorldSink};
use crate::error::{Rejection, StartRefusal};
use crate::settings::{ArenaLayout, LayoutStore, Location, MemoryLayoutStore};
use crate::states::draft::{DraftProgress, DraftProtocol};
use crate::states::inputs::{Ballot, InputQueue, MatchInput, MatchNotice};
use crate::states::match_config::{ClassKind, MatchMode, MatchSettings, Side};
use crate::states::teams::Teams;
use crate::states::voting::{VoteProgress, VotingProtocol};
use crate::states::MatchPhase;

use super::abilities::{AbilityId, AbilityOutcome, ResourceKind};
use super::ability_config::KitRegistry;
use super::class_registry::{AbilityTables, AssignOutcome, AssignmentMode, ClassAssignment, ClassAssignmentRegistry};
use super::components::{EntityId, GameRng};
use super::scheduler::{CancelView, CancelWhen, PhaseTimer, Repeat, TaskAction, TaskKey, TaskOwner, TaskSpec};
use super::win_conditions::{self, MatchOutcome};

const LOBBY_TIMER: &str = "lobby_gather";
const FREEZE_TIMER: &str = "freeze";
const COUNTDOWN_TIMER: &str = "countdown";
const RESET_TIMER: &str = "auto_reset";

/// What happened to an entity that came online.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// Nothing running; the entity will be in the next match.
    Lobby,
    /// Reconnected participant; the class was kept. Its tasks run again
    /// once combat is live.
    Restored,
    /// A match is running without this entity.
    Spectator,
    AlreadyOnline,
}

/// Current vote counts, for whichever round is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteTally {
    Closed,
    Map(Vec<(String, usize)>),
    Ban(Vec<(ClassKind, usize)>),
}

/// The state cancel conditions are checked against.
struct EngineView<'a> {
    phase: MatchPhase,
    online: &'a BTreeSet<EntityId>,
    registry: &'a ClassAssignmentRegistry,
    practice: &'a BTreeSet<EntityId>,
    eliminated: &'a BTreeSet<EntityId>,
}

impl CancelView for EngineView<'_> {
    fn is_online(&self, entity: EntityId) -> bool {
        self.online.contains(&entity)
    }

    fn assignment_generation(&self, entity: EntityId) -> Option<u64> {
        self.registry.generation(entity)
    }

    fn phase(&self) -> MatchPhase {
        self.phase
    }

    fn in_practice(&self, entity: EntityId) -> bool {
        self.practice.contains(&entity)
    }

    fn is_eliminated(&self, entity: EntityId) -> bool {
        self.phase.is_running() && self.eliminated.contains(&entity)
    }
}

#[derive(Resource)]
pub struct MatchEngine {
    settings: MatchSettings,
    layout: ArenaLayout,
    layout_store: Box<dyn LayoutStore>,
    effects: Box<dyn EffectSink>,
    world: Box<dyn WorldSink>,

    registry: ClassAssignmentRegistry,
    tables: AbilityTables,
    rng: GameRng,

    phase: MatchPhase,
    last_tick: Option<Duration>,

    online: BTreeSet<EntityId>,
    participants: BTreeSet<EntityId>,
    eliminated: BTreeSet<EntityId>,
    spectators: BTreeSet<EntityId>,
    practice: BTreeSet<EntityId>,
    /// Class each participant entered the match with
    lineup: BTreeMap<EntityId, ClassKind>,

    teams: Teams,
    map_vote: VotingProtocol<String>,
    ban_vote: VotingProtocol<ClassKind>,
    chosen_map: Option<String>,
    banned: Option<ClassKind>,
    draft: Option<DraftProtocol>,
    random_teams_offered: bool,

    combat_started: Option<Duration>,
    ended_at: Option<Duration>,
    outcome: Option<MatchOutcome>,

    inputs: InputQueue,
    notices: Vec<MatchNotice>,
    log: CombatLog,
}

impl MatchEngine {
    pub fn new(settings: MatchSettings, layout: ArenaLayout, kits: KitRegistry) -> Self {
        let rng = GameRng::from_optional_seed(settings.random_seed);
        Self {
            settings,
            layout,
            layout_store: Box::new(MemoryLayoutStore::new()),
            effects: Box::new(NullSink),
            world: Box::new(NullSink),
            registry: ClassAssignmentRegistry::new(kits),
            tables: AbilityTables::new(),
            rng,
            phase: MatchPhase::Idle,
            last_tick: None,
            online: BTreeSet::new(),
            participants: BTreeSet::new(),
            eliminated: BTreeSet::new(),
            spectators: BTreeSet::new(),
            practice: BTreeSet::new(),
            lineup: BTreeMap::new(),
            teams: Teams::new(),
            map_vote: VotingProtocol::new(),
            ban_vote: VotingProtocol::new(),
            chosen_map: None,
            banned: None,
            draft: None,
            random_teams_offered: false,
            combat_started: None,
            ended_at: None,
            outcome: None,
            inputs: InputQueue::new(),
            notices: Vec::new(),
            log: CombatLog::default(),
        }
    }

    pub fn with_effect_sink(mut self, sink: impl EffectSink + 'static) -> Self {
        self.effects = Box::new(sink);
        self
    }

    pub fn with_world_sink(mut self, sink: impl WorldSink + 'static) -> Self {
        self.world = Box::new(sink);
        self
    }

    pub fn with_layout_store(mut self, store: impl LayoutStore + 'static) -> Self {
        self.layout_store = Box::new(store);
        self
    }

    // ========================================================================
    // Tick & Inputs
    // ========================================================================

    /// Queue an input for the next tick.
    pub fn submit(&self, input: MatchInput) {
        self.inputs.push(input);
    }

    /// Handle for queueing inputs from elsewhere.
    pub fn input_queue(&self) -> InputQueue {
        self.inputs.clone()
    }

    /// Advance the match to `now`.
    ///
    /// # Panics
    /// If `now` is earlier than the previous tick.
    pub fn tick(&mut self, now: Duration) {
        let elapsed = match self.last_tick {
            Some(last) => {
                assert!(now >= last, "MatchEngine::tick went backwards: {:?} after {:?}", now, last);
                now - last
            }
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
        self.tables.cooldowns.advance_to(now);
        self.log.match_time = now.as_secs_f32();

        let due = {
            let view = EngineView {
                phase: self.phase,
                online: &self.online,
                registry: &self.registry,
                practice: &self.practice,
                eliminated: &self.eliminated,
            };
            self.tables.scheduler.tick(elapsed, &view)
        };

        for input in self.inputs.drain() {
            self.apply(input);
        }

        for fired in due {
            if !self.tables.scheduler.is_live(&fired, &self.view()) {
                continue;
            }
            match &fired.action {
                TaskAction::Phase(timer) => self.on_phase_timer(*timer),
                _ => self
                    .registry
                    .run_task(&fired, &mut self.tables, self.effects.as_mut()),
            }
            self.tables.scheduler.complete(&fired);
        }
    }

    fn view(&self) -> EngineView<'_> {
        EngineView {
            phase: self.phase,
            online: &self.online,
            registry: &self.registry,
            practice: &self.practice,
            eliminated: &self.eliminated,
        }
    }

    /// Apply one input now. Rejections become `InputRejected` notices.
    pub fn apply(&mut self, input: MatchInput) {
        let result: Result<(), Rejection> = match input.clone() {
            MatchInput::Join(entity) => {
                self.on_entity_join(entity);
                Ok(())
            }
            MatchInput::Leave(entity) => {
                self.on_entity_leave(entity);
                Ok(())
            }
            MatchInput::Eliminated(entity) => self.on_eliminated(entity),
            MatchInput::Assign { entity, kind } => self.request_assign(entity, kind).map(|_| ()),
            MatchInput::Clear(entity) => self.request_clear(entity).map(|_| ()),
            MatchInput::Vote { entity, ballot } => self.cast_vote(entity, ballot).map(|_| ()),
            MatchInput::DraftPick { entity, kind } => self.submit_draft_pick(entity, kind).map(|_| ()),
            MatchInput::ChooseSide { entity, side } => self.choose_side(entity, side),
            MatchInput::AcceptRandomTeams(entity) => self.accept_random_teams(entity),
            MatchInput::UseAbility {
                entity,
                ability,
                target,
            } => self.use_ability(entity, &ability, target).map(|outcome| {
                self.notices.push(MatchNotice::AbilityUsed {
                    entity,
                    ability,
                    outcome,
                });
            }),
            MatchInput::StartPractice { entity, kind } => self.start_practice(entity, kind).map(|_| ()),
            MatchInput::EndPractice(entity) => self.end_practice(entity),
            MatchInput::Start => {
                if let Err(refusal) = self.start() {
                    self.notices.push(MatchNotice::StartRefused(refusal));
                }
                Ok(())
            }
            MatchInput::ForceEnd { reason } => {
                if self.force_end(reason) {
                    Ok(())
                } else {
                    Err(Rejection::WrongPhase(self.phase))
                }
            }
            MatchInput::Reset => self.reset(),
        };

        if let Err(reason) = result {
            tracing::debug!(?input, %reason, "queued input rejected");
            self.notices.push(MatchNotice::InputRejected { input, reason });
        }
    }

    /// Take every notice produced since the last drain.
    pub fn drain_notices(&mut self) -> Vec<MatchNotice> {
        std::mem::take(&mut self.notices)
    }

    // ========================================================================
    // Connections & Eliminations
    // ========================================================================

    pub fn on_entity_join(&mut self, entity: EntityId) -> JoinStatus {
        if !self.online.insert(entity) {
            return JoinStatus::AlreadyOnline;
        }
        self.log.log(CombatLogEventType::Connection, format!("{} joined", entity));

        let returning = self.phase.is_in_arena()
            && self.participants.contains(&entity)
            && !self.eliminated.contains(&entity)
            && self
                .registry
                .get(entity)
                .is_some_and(|assignment| assignment.mode == AssignmentMode::Match);
        if returning {
            if self.phase == MatchPhase::Active {
                self.registry
                    .restore(entity, &mut self.tables, self.effects.as_mut());
            }
            self.notices.push(MatchNotice::ClassRestored(entity));
            tracing::info!(%entity, "participant reconnected, class restored");
            return JoinStatus::Restored;
        }

        if self.phase.is_running() {
            self.spectators.insert(entity);
            self.notices.push(MatchNotice::BecameSpectator(entity));
            tracing::info!(%entity, phase = ?self.phase, "joined as spectator");
            return JoinStatus::Spectator;
        }
        JoinStatus::Lobby
    }

    /// Returns false if the entity was not online.
    pub fn on_entity_leave(&mut self, entity: EntityId) -> bool {
        if !self.online.remove(&entity) {
            return false;
        }
        self.log.log(CombatLogEventType::Connection, format!("{} left", entity));
        self.spectators.remove(&entity);
        if self.practice.remove(&entity) {
            self.registry.teardown(entity, &mut self.tables);
        }

        if self.participants.contains(&entity) {
            if self.phase.is_pre_combat() {
                self.remove_participant(entity);
            } else if self.phase.is_in_arena() {
                // Still counts as standing; the class waits for a reconnect.
                let cancelled = self.tables.scheduler.cancel_owner(&TaskOwner::Entity(entity));
                tracing::info!(%entity, cancelled, "participant disconnected mid-match");
            }
        }
        true
    }

    pub fn on_eliminated(&mut self, entity: EntityId) -> Result<(), Rejection> {
        if self.phase != MatchPhase::Active {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if !self.participants.contains(&entity) {
            return Err(Rejection::NotParticipant(entity));
        }
        if !self.eliminated.insert(entity) {
            return Err(Rejection::Eliminated(entity));
        }

        self.registry.teardown(entity, &mut self.tables);
        self.notices.push(MatchNotice::Eliminated(entity));
        self.log.log(CombatLogEventType::Death, format!("{} was eliminated", entity));
        tracing::info!(%entity, standing = self.participants.len() - self.eliminated.len(), "participant eliminated");

        if let Some(outcome) =
            win_conditions::evaluate(self.settings.mode, &self.participants, &self.eliminated, &self.teams)
        {
            self.end_match(outcome);
        }
        Ok(())
    }

    fn remove_participant(&mut self, entity: EntityId) {
        self.participants.remove(&entity);
        self.lineup.remove(&entity);
        self.registry.teardown(entity, &mut self.tables);
        self.teams.remove(entity);

        if self.roster_too_small() {
            self.end_match(MatchOutcome::Aborted {
                reason: "not enough participants left".to_string(),
            });
            return;
        }

        match self.phase {
            MatchPhase::MapVote => {
                if let Some(result) = self.map_vote.remove_eligible(entity, &mut self.rng) {
                    self.choose_map(result.winner, result.tie_broken);
                }
            }
            MatchPhase::ClassBanVote => {
                if let Some(result) = self.ban_vote.remove_eligible(entity, &mut self.rng) {
                    self.ban_class(result.winner, result.tie_broken);
                }
            }
            MatchPhase::TeamOrDraftSelect => match self.draft.as_mut() {
                Some(draft) => {
                    let progress = draft.remove_entity(entity);
                    if !self.teams.is_balanced() {
                        self.roll_back_teams();
                    } else if progress == DraftProgress::Complete {
                        self.enter_freeze();
                    } else {
                        self.announce_draft_turn();
                    }
                }
                None => self.check_sides_complete(),
            },
            MatchPhase::ClassSelect => self.check_selection_complete(),
            _ => {}
        }
    }

    fn roster_too_small(&self) -> bool {
        self.participants.len() < self.settings.mode.min_players().max(1)
    }

    // ========================================================================
    // Start / End / Reset
    // ========================================================================

    /// Leave Idle. On refusal nothing changes.
    pub fn start(&mut self) -> Result<(), StartRefusal> {
        if self.phase != MatchPhase::Idle {
            return Err(StartRefusal::AlreadyRunning(self.phase));
        }
        let refusal = self.start_refusal();
        if let Some(refusal) = refusal {
            tracing::warn!(%refusal, "match start refused");
            return Err(refusal);
        }
        let Some(lobby) = self.layout.lobby.clone() else {
            return Err(StartRefusal::NoLobby);
        };

        let roster: Vec<EntityId> = self.online.iter().copied().collect();
        let placed = roster
            .iter()
            .filter(|entity| self.world.place(**entity, &lobby))
            .count();
        if placed == 0 {
            tracing::warn!("lobby teleport failed for every participant");
            return Err(StartRefusal::TeleportFailed);
        }

        for entity in std::mem::take(&mut self.practice) {
            self.registry.teardown(entity, &mut self.tables);
        }
        self.clear_match_state();
        self.participants = roster.iter().copied().collect();
        self.log.clear();
        self.log.log(
            CombatLogEventType::MatchEvent,
            format!("Match started with {} participants ({:?})", roster.len(), self.settings.mode),
        );
        tracing::info!(participants = roster.len(), mode = ?self.settings.mode, placed, "match starting");

        self.set_phase(MatchPhase::LobbyGather);
        self.schedule_phase_timer(LOBBY_TIMER, self.settings.lobby_gather(), None, PhaseTimer::LobbyGatherDone);
        Ok(())
    }

    fn start_refusal(&self) -> Option<StartRefusal> {
        if let Err(refusal) = self.layout.check() {
            return Some(refusal);
        }
        let required = self.settings.mode.min_players();
        let present = self.online.len();
        if present < required {
            return Some(StartRefusal::NotEnoughPlayers { required, present });
        }
        None
    }

    /// End the match from any phase except Ended. Returns false if already ended.
    pub fn force_end(&mut self, reason: impl Into<String>) -> bool {
        if self.phase == MatchPhase::Ended {
            return false;
        }
        let reason = reason.into();
        tracing::warn!(phase = ?self.phase, %reason, "match force-ended");
        self.end_match(MatchOutcome::Aborted { reason });
        true
    }

    /// `Ended -> Idle`.
    pub fn reset(&mut self) -> Result<(), Rejection> {
        if self.phase != MatchPhase::Ended {
            return Err(Rejection::WrongPhase(self.phase));
        }
        self.reset_to_idle();
        Ok(())
    }

    fn end_match(&mut self, outcome: MatchOutcome) {
        self.ended_at = Some(self.clock());
        self.outcome = Some(outcome.clone());
        self.set_phase(MatchPhase::Ended);

        self.map_vote.close();
        self.ban_vote.close();
        self.draft = None;
        self.random_teams_offered = false;
        self.tables.scheduler.cancel_owner(&TaskOwner::Match);
        let torn_down = self
            .registry
            .clear_mode(AssignmentMode::Match, &mut self.tables);

        if let Some(lobby) = self.layout.lobby.clone() {
            let returning: Vec<EntityId> = self.participants.intersection(&self.online).copied().collect();
            for entity in returning {
                self.world.place(entity, &lobby);
            }
        }

        self.log.log(CombatLogEventType::MatchEvent, format!("Match ended: {:?}", outcome));
        tracing::info!(?outcome, classes_cleared = torn_down.len(), "match ended");
        self.notices.push(MatchNotice::MatchEnded(outcome));

        if let Some(delay) = self.settings.auto_reset() {
            self.schedule_phase_timer(RESET_TIMER, delay, None, PhaseTimer::AutoReset);
        }
    }

    fn reset_to_idle(&mut self) {
        self.tables.scheduler.cancel_owner(&TaskOwner::Match);
        self.registry.clear_mode(AssignmentMode::Match, &mut self.tables);
        self.clear_match_state();
        self.set_phase(MatchPhase::Idle);
    }

    fn clear_match_state(&mut self) {
        self.participants.clear();
        self.eliminated.clear();
        self.spectators.clear();
        self.lineup.clear();
        self.teams.clear();
        self.map_vote.close();
        self.ban_vote.close();
        self.chosen_map = None;
        self.banned = None;
        self.draft = None;
        self.random_teams_offered = false;
        self.combat_started = None;
        self.ended_at = None;
        self.outcome = None;
    }

    fn set_phase(&mut self, to: MatchPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        tracing::info!(?from, ?to, "match phase changed");
        self.log.log(CombatLogEventType::Phase, format!("{:?} -> {:?}", from, to));
        self.notices.push(MatchNotice::PhaseChanged { from, to });
    }

    /// Register a match timer that dies when the current phase is left.
    fn schedule_phase_timer(&mut self, name: &str, delay: Duration, period: Option<Duration>, timer: PhaseTimer) {
        let key = TaskKey::match_timer(name);
        let action = TaskAction::Phase(timer);
        let spec = match period {
            Some(period) => TaskSpec::every(key, delay, period, action),
            None => TaskSpec::once(key, delay, action),
        };
        self.tables
            .scheduler
            .schedule(spec.cancel_when(CancelWhen::PhaseLeft(self.phase)));
    }

    fn on_phase_timer(&mut self, timer: PhaseTimer) {
        match (timer, self.phase) {
            (PhaseTimer::LobbyGatherDone, MatchPhase::LobbyGather) => self.open_map_vote(),
            (PhaseTimer::CountdownTick, MatchPhase::FreezeCountdown) => {
                let left = self
                    .tables
                    .scheduler
                    .remaining(&TaskKey::match_timer(FREEZE_TIMER))
                    .unwrap_or_default();
                let seconds_left = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                self.notices.push(MatchNotice::CountdownTick { seconds_left });
            }
            (PhaseTimer::FreezeDone, MatchPhase::FreezeCountdown) => self.enter_active(),
            (PhaseTimer::AutoReset, MatchPhase::Ended) => self.reset_to_idle(),
            (timer, phase) => {
                tracing::debug!(?timer, ?phase, "phase timer fired outside its phase");
            }
        }
    }

    // ========================================================================
    // Voting
    // ========================================================================

    fn open_map_vote(&mut self) {
        let maps = self.layout.map_names();
        if let [only] = maps.as_slice() {
            let only = only.clone();
            tracing::info!(map = %only, "single map configured, skipping map vote");
            self.choose_map(only, false);
            return;
        }
        self.set_phase(MatchPhase::MapVote);
        self.map_vote.open(self.participants.iter().copied(), maps);
    }

    fn choose_map(&mut self, map: String, tie_broken: bool) {
        self.log.log(CombatLogEventType::Vote, format!("Map chosen: {}", map));
        self.notices.push(MatchNotice::MapChosen {
            map: map.clone(),
            tie_broken,
        });
        self.chosen_map = Some(map);
        self.open_ban_vote();
    }

    fn open_ban_vote(&mut self) {
        self.set_phase(MatchPhase::ClassBanVote);
        let options = self.registry.kits().kinds();
        if options.is_empty() {
            tracing::warn!("no class kits registered, skipping ban vote");
            self.enter_selection();
            return;
        }
        self.ban_vote.open(self.participants.iter().copied(), options);
    }

    fn ban_class(&mut self, kind: ClassKind, tie_broken: bool) {
        self.log.log(CombatLogEventType::Vote, format!("Class banned: {}", kind.name()));
        self.notices.push(MatchNotice::ClassBanned { kind, tie_broken });
        self.banned = Some(kind);
        self.enter_selection();
    }

    /// Vote in the open round. Returns true if this vote completed the round.
    pub fn cast_vote(&mut self, entity: EntityId, ballot: Ballot) -> Result<bool, Rejection> {
        self.require_online(entity)?;
        match (self.phase, ballot) {
            (MatchPhase::MapVote, Ballot::Map(map)) => match self.map_vote.cast_vote(entity, map, &mut self.rng)? {
                VoteProgress::Complete(result) => {
                    self.choose_map(result.winner, result.tie_broken);
                    Ok(true)
                }
                VoteProgress::Pending { .. } => Ok(false),
            },
            (MatchPhase::ClassBanVote, Ballot::Ban(kind)) => match self.ban_vote.cast_vote(entity, kind, &mut self.rng)? {
                VoteProgress::Complete(result) => {
                    self.ban_class(result.winner, result.tie_broken);
                    Ok(true)
                }
                VoteProgress::Pending { .. } => Ok(false),
            },
            (MatchPhase::MapVote | MatchPhase::ClassBanVote, _) => Err(Rejection::UnknownChoice),
            (phase, _) => Err(Rejection::WrongPhase(phase)),
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    fn enter_selection(&mut self) {
        match self.settings.mode {
            MatchMode::Team => {
                self.teams.clear();
                self.draft = None;
                self.random_teams_offered = false;
                self.set_phase(MatchPhase::TeamOrDraftSelect);
            }
            MatchMode::Solo => self.set_phase(MatchPhase::ClassSelect),
        }
    }

    /// Pick a class. Participants do this in ClassSelect; entities in a
    /// practice session may do it at any time.
    pub fn request_assign(&mut self, entity: EntityId, kind: ClassKind) -> Result<AssignOutcome, Rejection> {
        self.require_online(entity)?;
        if self.practice.contains(&entity) {
            return self.registry.assign(
                entity,
                kind,
                AssignmentMode::Practice,
                &mut self.tables,
                self.effects.as_mut(),
            );
        }
        if self.phase != MatchPhase::ClassSelect {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if !self.participants.contains(&entity) {
            return Err(Rejection::NotParticipant(entity));
        }
        if self.banned == Some(kind) {
            return Err(Rejection::ClassBanned(kind));
        }

        let outcome = self.registry.assign(
            entity,
            kind,
            AssignmentMode::Match,
            &mut self.tables,
            self.effects.as_mut(),
        )?;
        // Class timers start with combat.
        self.registry.disarm(entity, &mut self.tables);
        self.lineup.insert(entity, kind);
        self.log.log(
            CombatLogEventType::ClassChange,
            format!("{} selected {}", entity, kind.name()),
        );
        self.check_selection_complete();
        Ok(outcome)
    }

    /// Drop a class. Returns whether one was removed.
    pub fn request_clear(&mut self, entity: EntityId) -> Result<bool, Rejection> {
        self.require_online(entity)?;
        if self.practice.contains(&entity) {
            return Ok(self.registry.clear(entity, &mut self.tables));
        }
        if self.phase != MatchPhase::ClassSelect {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if !self.participants.contains(&entity) {
            return Err(Rejection::NotParticipant(entity));
        }
        self.lineup.remove(&entity);
        Ok(self.registry.clear(entity, &mut self.tables))
    }

    fn check_selection_complete(&mut self) {
        if self.phase != MatchPhase::ClassSelect {
            return;
        }
        let everyone_ready = self.participants.iter().all(|entity| {
            self.registry
                .get(*entity)
                .is_some_and(|assignment| assignment.mode == AssignmentMode::Match)
        });
        if everyone_ready {
            self.enter_freeze();
        }
    }

    /// Team mode: join a side before the draft.
    pub fn choose_side(&mut self, entity: EntityId, side: Side) -> Result<(), Rejection> {
        self.require_participant(entity)?;
        if self.phase != MatchPhase::TeamOrDraftSelect || self.draft.is_some() {
            return Err(Rejection::WrongPhase(self.phase));
        }
        self.teams.choose(entity, side);
        tracing::debug!(%entity, ?side, "side chosen");
        self.check_sides_complete();
        Ok(())
    }

    /// Team mode: take the random reassignment offered after a rollback.
    pub fn accept_random_teams(&mut self, entity: EntityId) -> Result<(), Rejection> {
        self.require_participant(entity)?;
        if self.phase != MatchPhase::TeamOrDraftSelect || self.draft.is_some() {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if !self.random_teams_offered {
            return Err(Rejection::NoReassignmentOffer);
        }
        let roster: Vec<EntityId> = self.participants.iter().copied().collect();
        self.teams.random_split(&roster, &mut self.rng);
        self.random_teams_offered = false;
        tracing::info!(%entity, "random teams accepted");
        if self.teams.is_balanced() {
            self.start_draft();
        } else {
            self.roll_back_teams();
        }
        Ok(())
    }

    fn check_sides_complete(&mut self) {
        let roster: Vec<EntityId> = self.participants.iter().copied().collect();
        if !self.teams.unassigned(&roster).is_empty() {
            return;
        }
        if self.teams.is_balanced() {
            self.start_draft();
        } else {
            self.roll_back_teams();
        }
    }

    fn roll_back_teams(&mut self) {
        self.draft = None;
        self.teams.clear();
        for entity in self.registry.clear_mode(AssignmentMode::Match, &mut self.tables) {
            self.lineup.remove(&entity);
        }
        self.random_teams_offered = true;
        tracing::info!("side selection rolled back, random reassignment offered");
        self.log.log(
            CombatLogEventType::MatchEvent,
            "Teams unbalanced, side selection restarted".to_string(),
        );
        self.notices.push(MatchNotice::TeamsRolledBack);
        self.notices.push(MatchNotice::RandomTeamsOffered);
    }

    fn start_draft(&mut self) {
        let first = if self.rng.coin_flip() { Side::A } else { Side::B };
        let banned: Vec<ClassKind> = self.banned.into_iter().collect();
        let draft = DraftProtocol::new(
            &self.teams.members(Side::A),
            &self.teams.members(Side::B),
            first,
            &banned,
        );
        match draft {
            Some(draft) => {
                tracing::info!(?first, turns = draft.turn_order().len(), "draft started");
                self.draft = Some(draft);
                self.announce_draft_turn();
            }
            None => self.roll_back_teams(),
        }
    }

    fn announce_draft_turn(&mut self) {
        let Some(draft) = self.draft.as_ref() else {
            return;
        };
        if let (Some(entity), Some(side)) = (draft.current_picker(), draft.current_side()) {
            self.notices.push(MatchNotice::DraftTurn { entity, side });
        }
    }

    pub fn submit_draft_pick(&mut self, entity: EntityId, kind: ClassKind) -> Result<DraftProgress, Rejection> {
        self.require_participant(entity)?;
        if self.phase != MatchPhase::TeamOrDraftSelect {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if !self.registry.kits().contains(kind) {
            return Err(Rejection::UnknownClass(kind));
        }
        let Some(draft) = self.draft.as_mut() else {
            return Err(Rejection::WrongPhase(self.phase));
        };
        if draft.current_picker() == Some(entity) {
            if let Some(side) = self.teams.side_of(entity) {
                if let Some(holder) = self.registry.is_kind_taken_on_side(kind, side, &self.teams) {
                    return Err(Rejection::ClassTaken { kind, side, holder });
                }
            }
        }
        let progress = draft.submit_pick(entity, kind)?;

        if let Err(reason) = self.registry.assign(
            entity,
            kind,
            AssignmentMode::Match,
            &mut self.tables,
            self.effects.as_mut(),
        ) {
            tracing::warn!(%entity, %reason, "drafted class could not be assigned");
        }
        self.registry.disarm(entity, &mut self.tables);
        self.lineup.insert(entity, kind);
        self.log.log(
            CombatLogEventType::Draft,
            format!("{} drafted {}", entity, kind.name()),
        );

        match progress {
            DraftProgress::Next(_) => self.announce_draft_turn(),
            DraftProgress::Complete => self.enter_freeze(),
        }
        Ok(progress)
    }

    // ========================================================================
    // Freeze & Combat
    // ========================================================================

    fn enter_freeze(&mut self) {
        self.set_phase(MatchPhase::FreezeCountdown);
        self.place_at_spawns();

        let freeze = self.settings.freeze();
        if freeze.is_zero() {
            self.enter_active();
            return;
        }
        self.schedule_phase_timer(FREEZE_TIMER, freeze, None, PhaseTimer::FreezeDone);
        let second = Duration::from_secs(1);
        self.schedule_phase_timer(COUNTDOWN_TIMER, second, Some(second), PhaseTimer::CountdownTick);
        let seconds_left = freeze.as_secs() + u64::from(freeze.subsec_nanos() > 0);
        self.notices.push(MatchNotice::CountdownTick { seconds_left });
    }

    fn place_at_spawns(&mut self) {
        let spawns: Vec<Location> = self
            .chosen_map
            .as_deref()
            .and_then(|name| self.layout.map(name))
            .map(|map| map.spawns.clone())
            .unwrap_or_default();
        if spawns.is_empty() {
            tracing::warn!(map = ?self.chosen_map, "no spawn points to place participants at");
            return;
        }
        let roster: Vec<EntityId> = self.participants.intersection(&self.online).copied().collect();
        for (i, entity) in roster.into_iter().enumerate() {
            let spawn = &spawns[i % spawns.len()];
            if !self.world.place(entity, spawn) {
                tracing::warn!(%entity, "failed to place participant at spawn");
            }
        }
    }

    fn enter_active(&mut self) {
        self.combat_started = Some(self.clock());
        self.set_phase(MatchPhase::Active);
        self.log.log(CombatLogEventType::MatchEvent, "Gates open! Combat begins!".to_string());

        // Departures during selection can leave the result already decided.
        if let Some(outcome) =
            win_conditions::evaluate(self.settings.mode, &self.participants, &self.eliminated, &self.teams)
        {
            tracing::info!(?outcome, "match decided before combat");
            self.end_match(outcome);
            return;
        }

        let armed: Vec<EntityId> = self.participants.intersection(&self.online).copied().collect();
        for entity in armed {
            let in_match = self
                .registry
                .get(entity)
                .is_some_and(|assignment| assignment.mode == AssignmentMode::Match);
            if in_match {
                self.registry
                    .restore(entity, &mut self.tables, self.effects.as_mut());
            }
        }
    }

    pub fn use_ability(
        &mut self,
        entity: EntityId,
        ability: &AbilityId,
        target: Option<EntityId>,
    ) -> Result<AbilityOutcome, Rejection> {
        self.require_online(entity)?;
        if !self.practice.contains(&entity) {
            if self.phase != MatchPhase::Active {
                return Err(Rejection::WrongPhase(self.phase));
            }
            if !self.participants.contains(&entity) {
                return Err(Rejection::NotParticipant(entity));
            }
            if self.eliminated.contains(&entity) {
                return Err(Rejection::Eliminated(entity));
            }
        }
        let outcome = self.registry.use_ability(
            entity,
            ability,
            target,
            &mut self.tables,
            self.effects.as_mut(),
        )?;
        if outcome.is_used() {
            let message = match target {
                Some(target) => format!("{} used {} on {}", entity, ability, target),
                None => format!("{} used {}", entity, ability),
            };
            self.log.log(CombatLogEventType::AbilityUsed, message);
        }
        Ok(outcome)
    }

    // ========================================================================
    // Practice
    // ========================================================================

    /// Give an entity a private class outside the shared match.
    pub fn start_practice(&mut self, entity: EntityId, kind: ClassKind) -> Result<AssignOutcome, Rejection> {
        self.require_online(entity)?;
        if self.phase.is_running() && self.participants.contains(&entity) {
            return Err(Rejection::WrongPhase(self.phase));
        }
        if self.practice.contains(&entity) {
            return Err(Rejection::InPractice(entity));
        }
        self.practice.insert(entity);
        match self.registry.assign(
            entity,
            kind,
            AssignmentMode::Practice,
            &mut self.tables,
            self.effects.as_mut(),
        ) {
            Ok(outcome) => {
                tracing::info!(%entity, class = ?kind, "practice started");
                Ok(outcome)
            }
            Err(reason) => {
                self.practice.remove(&entity);
                Err(reason)
            }
        }
    }

    pub fn end_practice(&mut self, entity: EntityId) -> Result<(), Rejection> {
        if !self.practice.remove(&entity) {
            return Err(Rejection::NotPracticing(entity));
        }
        self.registry.teardown(entity, &mut self.tables);
        tracing::info!(%entity, "practice ended");
        Ok(())
    }

    // ========================================================================
    // Layout Editing
    // ========================================================================

    fn edit_layout(&mut self, edit: impl FnOnce(&mut ArenaLayout) -> Result<(), Rejection>) -> Result<(), Rejection> {
        if self.phase != MatchPhase::Idle {
            return Err(Rejection::WrongPhase(self.phase));
        }
        let mut next = self.layout.clone();
        edit(&mut next)?;
        if !self.layout_store.save(&next) {
            return Err(Rejection::PersistFailed);
        }
        self.layout = next;
        Ok(())
    }

    pub fn set_lobby(&mut self, at: Location) -> Result<(), Rejection> {
        self.edit_layout(|layout| {
            layout.set_lobby(at);
            Ok(())
        })
    }

    pub fn add_map(&mut self, name: &str) -> Result<(), Rejection> {
        self.edit_layout(|layout| layout.add_map(name))
    }

    pub fn remove_map(&mut self, name: &str) -> Result<(), Rejection> {
        self.edit_layout(|layout| layout.remove_map(name).map(|_| ()))
    }

    pub fn set_map_location(&mut self, name: &str, at: Location) -> Result<(), Rejection> {
        self.edit_layout(|layout| layout.set_map_location(name, at))
    }

    pub fn add_map_spawn(&mut self, name: &str, at: Location) -> Result<(), Rejection> {
        self.edit_layout(|layout| layout.add_map_spawn(name, at))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn require_online(&self, entity: EntityId) -> Result<(), Rejection> {
        if self.online.contains(&entity) {
            Ok(())
        } else {
            Err(Rejection::NotOnline(entity))
        }
    }

    fn require_participant(&self, entity: EntityId) -> Result<(), Rejection> {
        self.require_online(entity)?;
        if self.participants.contains(&entity) {
            Ok(())
        } else {
            Err(Rejection::NotParticipant(entity))
        }
    }

    pub fn current_phase(&self) -> MatchPhase {
        self.phase
    }

    /// Cooldown left on `ability` for `entity`, given its length.
    pub fn remaining(&self, entity: EntityId, ability: &AbilityId, duration: Duration) -> Duration {
        self.tables.cooldowns.remaining(entity, ability, duration)
    }

    pub fn resource_count(&self, entity: EntityId, kind: &ResourceKind) -> u32 {
        self.tables.resources.count(entity, kind)
    }

    pub fn current_picker(&self) -> Option<EntityId> {
        self.draft.as_ref().and_then(|draft| draft.current_picker())
    }

    pub fn vote_tally(&self) -> VoteTally {
        match self.phase {
            MatchPhase::MapVote => VoteTally::Map(self.map_vote.tally()),
            MatchPhase::ClassBanVote => VoteTally::Ban(self.ban_vote.tally()),
            _ => VoteTally::Closed,
        }
    }

    pub fn assignment(&self, entity: EntityId) -> Option<&ClassAssignment> {
        self.registry.get(entity)
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn participants(&self) -> &BTreeSet<EntityId> {
        &self.participants
    }

    pub fn is_online(&self, entity: EntityId) -> bool {
        self.online.contains(&entity)
    }

    pub fn is_spectator(&self, entity: EntityId) -> bool {
        self.spectators.contains(&entity)
    }

    pub fn is_eliminated(&self, entity: EntityId) -> bool {
        self.eliminated.contains(&entity)
    }

    pub fn is_practicing(&self, entity: EntityId) -> bool {
        self.practice.contains(&entity)
    }

    pub fn random_teams_offered(&self) -> bool {
        self.random_teams_offered
    }

    pub fn chosen_map(&self) -> Option<&str> {
        self.chosen_map.as_deref()
    }

    pub fn banned_class(&self) -> Option<ClassKind> {
        self.banned
    }

    pub fn teams(&self) -> &Teams {
        &self.teams
    }

    pub fn draft(&self) -> Option<&DraftProtocol> {
        self.draft.as_ref()
    }

    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn kits(&self) -> &KitRegistry {
        self.registry.kits()
    }

    /// Tasks currently registered for `owner`.
    pub fn scheduled_tasks(&self, owner: &TaskOwner) -> usize {
        self.tables.scheduler.tasks_for(owner)
    }

    /// Time of the last tick.
    pub fn clock(&self) -> Duration {
        self.last_tick.unwrap_or_default()
    }

    pub fn combat_log(&self) -> &CombatLog {
        &self.log
    }

    /// Summary of the current (or just finished) match.
    pub fn summary(&self) -> MatchSummary {
        let duration = match self.combat_started {
            Some(start) => self.ended_at.unwrap_or_else(|| self.clock()).saturating_sub(start),
            None => Duration::ZERO,
        };
        MatchSummary {
            map: self.chosen_map.clone(),
            banned_class: self.banned.map(|kind| kind.name().to_string()),
            outcome: self.outcome.clone(),
            duration_secs: duration.as_secs_f32(),
            random_seed: self.rng.seed,
            participants: self
                .participants
                .iter()
                .map(|entity| ParticipantSummary {
                    entity: *entity,
                    class_name: self.lineup.get(entity).map(|kind| kind.name().to_string()),
                    side: self.teams.side_of(*entity).map(|side| format!("{:?}", side)),
                    eliminated: self.eliminated.contains(entity),
                })
                .collect(),
        }
    }
}
