//! Headless match execution
//!
//! Runs a whole match (lobby, votes, selection, combat) with scripted bots.
//! A small health model stands in for the host world: it receives the
//! engine's effects, tracks health and reports eliminations back as inputs.
//! Time is simulated, so a match runs as fast as the CPU allows and the same
//! seed always produces the same match.

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::combat::{Effect, EffectKind, EffectSink, EffectTarget, WorldSink};
use crate::error::HeadlessError;
use crate::settings::Location;
use crate::states::inputs::{Ballot, MatchInput, MatchNotice};
use crate::states::match_config::{ClassKind, MatchMode, Side};
use crate::states::play_match::systems::MatchHostSet;
use crate::states::play_match::{AbilityShape, EntityId, KitRegistry, MatchEngine, MatchHostPlugin, MatchOutcome};
use crate::states::teams::Teams;
use crate::states::MatchPhase;

use super::config::{BotConfig, HeadlessMatchConfig};

/// Health every fighter starts with.
pub const MAX_HEALTH: u32 = 100;

/// Result of a completed headless match
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub outcome: MatchOutcome,
    /// Names of the winning player or side (empty for a draw or abort)
    pub winners: Vec<String>,
    /// Combat duration in seconds (from gates opening to match end)
    pub match_time: f32,
    pub map: Option<String>,
    pub banned_class: Option<String>,
    pub players: Vec<PlayerResult>,
    /// Random seed used (if deterministic mode)
    pub random_seed: Option<u64>,
    /// Where the combat log was written
    pub log_path: PathBuf,
}

/// Statistics for a single bot after the match
#[derive(Debug, Clone)]
pub struct PlayerResult {
    pub name: String,
    pub entity: EntityId,
    pub class_name: Option<String>,
    pub side: Option<Side>,
    pub final_health: u32,
    pub survived: bool,
    pub damage_dealt: u32,
    pub damage_taken: u32,
    pub healing_done: u32,
}

// ============================================================================
// Health Model
// ============================================================================

#[derive(Debug, Clone)]
struct Fighter {
    health: u32,
    shield: u32,
    alive: bool,
    position: Option<Location>,
    side: Option<Side>,
    damage_dealt: u32,
    damage_taken: u32,
    healing_done: u32,
}

impl Fighter {
    fn new() -> Self {
        Self {
            health: MAX_HEALTH,
            shield: 0,
            alive: true,
            position: None,
            side: None,
            damage_dealt: 0,
            damage_taken: 0,
            healing_done: 0,
        }
    }
}

#[derive(Debug, Default)]
struct ArenaState {
    fighters: BTreeMap<EntityId, Fighter>,
    /// Fighters that dropped to zero and have not been reported yet
    deaths: Vec<EntityId>,
}

fn distance(a: &Location, b: &Location) -> f64 {
    if a.world != b.world {
        return f64::INFINITY;
    }
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2) + (a.z - b.z).powi(2)).sqrt()
}

impl ArenaState {
    fn targets(&self, effect: &Effect) -> Vec<EntityId> {
        match effect.target {
            EffectTarget::Entity(entity) => vec![entity],
            EffectTarget::Area { origin, radius } => {
                let Some(centre) = self.fighters.get(&origin).and_then(|f| f.position.as_ref()) else {
                    return Vec::new();
                };
                let friendly = effect.kind.is_beneficial();
                let source_side = self.fighters.get(&effect.source).and_then(|f| f.side);
                self.fighters
                    .iter()
                    .filter(|(_, fighter)| fighter.alive)
                    .filter(|(_, fighter)| {
                        fighter
                            .position
                            .as_ref()
                            .is_some_and(|at| distance(at, centre) <= f64::from(radius))
                    })
                    .filter(|(id, fighter)| {
                        let ally = **id == effect.source || (source_side.is_some() && fighter.side == source_side);
                        ally == friendly
                    })
                    .map(|(id, _)| *id)
                    .collect()
            }
        }
    }

    fn apply(&mut self, effect: &Effect) -> bool {
        let targets = self.targets(effect);
        let mut landed = false;
        for target in targets {
            let Some(fighter) = self.fighters.get_mut(&target).filter(|f| f.alive) else {
                continue;
            };
            landed = true;
            let mut dealt = 0;
            let mut healed = 0;
            match effect.kind {
                EffectKind::Damage => {
                    let absorbed = fighter.shield.min(effect.magnitude);
                    fighter.shield -= absorbed;
                    dealt = (effect.magnitude - absorbed).min(fighter.health);
                    fighter.health -= dealt;
                    fighter.damage_taken += dealt;
                    if fighter.health == 0 {
                        fighter.alive = false;
                        self.deaths.push(target);
                    }
                }
                EffectKind::Heal => {
                    healed = effect.magnitude.min(MAX_HEALTH - fighter.health);
                    fighter.health += healed;
                }
                EffectKind::Shield => fighter.shield += effect.magnitude,
                // No movement or stat model
                EffectKind::Stun | EffectKind::Slow | EffectKind::Empower => {}
            }
            if let Some(source) = self.fighters.get_mut(&effect.source) {
                source.damage_dealt += dealt;
                source.healing_done += healed;
            }
        }
        landed
    }
}

/// Shared health model. Clones share state: one clone is the engine's
/// effect sink, one its world sink, and the runner keeps a third.
#[derive(Debug, Clone, Default)]
pub struct ArenaSim {
    state: Arc<Mutex<ArenaState>>,
}

impl ArenaSim {
    pub fn new(entities: &[EntityId]) -> Self {
        let fighters = entities.iter().map(|entity| (*entity, Fighter::new())).collect();
        Self {
            state: Arc::new(Mutex::new(ArenaState {
                fighters,
                deaths: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArenaState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Copy side membership so area effects can tell friend from foe.
    pub fn set_sides(&self, teams: &Teams) {
        let mut state = self.lock();
        for (entity, fighter) in state.fighters.iter_mut() {
            fighter.side = teams.side_of(*entity);
        }
    }

    pub fn take_deaths(&self) -> Vec<EntityId> {
        std::mem::take(&mut self.lock().deaths)
    }

    pub fn health(&self, entity: EntityId) -> Option<u32> {
        self.lock().fighters.get(&entity).map(|f| f.health)
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.lock().fighters.get(&entity).is_some_and(|f| f.alive)
    }

    pub fn position(&self, entity: EntityId) -> Option<Location> {
        self.lock().fighters.get(&entity).and_then(|f| f.position.clone())
    }
}

impl EffectSink for ArenaSim {
    fn apply(&mut self, effect: &Effect) -> bool {
        self.lock().apply(effect)
    }
}

impl WorldSink for ArenaSim {
    fn place(&mut self, entity: EntityId, at: &Location) -> bool {
        let mut state = self.lock();
        let fighter = state.fighters.entry(entity).or_insert_with(Fighter::new);
        fighter.position = Some(at.clone());
        true
    }
}

// ============================================================================
// Bots
// ============================================================================

#[derive(Debug, Clone)]
struct Bot {
    entity: EntityId,
    config: BotConfig,
    /// Parsed class preferences
    classes: Vec<ClassKind>,
}

impl Bot {
    /// First preferred class that is allowed, then any allowed kit.
    fn pick_class(&self, kits: &KitRegistry, allowed: impl Fn(ClassKind) -> bool) -> Option<ClassKind> {
        self.classes
            .iter()
            .copied()
            .chain(kits.kinds())
            .find(|kind| kits.contains(*kind) && allowed(*kind))
    }

    fn ban_choice(&self, kits: &KitRegistry) -> Option<ClassKind> {
        self.config
            .ban_vote
            .as_deref()
            .and_then(ClassKind::from_name)
            .or_else(|| kits.kinds().into_iter().find(|kind| !self.classes.contains(kind)))
            .or_else(|| kits.kinds().first().copied())
    }
}

type ResultSlot = Arc<Mutex<Option<Result<MatchResult, HeadlessError>>>>;

/// Resource to track headless match state
#[derive(Resource)]
pub struct HeadlessMatchState {
    bots: Vec<Bot>,
    arena: ArenaSim,
    /// Simulated time before the match is force-ended
    max_duration: Duration,
    output_path: Option<String>,
    started: bool,
    timed_out: bool,
    match_complete: bool,
    result: ResultSlot,
}

impl HeadlessMatchState {
    fn bot(&self, entity: EntityId) -> Option<&Bot> {
        self.bots.iter().find(|bot| bot.entity == entity)
    }

    fn finish(&mut self, result: Result<MatchResult, HeadlessError>) {
        if let Ok(mut slot) = self.result.lock() {
            *slot = Some(result);
        }
        self.match_complete = true;
    }
}

/// Plugin for headless match execution
pub struct HeadlessPlugin {
    pub config: HeadlessMatchConfig,
    pub arena: ArenaSim,
    result: ResultSlot,
}

impl Plugin for HeadlessPlugin {
    fn build(&self, app: &mut App) {
        let bots = self
            .config
            .players
            .iter()
            .enumerate()
            .map(|(i, player)| Bot {
                entity: EntityId(i as u64 + 1),
                config: player.clone(),
                classes: player
                    .classes
                    .iter()
                    .filter_map(|name| ClassKind::from_name(name))
                    .collect(),
            })
            .collect();

        app.insert_resource(HeadlessMatchState {
            bots,
            arena: self.arena.clone(),
            max_duration: Duration::from_secs_f32(self.config.max_duration_secs),
            output_path: self.config.output_path.clone(),
            started: false,
            timed_out: false,
            match_complete: false,
            result: self.result.clone(),
        });

        app.add_systems(
            FixedUpdate,
            (
                (headless_join_and_start, report_deaths, bot_combat, check_timeout)
                    .chain()
                    .before(MatchHostSet::CollectInputs),
                react_to_notices.after(MatchHostSet::PublishNotices),
            ),
        )
        .add_systems(PostUpdate, headless_exit_on_complete);
    }
}

/// Bring every bot online and ask for a match on the first step.
fn headless_join_and_start(mut state: ResMut<HeadlessMatchState>, mut inputs: EventWriter<MatchInput>) {
    if state.started {
        return;
    }
    state.started = true;
    for bot in &state.bots {
        inputs.send(MatchInput::Join(bot.entity));
    }
    inputs.send(MatchInput::Start);
    info!("{} bots joined, match requested", state.bots.len());
}

fn report_deaths(state: Res<HeadlessMatchState>, mut inputs: EventWriter<MatchInput>) {
    for entity in state.arena.take_deaths() {
        inputs.send(MatchInput::Eliminated(entity));
    }
}

/// Every standing bot tries every triggerable ability each step; cooldowns
/// and resources decide what actually goes off. Harmful abilities focus the
/// weakest enemy, beneficial ones the weakest ally.
fn bot_combat(engine: Res<MatchEngine>, state: Res<HeadlessMatchState>, mut inputs: EventWriter<MatchInput>) {
    if engine.current_phase() != MatchPhase::Active {
        return;
    }
    let standing: Vec<EntityId> = state
        .bots
        .iter()
        .map(|bot| bot.entity)
        .filter(|entity| !engine.is_eliminated(*entity) && state.arena.is_alive(*entity))
        .collect();
    let weakest = |candidates: Vec<EntityId>| {
        candidates
            .into_iter()
            .min_by_key(|entity| (state.arena.health(*entity).unwrap_or(0), *entity))
    };

    for bot in &state.bots {
        if !standing.contains(&bot.entity) {
            continue;
        }
        let Some(kit) = engine
            .assignment(bot.entity)
            .and_then(|assignment| engine.kits().get(assignment.kind))
        else {
            continue;
        };
        let own_side = engine.teams().side_of(bot.entity);
        let (allies, enemies): (Vec<EntityId>, Vec<EntityId>) = standing.iter().partition(|other| {
            **other == bot.entity
                || (engine.settings().mode == MatchMode::Team && engine.teams().side_of(**other) == own_side)
        });
        let enemy_target = weakest(enemies);
        let ally_target = weakest(allies);

        for ability in kit.definition.triggerable() {
            let beneficial = match &ability.shape {
                AbilityShape::Action { effect, .. } | AbilityShape::Ultimate { effect, .. } => effect.is_beneficial(),
                _ => continue,
            };
            let target = if beneficial { ally_target } else { enemy_target };
            if !beneficial && target.is_none() {
                continue;
            }
            inputs.send(MatchInput::UseAbility {
                entity: bot.entity,
                ability: ability.id.clone(),
                target,
            });
        }
    }
}

fn check_timeout(engine: Res<MatchEngine>, mut state: ResMut<HeadlessMatchState>, mut inputs: EventWriter<MatchInput>) {
    if state.timed_out || !engine.current_phase().is_running() || engine.clock() < state.max_duration {
        return;
    }
    state.timed_out = true;
    info!("Match timed out after {:.1}s", engine.clock().as_secs_f32());
    inputs.send(MatchInput::ForceEnd {
        reason: "time limit reached".to_string(),
    });
}

fn react_to_notices(
    mut notices: EventReader<MatchNotice>,
    engine: Res<MatchEngine>,
    mut state: ResMut<HeadlessMatchState>,
    mut inputs: EventWriter<MatchInput>,
) {
    for notice in notices.read() {
        match notice {
            MatchNotice::PhaseChanged { to, .. } if *to == engine.current_phase() => {
                debug!("bots entering {:?}", to);
                inputs.send_batch(phase_decisions(*to, &engine, &state));
            }
            MatchNotice::DraftTurn { entity, side } => {
                let Some(bot) = state.bot(*entity) else {
                    continue;
                };
                let banned = engine.banned_class();
                let pick = bot.pick_class(engine.kits(), |kind| {
                    Some(kind) != banned
                        && engine
                            .draft()
                            .map_or(true, |draft| draft.taken_on_side(kind, *side).is_none())
                });
                if let Some(kind) = pick {
                    inputs.send(MatchInput::DraftPick { entity: *entity, kind });
                }
            }
            MatchNotice::RandomTeamsOffered => {
                if let Some(bot) = state.bots.first() {
                    inputs.send(MatchInput::AcceptRandomTeams(bot.entity));
                }
            }
            MatchNotice::InputRejected { input, reason } => {
                debug!("bot input {:?} rejected: {}", input, reason);
                if let MatchInput::Assign { entity, kind } = input {
                    let refused = *kind;
                    let banned = engine.banned_class();
                    let fallback = state
                        .bot(*entity)
                        .and_then(|bot| bot.pick_class(engine.kits(), |k| k != refused && Some(k) != banned));
                    if let Some(kind) = fallback {
                        inputs.send(MatchInput::Assign { entity: *entity, kind });
                    }
                }
            }
            MatchNotice::StartRefused(refusal) => {
                warn!("Match refused to start: {}", refusal);
                state.finish(Err(HeadlessError::Start(refusal.clone())));
            }
            MatchNotice::MatchEnded(outcome) => {
                let result = build_match_result(outcome, &engine, &state);
                state.finish(result);
            }
            _ => {}
        }
    }
}

/// What every bot does on entering `phase`.
fn phase_decisions(phase: MatchPhase, engine: &MatchEngine, state: &HeadlessMatchState) -> Vec<MatchInput> {
    let kits = engine.kits();
    let banned = engine.banned_class();
    match phase {
        MatchPhase::MapVote => {
            let maps = engine.layout().map_names();
            state
                .bots
                .iter()
                .filter_map(|bot| {
                    let choice = bot.config.map_vote.clone().or_else(|| maps.first().cloned())?;
                    Some(MatchInput::Vote {
                        entity: bot.entity,
                        ballot: Ballot::Map(choice),
                    })
                })
                .collect()
        }
        MatchPhase::ClassBanVote => state
            .bots
            .iter()
            .filter_map(|bot| {
                Some(MatchInput::Vote {
                    entity: bot.entity,
                    ballot: Ballot::Ban(bot.ban_choice(kits)?),
                })
            })
            .collect(),
        MatchPhase::TeamOrDraftSelect => state
            .bots
            .iter()
            .enumerate()
            .map(|(i, bot)| MatchInput::ChooseSide {
                entity: bot.entity,
                side: bot
                    .config
                    .side
                    .unwrap_or(if i % 2 == 0 { Side::A } else { Side::B }),
            })
            .collect(),
        MatchPhase::ClassSelect => state
            .bots
            .iter()
            .filter_map(|bot| {
                let kind = bot.pick_class(kits, |kind| Some(kind) != banned)?;
                Some(MatchInput::Assign {
                    entity: bot.entity,
                    kind,
                })
            })
            .collect(),
        MatchPhase::Active => {
            state.arena.set_sides(engine.teams());
            info!("Gates open: {} bots fighting", state.bots.len());
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn build_match_result(
    outcome: &MatchOutcome,
    engine: &MatchEngine,
    state: &HeadlessMatchState,
) -> Result<MatchResult, HeadlessError> {
    let summary = engine.summary();
    let log_path = engine
        .combat_log()
        .save_to_file(&summary, state.output_path.as_deref().map(Path::new))?;
    println!("Match complete. Log saved to: {}", log_path.display());

    let players: Vec<PlayerResult> = {
        let arena = state.arena.lock();
        state
            .bots
            .iter()
            .map(|bot| {
                let fighter = arena.fighters.get(&bot.entity).cloned().unwrap_or_else(Fighter::new);
                let class_name = summary
                    .participants
                    .iter()
                    .find(|p| p.entity == bot.entity)
                    .and_then(|p| p.class_name.clone());
                PlayerResult {
                    name: bot.config.name.clone(),
                    entity: bot.entity,
                    class_name,
                    side: engine.teams().side_of(bot.entity),
                    final_health: fighter.health,
                    survived: !engine.is_eliminated(bot.entity),
                    damage_dealt: fighter.damage_dealt,
                    damage_taken: fighter.damage_taken,
                    healing_done: fighter.healing_done,
                }
            })
            .collect()
    };

    let winners = players
        .iter()
        .filter(|player| match outcome {
            MatchOutcome::Winner(entity) => player.entity == *entity,
            MatchOutcome::SideWins(side) => player.side == Some(*side),
            MatchOutcome::Draw | MatchOutcome::Aborted { .. } => false,
        })
        .map(|player| player.name.clone())
        .collect();

    Ok(MatchResult {
        outcome: outcome.clone(),
        winners,
        match_time: summary.duration_secs,
        map: summary.map,
        banned_class: summary.banned_class,
        players,
        random_seed: summary.random_seed,
        log_path,
    })
}

/// Exit the app when the match is complete
fn headless_exit_on_complete(state: Res<HeadlessMatchState>, mut exit: EventWriter<AppExit>) {
    if state.match_complete {
        exit.send(AppExit::Success);
    }
}

/// Run a headless match with the given configuration
pub fn run_headless_match(config: HeadlessMatchConfig) -> Result<MatchResult, HeadlessError> {
    config.validate()?;
    let kits = match &config.classes_path {
        Some(path) => KitRegistry::load(path)?,
        None => KitRegistry::builtin()?,
    };
    let settings = config.match_settings();

    println!("Starting headless match simulation...");
    println!("  Mode: {:?}", settings.mode);
    for player in &config.players {
        println!("  {}: {:?}", player.name, player.classes);
    }
    println!("  Maps: {:?}", config.maps);
    println!("  Max duration: {:.0}s", config.max_duration_secs);

    let entities: Vec<EntityId> = (1..=config.players.len() as u64).map(EntityId).collect();
    let arena = ArenaSim::new(&entities);
    let engine = MatchEngine::new(settings.clone(), config.arena_layout(), kits)
        .with_effect_sink(arena.clone())
        .with_world_sink(arena.clone());
    let result: ResultSlot = Arc::new(Mutex::new(None));

    App::new()
        // Minimal plugins - no window, no rendering, loop as fast as possible
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
        // Every update advances simulated time by exactly one quantum
        .insert_resource(TimeUpdateStrategy::ManualDuration(settings.tick()))
        .add_plugins(MatchHostPlugin::from_settings(&settings))
        .insert_resource(engine)
        .add_plugins(HeadlessPlugin {
            config,
            arena,
            result: result.clone(),
        })
        .run();

    let outcome = result.lock().ok().and_then(|mut slot| slot.take());
    outcome.unwrap_or(Err(HeadlessError::Incomplete))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(kind: EffectKind, magnitude: u32, target: EffectTarget) -> Effect {
        Effect {
            source: EntityId(1),
            ability: "test".into(),
            kind,
            magnitude,
            target,
        }
    }

    #[test]
    fn test_damage_eats_shield_then_health() {
        let mut arena = ArenaSim::new(&[EntityId(1), EntityId(2)]);
        arena.apply(&effect(EffectKind::Shield, 10, EffectTarget::Entity(EntityId(2))));
        arena.apply(&effect(EffectKind::Damage, 25, EffectTarget::Entity(EntityId(2))));
        assert_eq!(arena.health(EntityId(2)), Some(85));
        assert!(arena.take_deaths().is_empty());
    }

    #[test]
    fn test_lethal_damage_reports_death_once() {
        let mut arena = ArenaSim::new(&[EntityId(1), EntityId(2)]);
        arena.apply(&effect(EffectKind::Damage, 150, EffectTarget::Entity(EntityId(2))));
        arena.apply(&effect(EffectKind::Damage, 10, EffectTarget::Entity(EntityId(2))));
        assert_eq!(arena.health(EntityId(2)), Some(0));
        assert_eq!(arena.take_deaths(), vec![EntityId(2)]);
        assert!(arena.take_deaths().is_empty());
    }

    #[test]
    fn test_heal_caps_at_max_health() {
        let mut arena = ArenaSim::new(&[EntityId(1)]);
        arena.apply(&effect(EffectKind::Damage, 5, EffectTarget::Entity(EntityId(1))));
        arena.apply(&effect(EffectKind::Heal, 50, EffectTarget::Entity(EntityId(1))));
        assert_eq!(arena.health(EntityId(1)), Some(MAX_HEALTH));
    }

    #[test]
    fn test_area_damage_spares_caster_and_distant_fighters() {
        let entities = [EntityId(1), EntityId(2), EntityId(3)];
        let mut arena = ArenaSim::new(&entities);
        arena.place(EntityId(1), &Location::new("arena", 0.0, 0.0, 0.0));
        arena.place(EntityId(2), &Location::new("arena", 3.0, 0.0, 0.0));
        arena.place(EntityId(3), &Location::new("arena", 30.0, 0.0, 0.0));

        arena.apply(&effect(
            EffectKind::Damage,
            10,
            EffectTarget::Area {
                origin: EntityId(1),
                radius: 5.0,
            },
        ));
        assert_eq!(arena.health(EntityId(1)), Some(MAX_HEALTH));
        assert_eq!(arena.health(EntityId(2)), Some(90));
        assert_eq!(arena.health(EntityId(3)), Some(MAX_HEALTH));
    }

    #[test]
    fn test_area_heal_only_touches_allies() {
        let entities = [EntityId(1), EntityId(2), EntityId(3)];
        let mut arena = ArenaSim::new(&entities);
        for entity in entities {
            arena.place(entity, &Location::new("arena", 0.0, 0.0, 0.0));
        }
        let mut teams = Teams::new();
        teams.choose(EntityId(1), Side::A);
        teams.choose(EntityId(2), Side::A);
        teams.choose(EntityId(3), Side::B);
        arena.set_sides(&teams);
        for entity in entities {
            arena.apply(&Effect {
                source: EntityId(3),
                ability: "hit".into(),
                kind: EffectKind::Damage,
                magnitude: 20,
                target: EffectTarget::Entity(entity),
            });
        }

        arena.apply(&effect(
            EffectKind::Heal,
            10,
            EffectTarget::Area {
                origin: EntityId(1),
                radius: 5.0,
            },
        ));
        assert_eq!(arena.health(EntityId(1)), Some(90));
        assert_eq!(arena.health(EntityId(2)), Some(90));
        assert_eq!(arena.health(EntityId(3)), Some(80));
    }
}
