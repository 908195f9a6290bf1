//! Ability Scheduler
//!
//! Tick-driven registry of delayed and periodic tasks. Every task is keyed by
//! its owner plus a task name; registering a key that is already present
//! replaces the old task, which is how passive generators avoid stacking when
//! a class is re-equipped.
//!
//! ## Tick order
//! 1. Cancel conditions are evaluated first; a cancelled task never fires.
//! 2. Remaining delay is reduced by the elapsed quantum.
//! 3. Tasks that reach zero are returned as [`Fired`] records. Periodic tasks
//!    re-arm with their period (at most one firing per tick).
//!
//! The scheduler never runs actions itself. The engine dispatches each
//! [`Fired`] record and checks [`AbilityScheduler::is_live`] right before doing
//! so, because an earlier action in the same tick may have torn the owner down.

use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::states::match_config::ClassKind;
use crate::states::MatchPhase;

use super::abilities::AbilityId;
use super::components::EntityId;
use super::ports::AbilityContext;

// ============================================================================
// Keys
// ============================================================================

/// Who a task belongs to. Entity-owned tasks die with the entity's class;
/// match-owned tasks drive phase timers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskOwner {
    Entity(EntityId),
    Match,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub owner: TaskOwner,
    pub name: String,
}

impl TaskKey {
    pub fn entity(entity: EntityId, name: impl Into<String>) -> Self {
        Self {
            owner: TaskOwner::Entity(entity),
            name: name.into(),
        }
    }

    pub fn match_timer(name: impl Into<String>) -> Self {
        Self {
            owner: TaskOwner::Match,
            name: name.into(),
        }
    }

    pub fn entity_owner(&self) -> Option<EntityId> {
        match self.owner {
            TaskOwner::Entity(entity) => Some(entity),
            TaskOwner::Match => None,
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            TaskOwner::Entity(entity) => write!(f, "{}/{}", entity, self.name),
            TaskOwner::Match => write!(f, "match/{}", self.name),
        }
    }
}

// ============================================================================
// Task Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Once,
    Every(Duration),
}

/// Condition that removes a task without firing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelWhen {
    /// The owning entity is no longer connected.
    OwnerOffline,
    /// The owner's class assignment is gone or has a different generation.
    ClassChanged { generation: u64 },
    /// The match left the given phase.
    PhaseLeft(MatchPhase),
    /// The owner is no longer in a practice session.
    PracticeEnded,
    /// The owner has been eliminated from the running match.
    OwnerEliminated,
}

/// Read-only view of the state cancel conditions are evaluated against.
pub trait CancelView {
    fn is_online(&self, entity: EntityId) -> bool;
    fn assignment_generation(&self, entity: EntityId) -> Option<u64>;
    fn phase(&self) -> MatchPhase;
    fn in_practice(&self, entity: EntityId) -> bool;
    fn is_eliminated(&self, entity: EntityId) -> bool;
}

impl CancelWhen {
    /// True when the task owned by `owner` must be dropped.
    pub fn holds(&self, owner: &TaskOwner, view: &dyn CancelView) -> bool {
        match (self, owner) {
            (CancelWhen::PhaseLeft(phase), _) => view.phase() != *phase,
            (_, TaskOwner::Match) => false,
            (CancelWhen::OwnerOffline, TaskOwner::Entity(entity)) => !view.is_online(*entity),
            (CancelWhen::ClassChanged { generation }, TaskOwner::Entity(entity)) => {
                view.assignment_generation(*entity) != Some(*generation)
            }
            (CancelWhen::PracticeEnded, TaskOwner::Entity(entity)) => !view.in_practice(*entity),
            (CancelWhen::OwnerEliminated, TaskOwner::Entity(entity)) => view.is_eliminated(*entity),
        }
    }
}

/// Engine-level timers that drive phase progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTimer {
    LobbyGatherDone,
    CountdownTick,
    FreezeDone,
    AutoReset,
}

/// Extension hook for tasks that are not expressible as a kit tick.
#[derive(Clone)]
pub struct TaskHook(pub Arc<dyn Fn(&mut AbilityContext<'_>) + Send + Sync>);

impl TaskHook {
    pub fn new(hook: impl Fn(&mut AbilityContext<'_>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }
}

impl fmt::Debug for TaskHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskHook(..)")
    }
}

/// What a task does when it fires. Entity tasks carry a reference to the
/// kit ability they drive rather than captured state.
#[derive(Debug, Clone)]
pub enum TaskAction {
    /// Run the class kit's passive hook for `ability`.
    KitTick { class: ClassKind, ability: AbilityId },
    /// Advance the match state machine.
    Phase(PhaseTimer),
    /// Run an arbitrary hook against the owner's ability context.
    Custom(TaskHook),
}

/// Registration request for a task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub key: TaskKey,
    pub delay: Duration,
    pub repeat: Repeat,
    pub cancel_when: SmallVec<[CancelWhen; 4]>,
    pub action: TaskAction,
}

impl TaskSpec {
    pub fn once(key: TaskKey, delay: Duration, action: TaskAction) -> Self {
        Self {
            key,
            delay,
            repeat: Repeat::Once,
            cancel_when: SmallVec::new(),
            action,
        }
    }

    pub fn every(key: TaskKey, delay: Duration, period: Duration, action: TaskAction) -> Self {
        Self {
            key,
            delay,
            repeat: Repeat::Every(period),
            cancel_when: SmallVec::new(),
            action,
        }
    }

    pub fn cancel_when(mut self, condition: CancelWhen) -> Self {
        if !self.cancel_when.contains(&condition) {
            self.cancel_when.push(condition);
        }
        self
    }
}

struct ScheduledTask {
    key: TaskKey,
    remaining: Duration,
    repeat: Repeat,
    cancel_when: SmallVec<[CancelWhen; 4]>,
    action: TaskAction,
    /// One-shot that already fired and waits for `complete`.
    spent: bool,
}

impl ScheduledTask {
    fn should_cancel(&self, view: &dyn CancelView) -> bool {
        self.cancel_when
            .iter()
            .any(|condition| condition.holds(&self.key.owner, view))
    }
}

/// A task that came due this tick.
#[derive(Debug, Clone)]
pub struct Fired {
    pub key: TaskKey,
    pub seq: u64,
    pub action: TaskAction,
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Default)]
pub struct AbilityScheduler {
    /// Tasks in registration order so dispatch is deterministic.
    tasks: BTreeMap<u64, ScheduledTask>,
    index: HashMap<TaskKey, u64>,
    next_seq: u64,
}

impl AbilityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Returns true if it replaced an existing task with the same key.
    pub fn schedule(&mut self, spec: TaskSpec) -> bool {
        let replaced = self.cancel(&spec.key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(spec.key.clone(), seq);
        self.tasks.insert(
            seq,
            ScheduledTask {
                key: spec.key,
                remaining: spec.delay,
                repeat: spec.repeat,
                cancel_when: spec.cancel_when,
                action: spec.action,
                spent: false,
            },
        );
        replaced
    }

    pub fn cancel(&mut self, key: &TaskKey) -> bool {
        match self.index.remove(key) {
            Some(seq) => self.tasks.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Cancel every task belonging to `owner`. Returns how many were removed.
    pub fn cancel_owner(&mut self, owner: &TaskOwner) -> usize {
        let doomed: Vec<u64> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.key.owner == *owner)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in &doomed {
            self.remove_seq(*seq);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.index.clear();
    }

    /// Advance every task by `elapsed` and collect the ones that came due.
    pub fn tick(&mut self, elapsed: Duration, view: &dyn CancelView) -> Vec<Fired> {
        let mut fired = Vec::new();
        let mut dropped = Vec::new();

        for (seq, task) in self.tasks.iter_mut() {
            if task.spent || task.should_cancel(view) {
                dropped.push(*seq);
                continue;
            }

            let overshoot = elapsed.saturating_sub(task.remaining);
            task.remaining = task.remaining.saturating_sub(elapsed);
            if !task.remaining.is_zero() {
                continue;
            }

            fired.push(Fired {
                key: task.key.clone(),
                seq: *seq,
                action: task.action.clone(),
            });
            match task.repeat {
                Repeat::Once => task.spent = true,
                Repeat::Every(period) => task.remaining = period.saturating_sub(overshoot),
            }
        }

        for seq in dropped {
            if let Some(task) = self.tasks.get(&seq) {
                if !task.spent {
                    tracing::debug!(task = %task.key, "scheduled task cancelled by condition");
                }
            }
            self.remove_seq(seq);
        }

        fired
    }

    /// True if `fired` still refers to the registered task and none of its
    /// cancel conditions hold right now.
    pub fn is_live(&self, fired: &Fired, view: &dyn CancelView) -> bool {
        match self.tasks.get(&fired.seq) {
            Some(task) => task.key == fired.key && !task.should_cancel(view),
            None => false,
        }
    }

    /// Retire a dispatched one-shot. Periodic tasks stay registered.
    pub fn complete(&mut self, fired: &Fired) {
        let spent = self
            .tasks
            .get(&fired.seq)
            .map(|task| task.spent)
            .unwrap_or(false);
        if spent {
            self.remove_seq(fired.seq);
        }
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.index.contains_key(key)
    }

    /// Time until the task fires next, if registered.
    pub fn remaining(&self, key: &TaskKey) -> Option<Duration> {
        self.index
            .get(key)
            .and_then(|seq| self.tasks.get(seq))
            .map(|task| task.remaining)
    }

    pub fn tasks_for(&self, owner: &TaskOwner) -> usize {
        self.tasks
            .values()
            .filter(|task| task.key.owner == *owner)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn remove_seq(&mut self, seq: u64) {
        if let Some(task) = self.tasks.remove(&seq) {
            if self.index.get(&task.key) == Some(&seq) {
                self.index.remove(&task.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct View {
        online: HashSet<EntityId>,
        phase: MatchPhase,
    }

    impl View {
        fn with_online(ids: &[u64]) -> Self {
            Self {
                online: ids.iter().copied().map(EntityId).collect(),
                phase: MatchPhase::Active,
            }
        }
    }

    impl CancelView for View {
        fn is_online(&self, entity: EntityId) -> bool {
            self.online.contains(&entity)
        }
        fn assignment_generation(&self, _entity: EntityId) -> Option<u64> {
            Some(1)
        }
        fn phase(&self) -> MatchPhase {
            self.phase
        }
        fn in_practice(&self, _entity: EntityId) -> bool {
            false
        }
        fn is_eliminated(&self, _entity: EntityId) -> bool {
            false
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn timer() -> TaskAction {
        TaskAction::Phase(PhaseTimer::CountdownTick)
    }

    #[test]
    fn test_one_shot_fires_once_after_delay() {
        let view = View::with_online(&[]);
        let mut scheduler = AbilityScheduler::new();
        scheduler.schedule(TaskSpec::once(TaskKey::match_timer("gather"), ms(100), timer()));

        assert!(scheduler.tick(ms(50), &view).is_empty());
        let fired = scheduler.tick(ms(50), &view);
        assert_eq!(fired.len(), 1);
        scheduler.complete(&fired[0]);
        assert!(scheduler.is_empty());
        assert!(scheduler.tick(ms(50), &view).is_empty());
    }

    #[test]
    fn test_periodic_rearms_with_period() {
        let view = View::with_online(&[]);
        let mut scheduler = AbilityScheduler::new();
        let key = TaskKey::match_timer("countdown");
        scheduler.schedule(TaskSpec::every(key.clone(), ms(100), ms(100), timer()));

        let mut fired = 0;
        for _ in 0..10 {
            fired += scheduler.tick(ms(50), &view).len();
        }
        assert_eq!(fired, 5);
        assert!(scheduler.contains(&key));
    }

    #[test]
    fn test_periodic_fires_at_most_once_per_tick() {
        let view = View::with_online(&[]);
        let mut scheduler = AbilityScheduler::new();
        scheduler.schedule(TaskSpec::every(TaskKey::match_timer("fast"), ms(10), ms(10), timer()));

        assert_eq!(scheduler.tick(ms(50), &view).len(), 1);
        // The overshoot leaves the task due on the very next tick.
        assert_eq!(scheduler.tick(ms(1), &view).len(), 1);
    }

    #[test]
    fn test_reregistering_key_replaces_task() {
        let view = View::with_online(&[1]);
        let mut scheduler = AbilityScheduler::new();
        let key = TaskKey::entity(EntityId(1), "passive");
        assert!(!scheduler.schedule(TaskSpec::every(key.clone(), ms(50), ms(50), timer())));
        assert!(scheduler.schedule(TaskSpec::every(key.clone(), ms(50), ms(50), timer())));

        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.tick(ms(50), &view).len(), 1);
    }

    #[test]
    fn test_cancel_condition_checked_before_firing() {
        let view = View::with_online(&[]);
        let mut scheduler = AbilityScheduler::new();
        let key = TaskKey::entity(EntityId(7), "passive");
        scheduler.schedule(
            TaskSpec::once(key.clone(), ms(0), timer()).cancel_when(CancelWhen::OwnerOffline),
        );

        assert!(scheduler.tick(ms(50), &view).is_empty());
        assert!(!scheduler.contains(&key));
    }

    #[test]
    fn test_phase_left_applies_to_match_tasks() {
        let mut view = View::with_online(&[]);
        view.phase = MatchPhase::FreezeCountdown;
        let mut scheduler = AbilityScheduler::new();
        scheduler.schedule(
            TaskSpec::every(TaskKey::match_timer("countdown"), ms(1000), ms(1000), timer())
                .cancel_when(CancelWhen::PhaseLeft(MatchPhase::FreezeCountdown)),
        );
        assert!(scheduler.tick(ms(50), &view).is_empty());
        assert_eq!(scheduler.len(), 1);

        view.phase = MatchPhase::Ended;
        assert!(scheduler.tick(ms(50), &view).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_fired_record_goes_stale_after_replacement() {
        let view = View::with_online(&[1]);
        let mut scheduler = AbilityScheduler::new();
        let key = TaskKey::entity(EntityId(1), "passive");
        scheduler.schedule(TaskSpec::every(key.clone(), ms(0), ms(50), timer()));
        let fired = scheduler.tick(ms(50), &view);
        assert!(scheduler.is_live(&fired[0], &view));

        scheduler.schedule(TaskSpec::every(key, ms(50), ms(50), timer()));
        assert!(!scheduler.is_live(&fired[0], &view));
    }

    #[test]
    fn test_cancel_owner_only_hits_that_owner() {
        let mut scheduler = AbilityScheduler::new();
        for name in ["a", "b", "c"] {
            scheduler.schedule(TaskSpec::once(TaskKey::entity(EntityId(1), name), ms(10), timer()));
        }
        scheduler.schedule(TaskSpec::once(TaskKey::entity(EntityId(2), "a"), ms(10), timer()));

        assert_eq!(scheduler.cancel_owner(&TaskOwner::Entity(EntityId(1))), 3);
        assert_eq!(scheduler.tasks_for(&TaskOwner::Entity(EntityId(2))), 1);
        assert_eq!(scheduler.len(), 1);
    }
}
