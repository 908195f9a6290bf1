//! Class Assignment Registry
//!
//! Authoritative map of entity → active class. The registry owns the whole
//! lifecycle of a class assignment:
//!
//! - `assign` tears down whatever the entity had, installs the new class and
//!   runs the kit's equip hook (which registers its passive tasks)
//! - `teardown` cancels every task keyed to the entity, then wipes its
//!   cooldowns, resources and custom fields
//! - `restore` re-runs the equip hook for a reconnecting entity without
//!   touching its counters; `disarm` is its inverse
//!
//! Every assignment carries a generation number. Tasks registered by a kit
//! are cancelled as soon as the entity's current generation differs from the
//! one they were created under.

use std::collections::HashMap;
use std::time::Duration;

use crate::combat::EffectSink;
use crate::error::Rejection;
use crate::states::match_config::{ClassKind, Side};
use crate::states::teams::Teams;

use super::abilities::{AbilityId, AbilityOutcome};
use super::ability_config::{ClassKit, KitRegistry};
use super::components::{CustomFields, EntityId};
use super::cooldowns::CooldownTable;
use super::ports::AbilityContext;
use super::resources::ResourceLedger;
use super::scheduler::{AbilityScheduler, Fired, TaskAction, TaskOwner};

/// Whether an assignment belongs to the shared match or a private practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentMode {
    Practice,
    Match,
}

#[derive(Debug, Clone)]
pub struct ClassAssignment {
    pub entity: EntityId,
    pub kind: ClassKind,
    pub mode: AssignmentMode,
    pub generation: u64,
    /// Match clock at the moment of assignment
    pub assigned_at: Duration,
    pub custom: CustomFields,
}

/// The per-entity tables a class touches. Owned by the engine and lent to
/// the registry for each call.
#[derive(Default)]
pub struct AbilityTables {
    pub cooldowns: CooldownTable,
    pub resources: ResourceLedger,
    pub scheduler: AbilityScheduler,
}

impl AbilityTables {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of a successful `assign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// A new assignment was installed. `replaced` is the class torn down first.
    Assigned {
        generation: u64,
        replaced: Option<ClassKind>,
    },
    /// The entity already had this class in this mode.
    Unchanged,
}

fn context<'a>(
    assignment: &'a mut ClassAssignment,
    tables: &'a mut AbilityTables,
    effects: &'a mut dyn EffectSink,
) -> AbilityContext<'a> {
    AbilityContext {
        entity: assignment.entity,
        class: assignment.kind,
        generation: assignment.generation,
        mode: assignment.mode,
        cooldowns: &mut tables.cooldowns,
        resources: &mut tables.resources,
        scheduler: &mut tables.scheduler,
        effects,
        custom: &mut assignment.custom,
    }
}

pub struct ClassAssignmentRegistry {
    kits: KitRegistry,
    assignments: HashMap<EntityId, ClassAssignment>,
    next_generation: u64,
}

impl ClassAssignmentRegistry {
    pub fn new(kits: KitRegistry) -> Self {
        Self {
            kits,
            assignments: HashMap::new(),
            next_generation: 1,
        }
    }

    pub fn kits(&self) -> &KitRegistry {
        &self.kits
    }

    pub fn kit(&self, kind: ClassKind) -> Option<&ClassKit> {
        self.kits.get(kind)
    }

    /// Give `entity` the class `kind`. Re-assigning the same kind in the same
    /// mode is a no-op; anything else tears down the old class first.
    pub fn assign(
        &mut self,
        entity: EntityId,
        kind: ClassKind,
        mode: AssignmentMode,
        tables: &mut AbilityTables,
        effects: &mut dyn EffectSink,
    ) -> Result<AssignOutcome, Rejection> {
        if !self.kits.contains(kind) {
            return Err(Rejection::UnknownClass(kind));
        }
        if let Some(current) = self.assignments.get(&entity) {
            if current.kind == kind && current.mode == mode {
                return Ok(AssignOutcome::Unchanged);
            }
        }

        let replaced = self.teardown(entity, tables).map(|old| old.kind);
        let generation = self.next_generation;
        self.next_generation += 1;

        let assignment = self.assignments.entry(entity).or_insert(ClassAssignment {
            entity,
            kind,
            mode,
            generation,
            assigned_at: tables.cooldowns.now(),
            custom: CustomFields::default(),
        });
        if let Some(kit) = self.kits.get(kind) {
            let on_equip = kit.handlers.on_equip;
            let mut ctx = context(assignment, tables, effects);
            on_equip(&kit.definition, &mut ctx);
        }

        tracing::info!(%entity, class = ?kind, ?mode, generation, replaced = ?replaced, "class assigned");
        Ok(AssignOutcome::Assigned { generation, replaced })
    }

    /// Remove the entity's class and everything keyed to it. Tasks are
    /// cancelled before state is cleared. Safe to call for unknown entities.
    pub fn teardown(&mut self, entity: EntityId, tables: &mut AbilityTables) -> Option<ClassAssignment> {
        let cancelled = tables.scheduler.cancel_owner(&TaskOwner::Entity(entity));
        let cooldowns = tables.cooldowns.clear(entity);
        tables.resources.clear(entity);
        let removed = self.assignments.remove(&entity);
        if let Some(old) = &removed {
            tracing::debug!(%entity, class = ?old.kind, cancelled, cooldowns, "class torn down");
        }
        removed
    }

    /// Alias of [`teardown`](Self::teardown) that only reports whether a class was removed.
    pub fn clear(&mut self, entity: EntityId, tables: &mut AbilityTables) -> bool {
        self.teardown(entity, tables).is_some()
    }

    /// Tear down every assignment in `mode`. Returns the affected entities.
    pub fn clear_mode(&mut self, mode: AssignmentMode, tables: &mut AbilityTables) -> Vec<EntityId> {
        let mut doomed: Vec<EntityId> = self
            .assignments
            .values()
            .filter(|assignment| assignment.mode == mode)
            .map(|assignment| assignment.entity)
            .collect();
        doomed.sort();
        for entity in &doomed {
            self.teardown(*entity, tables);
        }
        doomed
    }

    /// Cancel the entity's scheduled tasks but keep its class and counters.
    /// [`restore`](Self::restore) arms them again.
    pub fn disarm(&mut self, entity: EntityId, tables: &mut AbilityTables) -> usize {
        if !self.assignments.contains_key(&entity) {
            return 0;
        }
        tables.scheduler.cancel_owner(&TaskOwner::Entity(entity))
    }

    /// Re-install the kit's tasks, for a reconnecting entity or one whose
    /// match has gone live. Cooldowns, resources and custom fields are left
    /// as they were.
    pub fn restore(&mut self, entity: EntityId, tables: &mut AbilityTables, effects: &mut dyn EffectSink) -> bool {
        let Some(assignment) = self.assignments.get_mut(&entity) else {
            return false;
        };
        let Some(kit) = self.kits.get(assignment.kind) else {
            return false;
        };
        let on_equip = kit.handlers.on_equip;
        let mut ctx = context(assignment, tables, effects);
        on_equip(&kit.definition, &mut ctx);
        tracing::debug!(%entity, "class tasks restored");
        true
    }

    pub fn get(&self, entity: EntityId) -> Option<&ClassAssignment> {
        self.assignments.get(&entity)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut ClassAssignment> {
        self.assignments.get_mut(&entity)
    }

    pub fn generation(&self, entity: EntityId) -> Option<u64> {
        self.assignments.get(&entity).map(|assignment| assignment.generation)
    }

    pub fn has_class(&self, entity: EntityId) -> bool {
        self.assignments.contains_key(&entity)
    }

    /// Who on `side` already plays `kind` in the match, if anyone.
    pub fn is_kind_taken_on_side(&self, kind: ClassKind, side: Side, teams: &Teams) -> Option<EntityId> {
        self.assignments
            .values()
            .filter(|assignment| {
                assignment.mode == AssignmentMode::Match
                    && assignment.kind == kind
                    && teams.side_of(assignment.entity) == Some(side)
            })
            .map(|assignment| assignment.entity)
            .min()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Trigger one of the entity's abilities.
    pub fn use_ability(
        &mut self,
        entity: EntityId,
        ability: &AbilityId,
        target: Option<EntityId>,
        tables: &mut AbilityTables,
        effects: &mut dyn EffectSink,
    ) -> Result<AbilityOutcome, Rejection> {
        let Some(assignment) = self.assignments.get_mut(&entity) else {
            return Err(Rejection::NoClass(entity));
        };
        let Some(kit) = self.kits.get(assignment.kind) else {
            return Err(Rejection::UnknownClass(assignment.kind));
        };
        let Some(definition) = kit.definition.ability(ability) else {
            return Ok(AbilityOutcome::UnknownAbility);
        };
        if !definition.shape.is_triggerable() {
            return Ok(AbilityOutcome::NotTriggerable);
        }
        let on_action = kit.handlers.on_action;
        let mut ctx = context(assignment, tables, effects);
        let outcome = on_action(&kit.definition, definition, target, &mut ctx);
        tracing::debug!(%entity, %ability, ?outcome, "ability used");
        Ok(outcome)
    }

    /// Dispatch an entity-owned task that came due. A task that no longer
    /// matches its owner's assignment is removed and nothing runs.
    pub fn run_task(&mut self, fired: &Fired, tables: &mut AbilityTables, effects: &mut dyn EffectSink) {
        let Some(entity) = fired.key.entity_owner() else {
            tracing::debug!(task = %fired.key, "match-owned task handed to the class registry");
            return;
        };
        let Some(assignment) = self.assignments.get_mut(&entity) else {
            Self::heal_stale(fired, tables, "owner has no class");
            return;
        };

        match &fired.action {
            TaskAction::KitTick { class, ability } => {
                if *class != assignment.kind {
                    Self::heal_stale(fired, tables, "owner changed class");
                    return;
                }
                let Some(kit) = self.kits.get(*class) else {
                    Self::heal_stale(fired, tables, "class has no kit");
                    return;
                };
                let Some(definition) = kit.definition.ability(ability) else {
                    Self::heal_stale(fired, tables, "ability no longer in kit");
                    return;
                };
                let on_tick = kit.handlers.on_passive_tick;
                let mut ctx = context(assignment, tables, effects);
                on_tick(&kit.definition, definition, &mut ctx);
            }
            TaskAction::Custom(hook) => {
                let mut ctx = context(assignment, tables, effects);
                (hook.0)(&mut ctx);
            }
            TaskAction::Phase(timer) => {
                tracing::debug!(task = %fired.key, ?timer, "phase timer keyed to an entity ignored");
            }
        }
    }

    fn heal_stale(fired: &Fired, tables: &mut AbilityTables, reason: &str) {
        tables.scheduler.cancel(&fired.key);
        tracing::debug!(task = %fired.key, reason, "removed stale scheduled task");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::RecordingSink;
    use crate::states::play_match::scheduler::CancelView;
    use crate::states::MatchPhase;

    struct Everyone<'a>(&'a ClassAssignmentRegistry);

    impl CancelView for Everyone<'_> {
        fn is_online(&self, _entity: EntityId) -> bool {
            true
        }
        fn assignment_generation(&self, entity: EntityId) -> Option<u64> {
            self.0.generation(entity)
        }
        fn phase(&self) -> MatchPhase {
            MatchPhase::Active
        }
        fn in_practice(&self, _entity: EntityId) -> bool {
            false
        }
        fn is_eliminated(&self, _entity: EntityId) -> bool {
            false
        }
    }

    fn registry() -> ClassAssignmentRegistry {
        ClassAssignmentRegistry::new(KitRegistry::builtin().unwrap())
    }

    fn run(registry: &mut ClassAssignmentRegistry, tables: &mut AbilityTables, sink: &mut RecordingSink, ms: u64) {
        let fired = tables.scheduler.tick(Duration::from_millis(ms), &Everyone(registry));
        for task in fired {
            if tables.scheduler.is_live(&task, &Everyone(registry)) {
                registry.run_task(&task, tables, sink);
                tables.scheduler.complete(&task);
            }
        }
    }

    #[test]
    fn test_assign_installs_passives() {
        let mut registry = registry();
        let mut tables = AbilityTables::new();
        let mut sink = RecordingSink::new();
        let outcome = registry
            .assign(EntityId(1), ClassKind::Warrior, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        assert!(matches!(outcome, AssignOutcome::Assigned { replaced: None, .. }));
        assert_eq!(tables.scheduler.tasks_for(&TaskOwner::Entity(EntityId(1))), 1);

        for _ in 0..3 {
            run(&mut registry, &mut tables, &mut sink, 1000);
        }
        assert_eq!(tables.resources.count(EntityId(1), &"rage".into()), 15);
    }

    #[test]
    fn test_same_kind_same_mode_is_idempotent() {
        let mut registry = registry();
        let mut tables = AbilityTables::new();
        let mut sink = RecordingSink::new();
        registry
            .assign(EntityId(1), ClassKind::Warrior, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        tables.resources.set(EntityId(1), &"rage".into(), 40);
        let generation = registry.generation(EntityId(1));

        let outcome = registry
            .assign(EntityId(1), ClassKind::Warrior, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        assert_eq!(outcome, AssignOutcome::Unchanged);
        assert_eq!(registry.generation(EntityId(1)), generation);
        assert_eq!(tables.resources.count(EntityId(1), &"rage".into()), 40);
    }

    #[test]
    fn test_reassign_wipes_old_state() {
        let mut registry = registry();
        let mut tables = AbilityTables::new();
        let mut sink = RecordingSink::new();
        registry
            .assign(EntityId(1), ClassKind::Warrior, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        tables.resources.set(EntityId(1), &"rage".into(), 40);
        registry
            .use_ability(EntityId(1), &"mortal_strike".into(), Some(EntityId(2)), &mut tables, &mut sink)
            .unwrap();
        assert_eq!(tables.cooldowns.entries_for(EntityId(1)), 1);

        let outcome = registry
            .assign(EntityId(1), ClassKind::Priest, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        assert!(matches!(
            outcome,
            AssignOutcome::Assigned {
                replaced: Some(ClassKind::Warrior),
                ..
            }
        ));
        assert_eq!(tables.cooldowns.entries_for(EntityId(1)), 0);
        assert_eq!(tables.resources.count(EntityId(1), &"rage".into()), 0);

        sink.clear();
        for _ in 0..20 {
            run(&mut registry, &mut tables, &mut sink, 500);
        }
        assert_eq!(tables.resources.count(EntityId(1), &"rage".into()), 0);
        assert!(sink.count_for(EntityId(1), "holy_nova") > 0);
    }

    #[test]
    fn test_restore_keeps_counters() {
        let mut registry = registry();
        let mut tables = AbilityTables::new();
        let mut sink = RecordingSink::new();
        registry
            .assign(EntityId(3), ClassKind::Hunter, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        tables.resources.set(EntityId(3), &"focus".into(), 30);
        registry.get_mut(EntityId(3)).unwrap().custom.increment("instinct", 2, 4);

        tables.scheduler.cancel_owner(&TaskOwner::Entity(EntityId(3)));
        assert!(registry.restore(EntityId(3), &mut tables, &mut sink));
        assert_eq!(tables.resources.count(EntityId(3), &"focus".into()), 30);
        assert_eq!(registry.get(EntityId(3)).unwrap().custom.int("instinct"), 2);
        assert_eq!(tables.scheduler.tasks_for(&TaskOwner::Entity(EntityId(3))), 2);
    }

    #[test]
    fn test_disarm_keeps_class_until_restored() {
        let mut registry = registry();
        let mut tables = AbilityTables::new();
        let mut sink = RecordingSink::new();
        registry
            .assign(EntityId(4), ClassKind::Warlock, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        assert_eq!(registry.disarm(EntityId(4), &mut tables), 2);
        assert_eq!(registry.disarm(EntityId(9), &mut tables), 0);

        for _ in 0..10 {
            run(&mut registry, &mut tables, &mut sink, 1000);
        }
        assert_eq!(tables.resources.count(EntityId(4), &"souls".into()), 0);
        assert!(sink.effects().is_empty());
        assert_eq!(registry.get(EntityId(4)).map(|a| a.kind), Some(ClassKind::Warlock));

        assert!(registry.restore(EntityId(4), &mut tables, &mut sink));
        for _ in 0..4 {
            run(&mut registry, &mut tables, &mut sink, 1000);
        }
        assert_eq!(tables.resources.count(EntityId(4), &"souls".into()), 1);
    }

    #[test]
    fn test_stale_task_is_removed() {
        let mut registry = registry();
        let mut tables = AbilityTables::new();
        let mut sink = RecordingSink::new();
        registry
            .assign(EntityId(1), ClassKind::Warrior, AssignmentMode::Match, &mut tables, &mut sink)
            .unwrap();
        let fired = tables.scheduler.tick(Duration::from_secs(1), &Everyone(&registry));
        assert_eq!(fired.len(), 1);

        // Ownership lost between tick and dispatch.
        registry.assignments.remove(&EntityId(1));
        registry.run_task(&fired[0], &mut tables, &mut sink);
        assert!(tables.scheduler.is_empty());
        assert_eq!(tables.resources.count(EntityId(1), &"rage".into()), 0);
    }

    #[test]
    fn test_use_ability_without_class_is_rejected() {
        let mut registry = registry();
        let mut tables = AbilityTables::new();
        let mut sink = RecordingSink::new();
        let result = registry.use_ability(EntityId(5), &"frostbolt".into(), None, &mut tables, &mut sink);
        assert_eq!(result, Err(Rejection::NoClass(EntityId(5))));
    }
}
