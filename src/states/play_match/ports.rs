//! Capability ports for class kits
//!
//! Kit hooks never see the concrete tables. They get an [`AbilityContext`]
//! holding one narrow port per table, so a kit can be exercised against
//! stand-in implementations and cannot reach state it was not handed.

use std::time::Duration;

use crate::combat::{Effect, EffectKind, EffectSink, EffectTarget};
use crate::states::match_config::ClassKind;

use super::abilities::{AbilityId, ResourceKind};
use super::class_registry::AssignmentMode;
use super::components::{CustomFields, EntityId};
use super::cooldowns::CooldownTable;
use super::resources::ResourceLedger;
use super::scheduler::{AbilityScheduler, CancelWhen, Repeat, TaskAction, TaskKey, TaskSpec};

pub trait CooldownPort {
    fn start_cooldown(&mut self, entity: EntityId, ability: &AbilityId);
    fn cooldown_remaining(&self, entity: EntityId, ability: &AbilityId, duration: Duration) -> Duration;

    fn cooldown_ready(&self, entity: EntityId, ability: &AbilityId, duration: Duration) -> bool {
        self.cooldown_remaining(entity, ability, duration).is_zero()
    }
}

pub trait ResourcePort {
    fn add(&mut self, entity: EntityId, kind: &ResourceKind, amount: i64) -> bool;
    fn count(&self, entity: EntityId, kind: &ResourceKind) -> u32;
    fn has_at_least(&self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool;
    fn consume(&mut self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool;
    fn set(&mut self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool;
    fn clamp(&mut self, entity: EntityId, kind: &ResourceKind, max: u32) -> u32;
}

pub trait SchedulerPort {
    fn schedule(&mut self, spec: TaskSpec) -> bool;
    fn cancel(&mut self, key: &TaskKey) -> bool;
}

impl CooldownPort for CooldownTable {
    fn start_cooldown(&mut self, entity: EntityId, ability: &AbilityId) {
        CooldownTable::start_cooldown(self, entity, ability);
    }

    fn cooldown_remaining(&self, entity: EntityId, ability: &AbilityId, duration: Duration) -> Duration {
        self.remaining(entity, ability, duration)
    }
}

impl ResourcePort for ResourceLedger {
    fn add(&mut self, entity: EntityId, kind: &ResourceKind, amount: i64) -> bool {
        ResourceLedger::add(self, entity, kind, amount)
    }

    fn count(&self, entity: EntityId, kind: &ResourceKind) -> u32 {
        ResourceLedger::count(self, entity, kind)
    }

    fn has_at_least(&self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool {
        ResourceLedger::has_at_least(self, entity, kind, n)
    }

    fn consume(&mut self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool {
        ResourceLedger::consume(self, entity, kind, n)
    }

    fn set(&mut self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool {
        ResourceLedger::set(self, entity, kind, n)
    }

    fn clamp(&mut self, entity: EntityId, kind: &ResourceKind, max: u32) -> u32 {
        ResourceLedger::clamp(self, entity, kind, max)
    }
}

impl SchedulerPort for AbilityScheduler {
    fn schedule(&mut self, spec: TaskSpec) -> bool {
        AbilityScheduler::schedule(self, spec)
    }

    fn cancel(&mut self, key: &TaskKey) -> bool {
        AbilityScheduler::cancel(self, key)
    }
}

/// Everything a kit hook may touch for one entity's assignment.
pub struct AbilityContext<'a> {
    pub entity: EntityId,
    pub class: ClassKind,
    /// Generation of the assignment this context was built for.
    pub generation: u64,
    pub mode: AssignmentMode,
    pub cooldowns: &'a mut dyn CooldownPort,
    pub resources: &'a mut dyn ResourcePort,
    pub scheduler: &'a mut dyn SchedulerPort,
    pub effects: &'a mut dyn EffectSink,
    pub custom: &'a mut CustomFields,
}

impl AbilityContext<'_> {
    /// Build a task owned by this assignment. It is cancelled when the class
    /// changes, the owner disconnects or is eliminated, and (for practice
    /// assignments) when the practice session ends.
    pub fn owned_task(&self, name: &str, delay: Duration, repeat: Repeat, action: TaskAction) -> TaskSpec {
        let key = TaskKey::entity(self.entity, name);
        let spec = match repeat {
            Repeat::Once => TaskSpec::once(key, delay, action),
            Repeat::Every(period) => TaskSpec::every(key, delay, period, action),
        };
        let spec = spec
            .cancel_when(CancelWhen::ClassChanged {
                generation: self.generation,
            })
            .cancel_when(CancelWhen::OwnerOffline)
            .cancel_when(CancelWhen::OwnerEliminated);
        match self.mode {
            AssignmentMode::Practice => spec.cancel_when(CancelWhen::PracticeEnded),
            AssignmentMode::Match => spec,
        }
    }

    pub fn schedule_owned(&mut self, name: &str, delay: Duration, repeat: Repeat, action: TaskAction) -> bool {
        let spec = self.owned_task(name, delay, repeat, action);
        self.scheduler.schedule(spec)
    }

    /// Send an effect from this entity to the effect sink.
    pub fn emit(&mut self, ability: &AbilityId, kind: EffectKind, magnitude: u32, target: EffectTarget) -> bool {
        let effect = Effect {
            source: self.entity,
            ability: ability.clone(),
            kind,
            magnitude,
            target,
        };
        self.effects.apply(&effect)
    }

    pub fn resource_count(&self, kind: &ResourceKind) -> u32 {
        self.resources.count(self.entity, kind)
    }
}
