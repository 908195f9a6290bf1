//! Cooldown Tracking
//!
//! Stores the instant each (entity, ability) pair was last used. The cooldown
//! length is never stored: callers pass it in when they ask how much time is
//! left, so rebalancing a class never invalidates existing entries.

use std::collections::HashMap;
use std::time::Duration;

use super::abilities::AbilityId;
use super::components::EntityId;

/// Per-(entity, ability) last-use timestamps, measured on the match clock.
#[derive(Debug, Default)]
pub struct CooldownTable {
    last_used: HashMap<(EntityId, AbilityId), Duration>,
    /// Current match clock. Advanced by the engine once per tick.
    now: Duration,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the table clock forward. Earlier instants are ignored.
    pub fn advance_to(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Stamp `ability` as used right now.
    pub fn start_cooldown(&mut self, entity: EntityId, ability: &AbilityId) {
        if ability.is_empty() {
            return;
        }
        self.last_used.insert((entity, ability.clone()), self.now);
    }

    /// Time left before `ability` is usable again, given its cooldown length.
    /// Zero when ready or when the ability was never used.
    pub fn remaining(&self, entity: EntityId, ability: &AbilityId, duration: Duration) -> Duration {
        self.remaining_at(entity, ability, duration, self.now)
    }

    /// Same as [`remaining`](Self::remaining) evaluated at an arbitrary instant.
    pub fn remaining_at(
        &self,
        entity: EntityId,
        ability: &AbilityId,
        duration: Duration,
        now: Duration,
    ) -> Duration {
        match self.last_used.get(&(entity, ability.clone())) {
            Some(last_use) => duration.saturating_sub(now.saturating_sub(*last_use)),
            None => Duration::ZERO,
        }
    }

    pub fn is_ready(&self, entity: EntityId, ability: &AbilityId, duration: Duration) -> bool {
        self.remaining(entity, ability, duration).is_zero()
    }

    /// Purge every entry belonging to `entity`. Returns how many were removed.
    pub fn clear(&mut self, entity: EntityId) -> usize {
        let before = self.last_used.len();
        self.last_used.retain(|(owner, _), _| *owner != entity);
        before - self.last_used.len()
    }

    pub fn clear_all(&mut self) {
        self.last_used.clear();
    }

    /// Number of tracked entries for `entity` (used by tests and debug output).
    pub fn entries_for(&self, entity: EntityId) -> usize {
        self.last_used.keys().filter(|(owner, _)| *owner == entity).count()
    }
}
