//! Resource Ledger
//!
//! Per-(entity, resource kind) non-negative counters. Ultimates are gated on
//! these, passives feed them. Every operation fails closed: bad arguments and
//! unknown keys produce `false` / `0` and leave the ledger untouched.

use std::collections::HashMap;

use super::abilities::ResourceKind;
use super::components::EntityId;

#[derive(Debug, Default)]
pub struct ResourceLedger {
    counts: HashMap<EntityId, HashMap<ResourceKind, u32>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positive amount. Non-positive amounts are rejected.
    /// Saturates at `u32::MAX`.
    pub fn add(&mut self, entity: EntityId, kind: &ResourceKind, amount: i64) -> bool {
        if amount <= 0 || kind.is_empty() {
            return false;
        }
        let amount = u32::try_from(amount).unwrap_or(u32::MAX);
        let slot = self
            .counts
            .entry(entity)
            .or_default()
            .entry(kind.clone())
            .or_insert(0);
        *slot = slot.saturating_add(amount);
        true
    }

    pub fn count(&self, entity: EntityId, kind: &ResourceKind) -> u32 {
        self.counts
            .get(&entity)
            .and_then(|kinds| kinds.get(kind))
            .copied()
            .unwrap_or(0)
    }

    pub fn has_at_least(&self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool {
        if n < 0 || kind.is_empty() {
            return false;
        }
        i64::from(self.count(entity, kind)) >= n
    }

    /// Decrement by `n` only if at least `n` is available.
    pub fn consume(&mut self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool {
        if !self.has_at_least(entity, kind, n) {
            return false;
        }
        // n fits: has_at_least proved 0 <= n <= count <= u32::MAX
        let n = n as u32;
        if n == 0 {
            return true;
        }
        if let Some(slot) = self.counts.get_mut(&entity).and_then(|kinds| kinds.get_mut(kind)) {
            *slot -= n;
        }
        true
    }

    /// Overwrite the counter. Negative values are rejected.
    pub fn set(&mut self, entity: EntityId, kind: &ResourceKind, n: i64) -> bool {
        if n < 0 || kind.is_empty() {
            return false;
        }
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        self.counts.entry(entity).or_default().insert(kind.clone(), n);
        true
    }

    /// Cap a counter at `max`. Returns the resulting count.
    pub fn clamp(&mut self, entity: EntityId, kind: &ResourceKind, max: u32) -> u32 {
        match self.counts.get_mut(&entity).and_then(|kinds| kinds.get_mut(kind)) {
            Some(slot) => {
                *slot = (*slot).min(max);
                *slot
            }
            None => 0,
        }
    }

    /// Drop every counter for `entity`.
    pub fn clear(&mut self, entity: EntityId) {
        self.counts.remove(&entity);
    }

    /// Drop a single counter for `entity`.
    pub fn clear_kind(&mut self, entity: EntityId, kind: &ResourceKind) {
        if let Some(kinds) = self.counts.get_mut(&entity) {
            kinds.remove(kind);
            if kinds.is_empty() {
                self.counts.remove(&entity);
            }
        }
    }

    pub fn clear_all(&mut self) {
        self.counts.clear();
    }

    pub fn tracks(&self, entity: EntityId) -> bool {
        self.counts.contains_key(&entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy() -> ResourceKind {
        ResourceKind::from("energy")
    }

    #[test]
    fn test_unknown_entity_reads_zero() {
        let ledger = ResourceLedger::new();
        assert_eq!(ledger.count(EntityId(9), &energy()), 0);
        assert!(!ledger.has_at_least(EntityId(9), &energy(), 1));
        assert!(ledger.has_at_least(EntityId(9), &energy(), 0));
    }

    #[test]
    fn test_add_and_consume() {
        let mut ledger = ResourceLedger::new();
        assert!(ledger.add(EntityId(1), &energy(), 5));
        assert!(ledger.consume(EntityId(1), &energy(), 3));
        assert_eq!(ledger.count(EntityId(1), &energy()), 2);
        assert!(!ledger.consume(EntityId(1), &energy(), 3));
        assert_eq!(ledger.count(EntityId(1), &energy()), 2);
    }

    #[test]
    fn test_invalid_amounts_are_noops() {
        let mut ledger = ResourceLedger::new();
        assert!(!ledger.add(EntityId(1), &energy(), 0));
        assert!(!ledger.add(EntityId(1), &energy(), -4));
        assert!(!ledger.consume(EntityId(1), &energy(), -1));
        assert!(!ledger.set(EntityId(1), &energy(), -1));
        assert!(!ledger.tracks(EntityId(1)));
    }

    #[test]
    fn test_empty_kind_fails_closed() {
        let mut ledger = ResourceLedger::new();
        let none = ResourceKind::from("");
        assert!(!ledger.add(EntityId(1), &none, 5));
        assert!(!ledger.set(EntityId(1), &none, 5));
        assert_eq!(ledger.count(EntityId(1), &none), 0);
    }

    #[test]
    fn test_clamp_and_clear_kind() {
        let mut ledger = ResourceLedger::new();
        ledger.set(EntityId(1), &energy(), 40);
        ledger.set(EntityId(1), &ResourceKind::from("rage"), 2);
        assert_eq!(ledger.clamp(EntityId(1), &energy(), 10), 10);
        ledger.clear_kind(EntityId(1), &energy());
        assert_eq!(ledger.count(EntityId(1), &energy()), 0);
        assert_eq!(ledger.count(EntityId(1), &ResourceKind::from("rage")), 2);
        ledger.clear(EntityId(1));
        assert!(!ledger.tracks(EntityId(1)));
    }
}
