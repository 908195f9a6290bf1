//! Shared data types for the ability engine
//!
//! This module contains the small value types every table and protocol
//! in the match core is keyed by:
//! - `EntityId`: opaque participant handle supplied by the host
//! - `CustomValue` / `CustomFields`: per-assignment mutable state for class kits
//! - `GameRng`: seeded random source for tie-breaks and shuffles

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier for a connected participant.
///
/// The core never creates these; the host hands them in with `on_entity_join`
/// and every table looks them up by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ============================================================================
// Custom Fields
// ============================================================================

/// Variant value stored in a class assignment's custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomValue {
    Int(i64),
    Float(f64),
    Flag(bool),
    Text(String),
}

/// Free-form per-assignment state owned by a class kit (stage counters,
/// toggles, stored targets). Cleared whenever the assignment is torn down.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomFields {
    values: HashMap<String, CustomValue>,
}

impl CustomFields {
    pub fn get(&self, field: &str) -> Option<&CustomValue> {
        self.values.get(field)
    }

    /// Integer view of a field. Missing or non-integer fields read as 0.
    pub fn int(&self, field: &str) -> i64 {
        match self.values.get(field) {
            Some(CustomValue::Int(value)) => *value,
            _ => 0,
        }
    }

    pub fn flag(&self, field: &str) -> bool {
        matches!(self.values.get(field), Some(CustomValue::Flag(true)))
    }

    pub fn set(&mut self, field: impl Into<String>, value: CustomValue) {
        self.values.insert(field.into(), value);
    }

    /// Add `delta` to an integer field, clamping the result to `max`.
    /// Returns the new value.
    pub fn increment(&mut self, field: &str, delta: i64, max: i64) -> i64 {
        let next = (self.int(field) + delta).min(max);
        self.values.insert(field.to_string(), CustomValue::Int(next));
        next
    }

    pub fn remove(&mut self, field: &str) -> Option<CustomValue> {
        self.values.remove(field)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

// ============================================================================
// Random Source
// ============================================================================

/// Seeded random number generator for deterministic match flow.
///
/// When a seed is provided (e.g., via match settings), the same seed will
/// always produce the same tie-breaks, team shuffles and draft order.
/// Without a seed, uses system entropy.
pub struct GameRng {
    rng: StdRng,
    /// The seed used to initialize this RNG (if deterministic)
    pub seed: Option<u64>,
}

impl GameRng {
    /// Create a new GameRng with a specific seed for deterministic behavior
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create a new GameRng with random entropy (non-deterministic)
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    /// Uniformly pick one element. `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    pub fn coin_flip(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    /// Generate a random f32 in the range [0.0, 1.0)
    pub fn random_f32(&mut self) -> f32 {
        self.rng.gen()
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_fields_increment_clamps() {
        let mut fields = CustomFields::default();
        assert_eq!(fields.increment("stage", 1, 2), 1);
        assert_eq!(fields.increment("stage", 1, 2), 2);
        assert_eq!(fields.increment("stage", 1, 2), 2);
        assert_eq!(fields.int("stage"), 2);
    }

    #[test]
    fn test_custom_fields_non_int_reads_zero() {
        let mut fields = CustomFields::default();
        fields.set("name", CustomValue::Text("ember".to_string()));
        assert_eq!(fields.int("name"), 0);
        assert_eq!(fields.int("missing"), 0);
        assert!(!fields.flag("missing"));
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let options = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut a = GameRng::from_seed(42);
        let mut b = GameRng::from_seed(42);
        for _ in 0..16 {
            assert_eq!(a.pick(&options), b.pick(&options));
        }
        assert_eq!(a.seed, Some(42));
    }

    #[test]
    fn test_pick_from_empty_is_none() {
        let mut rng = GameRng::from_seed(1);
        let empty: [u8; 0] = [];
        assert!(rng.pick(&empty).is_none());
    }
}
