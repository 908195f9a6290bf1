//! Combat effects and collaborator sinks
//!
//! The match core never applies damage or moves anything itself. Abilities
//! produce [`Effect`] values and hand them to an [`EffectSink`]; phase changes
//! move participants through a [`WorldSink`]. Both are owned by the host and
//! only report success or failure back.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::settings::Location;
use crate::states::play_match::{AbilityId, EntityId};

pub mod log;

/// What an effect does to its target(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Damage,
    Heal,
    Shield,
    Stun,
    Slow,
    Empower,
}

impl EffectKind {
    /// Beneficial effects default to the caster when no target is given.
    pub fn is_beneficial(&self) -> bool {
        matches!(self, EffectKind::Heal | EffectKind::Shield | EffectKind::Empower)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectTarget {
    Entity(EntityId),
    /// Everything within `radius` of `origin`; the sink resolves who that is.
    Area { origin: EntityId, radius: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub source: EntityId,
    pub ability: AbilityId,
    pub kind: EffectKind,
    pub magnitude: u32,
    pub target: EffectTarget,
}

/// Applies damage, healing and status effects in the host world.
pub trait EffectSink: Send + Sync {
    fn apply(&mut self, effect: &Effect) -> bool;
}

/// Places or teleports entities in the host world.
pub trait WorldSink: Send + Sync {
    fn place(&mut self, entity: EntityId, at: &Location) -> bool;
}

/// Sink that accepts everything and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EffectSink for NullSink {
    fn apply(&mut self, effect: &Effect) -> bool {
        tracing::trace!(source = %effect.source, ability = %effect.ability, "effect dropped by null sink");
        true
    }
}

impl WorldSink for NullSink {
    fn place(&mut self, entity: EntityId, at: &Location) -> bool {
        tracing::trace!(%entity, world = %at.world, "placement dropped by null sink");
        true
    }
}

/// Sink that records everything it receives. Cloning shares the record, so a
/// clone kept by the caller can inspect what the engine sent.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    effects: Arc<Mutex<Vec<Effect>>>,
    placements: Arc<Mutex<Vec<(EntityId, Location)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.effects
            .lock()
            .map(|effects| effects.clone())
            .unwrap_or_default()
    }

    pub fn placements(&self) -> Vec<(EntityId, Location)> {
        self.placements
            .lock()
            .map(|placements| placements.clone())
            .unwrap_or_default()
    }

    /// Effects sent by `source` for `ability`.
    pub fn count_for(&self, source: EntityId, ability: &str) -> usize {
        self.effects()
            .iter()
            .filter(|effect| effect.source == source && effect.ability.as_str() == ability)
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut effects) = self.effects.lock() {
            effects.clear();
        }
        if let Ok(mut placements) = self.placements.lock() {
            placements.clear();
        }
    }
}

impl EffectSink for RecordingSink {
    fn apply(&mut self, effect: &Effect) -> bool {
        match self.effects.lock() {
            Ok(mut effects) => {
                effects.push(effect.clone());
                true
            }
            Err(_) => false,
        }
    }
}

impl WorldSink for RecordingSink {
    fn place(&mut self, entity: EntityId, at: &Location) -> bool {
        match self.placements.lock() {
            Ok(mut placements) => {
                placements.push((entity, at.clone()));
                true
            }
            Err(_) => false,
        }
    }
}
