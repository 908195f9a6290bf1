//! Ability System - Types and Shape Handlers
//!
//! Individual abilities are data (see `ability_config`). What the engine
//! understands is the *shape* an ability takes:
//!
//! - **Action**: cooldown-gated, single target or area
//! - **Ultimate**: gated on a resource threshold that it consumes
//! - **Passive**: periodic resource generator, optionally capped
//! - **Pulse**: periodic area effect around the owner
//! - **Evolution**: periodic stage counter kept in custom fields; each stage
//!   adds a flat bonus to the class's triggered abilities
//!
//! The `equip_by_shape`, `act_by_shape` and `tick_by_shape` functions are the
//! default kit hooks that interpret these shapes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::combat::{EffectKind, EffectTarget};

use super::ability_config::ClassDefinition;
use super::components::{CustomFields, CustomValue, EntityId};
use super::ports::AbilityContext;
use super::scheduler::{Repeat, TaskAction};

/// Stable identifier of an ability within a class kit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbilityId(String);

impl AbilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AbilityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a per-entity counter ("rage", "focus", "souls").
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ResourceKind {
    fn from(kind: &str) -> Self {
        Self(kind.to_string())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The interaction pattern an ability follows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AbilityShape {
    Action {
        cooldown_secs: f32,
        effect: EffectKind,
        magnitude: u32,
        /// Area radius around the caster. `None` means single target.
        #[serde(default)]
        radius: Option<f32>,
    },
    Ultimate {
        resource: ResourceKind,
        cost: u32,
        effect: EffectKind,
        magnitude: u32,
        #[serde(default)]
        radius: Option<f32>,
    },
    Passive {
        resource: ResourceKind,
        amount: u32,
        period_secs: f32,
        #[serde(default)]
        cap: Option<u32>,
    },
    Pulse {
        period_secs: f32,
        effect: EffectKind,
        magnitude: u32,
        radius: f32,
    },
    Evolution {
        field: String,
        interval_secs: f32,
        max_stage: i64,
        #[serde(default)]
        bonus_per_stage: u32,
    },
}

impl AbilityShape {
    /// Whether the ability is used on demand (as opposed to running on a timer).
    pub fn is_triggerable(&self) -> bool {
        matches!(self, AbilityShape::Action { .. } | AbilityShape::Ultimate { .. })
    }

    pub fn cooldown(&self) -> Option<Duration> {
        match self {
            AbilityShape::Action { cooldown_secs, .. } => Some(secs(*cooldown_secs)),
            _ => None,
        }
    }

    /// Period of timer-driven shapes.
    pub fn period(&self) -> Option<Duration> {
        match self {
            AbilityShape::Passive { period_secs, .. } | AbilityShape::Pulse { period_secs, .. } => {
                Some(secs(*period_secs))
            }
            AbilityShape::Evolution { interval_secs, .. } => Some(secs(*interval_secs)),
            _ => None,
        }
    }
}

/// One entry of a class kit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbilityDef {
    pub id: AbilityId,
    /// Display name of the ability
    pub name: String,
    pub shape: AbilityShape,
}

/// Result of trying to use an ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbilityOutcome {
    /// The ability fired. `effect_applied` is the sink's verdict.
    Used { effect_applied: bool },
    OnCooldown { remaining: Duration },
    InsufficientResource { have: u32, need: u32 },
    /// A harmful single-target ability was used without a target.
    NeedsTarget,
    /// Timer-driven abilities cannot be triggered.
    NotTriggerable,
    UnknownAbility,
}

impl AbilityOutcome {
    pub fn is_used(&self) -> bool {
        matches!(self, AbilityOutcome::Used { .. })
    }
}

/// Seconds from config to a `Duration`. Negative or non-finite values read as zero.
pub fn secs(value: f32) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f32(value.min(1.0e9))
    } else {
        Duration::ZERO
    }
}

/// Flat magnitude bonus from every evolution stage the kit has reached.
pub fn evolution_bonus(definition: &ClassDefinition, custom: &CustomFields) -> u32 {
    definition
        .abilities
        .iter()
        .filter_map(|ability| match &ability.shape {
            AbilityShape::Evolution {
                field,
                bonus_per_stage,
                ..
            } => {
                let stage = u32::try_from(custom.int(field).max(0)).unwrap_or(u32::MAX);
                Some(stage.saturating_mul(*bonus_per_stage))
            }
            _ => None,
        })
        .fold(0u32, u32::saturating_add)
}

fn resolve_target(
    caster: EntityId,
    effect: EffectKind,
    radius: Option<f32>,
    target: Option<EntityId>,
) -> Option<EffectTarget> {
    match (radius, target) {
        (Some(radius), _) => Some(EffectTarget::Area {
            origin: caster,
            radius,
        }),
        (None, Some(target)) => Some(EffectTarget::Entity(target)),
        (None, None) if effect.is_beneficial() => Some(EffectTarget::Entity(caster)),
        (None, None) => None,
    }
}

// ============================================================================
// Default Kit Hooks
// ============================================================================

/// Register the timer-driven abilities of a kit.
pub fn equip_by_shape(definition: &ClassDefinition, ctx: &mut AbilityContext<'_>) {
    for ability in &definition.abilities {
        // Restoring a reconnecting entity re-runs equip; keep reached stages.
        if let AbilityShape::Evolution { field, .. } = &ability.shape {
            if ctx.custom.get(field).is_none() {
                ctx.custom.set(field.clone(), CustomValue::Int(0));
            }
        }
        let Some(period) = ability.shape.period() else {
            continue;
        };
        if period.is_zero() {
            tracing::warn!(class = ?ctx.class, ability = %ability.id, "timer ability with zero period skipped");
            continue;
        }
        ctx.schedule_owned(
            ability.id.as_str(),
            period,
            Repeat::Every(period),
            TaskAction::KitTick {
                class: ctx.class,
                ability: ability.id.clone(),
            },
        );
    }
}

/// Trigger an Action or Ultimate.
pub fn act_by_shape(
    definition: &ClassDefinition,
    ability: &AbilityDef,
    target: Option<EntityId>,
    ctx: &mut AbilityContext<'_>,
) -> AbilityOutcome {
    let bonus = evolution_bonus(definition, ctx.custom);
    match &ability.shape {
        AbilityShape::Action {
            cooldown_secs,
            effect,
            magnitude,
            radius,
        } => {
            let cooldown = secs(*cooldown_secs);
            let remaining = ctx.cooldowns.cooldown_remaining(ctx.entity, &ability.id, cooldown);
            if !remaining.is_zero() {
                return AbilityOutcome::OnCooldown { remaining };
            }
            let Some(target) = resolve_target(ctx.entity, *effect, *radius, target) else {
                return AbilityOutcome::NeedsTarget;
            };
            ctx.cooldowns.start_cooldown(ctx.entity, &ability.id);
            let effect_applied = ctx.emit(&ability.id, *effect, magnitude.saturating_add(bonus), target);
            AbilityOutcome::Used { effect_applied }
        }
        AbilityShape::Ultimate {
            resource,
            cost,
            effect,
            magnitude,
            radius,
        } => {
            let Some(target) = resolve_target(ctx.entity, *effect, *radius, target) else {
                return AbilityOutcome::NeedsTarget;
            };
            if !ctx.resources.consume(ctx.entity, resource, i64::from(*cost)) {
                return AbilityOutcome::InsufficientResource {
                    have: ctx.resources.count(ctx.entity, resource),
                    need: *cost,
                };
            }
            let effect_applied = ctx.emit(&ability.id, *effect, magnitude.saturating_add(bonus), target);
            AbilityOutcome::Used { effect_applied }
        }
        _ => AbilityOutcome::NotTriggerable,
    }
}

/// Run one period of a Passive, Pulse or Evolution.
pub fn tick_by_shape(definition: &ClassDefinition, ability: &AbilityDef, ctx: &mut AbilityContext<'_>) {
    match &ability.shape {
        AbilityShape::Passive {
            resource,
            amount,
            cap,
            ..
        } => {
            ctx.resources.add(ctx.entity, resource, i64::from(*amount));
            if let Some(cap) = cap {
                ctx.resources.clamp(ctx.entity, resource, *cap);
            }
        }
        AbilityShape::Pulse {
            effect,
            magnitude,
            radius,
            ..
        } => {
            let bonus = evolution_bonus(definition, ctx.custom);
            let target = EffectTarget::Area {
                origin: ctx.entity,
                radius: *radius,
            };
            ctx.emit(&ability.id, *effect, magnitude.saturating_add(bonus), target);
        }
        AbilityShape::Evolution {
            field, max_stage, ..
        } => {
            let before = ctx.custom.int(field);
            let stage = ctx.custom.increment(field, 1, *max_stage);
            if stage != before {
                tracing::debug!(entity = %ctx.entity, class = ?ctx.class, field = %field, stage, "class evolved");
            }
        }
        AbilityShape::Action { .. } | AbilityShape::Ultimate { .. } => {
            tracing::debug!(ability = %ability.id, "kit tick for a triggered ability ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_rejects_bad_values() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f32::NAN), Duration::ZERO);
        assert_eq!(secs(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn test_shape_classification() {
        let action = AbilityShape::Action {
            cooldown_secs: 4.0,
            effect: EffectKind::Damage,
            magnitude: 5,
            radius: None,
        };
        let passive = AbilityShape::Passive {
            resource: ResourceKind::from("rage"),
            amount: 1,
            period_secs: 2.0,
            cap: None,
        };
        assert!(action.is_triggerable());
        assert_eq!(action.cooldown(), Some(Duration::from_secs(4)));
        assert!(!passive.is_triggerable());
        assert_eq!(passive.period(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_target_resolution() {
        let me = EntityId(1);
        assert_eq!(
            resolve_target(me, EffectKind::Heal, None, None),
            Some(EffectTarget::Entity(me))
        );
        assert_eq!(resolve_target(me, EffectKind::Damage, None, None), None);
        assert_eq!(
            resolve_target(me, EffectKind::Damage, Some(3.0), Some(EntityId(2))),
            Some(EffectTarget::Area {
                origin: me,
                radius: 3.0
            })
        );
    }
}
