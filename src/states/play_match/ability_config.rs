//! Data-Driven Class Kits
//!
//! Class kits are defined in RON (`assets/config/classes.ron`). The built-in
//! file is embedded into the binary; a different file can be loaded at
//! startup to rebalance or replace kits.
//!
//! A kit is a [`ClassDefinition`] (the ability list) plus a small struct of
//! hook functions. The default hooks interpret ability shapes; a class that
//! needs bespoke behaviour swaps in its own functions with
//! [`KitRegistry::set_handlers`].
//!
//! ## Usage
//! ```ignore
//! let kits = KitRegistry::builtin()?;
//! let warrior = kits.get(ClassKind::Warrior).unwrap();
//! println!("{} has {} abilities", warrior.definition.name, warrior.definition.abilities.len());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::states::match_config::ClassKind;

use super::abilities::{act_by_shape, equip_by_shape, tick_by_shape, AbilityDef, AbilityId, AbilityOutcome, AbilityShape};
use super::components::EntityId;
use super::ports::AbilityContext;

const BUILTIN_CLASSES: &str = include_str!("../../../assets/config/classes.ron");

/// One class as written in the config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    /// Display name of the class
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub abilities: Vec<AbilityDef>,
}

impl ClassDefinition {
    pub fn ability(&self, id: &AbilityId) -> Option<&AbilityDef> {
        self.abilities.iter().find(|ability| ability.id == *id)
    }

    /// Abilities a player can trigger (Actions and Ultimates).
    pub fn triggerable(&self) -> impl Iterator<Item = &AbilityDef> {
        self.abilities.iter().filter(|ability| ability.shape.is_triggerable())
    }
}

/// Root structure for the classes.ron file
#[derive(Debug, Serialize, Deserialize)]
pub struct ClassesConfig {
    pub classes: HashMap<ClassKind, ClassDefinition>,
}

pub type EquipHook = fn(&ClassDefinition, &mut AbilityContext<'_>);
pub type PassiveTickHook = fn(&ClassDefinition, &AbilityDef, &mut AbilityContext<'_>);
pub type ActionHook = fn(&ClassDefinition, &AbilityDef, Option<EntityId>, &mut AbilityContext<'_>) -> AbilityOutcome;

/// The callbacks a kit plugs into the engine.
#[derive(Clone, Copy)]
pub struct ClassHandlers {
    /// Runs once when the class is assigned (and again on restore).
    pub on_equip: EquipHook,
    /// Runs each time one of the kit's scheduled tasks fires.
    pub on_passive_tick: PassiveTickHook,
    /// Runs when the owner triggers an ability.
    pub on_action: ActionHook,
}

impl Default for ClassHandlers {
    fn default() -> Self {
        Self {
            on_equip: equip_by_shape,
            on_passive_tick: tick_by_shape,
            on_action: act_by_shape,
        }
    }
}

impl std::fmt::Debug for ClassHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClassHandlers { .. }")
    }
}

#[derive(Clone, Debug)]
pub struct ClassKit {
    pub definition: ClassDefinition,
    pub handlers: ClassHandlers,
}

/// Every class kit, keyed by class kind.
#[derive(Clone, Debug, Default)]
pub struct KitRegistry {
    kits: HashMap<ClassKind, ClassKit>,
}

impl KitRegistry {
    /// Registry with no kits. Assigning any class will be rejected.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Kits from the embedded `classes.ron`.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_ron_str(BUILTIN_CLASSES, Path::new("assets/config/classes.ron"))
    }

    /// Kits from a RON file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_ron_str(&contents, path)?;
        tracing::info!(path = %path.display(), classes = registry.kits.len(), "loaded class kits");
        Ok(registry)
    }

    /// Parse and validate kits. `origin` is only used in error messages.
    pub fn from_ron_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: ClassesConfig = ron::from_str(contents).map_err(|source| ConfigError::Ron {
            path: origin.to_path_buf(),
            source,
        })?;
        let registry = Self::from_config(config);
        registry.validate().map_err(|problems| {
            ConfigError::Invalid(format!("{}: {}", origin.display(), problems.join("; ")))
        })?;
        Ok(registry)
    }

    pub fn from_config(config: ClassesConfig) -> Self {
        let kits = config
            .classes
            .into_iter()
            .map(|(kind, definition)| {
                (
                    kind,
                    ClassKit {
                        definition,
                        handlers: ClassHandlers::default(),
                    },
                )
            })
            .collect();
        Self { kits }
    }

    pub fn insert(&mut self, kind: ClassKind, definition: ClassDefinition) {
        self.kits.insert(
            kind,
            ClassKit {
                definition,
                handlers: ClassHandlers::default(),
            },
        );
    }

    /// Replace the hooks of an existing kit. Returns false if `kind` has no kit.
    pub fn set_handlers(&mut self, kind: ClassKind, handlers: ClassHandlers) -> bool {
        match self.kits.get_mut(&kind) {
            Some(kit) => {
                kit.handlers = handlers;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, kind: ClassKind) -> Option<&ClassKit> {
        self.kits.get(&kind)
    }

    pub fn contains(&self, kind: ClassKind) -> bool {
        self.kits.contains_key(&kind)
    }

    /// Class kinds with a kit, in declaration order.
    pub fn kinds(&self) -> Vec<ClassKind> {
        ClassKind::all()
            .iter()
            .copied()
            .filter(|kind| self.kits.contains_key(kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.kits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kits.is_empty()
    }

    /// Check that every class has a kit and every ability is well formed.
    /// Returns the list of problems found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        for kind in ClassKind::all() {
            if !self.kits.contains_key(kind) {
                problems.push(format!("missing kit for {:?}", kind));
            }
        }

        for (kind, kit) in &self.kits {
            let mut seen = HashSet::new();
            for ability in &kit.definition.abilities {
                if ability.id.is_empty() {
                    problems.push(format!("{:?}: ability with empty id", kind));
                } else if !seen.insert(ability.id.clone()) {
                    problems.push(format!("{:?}: duplicate ability id '{}'", kind, ability.id));
                }
                if let Some(problem) = shape_problem(&ability.shape) {
                    problems.push(format!("{:?}/{}: {}", kind, ability.id, problem));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            problems.sort();
            Err(problems)
        }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn shape_problem(shape: &AbilityShape) -> Option<&'static str> {
    match shape {
        AbilityShape::Action { cooldown_secs, .. } if !cooldown_secs.is_finite() || *cooldown_secs < 0.0 => {
            Some("cooldown must be a non-negative number")
        }
        AbilityShape::Ultimate { resource, .. } if resource.is_empty() => Some("ultimate needs a resource"),
        AbilityShape::Passive { resource, .. } if resource.is_empty() => Some("passive needs a resource"),
        AbilityShape::Passive { period_secs, .. } | AbilityShape::Pulse { period_secs, .. } if !positive(*period_secs) => {
            Some("period must be greater than 0")
        }
        AbilityShape::Evolution { interval_secs, .. } if !positive(*interval_secs) => {
            Some("interval must be greater than 0")
        }
        AbilityShape::Evolution { field, .. } if field.is_empty() => Some("evolution needs a field name"),
        AbilityShape::Evolution { max_stage, .. } if *max_stage < 0 => Some("max_stage must not be negative"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kits_are_valid() {
        let kits = KitRegistry::builtin().unwrap();
        assert_eq!(kits.len(), ClassKind::all().len());
        assert!(kits.validate().is_ok());
    }

    #[test]
    fn test_builtin_kits_cover_every_shape() {
        let kits = KitRegistry::builtin().unwrap();
        let mut shapes = HashSet::new();
        for kind in kits.kinds() {
            for ability in &kits.get(kind).unwrap().definition.abilities {
                shapes.insert(std::mem::discriminant(&ability.shape));
            }
        }
        assert_eq!(shapes.len(), 5);
    }

    #[test]
    fn test_missing_class_and_bad_period_reported() {
        let contents = r#"(
            classes: {
                Warrior: (
                    name: "Warrior",
                    abilities: [
                        (id: "rage", name: "Rage", shape: Passive(resource: "rage", amount: 1, period_secs: 0.0)),
                        (id: "rage", name: "Rage Again", shape: Action(cooldown_secs: 1.0, effect: Damage, magnitude: 1)),
                    ],
                ),
            },
        )"#;
        let err = KitRegistry::from_ron_str(contents, Path::new("test.ron")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing kit for Mage"));
        assert!(message.contains("duplicate ability id 'rage'"));
        assert!(message.contains("period must be greater than 0"));
    }

    #[test]
    fn test_set_handlers_requires_existing_kit() {
        let mut kits = KitRegistry::empty();
        assert!(!kits.set_handlers(ClassKind::Mage, ClassHandlers::default()));
        kits.insert(
            ClassKind::Mage,
            ClassDefinition {
                name: "Mage".to_string(),
                description: String::new(),
                abilities: Vec::new(),
            },
        );
        assert!(kits.set_handlers(ClassKind::Mage, ClassHandlers::default()));
    }
}
