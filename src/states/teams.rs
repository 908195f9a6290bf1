//! Team membership for team-mode matches

use std::collections::BTreeMap;

use super::match_config::Side;
use super::play_match::{EntityId, GameRng};

/// Side membership. Each entity is on at most one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Teams {
    sides: BTreeMap<EntityId, Side>,
}

impl Teams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `entity` on `side`. Returns the side it was on before.
    pub fn choose(&mut self, entity: EntityId, side: Side) -> Option<Side> {
        self.sides.insert(entity, side)
    }

    pub fn side_of(&self, entity: EntityId) -> Option<Side> {
        self.sides.get(&entity).copied()
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<Side> {
        self.sides.remove(&entity)
    }

    /// Members of `side` in ascending id order.
    pub fn members(&self, side: Side) -> Vec<EntityId> {
        self.sides
            .iter()
            .filter(|(_, s)| **s == side)
            .map(|(entity, _)| *entity)
            .collect()
    }

    /// Both sides have at least one member.
    pub fn is_balanced(&self) -> bool {
        !self.members(Side::A).is_empty() && !self.members(Side::B).is_empty()
    }

    /// Entities of `roster` that have not picked a side.
    pub fn unassigned(&self, roster: &[EntityId]) -> Vec<EntityId> {
        roster
            .iter()
            .copied()
            .filter(|entity| !self.sides.contains_key(entity))
            .collect()
    }

    /// Replace membership with a shuffled, alternating split of `roster`.
    /// Sizes differ by at most one.
    pub fn random_split(&mut self, roster: &[EntityId], rng: &mut GameRng) {
        let mut shuffled = roster.to_vec();
        shuffled.sort();
        rng.shuffle(&mut shuffled);
        let first = if rng.coin_flip() { Side::A } else { Side::B };
        self.sides.clear();
        for (i, entity) in shuffled.into_iter().enumerate() {
            let side = if i % 2 == 0 { first } else { first.other() };
            self.sides.insert(entity, side);
        }
    }

    pub fn clear(&mut self) {
        self.sides.clear();
    }

    pub fn len(&self) -> usize {
        self.sides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_side_per_entity() {
        let mut teams = Teams::new();
        assert_eq!(teams.choose(EntityId(1), Side::A), None);
        assert_eq!(teams.choose(EntityId(1), Side::B), Some(Side::A));
        assert_eq!(teams.members(Side::A), Vec::<EntityId>::new());
        assert_eq!(teams.members(Side::B), vec![EntityId(1)]);
        assert!(!teams.is_balanced());
    }

    #[test]
    fn test_random_split_is_balanced() {
        let roster: Vec<EntityId> = (1..=5).map(EntityId).collect();
        let mut teams = Teams::new();
        teams.random_split(&roster, &mut GameRng::from_seed(9));

        let a = teams.members(Side::A).len();
        let b = teams.members(Side::B).len();
        assert_eq!(a + b, 5);
        assert!(a.abs_diff(b) <= 1);
        assert!(teams.is_balanced());
        assert!(teams.unassigned(&roster).is_empty());
    }
}
