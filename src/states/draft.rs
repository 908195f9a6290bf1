//! Draft Protocol
//!
//! Team-mode class picking. Turns alternate between the two sides in snake
//! order: the first side picks, then the second side picks twice, then the
//! first side twice, and so on (A, B, B, A, A, B, ...). A side that has run
//! out of members is skipped, so the sequence length is always |A| + |B|.
//!
//! Only an accepted pick advances the turn.

use std::collections::{BTreeSet, VecDeque};

use crate::error::Rejection;

use super::match_config::{ClassKind, Side};
use super::play_match::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftPick {
    pub entity: EntityId,
    pub side: Side,
    pub kind: ClassKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftProgress {
    /// `next` picks now.
    Next(EntityId),
    Complete,
}

#[derive(Debug, Clone)]
pub struct DraftProtocol {
    order: Vec<(Side, EntityId)>,
    index: usize,
    picks: Vec<DraftPick>,
    banned: BTreeSet<ClassKind>,
}

/// Build the snake turn sequence for two rosters.
pub fn snake_order(side_a: &[EntityId], side_b: &[EntityId], first: Side) -> Vec<(Side, EntityId)> {
    let mut queues = [
        (Side::A, side_a.iter().copied().collect::<VecDeque<_>>()),
        (Side::B, side_b.iter().copied().collect::<VecDeque<_>>()),
    ];
    if first == Side::B {
        queues.swap(0, 1);
    }

    let mut order = Vec::with_capacity(side_a.len() + side_b.len());
    let mut round = 0usize;
    while queues.iter().any(|(_, queue)| !queue.is_empty()) {
        let slots = if round % 2 == 0 { [0, 1] } else { [1, 0] };
        for slot in slots {
            let (side, queue) = &mut queues[slot];
            if let Some(entity) = queue.pop_front() {
                order.push((*side, entity));
            }
        }
        round += 1;
    }
    order
}

impl DraftProtocol {
    /// Start a draft. `None` if either side is empty.
    pub fn new(
        side_a: &[EntityId],
        side_b: &[EntityId],
        first: Side,
        banned: &[ClassKind],
    ) -> Option<Self> {
        if side_a.is_empty() || side_b.is_empty() {
            return None;
        }
        Some(Self {
            order: snake_order(side_a, side_b, first),
            index: 0,
            picks: Vec::new(),
            banned: banned.iter().copied().collect(),
        })
    }

    /// Whose turn it is. `None` once every turn has been used.
    pub fn current_picker(&self) -> Option<EntityId> {
        self.order.get(self.index).map(|(_, entity)| *entity)
    }

    pub fn current_side(&self) -> Option<Side> {
        self.order.get(self.index).map(|(side, _)| *side)
    }

    pub fn submit_pick(&mut self, entity: EntityId, kind: ClassKind) -> Result<DraftProgress, Rejection> {
        let Some((side, picker)) = self.order.get(self.index).copied() else {
            return Err(Rejection::DraftComplete);
        };
        if picker != entity {
            return Err(Rejection::NotYourTurn(entity));
        }
        if self.banned.contains(&kind) {
            return Err(Rejection::ClassBanned(kind));
        }
        if let Some(holder) = self.taken_on_side(kind, side) {
            return Err(Rejection::ClassTaken { kind, side, holder });
        }

        self.picks.push(DraftPick { entity, side, kind });
        self.index += 1;
        tracing::debug!(%entity, ?side, class = ?kind, turn = self.index, "draft pick accepted");
        Ok(self.progress())
    }

    /// Drop the remaining turns of an entity that left.
    pub fn remove_entity(&mut self, entity: EntityId) -> DraftProgress {
        let upcoming = self.order.split_off(self.index);
        self.order
            .extend(upcoming.into_iter().filter(|(_, e)| *e != entity));
        self.progress()
    }

    pub fn progress(&self) -> DraftProgress {
        match self.current_picker() {
            Some(next) => DraftProgress::Next(next),
            None => DraftProgress::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.order.len()
    }

    pub fn taken_on_side(&self, kind: ClassKind, side: Side) -> Option<EntityId> {
        self.picks
            .iter()
            .find(|pick| pick.kind == kind && pick.side == side)
            .map(|pick| pick.entity)
    }

    pub fn picks(&self) -> &[DraftPick] {
        &self.picks
    }

    pub fn turn_order(&self) -> &[(Side, EntityId)] {
        &self.order
    }

    pub fn turn_index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a1() -> EntityId {
        EntityId(1)
    }
    fn a2() -> EntityId {
        EntityId(2)
    }
    fn b1() -> EntityId {
        EntityId(10)
    }

    #[test]
    fn test_snake_order_two_vs_one() {
        let order = snake_order(&[a1(), a2()], &[b1()], Side::A);
        assert_eq!(order, vec![(Side::A, a1()), (Side::B, b1()), (Side::A, a2())]);
    }

    #[test]
    fn test_snake_order_reverses_each_round() {
        let a: Vec<EntityId> = (1..=3).map(EntityId).collect();
        let b: Vec<EntityId> = (10..=12).map(EntityId).collect();
        let sides: Vec<Side> = snake_order(&a, &b, Side::A).into_iter().map(|(s, _)| s).collect();
        assert_eq!(sides, vec![Side::A, Side::B, Side::B, Side::A, Side::A, Side::B]);

        let sides: Vec<Side> = snake_order(&a, &b, Side::B).into_iter().map(|(s, _)| s).collect();
        assert_eq!(sides, vec![Side::B, Side::A, Side::A, Side::B, Side::B, Side::A]);
    }

    #[test]
    fn test_out_of_turn_pick_rejected() {
        let mut draft = DraftProtocol::new(&[a1(), a2()], &[b1()], Side::A, &[]).unwrap();
        assert_eq!(
            draft.submit_pick(b1(), ClassKind::Mage),
            Err(Rejection::NotYourTurn(b1()))
        );
        assert_eq!(draft.turn_index(), 0);
        assert_eq!(draft.current_picker(), Some(a1()));
    }

    #[test]
    fn test_side_uniqueness_and_ban() {
        let mut draft = DraftProtocol::new(&[a1(), a2()], &[b1()], Side::A, &[ClassKind::Rogue]).unwrap();
        assert_eq!(draft.submit_pick(a1(), ClassKind::Mage), Ok(DraftProgress::Next(b1())));
        // The other side may take the same class.
        assert_eq!(draft.submit_pick(b1(), ClassKind::Mage), Ok(DraftProgress::Next(a2())));
        assert_eq!(
            draft.submit_pick(a2(), ClassKind::Mage),
            Err(Rejection::ClassTaken {
                kind: ClassKind::Mage,
                side: Side::A,
                holder: a1()
            })
        );
        assert_eq!(draft.submit_pick(a2(), ClassKind::Rogue), Err(Rejection::ClassBanned(ClassKind::Rogue)));
        assert_eq!(draft.submit_pick(a2(), ClassKind::Priest), Ok(DraftProgress::Complete));
        assert!(draft.is_complete());
        assert_eq!(draft.submit_pick(a2(), ClassKind::Hunter), Err(Rejection::DraftComplete));
    }

    #[test]
    fn test_departure_drops_remaining_turns() {
        let mut draft = DraftProtocol::new(&[a1(), a2()], &[b1()], Side::A, &[]).unwrap();
        draft.submit_pick(a1(), ClassKind::Warrior).unwrap();
        assert_eq!(draft.remove_entity(b1()), DraftProgress::Next(a2()));
        assert_eq!(draft.remove_entity(a2()), DraftProgress::Complete);
        assert_eq!(draft.picks().len(), 1);
    }

    #[test]
    fn test_empty_side_refused() {
        assert!(DraftProtocol::new(&[a1()], &[], Side::A, &[]).is_none());
    }
}
