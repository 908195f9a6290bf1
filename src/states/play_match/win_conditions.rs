//! Win Condition Evaluation
//!
//! Run after every elimination while the match is Active. Counts who is
//! still standing and decides whether the match is over.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::states::match_config::{MatchMode, Side};
use crate::states::teams::Teams;

use super::components::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// Last participant standing (solo)
    Winner(EntityId),
    /// Last side standing (team)
    SideWins(Side),
    /// Nobody left
    Draw,
    /// Ended without a result (forced end, empty roster)
    Aborted { reason: String },
}

/// Decide the match, or `None` if it continues.
pub fn evaluate(
    mode: MatchMode,
    participants: &BTreeSet<EntityId>,
    eliminated: &BTreeSet<EntityId>,
    teams: &Teams,
) -> Option<MatchOutcome> {
    let standing: Vec<EntityId> = participants.difference(eliminated).copied().collect();
    match mode {
        MatchMode::Solo => match standing.as_slice() {
            [] => Some(MatchOutcome::Draw),
            [last] => Some(MatchOutcome::Winner(*last)),
            _ => None,
        },
        MatchMode::Team => {
            let sides: BTreeSet<Side> = standing.iter().filter_map(|entity| teams.side_of(*entity)).collect();
            let sides: Vec<Side> = sides.into_iter().collect();
            match sides.as_slice() {
                [] => Some(MatchOutcome::Draw),
                [side] => Some(MatchOutcome::SideWins(*side)),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(raw: &[u64]) -> BTreeSet<EntityId> {
        raw.iter().copied().map(EntityId).collect()
    }

    #[test]
    fn test_solo_last_standing_wins() {
        let everyone = set(&[1, 2, 3, 4]);
        let teams = Teams::new();
        assert_eq!(evaluate(MatchMode::Solo, &everyone, &set(&[1, 2]), &teams), None);
        assert_eq!(
            evaluate(MatchMode::Solo, &everyone, &set(&[1, 2, 3]), &teams),
            Some(MatchOutcome::Winner(EntityId(4)))
        );
        assert_eq!(
            evaluate(MatchMode::Solo, &everyone, &set(&[1, 2, 3, 4]), &teams),
            Some(MatchOutcome::Draw)
        );
    }

    #[test]
    fn test_team_last_side_wins() {
        let everyone = set(&[1, 2, 3, 4]);
        let mut teams = Teams::new();
        teams.choose(EntityId(1), Side::A);
        teams.choose(EntityId(2), Side::A);
        teams.choose(EntityId(3), Side::B);
        teams.choose(EntityId(4), Side::B);

        assert_eq!(evaluate(MatchMode::Team, &everyone, &set(&[1, 3]), &teams), None);
        assert_eq!(
            evaluate(MatchMode::Team, &everyone, &set(&[1, 2, 3]), &teams),
            Some(MatchOutcome::SideWins(Side::B))
        );
        assert_eq!(
            evaluate(MatchMode::Team, &everyone, &set(&[1, 2, 3, 4]), &teams),
            Some(MatchOutcome::Draw)
        );
    }
}
