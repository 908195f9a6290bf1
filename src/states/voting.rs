//! Voting Protocol
//!
//! One round of "every eligible entity picks one option". Used for the map
//! vote and the class-ban vote.
//!
//! ## Rules
//! - A vote from an ineligible entity, a second vote, or a vote for an option
//!   not on the ballot is rejected and changes nothing.
//! - The round completes when every eligible entity has voted. Eligible
//!   entities that leave are removed, which can complete the round.
//! - The option with strictly the most votes wins. Ties are broken by a
//!   uniform draw among the tied options.
//! - Completion is reported exactly once per `open`: through the return value
//!   of the call that completed the round and through the registered callback.
//!
//! There is no timeout. A round only ends when the last eligible voter votes
//! or leaves.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::Rejection;

use super::play_match::{EntityId, GameRng};

/// Final result of a round.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteResult<T> {
    pub winner: T,
    /// Votes per option, in ballot order
    pub tally: Vec<(T, usize)>,
    /// The winner was drawn among tied options.
    pub tie_broken: bool,
}

/// Outcome of an accepted vote.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteProgress<T> {
    Pending { cast: usize, needed: usize },
    Complete(VoteResult<T>),
}

type CompletionCallback<T> = Box<dyn FnMut(&VoteResult<T>) + Send + Sync>;

pub struct VotingProtocol<T> {
    eligible: BTreeSet<EntityId>,
    options: Vec<T>,
    votes: BTreeMap<EntityId, T>,
    open: bool,
    result: Option<VoteResult<T>>,
    on_complete: Option<CompletionCallback<T>>,
}

impl<T> Default for VotingProtocol<T> {
    fn default() -> Self {
        Self {
            eligible: BTreeSet::new(),
            options: Vec::new(),
            votes: BTreeMap::new(),
            open: false,
            result: None,
            on_complete: None,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for VotingProtocol<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VotingProtocol")
            .field("eligible", &self.eligible)
            .field("options", &self.options)
            .field("votes", &self.votes)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + fmt::Debug> VotingProtocol<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh round. Clears all votes and any previous result.
    pub fn open(&mut self, eligible: impl IntoIterator<Item = EntityId>, options: Vec<T>) {
        self.eligible = eligible.into_iter().collect();
        self.options = options;
        self.votes.clear();
        self.result = None;
        self.open = true;
        tracing::debug!(voters = self.eligible.len(), options = self.options.len(), "vote opened");
    }

    /// Register a callback run once when a round completes. Kept across rounds.
    pub fn on_complete(&mut self, callback: impl FnMut(&VoteResult<T>) + Send + Sync + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    pub fn cast_vote(&mut self, entity: EntityId, choice: T, rng: &mut GameRng) -> Result<VoteProgress<T>, Rejection> {
        if !self.open {
            return Err(Rejection::VotingClosed);
        }
        if !self.eligible.contains(&entity) {
            return Err(Rejection::NotEligible(entity));
        }
        if self.votes.contains_key(&entity) {
            return Err(Rejection::AlreadyVoted(entity));
        }
        if !self.options.contains(&choice) {
            return Err(Rejection::UnknownChoice);
        }

        tracing::debug!(%entity, ?choice, "vote cast");
        self.votes.insert(entity, choice);
        Ok(match self.try_complete(rng) {
            Some(result) => VoteProgress::Complete(result),
            None => VoteProgress::Pending {
                cast: self.votes.len(),
                needed: self.eligible.len(),
            },
        })
    }

    /// Drop a voter that left. Their vote, if any, is discarded.
    pub fn remove_eligible(&mut self, entity: EntityId, rng: &mut GameRng) -> Option<VoteResult<T>> {
        let was_eligible = self.eligible.remove(&entity);
        self.votes.remove(&entity);
        if was_eligible {
            self.try_complete(rng)
        } else {
            None
        }
    }

    /// Resolve the round if every remaining eligible entity has voted.
    pub fn try_complete(&mut self, rng: &mut GameRng) -> Option<VoteResult<T>> {
        if !self.open || self.votes.len() < self.eligible.len() {
            return None;
        }
        let result = self.resolve(rng)?;
        self.open = false;
        self.result = Some(result.clone());
        tracing::info!(winner = ?result.winner, tie_broken = result.tie_broken, "vote complete");
        if let Some(callback) = self.on_complete.as_mut() {
            callback(&result);
        }
        Some(result)
    }

    fn resolve(&self, rng: &mut GameRng) -> Option<VoteResult<T>> {
        let tally = self.tally();
        let best = tally.iter().map(|(_, count)| *count).max()?;
        let tied: Vec<&T> = tally
            .iter()
            .filter(|(_, count)| *count == best)
            .map(|(option, _)| option)
            .collect();
        let winner = (*rng.pick(&tied)?).clone();
        Some(VoteResult {
            winner,
            tie_broken: tied.len() > 1,
            tally,
        })
    }

    /// Votes per option, in ballot order.
    pub fn tally(&self) -> Vec<(T, usize)> {
        self.options
            .iter()
            .map(|option| {
                let count = self.votes.values().filter(|vote| *vote == option).count();
                (option.clone(), count)
            })
            .collect()
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn has_voted(&self, entity: EntityId) -> bool {
        self.votes.contains_key(&entity)
    }

    pub fn is_eligible(&self, entity: EntityId) -> bool {
        self.eligible.contains(&entity)
    }

    pub fn options(&self) -> &[T] {
        &self.options
    }

    pub fn votes_cast(&self) -> usize {
        self.votes.len()
    }

    /// Eligible entities that have not voted yet.
    pub fn waiting_on(&self) -> Vec<EntityId> {
        self.eligible
            .iter()
            .filter(|entity| !self.votes.contains_key(entity))
            .copied()
            .collect()
    }

    pub fn result(&self) -> Option<&VoteResult<T>> {
        self.result.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ids(raw: &[u64]) -> Vec<EntityId> {
        raw.iter().copied().map(EntityId).collect()
    }

    #[test]
    fn test_double_vote_rejected_and_tally_unchanged() {
        let mut rng = GameRng::from_seed(1);
        let mut vote = VotingProtocol::new();
        vote.open(ids(&[1, 2]), vec!["north", "south"]);

        vote.cast_vote(EntityId(1), "north", &mut rng).unwrap();
        let before = vote.tally();
        assert_eq!(
            vote.cast_vote(EntityId(1), "south", &mut rng),
            Err(Rejection::AlreadyVoted(EntityId(1)))
        );
        assert_eq!(vote.tally(), before);
    }

    #[test]
    fn test_ineligible_and_unknown_choice_rejected() {
        let mut rng = GameRng::from_seed(1);
        let mut vote = VotingProtocol::new();
        vote.open(ids(&[1]), vec!["north"]);
        assert_eq!(
            vote.cast_vote(EntityId(9), "north", &mut rng),
            Err(Rejection::NotEligible(EntityId(9)))
        );
        assert_eq!(vote.cast_vote(EntityId(1), "east", &mut rng), Err(Rejection::UnknownChoice));
        assert_eq!(vote.votes_cast(), 0);
    }

    #[test]
    fn test_majority_wins() {
        let mut rng = GameRng::from_seed(1);
        let mut vote = VotingProtocol::new();
        vote.open(ids(&[1, 2, 3]), vec!["north", "south"]);
        vote.cast_vote(EntityId(1), "south", &mut rng).unwrap();
        vote.cast_vote(EntityId(2), "north", &mut rng).unwrap();
        match vote.cast_vote(EntityId(3), "south", &mut rng).unwrap() {
            VoteProgress::Complete(result) => {
                assert_eq!(result.winner, "south");
                assert!(!result.tie_broken);
                assert_eq!(result.tally, vec![("north", 1), ("south", 2)]);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_callback_fires_once_per_round() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let mut rng = GameRng::from_seed(3);
        let mut vote = VotingProtocol::new();
        vote.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        vote.open(ids(&[1, 2]), vec!["north", "south"]);
        vote.cast_vote(EntityId(1), "north", &mut rng).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        vote.cast_vote(EntityId(2), "south", &mut rng).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Closed: later votes and leaves do not fire it again.
        assert_eq!(vote.cast_vote(EntityId(2), "north", &mut rng), Err(Rejection::VotingClosed));
        assert!(vote.remove_eligible(EntityId(1), &mut rng).is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        vote.open(ids(&[1]), vec!["north"]);
        vote.cast_vote(EntityId(1), "north", &mut rng).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_two_way_tie_resolves_to_one_of_them() {
        for seed in 0..20 {
            let mut rng = GameRng::from_seed(seed);
            let mut vote = VotingProtocol::new();
            vote.open(ids(&[1, 2]), vec!["north", "south", "west"]);
            assert!(matches!(
                vote.cast_vote(EntityId(1), "north", &mut rng),
                Ok(VoteProgress::Pending { cast: 1, needed: 2 })
            ));
            assert!(vote.result().is_none());
            let VoteProgress::Complete(result) = vote.cast_vote(EntityId(2), "west", &mut rng).unwrap() else {
                panic!("round should be complete");
            };
            assert!(result.tie_broken);
            assert!(result.winner == "north" || result.winner == "west");
        }
    }

    #[test]
    fn test_leaving_voter_can_complete_round() {
        let mut rng = GameRng::from_seed(5);
        let mut vote = VotingProtocol::new();
        vote.open(ids(&[1, 2, 3]), vec!["north", "south"]);
        vote.cast_vote(EntityId(1), "north", &mut rng).unwrap();
        vote.cast_vote(EntityId(2), "north", &mut rng).unwrap();
        assert_eq!(vote.waiting_on(), ids(&[3]));

        let result = vote.remove_eligible(EntityId(3), &mut rng).unwrap();
        assert_eq!(result.winner, "north");
        assert!(!vote.is_open());
    }
}
