//! Skip-vote quorum.
//!
//! The requester of the current track skips unconditionally. Everyone else
//! votes, and the track is skipped once `quorum` distinct members voted.

use std::collections::HashSet;

use crate::ids::UserId;

pub const DEFAULT_SKIP_QUORUM: usize = 3;

#[derive(Debug, Default)]
pub struct SkipVotes {
    voters: HashSet<UserId>,
}

impl SkipVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the member had already voted.
    pub fn register(&mut self, user: UserId) -> bool {
        self.voters.insert(user)
    }

    pub fn count(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    pub fn clear(&mut self) {
        self.voters.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
    Advance,
    Counted { votes: usize, needed: usize },
    AlreadyVoted { votes: usize, needed: usize },
}

pub fn evaluate_skip(
    current_requester: UserId,
    user: UserId,
    votes: &mut SkipVotes,
    quorum: usize,
) -> SkipDecision {
    if user == current_requester {
        return SkipDecision::Advance;
    }
    if !votes.register(user) {
        return SkipDecision::AlreadyVoted {
            votes: votes.count(),
            needed: quorum,
        };
    }
    if votes.count() >= quorum {
        SkipDecision::Advance
    } else {
        SkipDecision::Counted {
            votes: votes.count(),
            needed: quorum,
        }
    }
}
