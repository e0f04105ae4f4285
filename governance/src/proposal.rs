//! Proposal types and state derivation

use infravest_core::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::voting::VoteChoice;

/// Monotonic proposal identifier, starting at 1
pub type ProposalId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    /// Created, voting window not yet open
    Pending,
    /// Voting window open
    Active,
    /// Withdrawn by the proposer
    Canceled,
    /// Window closed without majority or quorum
    Defeated,
    /// Window closed with majority and quorum; awaiting execution
    Succeeded,
    /// Payload handed to the executor
    Executed,
}

impl ProposalState {
    pub fn name(self) -> &'static str {
        match self {
            ProposalState::Pending => "pending",
            ProposalState::Active => "active",
            ProposalState::Canceled => "canceled",
            ProposalState::Defeated => "defeated",
            ProposalState::Succeeded => "succeeded",
            ProposalState::Executed => "executed",
        }
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProposalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ProposalState::Pending),
            "active" => Ok(ProposalState::Active),
            "canceled" | "cancelled" => Ok(ProposalState::Canceled),
            "defeated" => Ok(ProposalState::Defeated),
            "succeeded" => Ok(ProposalState::Succeeded),
            "executed" => Ok(ProposalState::Executed),
            other => Err(format!("unknown proposal state: {}", other)),
        }
    }
}

/// Cast voting weight per choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub for_votes: u64,
    pub against_votes: u64,
    pub abstain_votes: u64,
}

impl Tally {
    pub fn total(&self) -> u64 {
        self.for_votes
            .saturating_add(self.against_votes)
            .saturating_add(self.abstain_votes)
    }

    /// Tally with one more ballot applied; `None` on overflow
    pub fn with_vote(&self, choice: VoteChoice, weight: u64) -> Option<Tally> {
        let mut next = *self;
        let bucket = match choice {
            VoteChoice::For => &mut next.for_votes,
            VoteChoice::Against => &mut next.against_votes,
            VoteChoice::Abstain => &mut next.abstain_votes,
        };
        *bucket = bucket.checked_add(weight)?;
        next.for_votes
            .checked_add(next.against_votes)?
            .checked_add(next.abstain_votes)?;
        Some(next)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub proposer: Address,
    pub created_at: Timestamp,
    pub voting_start: Timestamp,
    pub voting_end: Timestamp,
    /// Action to perform once passed; interpreted only by the executor
    pub payload: serde_json::Value,
    /// Cast weight required, fixed at creation
    pub quorum_votes: u64,
    pub total_supply_at_creation: u64,
    pub tally: Tally,
    pub canceled_at: Option<Timestamp>,
    pub executed_at: Option<Timestamp>,
}

impl Proposal {
    /// Lifecycle state at `now`. Depends only on stored fields and `now`.
    pub fn state_at(&self, now: Timestamp) -> ProposalState {
        if self.canceled_at.is_some() {
            return ProposalState::Canceled;
        }
        if self.executed_at.is_some() {
            return ProposalState::Executed;
        }
        if now < self.voting_start {
            return ProposalState::Pending;
        }
        if now <= self.voting_end {
            return ProposalState::Active;
        }
        if self.passed() {
            ProposalState::Succeeded
        } else {
            ProposalState::Defeated
        }
    }

    pub fn quorum_reached(&self) -> bool {
        self.tally.total() >= self.quorum_votes
    }

    /// Strict for-over-against majority with quorum met. Abstentions count
    /// toward quorum only.
    pub fn passed(&self) -> bool {
        self.tally.for_votes > self.tally.against_votes && self.quorum_reached()
    }
}

/// Proposal together with its derived state, as served to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub state: ProposalState,
    pub quorum_reached: bool,
    pub ballot_count: usize,
}
