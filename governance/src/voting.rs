//! Ballots and vote receipts

use infravest_core::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::proposal::{ProposalId, Tally};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoteChoice::For => "for",
            VoteChoice::Against => "against",
            VoteChoice::Abstain => "abstain",
        };
        f.write_str(name)
    }
}

impl FromStr for VoteChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "for" | "yes" => Ok(VoteChoice::For),
            "against" | "no" => Ok(VoteChoice::Against),
            "abstain" => Ok(VoteChoice::Abstain),
            other => Err(format!("unknown vote choice: {}", other)),
        }
    }
}

/// One voter's ballot on one proposal. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub proposal_id: ProposalId,
    pub voter: Address,
    pub choice: VoteChoice,
    /// Token weight captured when the ballot was cast
    pub weight: u64,
    pub reason: Option<String>,
    pub cast_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub ballot: Ballot,
    /// Proposal tally after this ballot was counted
    pub tally: Tally,
}

/// Tally rebuilt from a set of ballots
pub fn tally_ballots<'a>(ballots: impl IntoIterator<Item = &'a Ballot>) -> Option<Tally> {
    ballots
        .into_iter()
        .try_fold(Tally::default(), |tally, ballot| tally.with_vote(ballot.choice, ballot.weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(voter: &str, choice: VoteChoice, weight: u64) -> Ballot {
        Ballot {
            proposal_id: 1,
            voter: Address::from(voter),
            choice,
            weight,
            reason: None,
            cast_at: 20,
        }
    }

    #[test]
    fn test_tally_from_ballots() {
        let ballots = vec![
            ballot("a", VoteChoice::For, 200),
            ballot("b", VoteChoice::Against, 50),
            ballot("c", VoteChoice::Abstain, 25),
            ballot("d", VoteChoice::For, 100),
        ];
        let tally = tally_ballots(&ballots).unwrap();
        assert_eq!(tally.for_votes, 300);
        assert_eq!(tally.against_votes, 50);
        assert_eq!(tally.abstain_votes, 25);
        assert_eq!(tally.total(), ballots.iter().map(|b| b.weight).sum::<u64>());
    }

    #[test]
    fn test_choice_parsing() {
        assert_eq!("FOR".parse::<VoteChoice>().unwrap(), VoteChoice::For);
        assert_eq!("no".parse::<VoteChoice>().unwrap(), VoteChoice::Against);
        assert!("maybe".parse::<VoteChoice>().is_err());
        assert_eq!(serde_json::to_string(&VoteChoice::Abstain).unwrap(), "\"abstain\"");
    }
}
