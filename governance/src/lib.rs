//! Infravest Governance Module
//!
//! Runs the proposal and voting state machine that lets verified token
//! holders govern a project:
//! - Proposals weighted by token balance, quorum captured at creation
//! - Exactly-once ballots per (proposal, voter)
//! - Optional claim gating for proposers and voters
//! - Proposal state derived from stored fields and the injected clock

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod proposal;
pub mod voting;

pub use config::{ConfigError, GovernanceConfig, WeightSource};
pub use engine::{GovernanceEngine, GovernanceSnapshot, NewProposal, ProposalRecord};
pub use error::{GovernanceError, Result};
pub use executor::{ExecutionError, ProposalExecutor};
pub use proposal::{Proposal, ProposalId, ProposalState, ProposalView, Tally};
pub use voting::{Ballot, VoteChoice, VoteReceipt};
