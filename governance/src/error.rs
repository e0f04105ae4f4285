//! Governance error types

use infravest_claims::ClaimTopic;
use infravest_core::{Address, LedgerError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::proposal::{ProposalId, ProposalState};

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Proposal not found: {0}")]
    NotFound(ProposalId),

    #[error("{0} holds no voting weight")]
    NotATokenHolder(Address),

    #[error("{account} is missing required claims: {missing:?}")]
    NotEligible {
        account: Address,
        missing: Vec<ClaimTopic>,
    },

    #[error("{voter} already voted on proposal {proposal_id}")]
    AlreadyVoted {
        proposal_id: ProposalId,
        voter: Address,
    },

    #[error("Proposal {proposal_id} is not active (state: {state})")]
    ProposalNotActive {
        proposal_id: ProposalId,
        state: ProposalState,
    },

    #[error("{requester} is not the proposer of proposal {proposal_id}")]
    NotAuthorizedToCancel {
        proposal_id: ProposalId,
        requester: Address,
    },

    #[error("Cannot {operation} proposal {proposal_id} in state {state}")]
    InvalidState {
        proposal_id: ProposalId,
        state: ProposalState,
        operation: &'static str,
    },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(#[from] LedgerError),

    #[error("Execution of proposal {proposal_id} failed: {reason}")]
    ExecutionFailed {
        proposal_id: ProposalId,
        reason: String,
    },

    #[error("Tally overflow on proposal {0}")]
    TallyOverflow(ProposalId),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GovernanceError {
    /// Stable client-facing error code
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::NotFound(_) => "NOT_FOUND",
            GovernanceError::NotATokenHolder(_) => "NOT_A_TOKEN_HOLDER",
            GovernanceError::NotEligible { .. } => "NOT_ELIGIBLE",
            GovernanceError::AlreadyVoted { .. } => "ALREADY_VOTED",
            GovernanceError::ProposalNotActive { .. } => "PROPOSAL_NOT_ACTIVE",
            GovernanceError::NotAuthorizedToCancel { .. } => "NOT_AUTHORIZED_TO_CANCEL",
            GovernanceError::InvalidState { .. } => "INVALID_STATE",
            GovernanceError::InvalidProposal(_) => "INVALID_PROPOSAL",
            GovernanceError::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            GovernanceError::ExecutionFailed { .. } => "EXECUTION_FAILED",
            GovernanceError::TallyOverflow(_) => "TALLY_OVERFLOW",
            GovernanceError::CorruptSnapshot(_) => "CORRUPT_SNAPSHOT",
            GovernanceError::Config(_) => "INVALID_CONFIG",
            GovernanceError::Io(_) | GovernanceError::Serialization(_) => "STORAGE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
