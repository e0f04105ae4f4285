//! Hook for applying a passed proposal's payload
//!
//! The engine never interprets payloads. Whatever performs the action
//! (treasury transfer, parameter change, off-chain workflow) implements
//! `ProposalExecutor` and is invoked once per succeeded proposal.

use crate::proposal::Proposal;

pub type ExecutionError = Box<dyn std::error::Error + Send + Sync>;

pub trait ProposalExecutor: Send + Sync {
    fn execute(&self, proposal: &Proposal) -> Result<(), ExecutionError>;
}

impl<F> ProposalExecutor for F
where
    F: Fn(&Proposal) -> Result<(), ExecutionError> + Send + Sync,
{
    fn execute(&self, proposal: &Proposal) -> Result<(), ExecutionError> {
        self(proposal)
    }
}
