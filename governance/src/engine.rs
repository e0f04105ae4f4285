//! Governance engine
//!
//! Owns the proposal store and drives the voting state machine. Each
//! proposal sits behind its own mutex: the "not yet voted" check, ballot
//! insert and tally update happen under one lock, while different
//! proposals are mutated independently.

use dashmap::DashMap;
use infravest_claims::{EligibilityEvaluator, TopicSet};
use infravest_core::{Address, Clock, TokenLedger};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{ConfigError, GovernanceConfig, WeightSource};
use crate::error::{GovernanceError, Result};
use crate::executor::ProposalExecutor;
use crate::proposal::{Proposal, ProposalId, ProposalState, ProposalView, Tally};
use crate::voting::{tally_ballots, Ballot, VoteChoice, VoteReceipt};

/// Parameters for a new proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposal {
    pub proposer: Address,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Falls back to the configured voting period
    #[serde(default)]
    pub voting_period: Option<u64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A proposal and every ballot cast on it, keyed by voter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub proposal: Proposal,
    pub ballots: BTreeMap<Address, Ballot>,
}

impl ProposalRecord {
    fn view(&self, now: u64) -> ProposalView {
        ProposalView {
            proposal: self.proposal.clone(),
            state: self.proposal.state_at(now),
            quorum_reached: self.proposal.quorum_reached(),
            ballot_count: self.ballots.len(),
        }
    }
}

/// Persisted shape of the proposal and ballot collections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceSnapshot {
    pub next_proposal_id: ProposalId,
    pub proposals: Vec<ProposalRecord>,
}

pub struct GovernanceEngine {
    config: GovernanceConfig,
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    eligibility: Option<EligibilityEvaluator>,
    next_id: AtomicU64,
    proposals: DashMap<ProposalId, Arc<Mutex<ProposalRecord>>>,
}

impl GovernanceEngine {
    /// Build an engine. Claim gating requires an eligibility evaluator.
    pub fn new(
        config: GovernanceConfig,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
        eligibility: Option<EligibilityEvaluator>,
    ) -> Result<Self> {
        config.validate()?;
        if config.claim_gating_enabled && eligibility.is_none() {
            return Err(ConfigError::Invalid(
                "claim gating is enabled but no eligibility evaluator was provided".to_string(),
            )
            .into());
        }

        Ok(GovernanceEngine {
            config,
            ledger,
            clock,
            eligibility,
            next_id: AtomicU64::new(1),
            proposals: DashMap::new(),
        })
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Create a proposal. The proposer must hold voting weight and, when
    /// gating is on, the configured proposal claims. Quorum is fixed here
    /// from the current total supply.
    pub fn create_proposal(&self, request: NewProposal) -> Result<ProposalId> {
        let NewProposal {
            proposer,
            title,
            description,
            voting_period,
            payload,
        } = request;

        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(GovernanceError::InvalidProposal(
                "title must not be empty".to_string(),
            ));
        }
        let voting_period = voting_period.unwrap_or(self.config.voting_period);
        if voting_period == 0 || voting_period > self.config.max_voting_period {
            return Err(GovernanceError::InvalidProposal(format!(
                "voting period must be between 1 and {} seconds, got {}",
                self.config.max_voting_period, voting_period
            )));
        }

        if self.ledger.balance(&proposer)? == 0 {
            return Err(GovernanceError::NotATokenHolder(proposer));
        }
        self.require_claims(&proposer, &self.config.required_proposal_claims)?;

        let total_supply = self.ledger.total_supply()?;
        let quorum_votes = self.config.quorum_for(total_supply);

        let now = self.clock.now();
        let voting_start = now.saturating_add(self.config.voting_delay);
        let voting_end = voting_start.saturating_add(voting_period);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let proposal = Proposal {
            id,
            title,
            description,
            proposer,
            created_at: now,
            voting_start,
            voting_end,
            payload,
            quorum_votes,
            total_supply_at_creation: total_supply,
            tally: Tally::default(),
            canceled_at: None,
            executed_at: None,
        };

        log::info!(
            "📋 Proposal {} created by {}: \"{}\" (voting {}..={}, quorum {} of {})",
            id,
            proposal.proposer,
            proposal.title,
            voting_start,
            voting_end,
            quorum_votes,
            total_supply
        );

        self.proposals.insert(
            id,
            Arc::new(Mutex::new(ProposalRecord {
                proposal,
                ballots: BTreeMap::new(),
            })),
        );
        Ok(id)
    }

    /// Cast a ballot. Checks, in order: proposal exists, voting is open,
    /// voter has not voted, voter holds weight, voter holds the configured
    /// vote claims. Nothing is recorded unless every check passes.
    pub fn cast_vote(
        &self,
        proposal_id: ProposalId,
        voter: &Address,
        choice: VoteChoice,
        reason: Option<String>,
    ) -> Result<VoteReceipt> {
        let entry = self.record(proposal_id)?;
        let mut record = entry.lock();
        let now = self.clock.now();

        let state = record.proposal.state_at(now);
        if state != ProposalState::Active {
            return Err(GovernanceError::ProposalNotActive { proposal_id, state });
        }
        if record.ballots.contains_key(voter) {
            return Err(GovernanceError::AlreadyVoted {
                proposal_id,
                voter: voter.clone(),
            });
        }

        let weight = match self.config.weight_source {
            WeightSource::Live => self.ledger.balance(voter)?,
            WeightSource::SnapshotAtVotingStart => {
                self.ledger.balance_at(voter, record.proposal.voting_start)?
            }
        };
        if weight == 0 {
            return Err(GovernanceError::NotATokenHolder(voter.clone()));
        }
        self.require_claims(voter, &self.config.required_vote_claims)?;

        let tally = record
            .proposal
            .tally
            .with_vote(choice, weight)
            .ok_or(GovernanceError::TallyOverflow(proposal_id))?;

        let ballot = Ballot {
            proposal_id,
            voter: voter.clone(),
            choice,
            weight,
            reason: reason.filter(|r| !r.trim().is_empty()),
            cast_at: now,
        };
        record.proposal.tally = tally;
        record.ballots.insert(voter.clone(), ballot.clone());

        log::info!(
            "🗳️  {} voted {} on proposal {} with weight {}",
            voter,
            choice,
            proposal_id,
            weight
        );
        Ok(VoteReceipt { ballot, tally })
    }

    /// Cancel a proposal. Only the proposer may cancel, and only while it is
    /// pending or active with no ballots cast.
    pub fn cancel_proposal(&self, proposal_id: ProposalId, requester: &Address) -> Result<Proposal> {
        let entry = self.record(proposal_id)?;
        let mut record = entry.lock();

        if record.proposal.proposer != *requester {
            return Err(GovernanceError::NotAuthorizedToCancel {
                proposal_id,
                requester: requester.clone(),
            });
        }

        let now = self.clock.now();
        let state = record.proposal.state_at(now);
        let cancellable = match state {
            ProposalState::Pending => true,
            ProposalState::Active => record.ballots.is_empty(),
            _ => false,
        };
        if !cancellable {
            return Err(GovernanceError::InvalidState {
                proposal_id,
                state,
                operation: "cancel",
            });
        }

        record.proposal.canceled_at = Some(now);
        log::info!("Proposal {} canceled by {}", proposal_id, requester);
        Ok(record.proposal.clone())
    }

    /// Hand a succeeded proposal to `executor`. On executor failure the
    /// proposal stays `Succeeded` and may be retried.
    pub fn execute_proposal(
        &self,
        proposal_id: ProposalId,
        executor: &dyn ProposalExecutor,
    ) -> Result<Proposal> {
        let entry = self.record(proposal_id)?;
        let mut record = entry.lock();
        let now = self.clock.now();

        let state = record.proposal.state_at(now);
        if state != ProposalState::Succeeded {
            return Err(GovernanceError::InvalidState {
                proposal_id,
                state,
                operation: "execute",
            });
        }

        if let Err(e) = executor.execute(&record.proposal) {
            log::warn!("⚠️  Execution of proposal {} failed: {}", proposal_id, e);
            return Err(GovernanceError::ExecutionFailed {
                proposal_id,
                reason: e.to_string(),
            });
        }

        record.proposal.executed_at = Some(now);
        log::info!("✅ Proposal {} executed", proposal_id);
        Ok(record.proposal.clone())
    }

    pub fn state(&self, proposal_id: ProposalId) -> Result<ProposalState> {
        let entry = self.record(proposal_id)?;
        let record = entry.lock();
        Ok(record.proposal.state_at(self.clock.now()))
    }

    pub fn proposal(&self, proposal_id: ProposalId) -> Result<ProposalView> {
        let entry = self.record(proposal_id)?;
        let record = entry.lock();
        Ok(record.view(self.clock.now()))
    }

    /// All proposals in id order, optionally only those in `status`
    pub fn list_proposals(&self, status: Option<ProposalState>) -> Vec<ProposalView> {
        let now = self.clock.now();
        self.entries()
            .into_iter()
            .map(|entry| entry.lock().view(now))
            .filter(|view| status.map_or(true, |wanted| view.state == wanted))
            .collect()
    }

    /// Ids of proposals whose voting window is open now
    pub fn active_proposals(&self) -> Vec<ProposalId> {
        self.list_proposals(Some(ProposalState::Active))
            .into_iter()
            .map(|view| view.proposal.id)
            .collect()
    }

    pub fn quorum_reached(&self, proposal_id: ProposalId) -> Result<bool> {
        let entry = self.record(proposal_id)?;
        let reached = entry.lock().proposal.quorum_reached();
        Ok(reached)
    }

    pub fn tally(&self, proposal_id: ProposalId) -> Result<Tally> {
        let entry = self.record(proposal_id)?;
        let tally = entry.lock().proposal.tally;
        Ok(tally)
    }

    /// Ballots on a proposal in the order they were cast
    pub fn ballots(&self, proposal_id: ProposalId) -> Result<Vec<Ballot>> {
        let entry = self.record(proposal_id)?;
        let mut ballots: Vec<Ballot> = entry.lock().ballots.values().cloned().collect();
        ballots.sort_by(|a, b| a.cast_at.cmp(&b.cast_at).then_with(|| a.voter.cmp(&b.voter)));
        Ok(ballots)
    }

    pub fn ballot(&self, proposal_id: ProposalId, voter: &Address) -> Result<Option<Ballot>> {
        let entry = self.record(proposal_id)?;
        let ballot = entry.lock().ballots.get(voter).cloned();
        Ok(ballot)
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.len()
    }

    pub fn snapshot(&self) -> GovernanceSnapshot {
        GovernanceSnapshot {
            next_proposal_id: self.next_id.load(Ordering::SeqCst),
            proposals: self
                .entries()
                .into_iter()
                .map(|entry| entry.lock().clone())
                .collect(),
        }
    }

    /// Replace all proposals with `snapshot`. Every tally is rebuilt from its
    /// ballots and must match the stored one.
    pub fn restore(&self, snapshot: GovernanceSnapshot) -> Result<usize> {
        let mut max_id: ProposalId = 0;
        for record in &snapshot.proposals {
            Self::verify_record(record)?;
            max_id = max_id.max(record.proposal.id);
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = snapshot.proposals.iter().find(|r| !seen.insert(r.proposal.id)) {
            return Err(GovernanceError::CorruptSnapshot(format!(
                "duplicate proposal id {}",
                dup.proposal.id
            )));
        }

        let resume_id = max_id.checked_add(1).ok_or_else(|| {
            GovernanceError::CorruptSnapshot(format!("proposal id {} leaves no room for new ids", max_id))
        })?;

        self.proposals.clear();
        let count = snapshot.proposals.len();
        for record in snapshot.proposals {
            self.proposals
                .insert(record.proposal.id, Arc::new(Mutex::new(record)));
        }
        self.next_id
            .store(snapshot.next_proposal_id.max(resume_id), Ordering::SeqCst);
        Ok(count)
    }

    /// Save proposals and ballots to a JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        log::info!(
            "💾 Saved {} proposals to {}",
            snapshot.proposals.len(),
            path.display()
        );
        Ok(())
    }

    /// Load proposals from a JSON file. A missing file leaves the store empty.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Ok(0);
        }

        let data = tokio::fs::read_to_string(path).await?;
        let snapshot: GovernanceSnapshot = serde_json::from_str(&data)?;
        let count = self.restore(snapshot)?;
        log::info!("Loaded {} proposals from {}", count, path.display());
        Ok(count)
    }

    fn verify_record(record: &ProposalRecord) -> Result<()> {
        let id = record.proposal.id;
        if id == 0 {
            return Err(GovernanceError::CorruptSnapshot(
                "proposal id 0 is reserved".to_string(),
            ));
        }
        for (voter, ballot) in &record.ballots {
            if ballot.proposal_id != id || ballot.voter != *voter {
                return Err(GovernanceError::CorruptSnapshot(format!(
                    "ballot for {} does not belong to proposal {}",
                    voter, id
                )));
            }
        }

        let rebuilt = tally_ballots(record.ballots.values())
            .ok_or_else(|| GovernanceError::CorruptSnapshot(format!("tally overflow on proposal {}", id)))?;
        if rebuilt != record.proposal.tally {
            return Err(GovernanceError::CorruptSnapshot(format!(
                "tally of proposal {} does not match its ballots",
                id
            )));
        }
        Ok(())
    }

    fn require_claims(&self, account: &Address, required: &TopicSet) -> Result<()> {
        if !self.config.claim_gating_enabled || required.is_empty() {
            return Ok(());
        }
        let evaluator = self.eligibility.as_ref().ok_or_else(|| {
            GovernanceError::Config(ConfigError::Invalid(
                "claim gating is enabled but no eligibility evaluator was provided".to_string(),
            ))
        })?;

        let missing = evaluator.missing_topics_at(account, required, self.clock.now());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GovernanceError::NotEligible {
                account: account.clone(),
                missing: missing.into_iter().collect(),
            })
        }
    }

    fn record(&self, proposal_id: ProposalId) -> Result<Arc<Mutex<ProposalRecord>>> {
        self.proposals
            .get(&proposal_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GovernanceError::NotFound(proposal_id))
    }

    /// Handles to every proposal in id order. Map guards are released before
    /// any proposal lock is taken.
    fn entries(&self) -> Vec<Arc<Mutex<ProposalRecord>>> {
        let mut entries: Vec<(ProposalId, Arc<Mutex<ProposalRecord>>)> = self
            .proposals
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, record)| record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infravest_core::{ManualClock, MemoryLedger};

    fn engine() -> (Arc<ManualClock>, Arc<MemoryLedger>, GovernanceEngine) {
        let clock = Arc::new(ManualClock::new(0));
        let ledger = Arc::new(MemoryLedger::new(clock.clone()));
        ledger.set_balance(&Address::from("alice"), 400);
        ledger.set_balance(&Address::from("bob"), 200);
        let config = GovernanceConfig {
            voting_delay: 10,
            voting_period: 100,
            quorum_numerator: 20,
            quorum_denominator: 100,
            ..Default::default()
        };
        let engine = GovernanceEngine::new(config, ledger.clone(), clock.clone(), None).unwrap();
        (clock, ledger, engine)
    }

    fn new_proposal(proposer: &str) -> NewProposal {
        NewProposal {
            proposer: Address::from(proposer),
            title: "Fund solar array".to_string(),
            description: "Phase 2 build-out".to_string(),
            voting_period: None,
            payload: serde_json::json!({"action": "release_tranche", "amount": 1000}),
        }
    }

    #[test]
    fn test_ids_are_monotonic() {
        let (_, _, engine) = engine();
        let a = engine.create_proposal(new_proposal("alice")).unwrap();
        let b = engine.create_proposal(new_proposal("bob")).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(engine.proposal_count(), 2);
    }

    #[test]
    fn test_create_captures_window_and_quorum() {
        let (clock, _, engine) = engine();
        clock.set(1_000);
        let id = engine.create_proposal(new_proposal("alice")).unwrap();

        let view = engine.proposal(id).unwrap();
        assert_eq!(view.proposal.voting_start, 1_010);
        assert_eq!(view.proposal.voting_end, 1_110);
        assert_eq!(view.proposal.quorum_votes, 120);
        assert_eq!(view.proposal.total_supply_at_creation, 600);
        assert_eq!(view.state, ProposalState::Pending);
    }

    #[test]
    fn test_create_validation() {
        let (_, _, engine) = engine();

        let mut blank = new_proposal("alice");
        blank.title = "  ".to_string();
        assert_eq!(engine.create_proposal(blank).unwrap_err().code(), "INVALID_PROPOSAL");

        let mut long = new_proposal("alice");
        long.voting_period = Some(engine.config().max_voting_period + 1);
        assert_eq!(engine.create_proposal(long).unwrap_err().code(), "INVALID_PROPOSAL");

        let err = engine.create_proposal(new_proposal("carol")).unwrap_err();
        assert!(matches!(err, GovernanceError::NotATokenHolder(_)));
        assert_eq!(engine.proposal_count(), 0);
    }

    #[test]
    fn test_cancel_active_after_vote_is_invalid() {
        let (clock, _, engine) = engine();
        let id = engine.create_proposal(new_proposal("alice")).unwrap();
        clock.set(20);
        engine
            .cast_vote(id, &Address::from("bob"), VoteChoice::Against, None)
            .unwrap();

        let err = engine.cancel_proposal(id, &Address::from("alice")).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::InvalidState { state: ProposalState::Active, .. }
        ));
    }

    #[test]
    fn test_cancel_active_without_votes() {
        let (clock, _, engine) = engine();
        let id = engine.create_proposal(new_proposal("alice")).unwrap();
        clock.set(20);
        engine.cancel_proposal(id, &Address::from("alice")).unwrap();
        assert_eq!(engine.state(id).unwrap(), ProposalState::Canceled);
    }

    #[test]
    fn test_only_proposer_cancels() {
        let (_, _, engine) = engine();
        let id = engine.create_proposal(new_proposal("alice")).unwrap();
        let err = engine.cancel_proposal(id, &Address::from("bob")).unwrap_err();
        assert_eq!(err.code(), "NOT_AUTHORIZED_TO_CANCEL");
        assert_eq!(engine.state(id).unwrap(), ProposalState::Pending);
    }

    #[test]
    fn test_empty_reason_dropped() {
        let (clock, _, engine) = engine();
        let id = engine.create_proposal(new_proposal("alice")).unwrap();
        clock.set(15);
        let receipt = engine
            .cast_vote(id, &Address::from("alice"), VoteChoice::For, Some("  ".to_string()))
            .unwrap();
        assert_eq!(receipt.ballot.reason, None);
        assert_eq!(receipt.tally.for_votes, 400);
    }

    #[test]
    fn test_restore_rejects_tampered_tally() {
        let (clock, _, engine) = engine();
        let id = engine.create_proposal(new_proposal("alice")).unwrap();
        clock.set(15);
        engine
            .cast_vote(id, &Address::from("bob"), VoteChoice::For, None)
            .unwrap();

        let mut snapshot = engine.snapshot();
        snapshot.proposals[0].proposal.tally.for_votes += 1;

        let (_, _, other) = self::engine();
        let err = other.restore(snapshot).unwrap_err();
        assert!(matches!(err, GovernanceError::CorruptSnapshot(_)));
        assert_eq!(other.proposal_count(), 0);
    }

    #[test]
    fn test_restore_resumes_ids() {
        let (_, _, engine) = engine();
        engine.create_proposal(new_proposal("alice")).unwrap();
        engine.create_proposal(new_proposal("alice")).unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.next_proposal_id, 3);

        let (_, _, other) = self::engine();
        assert_eq!(other.restore(snapshot).unwrap(), 2);
        assert_eq!(other.create_proposal(new_proposal("bob")).unwrap(), 3);
    }

    #[test]
    fn test_restore_rejects_exhausted_id_space() {
        let (_, _, engine) = engine();
        engine.create_proposal(new_proposal("alice")).unwrap();
        let mut snapshot = engine.snapshot();
        snapshot.proposals[0].proposal.id = u64::MAX;

        let (_, _, other) = self::engine();
        let err = other.restore(snapshot).unwrap_err();
        assert_eq!(err.code(), "CORRUPT_SNAPSHOT");
        assert_eq!(other.proposal_count(), 0);
        assert_eq!(other.create_proposal(new_proposal("bob")).unwrap(), 1);
    }

    #[test]
    fn test_gating_without_evaluator_rejected() {
        let clock = Arc::new(ManualClock::new(0));
        let ledger = Arc::new(MemoryLedger::new(clock.clone()));
        let config = GovernanceConfig {
            claim_gating_enabled: true,
            ..Default::default()
        };
        let result = GovernanceEngine::new(config, ledger, clock, None);
        assert!(matches!(result, Err(GovernanceError::Config(_))));
    }
}
