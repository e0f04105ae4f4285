//! Scenario replay
//!
//! A scenario is a JSON document of time-stamped steps run against a fresh
//! in-process engine. The manual clock jumps to each step's `at` before the
//! step runs, so replays are deterministic.
//!
//! ```json
//! {
//!   "admins": ["compliance-admin"],
//!   "steps": [
//!     {"at": 0, "action": "add_issuer", "caller": "compliance-admin",
//!      "issuer": "kyc-co", "name": "KYC Co", "topics": ["KYC_APPROVED"]},
//!     {"at": 0, "action": "issue_claim", "label": "alice-kyc", "subject": "alice",
//!      "topic": "KYC_APPROVED", "issuer": "kyc-co"},
//!     {"at": 20, "action": "vote", "proposal": 1, "voter": "alice",
//!      "choice": "for", "expect": "OK"}
//!   ]
//! }
//! ```

use anyhow::{bail, Context};
use infravest_claims::{
    ClaimId, ClaimStore, ClaimTopic, ClaimsError, EligibilityEvaluator, IssueClaim, IssuerRegistry,
    TopicSet,
};
use infravest_core::{Address, Clock, LedgerError, ManualClock, MemoryLedger, Timestamp};
use infravest_governance::{
    ExecutionError, GovernanceConfig, GovernanceEngine, GovernanceError, NewProposal, Proposal,
    ProposalId, VoteChoice,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Outcome label used by `expect` for a step that succeeded
pub const EXPECT_OK: &str = "OK";

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Registry administrators
    pub admins: Vec<Address>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        serde_json::from_str(contents).context("invalid scenario document")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&contents)
    }
}

#[derive(Debug, Deserialize)]
pub struct Step {
    /// Clock value for this step; omitted means "same time as before"
    #[serde(default)]
    pub at: Option<Timestamp>,
    /// `"OK"` or the error code the step should fail with
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    AddIssuer {
        caller: Address,
        issuer: Address,
        name: String,
        topics: TopicSet,
    },
    IssueClaim {
        /// Name later steps use to refer to the issued claim
        #[serde(default)]
        label: Option<String>,
        subject: Address,
        topic: ClaimTopic,
        issuer: Address,
        #[serde(default)]
        value: serde_json::Value,
        #[serde(default)]
        expires_at: Option<Timestamp>,
    },
    RevokeClaim {
        /// Label from an earlier `issue_claim`, or a claim id
        claim: String,
        revoked_by: Address,
        reason: String,
    },
    SetBalance {
        address: Address,
        amount: u64,
    },
    Transfer {
        from: Address,
        to: Address,
        amount: u64,
    },
    CreateProposal {
        proposer: Address,
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        voting_period: Option<u64>,
        #[serde(default)]
        payload: serde_json::Value,
    },
    Vote {
        proposal: ProposalId,
        voter: Address,
        choice: VoteChoice,
        #[serde(default)]
        reason: Option<String>,
    },
    Cancel {
        proposal: ProposalId,
        requester: Address,
    },
    Execute {
        proposal: ProposalId,
        /// Makes the executor fail with this message
        #[serde(default)]
        fail_with: Option<String>,
    },
    ShowProposal {
        proposal: ProposalId,
    },
    CheckEligibility {
        subject: Address,
        topics: TopicSet,
    },
    SweepExpired,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddIssuer { .. } => "add_issuer",
            Action::IssueClaim { .. } => "issue_claim",
            Action::RevokeClaim { .. } => "revoke_claim",
            Action::SetBalance { .. } => "set_balance",
            Action::Transfer { .. } => "transfer",
            Action::CreateProposal { .. } => "create_proposal",
            Action::Vote { .. } => "vote",
            Action::Cancel { .. } => "cancel",
            Action::Execute { .. } => "execute",
            Action::ShowProposal { .. } => "show_proposal",
            Action::CheckEligibility { .. } => "check_eligibility",
            Action::SweepExpired => "sweep_expired",
        }
    }
}

/// A failed step with its stable error code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<ClaimsError> for StepFailure {
    fn from(e: ClaimsError) -> Self {
        StepFailure {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<GovernanceError> for StepFailure {
    fn from(e: GovernanceError) -> Self {
        StepFailure {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<LedgerError> for StepFailure {
    fn from(e: LedgerError) -> Self {
        StepFailure {
            code: "LEDGER_ERROR",
            message: e.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct StepReport {
    pub index: usize,
    pub at: Timestamp,
    pub action: &'static str,
    pub outcome: Result<String, StepFailure>,
    pub expected: Option<String>,
}

impl StepReport {
    pub fn outcome_code(&self) -> &str {
        match &self.outcome {
            Ok(_) => EXPECT_OK,
            Err(failure) => failure.code,
        }
    }

    /// False only when an expectation was given and not met
    pub fn met_expectation(&self) -> bool {
        self.expected
            .as_deref()
            .map_or(true, |expected| expected.eq_ignore_ascii_case(self.outcome_code()))
    }
}

/// One claims store, ledger and governance engine sharing a manual clock
pub struct Simulator {
    clock: Arc<ManualClock>,
    ledger: Arc<MemoryLedger>,
    store: Arc<ClaimStore>,
    eligibility: EligibilityEvaluator,
    engine: GovernanceEngine,
    labels: HashMap<String, ClaimId>,
}

impl Simulator {
    pub fn new(config: GovernanceConfig, admins: Vec<Address>) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(0));
        let registry = Arc::new(IssuerRegistry::new(admins, clock.clone()));
        let store = Arc::new(ClaimStore::new(registry, clock.clone()));
        let eligibility = EligibilityEvaluator::new(store.clone());
        let ledger = Arc::new(MemoryLedger::new(clock.clone()));
        let engine = GovernanceEngine::new(
            config,
            ledger.clone(),
            clock.clone(),
            Some(eligibility.clone()),
        )
        .context("failed to build governance engine")?;

        Ok(Simulator {
            clock,
            ledger,
            store,
            eligibility,
            engine,
            labels: HashMap::new(),
        })
    }

    pub fn engine(&self) -> &GovernanceEngine {
        &self.engine
    }

    pub fn store(&self) -> &ClaimStore {
        &self.store
    }

    /// Run every step in order. Step failures are reported, not returned;
    /// only a step scheduled before the current time aborts the replay.
    pub fn run(&mut self, scenario: &Scenario) -> anyhow::Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            reports.push(self.apply(index + 1, step)?);
        }
        Ok(reports)
    }

    pub fn apply(&mut self, index: usize, step: &Step) -> anyhow::Result<StepReport> {
        if let Some(at) = step.at {
            let now = self.clock.now();
            if at < now {
                bail!("step {} is scheduled at {} but the clock is already at {}", index, at, now);
            }
            self.clock.set(at);
        }

        let outcome = self.execute(&step.action);
        Ok(StepReport {
            index,
            at: self.clock.now(),
            action: step.action.name(),
            outcome,
            expected: step.expect.clone(),
        })
    }

    /// Write claims and governance snapshots into `dir`
    pub async fn save(&self, dir: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        self.store
            .save(dir.join("claims.json"))
            .await
            .context("failed to save claims")?;
        self.engine
            .save(dir.join("governance.json"))
            .await
            .context("failed to save governance state")?;
        Ok(())
    }

    fn execute(&mut self, action: &Action) -> Result<String, StepFailure> {
        match action {
            Action::AddIssuer {
                caller,
                issuer,
                name,
                topics,
            } => {
                let issuer = self
                    .store
                    .registry()
                    .add_issuer(caller, issuer.clone(), name.as_str(), topics.clone())?;
                Ok(format!(
                    "issuer {} authorized for {}",
                    issuer.id,
                    join_topics(&issuer.authorized_topics)
                ))
            }

            Action::IssueClaim {
                label,
                subject,
                topic,
                issuer,
                value,
                expires_at,
            } => {
                let claim_id = self.store.issue_claim(IssueClaim {
                    subject: subject.clone(),
                    topic: *topic,
                    issuer: issuer.clone(),
                    value: value.clone(),
                    expires_at: *expires_at,
                })?;
                if let Some(label) = label {
                    self.labels.insert(label.clone(), claim_id);
                }
                Ok(format!("{} claim {} issued to {}", topic, claim_id, subject))
            }

            Action::RevokeClaim {
                claim,
                revoked_by,
                reason,
            } => {
                let claim_id = self.resolve_claim(claim)?;
                let revoked = self.store.revoke_claim(claim_id, revoked_by, reason)?;
                Ok(format!(
                    "{} claim of {} revoked by {}",
                    revoked.topic, revoked.subject, revoked_by
                ))
            }

            Action::SetBalance { address, amount } => {
                self.ledger.set_balance(address, *amount);
                Ok(format!("{} balance set to {}", address, amount))
            }

            Action::Transfer { from, to, amount } => {
                self.ledger.transfer(from, to, *amount)?;
                Ok(format!("{} moved {} to {}", from, amount, to))
            }

            Action::CreateProposal {
                proposer,
                title,
                description,
                voting_period,
                payload,
            } => {
                let id = self.engine.create_proposal(NewProposal {
                    proposer: proposer.clone(),
                    title: title.clone(),
                    description: description.clone(),
                    voting_period: *voting_period,
                    payload: payload.clone(),
                })?;
                let view = self.engine.proposal(id)?;
                Ok(format!(
                    "proposal {} created, voting {}..={}, quorum {}",
                    id, view.proposal.voting_start, view.proposal.voting_end, view.proposal.quorum_votes
                ))
            }

            Action::Vote {
                proposal,
                voter,
                choice,
                reason,
            } => {
                let receipt = self
                    .engine
                    .cast_vote(*proposal, voter, *choice, reason.clone())?;
                Ok(format!(
                    "{} voted {} with weight {} (for {} / against {} / abstain {})",
                    voter,
                    choice,
                    receipt.ballot.weight,
                    receipt.tally.for_votes,
                    receipt.tally.against_votes,
                    receipt.tally.abstain_votes
                ))
            }

            Action::Cancel {
                proposal,
                requester,
            } => {
                self.engine.cancel_proposal(*proposal, requester)?;
                Ok(format!("proposal {} canceled", proposal))
            }

            Action::Execute {
                proposal,
                fail_with,
            } => {
                let executor = |p: &Proposal| -> Result<(), ExecutionError> {
                    if let Some(reason) = fail_with {
                        return Err(reason.clone().into());
                    }
                    log::info!("⚙️  Applying payload of proposal {}: {}", p.id, p.payload);
                    Ok(())
                };
                let executed = self.engine.execute_proposal(*proposal, &executor)?;
                Ok(format!(
                    "proposal {} executed at {}",
                    proposal,
                    executed.executed_at.unwrap_or_default()
                ))
            }

            Action::ShowProposal { proposal } => {
                let view = self.engine.proposal(*proposal)?;
                let tally = view.proposal.tally;
                Ok(format!(
                    "proposal {} \"{}\" is {} (for {} / against {} / abstain {}, quorum {} {}, {} ballots)",
                    proposal,
                    view.proposal.title,
                    view.state,
                    tally.for_votes,
                    tally.against_votes,
                    tally.abstain_votes,
                    view.proposal.quorum_votes,
                    if view.quorum_reached { "reached" } else { "not reached" },
                    view.ballot_count
                ))
            }

            Action::CheckEligibility { subject, topics } => {
                let report = self.eligibility.report(subject, topics);
                if report.eligible {
                    Ok(format!("{} is eligible for {}", subject, join_topics(topics)))
                } else {
                    Ok(format!(
                        "{} is not eligible, missing {}",
                        subject,
                        join_topics(&report.missing)
                    ))
                }
            }

            Action::SweepExpired => {
                let expired = self.store.sweep_expired(self.clock.now());
                Ok(format!("{} claims marked expired", expired.len()))
            }
        }
    }

    fn resolve_claim(&self, claim: &str) -> Result<ClaimId, StepFailure> {
        if let Some(id) = self.labels.get(claim) {
            return Ok(*id);
        }
        claim.parse::<ClaimId>().map_err(|_| StepFailure {
            code: "UNKNOWN_CLAIM_LABEL",
            message: format!("no claim labelled {}", claim),
        })
    }
}

fn join_topics(topics: &TopicSet) -> String {
    if topics.is_empty() {
        return "nothing".to_string();
    }
    topics
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GovernanceConfig {
        GovernanceConfig {
            voting_delay: 10,
            voting_period: 100,
            quorum_numerator: 20,
            quorum_denominator: 100,
            claim_gating_enabled: true,
            required_proposal_claims: [ClaimTopic::KycApproved].into_iter().collect(),
            required_vote_claims: [ClaimTopic::KycApproved].into_iter().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_json(
            r#"{
                "name": "parse",
                "admins": ["admin"],
                "steps": [
                    {"at": 5, "action": "set_balance", "address": "alice", "amount": 100},
                    {"action": "vote", "proposal": 1, "voter": "alice", "choice": "against", "expect": "PROPOSAL_NOT_ACTIVE"},
                    {"action": "sweep_expired"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0].at, Some(5));
        assert!(matches!(
            scenario.steps[1].action,
            Action::Vote { proposal: 1, choice: VoteChoice::Against, .. }
        ));
        assert_eq!(scenario.steps[1].expect.as_deref(), Some("PROPOSAL_NOT_ACTIVE"));
        assert_eq!(scenario.steps[2].action.name(), "sweep_expired");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result = Scenario::from_json(r#"{"admins": [], "steps": [{"action": "mint_nft"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_topic_rejected() {
        let result = Scenario::from_json(
            r#"{"admins": [], "steps": [{"action": "check_eligibility", "subject": "a", "topics": ["KYC"]}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_gated_vote_replay() {
        let scenario = Scenario::from_json(
            r#"{
                "admins": ["admin"],
                "steps": [
                    {"at": 0, "action": "add_issuer", "caller": "admin", "issuer": "kyc-co", "name": "KYC Co", "topics": ["KYC_APPROVED"]},
                    {"action": "set_balance", "address": "alice", "amount": 400},
                    {"action": "set_balance", "address": "bob", "amount": 200},
                    {"action": "issue_claim", "label": "alice-kyc", "subject": "alice", "topic": "KYC_APPROVED", "issuer": "kyc-co"},
                    {"action": "create_proposal", "proposer": "alice", "title": "Fund turbines", "expect": "OK"},
                    {"action": "create_proposal", "proposer": "bob", "title": "Rival plan", "expect": "NOT_ELIGIBLE"},
                    {"at": 20, "action": "vote", "proposal": 1, "voter": "bob", "choice": "for", "expect": "NOT_ELIGIBLE"},
                    {"action": "vote", "proposal": 1, "voter": "alice", "choice": "for", "expect": "OK"},
                    {"action": "revoke_claim", "claim": "alice-kyc", "revoked_by": "kyc-co", "reason": "expired documents", "expect": "OK"},
                    {"action": "revoke_claim", "claim": "missing", "revoked_by": "kyc-co", "reason": "x", "expect": "UNKNOWN_CLAIM_LABEL"},
                    {"at": 111, "action": "show_proposal", "proposal": 1},
                    {"action": "execute", "proposal": 1, "fail_with": "treasury offline", "expect": "EXECUTION_FAILED"},
                    {"action": "execute", "proposal": 1, "expect": "OK"}
                ]
            }"#,
        )
        .unwrap();

        let mut simulator = Simulator::new(config(), scenario.admins.clone()).unwrap();
        let reports = simulator.run(&scenario).unwrap();

        for report in &reports {
            assert!(
                report.met_expectation(),
                "step {} ({}) returned {:?}",
                report.index,
                report.action,
                report.outcome
            );
        }
        assert_eq!(simulator.engine().proposal_count(), 1);
        assert_eq!(simulator.store().claim_count(), 1);
    }

    #[test]
    fn test_demo_scenario_meets_expectations() {
        let config = GovernanceConfig::from_toml_str(include_str!("../../demos/governance.toml")).unwrap();
        let scenario = Scenario::from_json(include_str!("../../demos/scenario.json")).unwrap();

        let mut simulator = Simulator::new(config, scenario.admins.clone()).unwrap();
        let reports = simulator.run(&scenario).unwrap();
        let unmet: Vec<_> = reports.iter().filter(|r| !r.met_expectation()).collect();
        assert!(unmet.is_empty(), "unmet steps: {:?}", unmet);

        let view = simulator.engine().proposal(1).unwrap();
        assert_eq!(view.state, infravest_governance::ProposalState::Executed);
        assert_eq!(view.proposal.tally.for_votes, 300);
    }

    #[test]
    fn test_time_cannot_go_backwards() {
        let scenario = Scenario::from_json(
            r#"{"admins": [], "steps": [
                {"at": 50, "action": "sweep_expired"},
                {"at": 10, "action": "sweep_expired"}
            ]}"#,
        )
        .unwrap();
        let mut simulator = Simulator::new(GovernanceConfig::default(), Vec::new()).unwrap();
        assert!(simulator.run(&scenario).is_err());
    }

    #[tokio::test]
    async fn test_save_writes_both_snapshots() {
        let mut simulator = Simulator::new(GovernanceConfig::default(), vec![Address::from("admin")]).unwrap();
        let scenario = Scenario::from_json(
            r#"{"admins": ["admin"], "steps": [
                {"action": "set_balance", "address": "alice", "amount": 10},
                {"action": "create_proposal", "proposer": "alice", "title": "Audit budget"}
            ]}"#,
        )
        .unwrap();
        simulator.run(&scenario).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        simulator.save(&state_dir).await.unwrap();
        assert!(state_dir.join("claims.json").exists());
        assert!(state_dir.join("governance.json").exists());
    }
}
