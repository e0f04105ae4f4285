//! Eligibility evaluation
//!
//! A subject is eligible for a topic set when, for every topic, it holds
//! at least one claim that is active and unexpired. Evaluation only reads
//! the claims store.

use infravest_core::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::claim::ClaimId;
use crate::error::{ClaimsError, Result};
use crate::store::ClaimStore;
use crate::topic::{ClaimTopic, TopicSet};

/// Per-topic outcome of an eligibility check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub subject: Address,
    pub evaluated_at: Timestamp,
    pub eligible: bool,
    /// Topic -> a claim currently satisfying it
    pub satisfied: BTreeMap<ClaimTopic, ClaimId>,
    pub missing: TopicSet,
}

#[derive(Clone)]
pub struct EligibilityEvaluator {
    store: Arc<ClaimStore>,
}

impl EligibilityEvaluator {
    pub fn new(store: Arc<ClaimStore>) -> Self {
        Self { store }
    }

    pub fn is_eligible(&self, subject: &Address, required: &TopicSet) -> bool {
        self.is_eligible_at(subject, required, self.store.now())
    }

    pub fn is_eligible_at(&self, subject: &Address, required: &TopicSet, now: Timestamp) -> bool {
        self.missing_topics_at(subject, required, now).is_empty()
    }

    /// The subset of `required` the subject does not currently satisfy
    pub fn missing_topics(&self, subject: &Address, required: &TopicSet) -> TopicSet {
        self.missing_topics_at(subject, required, self.store.now())
    }

    pub fn missing_topics_at(&self, subject: &Address, required: &TopicSet, now: Timestamp) -> TopicSet {
        self.report_at(subject, required, now).missing
    }

    pub fn report(&self, subject: &Address, required: &TopicSet) -> EligibilityReport {
        self.report_at(subject, required, self.store.now())
    }

    pub fn report_at(&self, subject: &Address, required: &TopicSet, now: Timestamp) -> EligibilityReport {
        let mut satisfied = BTreeMap::new();
        if !required.is_empty() {
            for claim in self.store.active_claims_at(subject, now) {
                if required.contains(&claim.topic) {
                    satisfied.entry(claim.topic).or_insert(claim.id);
                }
            }
        }

        let missing: TopicSet = required
            .iter()
            .filter(|topic| !satisfied.contains_key(*topic))
            .copied()
            .collect();

        EligibilityReport {
            subject: subject.clone(),
            evaluated_at: now,
            eligible: missing.is_empty(),
            satisfied,
            missing,
        }
    }

    /// `Ok(())` when eligible, otherwise `NotEligible` listing the missing topics
    pub fn require(&self, subject: &Address, required: &TopicSet) -> Result<()> {
        let missing = self.missing_topics(subject, required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ClaimsError::NotEligible {
                subject: subject.clone(),
                missing: missing.into_iter().collect(),
            })
        }
    }
}
