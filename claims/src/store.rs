//! Identity claims store
//!
//! Claims are grouped per subject. All writes that touch a subject (issue,
//! supersede, revoke, expiry sweep) run under that subject's map entry, so
//! they are atomic per subject while different subjects proceed in
//! parallel.

use dashmap::DashMap;
use infravest_core::{Address, Clock, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::claim::{Claim, ClaimId, ClaimStatus, Revocation};
use crate::error::{ClaimsError, Result};
use crate::events::ClaimEvent;
use crate::issuer::IssuerRegistry;
use crate::topic::ClaimTopic;

/// Revocation reason recorded when a newer claim replaces an active one
pub const SUPERSEDED_REASON: &str = "superseded";

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Parameters for issuing a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueClaim {
    pub subject: Address,
    pub topic: ClaimTopic,
    pub issuer: Address,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

/// Persisted shape of the claims collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimsSnapshot {
    pub claims: Vec<Claim>,
}

pub struct ClaimStore {
    registry: Arc<IssuerRegistry>,
    clock: Arc<dyn Clock>,
    by_subject: DashMap<Address, Vec<Claim>>,
    index: DashMap<ClaimId, Address>,
    events: broadcast::Sender<ClaimEvent>,
}

impl ClaimStore {
    pub fn new(registry: Arc<IssuerRegistry>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        ClaimStore {
            registry,
            clock,
            by_subject: DashMap::new(),
            index: DashMap::new(),
            events,
        }
    }

    pub fn registry(&self) -> &Arc<IssuerRegistry> {
        &self.registry
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Subscribe to claim lifecycle events committed after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ClaimEvent> {
        self.events.subscribe()
    }

    /// Issue a claim. Any active claim for the same subject, topic and
    /// issuer is revoked as superseded in the same step.
    pub fn issue_claim(&self, request: IssueClaim) -> Result<ClaimId> {
        let IssueClaim {
            subject,
            topic,
            issuer,
            value,
            expires_at,
        } = request;

        if subject.is_empty() {
            return Err(ClaimsError::InvalidRequest(
                "claim subject must not be empty".to_string(),
            ));
        }
        if !self.registry.is_authorized(&issuer, topic) {
            return Err(ClaimsError::UnauthorizedIssuer { issuer, topic });
        }

        let now = self.clock.now();
        if let Some(expires_at) = expires_at {
            if expires_at <= now {
                return Err(ClaimsError::InvalidExpiry { expires_at, now });
            }
        }

        let value_hash = hash_value(&value)?;
        let claim = Claim {
            id: ClaimId::generate(),
            subject: subject.clone(),
            topic,
            issuer: issuer.clone(),
            value,
            value_hash: value_hash.clone(),
            issued_at: now,
            expires_at,
            status: ClaimStatus::Active,
            revocation: None,
        };
        let claim_id = claim.id;

        let mut pending = Vec::new();
        {
            let mut claims = self.by_subject.entry(subject.clone()).or_default();
            for prior in claims
                .iter_mut()
                .filter(|c| {
                    c.topic == topic
                        && c.issuer == issuer
                        && c.effective_status(now) == ClaimStatus::Active
                })
            {
                prior.status = ClaimStatus::Revoked;
                prior.revocation = Some(Revocation {
                    revoked_by: issuer.clone(),
                    reason: SUPERSEDED_REASON.to_string(),
                    revoked_at: now,
                });
                log::info!("Claim {} superseded by {}", prior.id, claim_id);
                pending.push(ClaimEvent::Revoked {
                    claim_id: prior.id,
                    subject: subject.clone(),
                    topic,
                    revoked_by: issuer.clone(),
                    reason: SUPERSEDED_REASON.to_string(),
                    at: now,
                });
            }

            claims.push(claim);
            self.index.insert(claim_id, subject.clone());
        }

        log::info!(
            "✓ Issued claim {} ({}) for {} by {}",
            claim_id,
            topic,
            subject,
            issuer
        );
        pending.push(ClaimEvent::Issued {
            claim_id,
            subject,
            topic,
            issuer,
            value_hash,
            expires_at,
            at: now,
        });
        self.publish(pending);

        Ok(claim_id)
    }

    /// Issue several claims; each item succeeds or fails on its own
    pub fn issue_batch(&self, requests: Vec<IssueClaim>) -> Vec<Result<ClaimId>> {
        let results: Vec<Result<ClaimId>> = requests
            .into_iter()
            .map(|request| self.issue_claim(request))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            log::warn!(
                "Batch issuance: {} of {} claims rejected",
                failed,
                results.len()
            );
        }
        results
    }

    /// Revoke an active claim. Only the original issuer or an administrator
    /// may revoke.
    pub fn revoke_claim(&self, claim_id: ClaimId, revoked_by: &Address, reason: &str) -> Result<Claim> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ClaimsError::InvalidRequest(
                "revocation reason must not be empty".to_string(),
            ));
        }

        let subject = self
            .index
            .get(&claim_id)
            .map(|entry| entry.value().clone())
            .ok_or(ClaimsError::NotFound(claim_id))?;

        let now = self.clock.now();
        let revoked = {
            let mut claims = self
                .by_subject
                .get_mut(&subject)
                .ok_or(ClaimsError::NotFound(claim_id))?;
            let claim = claims
                .iter_mut()
                .find(|c| c.id == claim_id)
                .ok_or(ClaimsError::NotFound(claim_id))?;

            if claim.issuer != *revoked_by && !self.registry.is_admin(revoked_by) {
                return Err(ClaimsError::Unauthorized(format!(
                    "{} may not revoke claim {}",
                    revoked_by, claim_id
                )));
            }
            match claim.effective_status(now) {
                ClaimStatus::Revoked => return Err(ClaimsError::AlreadyRevoked(claim_id)),
                ClaimStatus::Expired => return Err(ClaimsError::AlreadyInactive(claim_id)),
                ClaimStatus::Active => {}
            }

            claim.status = ClaimStatus::Revoked;
            claim.revocation = Some(Revocation {
                revoked_by: revoked_by.clone(),
                reason: reason.to_string(),
                revoked_at: now,
            });
            claim.clone()
        };

        log::info!(
            "Revoked claim {} ({}) for {}: {}",
            claim_id,
            revoked.topic,
            revoked.subject,
            reason
        );
        self.publish(vec![ClaimEvent::Revoked {
            claim_id,
            subject: revoked.subject.clone(),
            topic: revoked.topic,
            revoked_by: revoked_by.clone(),
            reason: reason.to_string(),
            at: now,
        }]);

        Ok(revoked)
    }

    /// Single claim with its effective status
    pub fn get_claim(&self, claim_id: ClaimId) -> Result<Claim> {
        let subject = self
            .index
            .get(&claim_id)
            .map(|entry| entry.value().clone())
            .ok_or(ClaimsError::NotFound(claim_id))?;
        let now = self.clock.now();

        self.by_subject
            .get(&subject)
            .and_then(|claims| claims.iter().find(|c| c.id == claim_id).map(|c| c.as_of(now)))
            .ok_or(ClaimsError::NotFound(claim_id))
    }

    /// Every claim ever issued for `subject`, in issuance order, with
    /// effective statuses. Intended for audit.
    pub fn get_claims(&self, subject: &Address) -> Vec<Claim> {
        let now = self.clock.now();
        self.by_subject
            .get(subject)
            .map(|claims| claims.iter().map(|c| c.as_of(now)).collect())
            .unwrap_or_default()
    }

    /// Claims for `subject` that are active and unexpired now
    pub fn get_active_claims(&self, subject: &Address) -> Vec<Claim> {
        self.active_claims_at(subject, self.clock.now())
    }

    pub fn active_claims_at(&self, subject: &Address, now: Timestamp) -> Vec<Claim> {
        self.by_subject
            .get(subject)
            .map(|claims| {
                claims
                    .iter()
                    .filter(|c| c.is_valid_at(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Claims still stored as active whose expiry has passed at `as_of`.
    /// Does not modify anything; see `sweep_expired`.
    pub fn find_expired(&self, as_of: Timestamp) -> Vec<Claim> {
        let mut expired: Vec<Claim> = self
            .by_subject
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|c| c.status == ClaimStatus::Active && c.is_expired_at(as_of))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        expired.sort_by_key(|c| (c.expires_at, c.issued_at));
        expired
    }

    /// Persist the `Expired` status for claims past their expiry at `as_of`.
    /// Reads already treat such claims as expired; this only keeps the
    /// stored status in step for indexing. `as_of` is capped at the store
    /// clock so a sweep never expires a claim that is still valid now.
    pub fn sweep_expired(&self, as_of: Timestamp) -> Vec<ClaimId> {
        let as_of = as_of.min(self.clock.now());
        let mut pending = Vec::new();
        for mut entry in self.by_subject.iter_mut() {
            for claim in entry
                .value_mut()
                .iter_mut()
                .filter(|c| c.status == ClaimStatus::Active && c.is_expired_at(as_of))
            {
                claim.status = ClaimStatus::Expired;
                pending.push(ClaimEvent::Expired {
                    claim_id: claim.id,
                    subject: claim.subject.clone(),
                    topic: claim.topic,
                    at: as_of,
                });
            }
        }

        let swept: Vec<ClaimId> = pending.iter().map(ClaimEvent::claim_id).collect();
        if !swept.is_empty() {
            log::info!("Expiry sweep at {}: {} claims marked expired", as_of, swept.len());
        }
        self.publish(pending);
        swept
    }

    pub fn claim_count(&self) -> usize {
        self.index.len()
    }

    pub fn subject_count(&self) -> usize {
        self.by_subject.len()
    }

    pub fn snapshot(&self) -> ClaimsSnapshot {
        let mut claims: Vec<Claim> = self
            .by_subject
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        claims.sort_by(|a, b| {
            a.issued_at
                .cmp(&b.issued_at)
                .then_with(|| a.subject.cmp(&b.subject))
        });
        ClaimsSnapshot { claims }
    }

    /// Replace the store contents with `snapshot`. Returns the number of claims loaded.
    pub fn restore(&self, snapshot: ClaimsSnapshot) -> Result<usize> {
        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = snapshot.claims.iter().find(|c| !seen.insert(c.id)) {
            return Err(ClaimsError::InvalidRequest(format!(
                "duplicate claim id {} in snapshot",
                duplicate.id
            )));
        }

        self.by_subject.clear();
        self.index.clear();

        let count = snapshot.claims.len();
        for claim in snapshot.claims {
            self.index.insert(claim.id, claim.subject.clone());
            self.by_subject
                .entry(claim.subject.clone())
                .or_default()
                .push(claim);
        }
        Ok(count)
    }

    /// Save all claims to a JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(path, json).await?;
        log::info!("💾 Saved {} claims to {}", self.claim_count(), path.display());
        Ok(())
    }

    /// Load claims from a JSON file. A missing file leaves the store empty.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Ok(0);
        }

        let data = tokio::fs::read_to_string(path).await?;
        let snapshot: ClaimsSnapshot = serde_json::from_str(&data)?;
        let count = self.restore(snapshot)?;
        log::info!("Loaded {} claims from {}", count, path.display());
        Ok(count)
    }

    fn publish(&self, events: Vec<ClaimEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}

fn hash_value(value: &serde_json::Value) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infravest_core::ManualClock;

    struct Fixture {
        clock: Arc<ManualClock>,
        admin: Address,
        store: ClaimStore,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let admin = Address::from("admin");
        let registry = Arc::new(IssuerRegistry::new([admin.clone()], clock.clone()));
        registry
            .add_issuer(
                &admin,
                Address::from("I1"),
                "Acme KYC",
                [ClaimTopic::KycApproved, ClaimTopic::AmlCleared].into_iter().collect(),
            )
            .unwrap();
        let store = ClaimStore::new(registry, clock.clone());
        Fixture { clock, admin, store }
    }

    fn kyc(subject: &str, expires_at: Option<Timestamp>) -> IssueClaim {
        IssueClaim {
            subject: Address::from(subject),
            topic: ClaimTopic::KycApproved,
            issuer: Address::from("I1"),
            value: serde_json::json!({"provider": "acme", "level": 2}),
            expires_at,
        }
    }

    #[test]
    fn test_issue_records_active_claim() {
        let f = fixture();
        let id = f.store.issue_claim(kyc("S1", None)).unwrap();

        let claim = f.store.get_claim(id).unwrap();
        assert_eq!(claim.status, ClaimStatus::Active);
        assert_eq!(claim.subject, Address::from("S1"));
        assert_eq!(claim.value_hash.len(), 64);
        assert_eq!(f.store.claim_count(), 1);
    }

    #[test]
    fn test_unauthorized_topic_rejected() {
        let f = fixture();
        let mut request = kyc("S1", None);
        request.topic = ClaimTopic::AccreditedInvestor;

        let err = f.store.issue_claim(request).unwrap_err();
        assert!(matches!(err, ClaimsError::UnauthorizedIssuer { .. }));
        assert_eq!(f.store.claim_count(), 0);
    }

    #[test]
    fn test_past_expiry_rejected() {
        let f = fixture();
        f.clock.set(500);
        let err = f.store.issue_claim(kyc("S1", Some(500))).unwrap_err();
        assert!(matches!(err, ClaimsError::InvalidExpiry { .. }));
    }

    #[test]
    fn test_reissue_supersedes_previous() {
        let f = fixture();
        let first = f.store.issue_claim(kyc("S1", None)).unwrap();
        f.clock.advance(10);
        let second = f.store.issue_claim(kyc("S1", None)).unwrap();

        let old = f.store.get_claim(first).unwrap();
        assert_eq!(old.status, ClaimStatus::Revoked);
        assert_eq!(old.revocation.unwrap().reason, SUPERSEDED_REASON);

        let active = f.store.get_active_claims(&Address::from("S1"));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second);
        assert_eq!(f.store.get_claims(&Address::from("S1")).len(), 2);
    }

    #[test]
    fn test_different_topic_does_not_supersede() {
        let f = fixture();
        f.store.issue_claim(kyc("S1", None)).unwrap();
        let mut aml = kyc("S1", None);
        aml.topic = ClaimTopic::AmlCleared;
        f.store.issue_claim(aml).unwrap();

        assert_eq!(f.store.get_active_claims(&Address::from("S1")).len(), 2);
    }

    #[test]
    fn test_revoke_rules() {
        let f = fixture();
        let id = f.store.issue_claim(kyc("S1", None)).unwrap();

        let err = f
            .store
            .revoke_claim(id, &Address::from("mallory"), "no reason")
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        let revoked = f.store.revoke_claim(id, &Address::from("I1"), "fraud").unwrap();
        assert_eq!(revoked.status, ClaimStatus::Revoked);
        assert_eq!(revoked.revocation.as_ref().unwrap().reason, "fraud");

        let err = f.store.revoke_claim(id, &f.admin, "again").unwrap_err();
        assert!(matches!(err, ClaimsError::AlreadyRevoked(_)));

        let err = f
            .store
            .revoke_claim(ClaimId::generate(), &f.admin, "missing")
            .unwrap_err();
        assert!(matches!(err, ClaimsError::NotFound(_)));
    }

    #[test]
    fn test_admin_can_revoke_and_expired_is_inactive() {
        let f = fixture();
        let live = f.store.issue_claim(kyc("S1", None)).unwrap();
        let expiring = f.store.issue_claim(kyc("S2", Some(100))).unwrap();

        assert!(f.store.revoke_claim(live, &f.admin, "compliance order").is_ok());

        f.clock.set(150);
        let err = f.store.revoke_claim(expiring, &f.admin, "late").unwrap_err();
        assert!(matches!(err, ClaimsError::AlreadyInactive(_)));
    }

    #[test]
    fn test_find_and_sweep_expired() {
        let f = fixture();
        let short = f.store.issue_claim(kyc("S1", Some(100))).unwrap();
        f.store.issue_claim(kyc("S2", Some(1_000))).unwrap();
        f.store.issue_claim(kyc("S3", None)).unwrap();

        let expired = f.store.find_expired(200);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, short);
        // find_expired is read-only
        assert_eq!(f.store.find_expired(200).len(), 1);

        f.clock.set(200);
        let swept = f.store.sweep_expired(200);
        assert_eq!(swept, vec![short]);
        assert!(f.store.find_expired(200).is_empty());

        assert_eq!(f.store.get_claim(short).unwrap().status, ClaimStatus::Expired);
    }

    #[test]
    fn test_sweep_ahead_of_clock_keeps_valid_claims() {
        let f = fixture();
        let id = f.store.issue_claim(kyc("S1", Some(100))).unwrap();
        f.clock.set(10);

        assert!(f.store.sweep_expired(500).is_empty());
        assert_eq!(f.store.get_claim(id).unwrap().status, ClaimStatus::Active);
        assert_eq!(f.store.get_active_claims(&Address::from("S1")).len(), 1);

        f.clock.set(100);
        assert_eq!(f.store.sweep_expired(500), vec![id]);
    }

    #[test]
    fn test_events_published() {
        let f = fixture();
        let mut rx = f.store.subscribe();

        let first = f.store.issue_claim(kyc("S1", None)).unwrap();
        let second = f.store.issue_claim(kyc("S1", None)).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), ClaimEvent::Issued { claim_id, .. } if claim_id == first));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ClaimEvent::Revoked { claim_id, ref reason, .. } if claim_id == first && reason == SUPERSEDED_REASON
        ));
        assert!(matches!(rx.try_recv().unwrap(), ClaimEvent::Issued { claim_id, .. } if claim_id == second));
    }

    #[test]
    fn test_batch_reports_per_item() {
        let f = fixture();
        let mut bad = kyc("S2", None);
        bad.issuer = Address::from("unknown");

        let results = f
            .store
            .issue_batch(vec![kyc("S1", None), bad, kyc("S3", None)]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ClaimsError::UnauthorizedIssuer { .. })));
        assert!(results[2].is_ok());
        assert_eq!(f.store.claim_count(), 2);
    }

    #[test]
    fn test_snapshot_restore() {
        let f = fixture();
        let id = f.store.issue_claim(kyc("S1", None)).unwrap();
        f.store.issue_claim(kyc("S2", Some(50))).unwrap();
        let snapshot = f.store.snapshot();

        let other = fixture();
        assert_eq!(other.store.restore(snapshot).unwrap(), 2);
        assert_eq!(other.store.get_claim(id).unwrap().subject, Address::from("S1"));
        assert_eq!(other.store.subject_count(), 2);
    }
}
