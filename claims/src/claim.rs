//! Claim records and effective status

use infravest_core::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::topic::ClaimTopic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(Uuid);

impl ClaimId {
    pub fn generate() -> Self {
        ClaimId(Uuid::new_v4())
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for ClaimId {
    fn from(value: Uuid) -> Self {
        ClaimId(value)
    }
}

impl std::str::FromStr for ClaimId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ClaimId(Uuid::parse_str(s.trim())?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    Active,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub revoked_by: Address,
    pub reason: String,
    pub revoked_at: Timestamp,
}

/// An attestation about `subject` made by `issuer` for one topic.
///
/// `status` is the stored status. Expiry is applied on read through
/// `effective_status`, so a stored `Active` claim past its expiry is
/// reported as `Expired` even before any sweep persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub subject: Address,
    pub topic: ClaimTopic,
    pub issuer: Address,
    pub value: serde_json::Value,
    /// SHA-256 of the serialized value, hex encoded
    pub value_hash: String,
    pub issued_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub status: ClaimStatus,
    pub revocation: Option<Revocation>,
}

impl Claim {
    /// Status as observed at `now`. A revocation counts from its
    /// `revoked_at`; expiry counts from `expires_at` whether or not a sweep
    /// has persisted it.
    pub fn effective_status(&self, now: Timestamp) -> ClaimStatus {
        if self.is_revoked_at(now) {
            return ClaimStatus::Revoked;
        }
        match self.status {
            _ if self.is_expired_at(now) => ClaimStatus::Expired,
            ClaimStatus::Expired if self.expires_at.is_none() => ClaimStatus::Expired,
            _ => ClaimStatus::Active,
        }
    }

    /// Issued, not revoked and not expired at `now`
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.issued_at <= now && self.effective_status(now) == ClaimStatus::Active
    }

    pub fn is_revoked_at(&self, now: Timestamp) -> bool {
        match (self.status, &self.revocation) {
            (ClaimStatus::Revoked, Some(revocation)) => revocation.revoked_at <= now,
            (ClaimStatus::Revoked, None) => true,
            _ => false,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Copy of the claim with `status` replaced by its effective value
    pub fn as_of(&self, now: Timestamp) -> Claim {
        let mut view = self.clone();
        view.status = self.effective_status(now);
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(expires_at: Option<Timestamp>) -> Claim {
        Claim {
            id: ClaimId::generate(),
            subject: Address::from("S1"),
            topic: ClaimTopic::KycApproved,
            issuer: Address::from("I1"),
            value: serde_json::json!({"level": "full"}),
            value_hash: String::new(),
            issued_at: 0,
            expires_at,
            status: ClaimStatus::Active,
            revocation: None,
        }
    }

    #[test]
    fn test_expiry_is_derived_at_read_time() {
        let c = claim(Some(100));
        assert_eq!(c.effective_status(99), ClaimStatus::Active);
        assert_eq!(c.effective_status(100), ClaimStatus::Expired);
        assert_eq!(c.effective_status(101), ClaimStatus::Expired);
        // Stored status untouched
        assert_eq!(c.status, ClaimStatus::Active);
    }

    #[test]
    fn test_no_expiry_stays_active() {
        let c = claim(None);
        assert!(c.is_valid_at(u64::MAX));
    }

    #[test]
    fn test_revoked_wins_over_expiry() {
        let mut c = claim(Some(50));
        c.status = ClaimStatus::Revoked;
        assert_eq!(c.effective_status(10), ClaimStatus::Revoked);
        assert_eq!(c.effective_status(60), ClaimStatus::Revoked);
        assert_eq!(c.as_of(60).status, ClaimStatus::Revoked);
    }

    #[test]
    fn test_not_valid_before_issuance() {
        let mut c = claim(None);
        c.issued_at = 50;
        assert!(!c.is_valid_at(10));
        assert!(!c.is_valid_at(49));
        assert!(c.is_valid_at(50));
    }

    #[test]
    fn test_revocation_counts_from_revoked_at() {
        let mut c = claim(None);
        c.status = ClaimStatus::Revoked;
        c.revocation = Some(Revocation {
            revoked_by: Address::from("I1"),
            reason: "documents withdrawn".to_string(),
            revoked_at: 40,
        });
        assert!(c.is_valid_at(39));
        assert_eq!(c.effective_status(40), ClaimStatus::Revoked);
        assert!(!c.is_valid_at(40));
    }

    #[test]
    fn test_persisted_expiry_respects_expires_at() {
        let mut c = claim(Some(100));
        c.status = ClaimStatus::Expired;
        assert!(c.is_valid_at(99));
        assert_eq!(c.effective_status(100), ClaimStatus::Expired);
    }

    #[test]
    fn test_claim_id_roundtrips_through_string() {
        let id = ClaimId::generate();
        let parsed: ClaimId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
