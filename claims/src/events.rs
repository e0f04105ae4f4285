//! Observable claim lifecycle events

use infravest_core::{Address, Timestamp};
use serde::{Deserialize, Serialize};

use crate::claim::ClaimId;
use crate::topic::ClaimTopic;

/// Published on the store's broadcast channel after each committed change.
/// Events carry the value hash, never the claim value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimEvent {
    Issued {
        claim_id: ClaimId,
        subject: Address,
        topic: ClaimTopic,
        issuer: Address,
        value_hash: String,
        expires_at: Option<Timestamp>,
        at: Timestamp,
    },
    Revoked {
        claim_id: ClaimId,
        subject: Address,
        topic: ClaimTopic,
        revoked_by: Address,
        reason: String,
        at: Timestamp,
    },
    Expired {
        claim_id: ClaimId,
        subject: Address,
        topic: ClaimTopic,
        at: Timestamp,
    },
}

impl ClaimEvent {
    pub fn claim_id(&self) -> ClaimId {
        match self {
            ClaimEvent::Issued { claim_id, .. }
            | ClaimEvent::Revoked { claim_id, .. }
            | ClaimEvent::Expired { claim_id, .. } => *claim_id,
        }
    }
}
