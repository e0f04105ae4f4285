//! Trusted issuer registry
//!
//! Tracks which identities may attest which claim topics. Authorization is
//! checked once, at issuance; changing or removing an issuer later never
//! touches claims it already issued.

use infravest_core::{Address, Clock, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{ClaimsError, Result};
use crate::topic::{ClaimTopic, TopicSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIssuer {
    pub id: Address,
    pub name: String,
    pub authorized_topics: TopicSet,
    pub active: bool,
    pub registered_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TrustedIssuer {
    pub fn can_issue(&self, topic: ClaimTopic) -> bool {
        self.active && self.authorized_topics.contains(&topic)
    }
}

pub struct IssuerRegistry {
    clock: Arc<dyn Clock>,
    admins: RwLock<HashSet<Address>>,
    issuers: RwLock<HashMap<Address, TrustedIssuer>>,
}

impl IssuerRegistry {
    pub fn new(admins: impl IntoIterator<Item = Address>, clock: Arc<dyn Clock>) -> Self {
        IssuerRegistry {
            clock,
            admins: RwLock::new(admins.into_iter().collect()),
            issuers: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.admins.read().contains(address)
    }

    pub fn grant_admin(&self, caller: &Address, admin: Address) -> Result<()> {
        self.ensure_admin(caller, "grant admin")?;
        log::info!("🔑 {} granted admin role to {}", caller, admin);
        self.admins.write().insert(admin);
        Ok(())
    }

    pub fn add_issuer(
        &self,
        caller: &Address,
        id: Address,
        name: impl Into<String>,
        authorized_topics: TopicSet,
    ) -> Result<TrustedIssuer> {
        self.ensure_admin(caller, "add issuer")?;
        if id.is_empty() {
            return Err(ClaimsError::InvalidRequest(
                "issuer identifier must not be empty".to_string(),
            ));
        }

        let mut issuers = self.issuers.write();
        if issuers.contains_key(&id) {
            return Err(ClaimsError::AlreadyRegistered(id));
        }

        let now = self.clock.now();
        let issuer = TrustedIssuer {
            id: id.clone(),
            name: name.into(),
            authorized_topics,
            active: true,
            registered_at: now,
            updated_at: now,
        };
        issuers.insert(id, issuer.clone());

        log::info!(
            "✅ Registered trusted issuer {} ({}) for {:?}",
            issuer.id,
            issuer.name,
            issuer.authorized_topics
        );
        Ok(issuer)
    }

    pub fn remove_issuer(&self, caller: &Address, id: &Address) -> Result<TrustedIssuer> {
        self.ensure_admin(caller, "remove issuer")?;
        let removed = self
            .issuers
            .write()
            .remove(id)
            .ok_or_else(|| ClaimsError::IssuerNotFound(id.clone()))?;

        log::info!("Removed trusted issuer {}", id);
        Ok(removed)
    }

    pub fn update_authorized_topics(
        &self,
        caller: &Address,
        id: &Address,
        topics: TopicSet,
    ) -> Result<TrustedIssuer> {
        self.ensure_admin(caller, "update issuer topics")?;
        let now = self.clock.now();
        self.modify(id, |issuer| {
            issuer.authorized_topics = topics;
            issuer.updated_at = now;
        })
    }

    /// Suspend (`false`) or reinstate (`true`) an issuer's ability to issue
    pub fn set_active(&self, caller: &Address, id: &Address, active: bool) -> Result<TrustedIssuer> {
        self.ensure_admin(caller, "change issuer status")?;
        let now = self.clock.now();
        let updated = self.modify(id, |issuer| {
            issuer.active = active;
            issuer.updated_at = now;
        })?;
        if !active {
            log::warn!("⚠️  Trusted issuer {} suspended", id);
        }
        Ok(updated)
    }

    pub fn is_authorized(&self, id: &Address, topic: ClaimTopic) -> bool {
        self.issuers
            .read()
            .get(id)
            .is_some_and(|issuer| issuer.can_issue(topic))
    }

    pub fn get(&self, id: &Address) -> Option<TrustedIssuer> {
        self.issuers.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<TrustedIssuer> {
        let mut issuers: Vec<TrustedIssuer> = self.issuers.read().values().cloned().collect();
        issuers.sort_by(|a, b| a.id.cmp(&b.id));
        issuers
    }

    pub fn count(&self) -> usize {
        self.issuers.read().len()
    }

    fn modify(&self, id: &Address, f: impl FnOnce(&mut TrustedIssuer)) -> Result<TrustedIssuer> {
        let mut issuers = self.issuers.write();
        let issuer = issuers
            .get_mut(id)
            .ok_or_else(|| ClaimsError::IssuerNotFound(id.clone()))?;
        f(issuer);
        Ok(issuer.clone())
    }

    fn ensure_admin(&self, caller: &Address, action: &str) -> Result<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(ClaimsError::Unauthorized(format!(
                "{} is not an administrator ({})",
                caller, action
            )))
        }
    }
}
