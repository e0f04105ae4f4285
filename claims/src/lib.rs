//! Infravest Claims Module
//!
//! Tracks verifiable identity claims that gate who may hold, transfer and
//! govern project tokens:
//! - Claim topic catalog (KYC, accreditation, AML, ...)
//! - Trusted issuer registry
//! - Identity claims store with supersession, revocation and expiry
//! - Eligibility evaluation over the current claim set

pub mod claim;
pub mod eligibility;
pub mod error;
pub mod events;
pub mod issuer;
pub mod store;
pub mod topic;

pub use claim::{Claim, ClaimId, ClaimStatus, Revocation};
pub use eligibility::{EligibilityEvaluator, EligibilityReport};
pub use error::{ClaimsError, Result};
pub use events::ClaimEvent;
pub use issuer::{IssuerRegistry, TrustedIssuer};
pub use store::{ClaimStore, ClaimsSnapshot, IssueClaim, SUPERSEDED_REASON};
pub use topic::{ClaimTopic, TopicSet};
