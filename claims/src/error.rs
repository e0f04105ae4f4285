//! Claims error types

use infravest_core::Address;
use thiserror::Error;

use crate::claim::ClaimId;
use crate::topic::ClaimTopic;

#[derive(Error, Debug)]
pub enum ClaimsError {
    #[error("Claim not found: {0}")]
    NotFound(ClaimId),

    #[error("Issuer not found: {0}")]
    IssuerNotFound(Address),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Issuer {issuer} is not authorized for topic {topic}")]
    UnauthorizedIssuer { issuer: Address, topic: ClaimTopic },

    #[error("Issuer already registered: {0}")]
    AlreadyRegistered(Address),

    #[error("Claim already revoked: {0}")]
    AlreadyRevoked(ClaimId),

    #[error("Claim no longer active: {0}")]
    AlreadyInactive(ClaimId),

    #[error("Invalid expiry: expires at {expires_at}, now {now}")]
    InvalidExpiry { expires_at: u64, now: u64 },

    #[error("{subject} is missing required claims: {missing:?}")]
    NotEligible {
        subject: Address,
        missing: Vec<ClaimTopic>,
    },

    #[error("Unknown claim topic: {0}")]
    UnknownTopic(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClaimsError {
    /// Stable client-facing error code
    pub fn code(&self) -> &'static str {
        match self {
            ClaimsError::NotFound(_) | ClaimsError::IssuerNotFound(_) => "NOT_FOUND",
            ClaimsError::Unauthorized(_) => "UNAUTHORIZED",
            ClaimsError::UnauthorizedIssuer { .. } => "UNAUTHORIZED_ISSUER",
            ClaimsError::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            ClaimsError::AlreadyRevoked(_) => "ALREADY_REVOKED",
            ClaimsError::AlreadyInactive(_) => "ALREADY_INACTIVE",
            ClaimsError::InvalidExpiry { .. } => "INVALID_EXPIRY",
            ClaimsError::NotEligible { .. } => "NOT_ELIGIBLE",
            ClaimsError::UnknownTopic(_) => "UNKNOWN_TOPIC",
            ClaimsError::InvalidRequest(_) => "INVALID_REQUEST",
            ClaimsError::Io(_) | ClaimsError::Serialization(_) => "STORAGE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClaimsError>;
