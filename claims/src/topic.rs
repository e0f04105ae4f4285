//! Claim topic catalog
//!
//! Topic codes are permanent: a retired topic keeps its code and new
//! topics always take a fresh one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ClaimsError;

/// Set of required topics, ordered by code
pub type TopicSet = BTreeSet<ClaimTopic>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ClaimTopic {
    /// Identity verified by a KYC provider
    KycApproved = 1,
    /// Holder qualifies as an accredited investor
    AccreditedInvestor = 2,
    /// Anti-money-laundering screening passed
    AmlCleared = 3,
    QualifiedPurchaser = 4,
    /// Residence in a jurisdiction the offering is open to
    JurisdictionApproved = 5,
    SanctionsScreened = 6,
}

impl ClaimTopic {
    pub const ALL: [ClaimTopic; 6] = [
        ClaimTopic::KycApproved,
        ClaimTopic::AccreditedInvestor,
        ClaimTopic::AmlCleared,
        ClaimTopic::QualifiedPurchaser,
        ClaimTopic::JurisdictionApproved,
        ClaimTopic::SanctionsScreened,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ClaimTopic::KycApproved => "KYC_APPROVED",
            ClaimTopic::AccreditedInvestor => "ACCREDITED_INVESTOR",
            ClaimTopic::AmlCleared => "AML_CLEARED",
            ClaimTopic::QualifiedPurchaser => "QUALIFIED_PURCHASER",
            ClaimTopic::JurisdictionApproved => "JURISDICTION_APPROVED",
            ClaimTopic::SanctionsScreened => "SANCTIONS_SCREENED",
        }
    }
}

impl fmt::Display for ClaimTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClaimTopic {
    type Err = ClaimsError;

    /// Accepts a catalog name (any case, `-` or `_` separated) or a numeric code
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u16>() {
            return Self::from_code(code).ok_or_else(|| ClaimsError::UnknownTopic(s.to_string()));
        }

        let normalized = trimmed.to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|topic| topic.name() == normalized)
            .ok_or_else(|| ClaimsError::UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ClaimTopic::KycApproved.code(), 1);
        assert_eq!(ClaimTopic::AccreditedInvestor.code(), 2);
        assert_eq!(ClaimTopic::AmlCleared.code(), 3);
        assert_eq!(ClaimTopic::from_code(6), Some(ClaimTopic::SanctionsScreened));
        assert_eq!(ClaimTopic::from_code(0), None);
    }

    #[test]
    fn test_parse_names_and_codes() {
        assert_eq!("KYC_APPROVED".parse::<ClaimTopic>().unwrap(), ClaimTopic::KycApproved);
        assert_eq!("aml-cleared".parse::<ClaimTopic>().unwrap(), ClaimTopic::AmlCleared);
        assert_eq!("2".parse::<ClaimTopic>().unwrap(), ClaimTopic::AccreditedInvestor);
        assert!(matches!(
            "GOLD_MEMBER".parse::<ClaimTopic>(),
            Err(ClaimsError::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_serde_uses_catalog_names() {
        let json = serde_json::to_string(&ClaimTopic::JurisdictionApproved).unwrap();
        assert_eq!(json, "\"JURISDICTION_APPROVED\"");
        assert!(serde_json::from_str::<ClaimTopic>("\"NOT_A_TOPIC\"").is_err());
    }
}
