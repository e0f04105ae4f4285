//! Governance configuration
//!
//! Loaded from TOML. Claim topics are written by catalog name and are
//! checked against the catalog while parsing, so a typo fails at load
//! time rather than silently disabling a requirement.
//!
//! ```toml
//! voting_delay = 86400
//! voting_period = 604800
//! quorum_numerator = 10
//! quorum_denominator = 100
//! claim_gating_enabled = true
//! required_proposal_claims = ["KYC_APPROVED", "ACCREDITED_INVESTOR"]
//! required_vote_claims = ["KYC_APPROVED"]
//! weight_source = "live"
//! ```

use infravest_claims::TopicSet;
use infravest_core::SECONDS_PER_DAY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Delay between proposal creation and the start of voting (1 day)
pub const DEFAULT_VOTING_DELAY: u64 = SECONDS_PER_DAY;

/// Standard voting period (7 days)
pub const DEFAULT_VOTING_PERIOD: u64 = 7 * SECONDS_PER_DAY;

/// Longest voting period a proposer may request (30 days)
pub const DEFAULT_MAX_VOTING_PERIOD: u64 = 30 * SECONDS_PER_DAY;

/// Default quorum: 10% of total supply
pub const DEFAULT_QUORUM_NUMERATOR: u64 = 10;
pub const DEFAULT_QUORUM_DENOMINATOR: u64 = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where a ballot's weight is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Voter's balance at the moment the ballot is cast.
    /// Tokens moved after voting can be voted again from another address
    /// unless the ledger locks transfers during voting windows.
    #[default]
    Live,
    /// Voter's balance when the voting window opened (requires ledger history)
    SnapshotAtVotingStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub voting_delay: u64,
    pub voting_period: u64,
    pub max_voting_period: u64,
    pub quorum_numerator: u64,
    pub quorum_denominator: u64,
    pub claim_gating_enabled: bool,
    pub required_proposal_claims: TopicSet,
    pub required_vote_claims: TopicSet,
    pub weight_source: WeightSource,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_delay: DEFAULT_VOTING_DELAY,
            voting_period: DEFAULT_VOTING_PERIOD,
            max_voting_period: DEFAULT_MAX_VOTING_PERIOD,
            quorum_numerator: DEFAULT_QUORUM_NUMERATOR,
            quorum_denominator: DEFAULT_QUORUM_DENOMINATOR,
            claim_gating_enabled: false,
            required_proposal_claims: TopicSet::new(),
            required_vote_claims: TopicSet::new(),
            weight_source: WeightSource::Live,
        }
    }
}

impl GovernanceConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: GovernanceConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quorum_denominator == 0 {
            return Err(ConfigError::Invalid(
                "quorum_denominator must be greater than zero".to_string(),
            ));
        }
        if self.quorum_numerator > self.quorum_denominator {
            return Err(ConfigError::Invalid(format!(
                "quorum fraction {}/{} exceeds 1",
                self.quorum_numerator, self.quorum_denominator
            )));
        }
        if self.voting_period == 0 {
            return Err(ConfigError::Invalid(
                "voting_period must be greater than zero".to_string(),
            ));
        }
        if self.voting_period > self.max_voting_period {
            return Err(ConfigError::Invalid(format!(
                "voting_period {} exceeds max_voting_period {}",
                self.voting_period, self.max_voting_period
            )));
        }
        Ok(())
    }

    /// Quorum in token weight for a given total supply, rounded down
    pub fn quorum_for(&self, total_supply: u64) -> u64 {
        let quorum = total_supply as u128 * self.quorum_numerator as u128
            / self.quorum_denominator.max(1) as u128;
        // numerator <= denominator keeps this within u64
        quorum as u64
    }
}
