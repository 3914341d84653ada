//! Governor configuration.
//!
//! Fixed at construction; the engine never mutates it.

use agora_types::U256;
use serde::{Deserialize, Serialize};

use crate::checkpoint::WeightDecay;
use crate::error::GovernanceError;

/// Fourteen days, the grace window of a queued proposal.
pub const DEFAULT_GRACE_PERIOD: u64 = 14 * 24 * 60 * 60;

/// Governance parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Quorum as a percentage of total supply at the snapshot block
    pub quorum_percentage: u8,
    /// Blocks between proposal creation and the start of voting
    pub voting_delay: u64,
    /// Length of the voting window in blocks
    pub voting_period: u64,
    /// Minimum timelock delay in seconds
    pub min_timelock_delay: u64,
    /// Seconds after the eta during which a queued proposal can execute
    pub grace_period: u64,
    /// Weight a proposer needs to open a proposal
    pub proposal_threshold: U256,
    /// Decay applied to weights read before the equilibrium block
    pub weight_decay: WeightDecay,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            quorum_percentage: 4,
            voting_delay: 1,
            voting_period: 5,
            min_timelock_delay: 1,
            grace_period: DEFAULT_GRACE_PERIOD,
            proposal_threshold: U256::ZERO,
            weight_decay: WeightDecay::Identity,
        }
    }
}

impl GovernorConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.quorum_percentage > 100 {
            return Err(GovernanceError::InvalidParameter(format!(
                "quorum_percentage {} exceeds 100",
                self.quorum_percentage
            )));
        }
        if self.voting_period == 0 {
            return Err(GovernanceError::InvalidParameter(
                "voting_period cannot be 0".to_string(),
            ));
        }
        self.weight_decay.validate()
    }
}
