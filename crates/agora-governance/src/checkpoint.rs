//! Historical voting-weight snapshots.
//!
//! Every account owns an append-only sequence of `(block, weight)`
//! checkpoints ordered by block. A lookup for block `N` returns the weight of
//! the last checkpoint recorded at or before `N`, found by binary search.

use std::collections::HashMap;

use agora_types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// A recorded voting-power change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Block from which `weight` is in effect
    pub block: u64,
    /// Weight until superseded by the next checkpoint
    pub weight: U256,
}

/// Ordered checkpoint sequence for a single account (or for total supply).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointHistory {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `weight` as of `block`.
    ///
    /// Appends when `block` is past the last checkpoint and overwrites the last
    /// checkpoint when several changes land in the same block.
    pub fn push(&mut self, block: u64, weight: U256) -> Result<(), GovernanceError> {
        match self.checkpoints.last_mut() {
            Some(last) if last.block == block => {
                last.weight = weight;
            }
            Some(last) if last.block > block => {
                return Err(GovernanceError::NonMonotonicCheckpoint {
                    block,
                    last: last.block,
                });
            }
            _ => self.checkpoints.push(Checkpoint { block, weight }),
        }
        Ok(())
    }

    /// Weight in effect at `block`, zero before the first checkpoint.
    pub fn at(&self, block: u64) -> U256 {
        let pos = self.checkpoints.partition_point(|c| c.block <= block);
        match pos {
            0 => U256::ZERO,
            n => self.checkpoints[n - 1].weight,
        }
    }

    /// Most recent weight.
    pub fn latest(&self) -> U256 {
        self.checkpoints.last().map(|c| c.weight).unwrap_or(U256::ZERO)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&Checkpoint> {
        self.checkpoints.get(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }
}

/// Per-account checkpoint store.
///
/// Owned and written by the token ledger; the engine only reads it.
#[derive(Debug, Clone, Default)]
pub struct WeightSnapshotStore {
    histories: HashMap<Address, CheckpointHistory>,
}

impl WeightSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weight of `account` in effect at `block`.
    ///
    /// Callers must not query blocks past the chain head; the store has no
    /// notion of the current block.
    pub fn weight_at(&self, account: &Address, block: u64) -> U256 {
        self.histories
            .get(account)
            .map(|h| h.at(block))
            .unwrap_or(U256::ZERO)
    }

    /// Record a new weight for `account` as of `at_block`.
    pub fn record_change(
        &mut self,
        account: Address,
        new_weight: U256,
        at_block: u64,
    ) -> Result<(), GovernanceError> {
        self.histories
            .entry(account)
            .or_default()
            .push(at_block, new_weight)
    }

    /// Current (latest) weight of `account`.
    pub fn latest(&self, account: &Address) -> U256 {
        self.histories
            .get(account)
            .map(|h| h.latest())
            .unwrap_or(U256::ZERO)
    }

    pub fn checkpoint_count(&self, account: &Address) -> usize {
        self.histories.get(account).map(|h| h.len()).unwrap_or(0)
    }

    pub fn checkpoint(&self, account: &Address, pos: usize) -> Option<Checkpoint> {
        self.histories.get(account).and_then(|h| h.get(pos)).copied()
    }
}

/// Discount applied to weights read for blocks before an equilibrium block.
///
/// Configured once per engine. At and after the equilibrium block every curve
/// is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum WeightDecay {
    /// No decay
    #[default]
    Identity,
    /// `weight * block / equilibrium_block` before the pivot
    Linear { equilibrium_block: u64 },
    /// `weight * factor_bps / 10000` before the pivot
    Step { equilibrium_block: u64, factor_bps: u16 },
}

impl WeightDecay {
    pub fn equilibrium_block(&self) -> Option<u64> {
        match self {
            WeightDecay::Identity => None,
            WeightDecay::Linear { equilibrium_block }
            | WeightDecay::Step { equilibrium_block, .. } => Some(*equilibrium_block),
        }
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        match self {
            WeightDecay::Identity => Ok(()),
            WeightDecay::Linear { equilibrium_block: 0 }
            | WeightDecay::Step { equilibrium_block: 0, .. } => Err(
                GovernanceError::InvalidParameter("equilibrium_block must be positive".into()),
            ),
            WeightDecay::Step { factor_bps, .. } if *factor_bps > 10_000 => Err(
                GovernanceError::InvalidParameter(format!(
                    "factor_bps {} exceeds 10000",
                    factor_bps
                )),
            ),
            _ => Ok(()),
        }
    }

    /// Scale `weight` as read for `block`.
    pub fn apply(&self, weight: U256, block: u64) -> U256 {
        match *self {
            WeightDecay::Identity => weight,
            WeightDecay::Linear { equilibrium_block } if block < equilibrium_block => {
                scale(weight, U256::from(block), U256::from(equilibrium_block))
            }
            WeightDecay::Step { equilibrium_block, factor_bps } if block < equilibrium_block => {
                scale(weight, U256::from(factor_bps as u64), U256::from(10_000u64))
            }
            _ => weight,
        }
    }
}

fn scale(weight: U256, numerator: U256, denominator: U256) -> U256 {
    weight.mul_div(&numerator, &denominator).unwrap_or_else(|| {
        // weight * numerator overflowed; divide first and accept the rounding.
        weight
            .checked_div(&denominator)
            .and_then(|w| w.checked_mul(&numerator))
            .unwrap_or(weight)
    })
}
