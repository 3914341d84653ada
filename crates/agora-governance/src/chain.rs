//! Block context supplied by the host ledger on every call.

use serde::{Deserialize, Serialize};

/// Height and timestamp of the block a call executes in.
///
/// Voting windows are measured in blocks, timelock delays in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockContext {
    /// Current block height
    pub number: u64,
    /// Current block timestamp (seconds)
    pub timestamp: u64,
}

impl BlockContext {
    pub const fn new(number: u64, timestamp: u64) -> Self {
        Self { number, timestamp }
    }

    /// Context `blocks` blocks later, `block_time` seconds apart.
    pub fn advance(&self, blocks: u64, block_time: u64) -> Self {
        Self {
            number: self.number + blocks,
            timestamp: self.timestamp + blocks * block_time,
        }
    }

    /// Same block height, `seconds` later.
    pub fn wait(&self, seconds: u64) -> Self {
        Self {
            number: self.number,
            timestamp: self.timestamp + seconds,
        }
    }
}
