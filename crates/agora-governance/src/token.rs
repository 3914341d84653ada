//! Governance token ledger.
//!
//! A minimal votes-tracking token: balances, delegation and the checkpoint
//! histories the engine reads. Balances only count as voting weight once the
//! holder delegates (to themselves or to someone else).

use std::collections::HashMap;

use agora_types::{Address, U256};
use tracing::debug;

use crate::checkpoint::{Checkpoint, CheckpointHistory, WeightSnapshotStore};
use crate::error::GovernanceError;

/// Historical weight lookups consumed by the governor.
pub trait VotesSource {
    /// Delegated weight of `account` at `block`.
    fn past_votes(&self, account: &Address, block: u64) -> U256;

    /// Total token supply at `block`.
    fn past_total_supply(&self, block: u64) -> U256;
}

/// In-memory votes token.
#[derive(Debug, Clone, Default)]
pub struct VotesToken {
    balances: HashMap<Address, U256>,
    delegates: HashMap<Address, Address>,
    votes: WeightSnapshotStore,
    total_supply: CheckpointHistory,
    /// Highest block any change was recorded at
    head: u64,
}

impl VotesToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> U256 {
        self.balances.get(account).copied().unwrap_or(U256::ZERO)
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply.latest()
    }

    /// Current delegatee of `account`, if any.
    pub fn delegates(&self, account: &Address) -> Option<Address> {
        self.delegates.get(account).copied()
    }

    /// Current voting weight of `account`.
    pub fn get_votes(&self, account: &Address) -> U256 {
        self.votes.latest(account)
    }

    pub fn get_past_votes(&self, account: &Address, block: u64) -> U256 {
        self.votes.weight_at(account, block)
    }

    pub fn get_past_total_supply(&self, block: u64) -> U256 {
        self.total_supply.at(block)
    }

    pub fn num_checkpoints(&self, account: &Address) -> usize {
        self.votes.checkpoint_count(account)
    }

    pub fn checkpoint(&self, account: &Address, pos: usize) -> Option<Checkpoint> {
        self.votes.checkpoint(account, pos)
    }

    /// Read access to the underlying snapshot store.
    pub fn snapshots(&self) -> &WeightSnapshotStore {
        &self.votes
    }

    /// Create `amount` new tokens for `to`.
    pub fn mint(&mut self, to: Address, amount: U256, block: u64) -> Result<(), GovernanceError> {
        self.check_block(block)?;
        let supply = self
            .total_supply()
            .checked_add(&amount)
            .ok_or(GovernanceError::Overflow)?;
        let balance = self
            .balance_of(&to)
            .checked_add(&amount)
            .ok_or(GovernanceError::Overflow)?;
        let moves = self.plan_move(None, self.delegates(&to), amount)?;

        self.total_supply.push(block, supply)?;
        self.balances.insert(to, balance);
        self.apply_moves(moves, block)?;
        debug!(%to, %amount, block, "Minted governance tokens");
        Ok(())
    }

    /// Destroy `amount` tokens held by `from`.
    pub fn burn(&mut self, from: Address, amount: U256, block: u64) -> Result<(), GovernanceError> {
        self.check_block(block)?;
        let balance = self.debit(&from, amount)?;
        let supply = self
            .total_supply()
            .checked_sub(&amount)
            .ok_or(GovernanceError::Overflow)?;
        let moves = self.plan_move(self.delegates(&from), None, amount)?;

        self.total_supply.push(block, supply)?;
        self.balances.insert(from, balance);
        self.apply_moves(moves, block)?;
        Ok(())
    }

    /// Move `amount` from `from` to `to`, carrying delegated weight along.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
        block: u64,
    ) -> Result<(), GovernanceError> {
        self.check_block(block)?;
        let from_balance = self.debit(&from, amount)?;
        let to_balance = if from == to {
            self.balance_of(&to)
        } else {
            self.balance_of(&to)
                .checked_add(&amount)
                .ok_or(GovernanceError::Overflow)?
        };
        let moves = self.plan_move(self.delegates(&from), self.delegates(&to), amount)?;

        if from != to {
            self.balances.insert(from, from_balance);
            self.balances.insert(to, to_balance);
        }
        self.apply_moves(moves, block)?;
        debug!(%from, %to, %amount, block, "Transferred governance tokens");
        Ok(())
    }

    /// Point the voting weight of `delegator`'s balance at `delegatee`.
    pub fn delegate(
        &mut self,
        delegator: Address,
        delegatee: Address,
        block: u64,
    ) -> Result<(), GovernanceError> {
        self.check_block(block)?;
        let previous = self.delegates(&delegator);
        let amount = self.balance_of(&delegator);
        let moves = self.plan_move(previous, Some(delegatee), amount)?;

        self.delegates.insert(delegator, delegatee);
        self.apply_moves(moves, block)?;
        debug!(%delegator, %delegatee, block, "Delegated voting weight");
        Ok(())
    }

    fn check_block(&self, block: u64) -> Result<(), GovernanceError> {
        if block < self.head {
            return Err(GovernanceError::NonMonotonicCheckpoint { block, last: self.head });
        }
        Ok(())
    }

    fn debit(&self, account: &Address, amount: U256) -> Result<U256, GovernanceError> {
        let balance = self.balance_of(account);
        balance.checked_sub(&amount).ok_or_else(|| {
            GovernanceError::InsufficientBalance(format!(
                "{} holds {}, needs {}",
                account, balance, amount
            ))
        })
    }

    /// Compute the new weights of `src` and `dst` without writing anything.
    fn plan_move(
        &self,
        src: Option<Address>,
        dst: Option<Address>,
        amount: U256,
    ) -> Result<Vec<(Address, U256)>, GovernanceError> {
        if src == dst || amount.is_zero() {
            return Ok(Vec::new());
        }
        let mut moves = Vec::with_capacity(2);
        if let Some(src) = src {
            let weight = self
                .get_votes(&src)
                .checked_sub(&amount)
                .ok_or(GovernanceError::Overflow)?;
            moves.push((src, weight));
        }
        if let Some(dst) = dst {
            let weight = self
                .get_votes(&dst)
                .checked_add(&amount)
                .ok_or(GovernanceError::Overflow)?;
            moves.push((dst, weight));
        }
        Ok(moves)
    }

    fn apply_moves(&mut self, moves: Vec<(Address, U256)>, block: u64) -> Result<(), GovernanceError> {
        for (account, weight) in moves {
            self.votes.record_change(account, weight, block)?;
        }
        self.head = block;
        Ok(())
    }
}

impl VotesSource for VotesToken {
    fn past_votes(&self, account: &Address, block: u64) -> U256 {
        self.get_past_votes(account, block)
    }

    fn past_total_supply(&self, block: u64) -> U256 {
        self.get_past_total_supply(block)
    }
}
