//! Proposal lifecycle management.
//!
//! Proposals go through states: Pending -> Active -> Succeeded/Defeated -> Queued -> Executed,
//! with Canceled and Expired as side exits. State is never stored; it is derived from
//! the proposal's fields and the current block on every read.

use std::collections::HashMap;

use agora_types::{Address, Hash, HashBuilder, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::BlockContext;
use crate::error::GovernanceError;
use crate::host::{hash_calls, Call};
use crate::option::{OptionKind, OptionValue, ProposalOption};

/// Proposal state. Ordinals are read by external indexers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProposalState {
    /// Created, voting has not opened
    Pending = 0,
    /// Voting window is open
    Active = 1,
    /// Canceled by the proposer
    Canceled = 2,
    /// Missed quorum, tied at the top, or the no-op option won
    Defeated = 3,
    /// Voting closed with a unique winner
    Succeeded = 4,
    /// Scheduled in the timelock
    Queued = 5,
    /// Queued but not executed within the grace period
    Expired = 6,
    /// Winning action executed
    Executed = 7,
}

impl ProposalState {
    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Canceled
                | ProposalState::Defeated
                | ProposalState::Expired
                | ProposalState::Executed
        )
    }
}

impl TryFrom<u8> for ProposalState {
    type Error = GovernanceError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ProposalState::Pending,
            1 => ProposalState::Active,
            2 => ProposalState::Canceled,
            3 => ProposalState::Defeated,
            4 => ProposalState::Succeeded,
            5 => ProposalState::Queued,
            6 => ProposalState::Expired,
            7 => ProposalState::Executed,
            other => {
                return Err(GovernanceError::InvalidParameter(format!(
                    "unknown proposal state {}",
                    other
                )))
            }
        })
    }
}

/// How a voter voted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub option: u32,
    pub weight: U256,
}

/// Identity of a proposal: hash of its calls and description hash.
pub fn hash_proposal(calls: &[Call], description_hash: &Hash) -> Hash {
    let mut builder = HashBuilder::new("proposal");
    hash_calls(&mut builder, calls);
    builder.fixed(description_hash.as_bytes());
    builder.finalize()
}

/// Hash of a human readable description.
pub fn hash_description(description: &str) -> Hash {
    Hash::compute(description.as_bytes())
}

/// On-chain proposal.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Unique proposal ID
    pub id: Hash,
    /// Proposer address
    pub proposer: Address,
    /// Option type
    pub kind: OptionKind,
    /// Actions replayed when the proposal executes
    pub calls: Vec<Call>,
    /// Description
    pub description: String,
    /// Hash of the description, also the timelock salt
    pub description_hash: Hash,
    /// Options in index order
    pub options: Vec<ProposalOption>,
    /// Weight per option, parallel to `options`
    pub tallies: Vec<U256>,
    /// First block of the voting window
    pub start_block: u64,
    /// First block after the voting window
    pub end_block: u64,
    /// Votes by voter
    pub receipts: HashMap<Address, Receipt>,
    pub canceled: bool,
    /// Block the proposal was queued at
    pub queued_at: Option<u64>,
    /// Timestamp the queued action becomes executable
    pub eta: Option<u64>,
    pub executed: bool,
}

impl Proposal {
    /// Block whose weights and supply count for this proposal.
    pub fn snapshot_block(&self) -> u64 {
        self.start_block.saturating_sub(1)
    }

    pub fn option_count(&self) -> u32 {
        self.options.len() as u32
    }

    /// Weight cast on all options, `None` if the sum does not fit.
    pub fn total_votes(&self) -> Option<U256> {
        self.tallies
            .iter()
            .try_fold(U256::ZERO, |acc, tally| acc.checked_add(tally))
    }

    pub fn has_voted(&self, voter: &Address) -> bool {
        self.receipts.contains_key(voter)
    }

    pub fn receipt(&self, voter: &Address) -> Option<Receipt> {
        self.receipts.get(voter).copied()
    }

    pub fn targets(&self) -> Vec<Address> {
        self.calls.iter().map(|c| c.target).collect()
    }

    pub fn values(&self) -> Vec<U256> {
        self.calls.iter().map(|c| c.value).collect()
    }

    pub fn calldatas(&self) -> Vec<Vec<u8>> {
        self.calls.iter().map(|c| c.calldata.clone()).collect()
    }

    /// Option with the highest tally, lowest index on ties.
    pub fn winning_option(&self) -> Option<u32> {
        let mut best: Option<(u32, U256)> = None;
        for (index, tally) in self.tallies.iter().enumerate() {
            match best {
                Some((_, top)) if *tally <= top => {}
                _ => best = Some((index as u32, *tally)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// The winning option if it is strictly ahead of every other option
    /// and carries some weight.
    pub fn unique_winner(&self) -> Option<u32> {
        let winner = self.winning_option()?;
        let top = self.tallies[winner as usize];
        if top.is_zero() {
            return None;
        }
        let tied = self
            .tallies
            .iter()
            .enumerate()
            .any(|(i, t)| i as u32 != winner && *t == top);
        if tied {
            None
        } else {
            Some(winner)
        }
    }

    /// Payload of the winning option, if the option carries one.
    pub fn winning_payload(&self) -> Option<OptionValue> {
        let winner = self.unique_winner()?;
        self.options[winner as usize].payload
    }

    /// Derive the state at `ctx`.
    ///
    /// `quorum_at` maps the snapshot block to the quorum; it is only
    /// consulted once voting has closed.
    pub fn state(
        &self,
        ctx: &BlockContext,
        grace_period: u64,
        quorum_at: impl FnOnce(u64) -> U256,
    ) -> ProposalState {
        if self.executed {
            return ProposalState::Executed;
        }
        if self.canceled {
            return ProposalState::Canceled;
        }
        if ctx.number < self.start_block {
            return ProposalState::Pending;
        }
        if ctx.number < self.end_block {
            return ProposalState::Active;
        }

        // cast_vote rejects any vote that would overflow the sum
        let total = self.total_votes().unwrap_or(U256::MAX);
        if total < quorum_at(self.snapshot_block()) {
            return ProposalState::Defeated;
        }
        match self.unique_winner() {
            None => return ProposalState::Defeated,
            Some(winner) if Some(winner) == self.kind.noop_option() => {
                return ProposalState::Defeated
            }
            Some(_) => {}
        }

        match self.eta {
            Some(eta) if ctx.timestamp >= eta.saturating_add(grace_period) => {
                ProposalState::Expired
            }
            Some(_) => ProposalState::Queued,
            None => ProposalState::Succeeded,
        }
    }
}

/// Proposal registry managing all proposals.
#[derive(Debug, Clone)]
pub struct ProposalRegistry {
    proposals: HashMap<Hash, Proposal>,
    /// Creation order
    order: Vec<Hash>,
    voting_delay: u64,
    voting_period: u64,
    grace_period: u64,
}

impl ProposalRegistry {
    pub fn new(voting_delay: u64, voting_period: u64, grace_period: u64) -> Self {
        Self {
            proposals: HashMap::new(),
            order: Vec::new(),
            voting_delay,
            voting_period,
            grace_period,
        }
    }

    /// Create a new proposal and seed its options.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        proposer: Address,
        targets: &[Address],
        values: &[U256],
        calldatas: &[Vec<u8>],
        description: &str,
        kind: OptionKind,
        ctx: &BlockContext,
    ) -> Result<Hash, GovernanceError> {
        if targets.is_empty() {
            return Err(GovernanceError::EmptyAction);
        }
        let calls = Call::zip(targets, values, calldatas).ok_or(GovernanceError::EmptyAction)?;
        let description_hash = hash_description(description);
        let id = hash_proposal(&calls, &description_hash);
        if self.proposals.contains_key(&id) {
            return Err(GovernanceError::DuplicateProposal(id));
        }

        let start_block = ctx
            .number
            .checked_add(self.voting_delay)
            .ok_or(GovernanceError::Overflow)?;
        let end_block = start_block
            .checked_add(self.voting_period)
            .ok_or(GovernanceError::Overflow)?;

        let options: Vec<ProposalOption> = kind
            .seeded_labels()
            .iter()
            .enumerate()
            .map(|(index, label)| ProposalOption {
                index: index as u32,
                label: label.to_string(),
                payload: None,
            })
            .collect();
        let tallies = vec![U256::ZERO; options.len()];

        let proposal = Proposal {
            id,
            proposer,
            kind,
            calls,
            description: description.to_string(),
            description_hash,
            options,
            tallies,
            start_block,
            end_block,
            receipts: HashMap::new(),
            canceled: false,
            queued_at: None,
            eta: None,
            executed: false,
        };
        self.proposals.insert(id, proposal);
        self.order.push(id);
        debug!(%id, %proposer, ?kind, start_block, end_block, "Proposal stored");
        Ok(id)
    }

    /// Append an option. Only possible before voting opens.
    pub fn add_option(
        &mut self,
        id: &Hash,
        label: &str,
        payload: Option<OptionValue>,
        ctx: &BlockContext,
    ) -> Result<u32, GovernanceError> {
        let proposal = self.get_mut(id)?;
        if ctx.number >= proposal.start_block {
            return Err(GovernanceError::VotingAlreadyStarted(proposal.start_block));
        }
        if label.trim().is_empty() {
            return Err(GovernanceError::EmptyOptionLabel);
        }
        proposal.kind.check_payload(payload.as_ref())?;

        let index = proposal.option_count();
        proposal.options.push(ProposalOption {
            index,
            label: label.to_string(),
            payload,
        });
        proposal.tallies.push(U256::ZERO);
        debug!(%id, index, label, "Option added");
        Ok(index)
    }

    /// Record a vote and return the weight counted.
    ///
    /// `weight_at` maps the snapshot block to the voter's weight.
    pub fn cast_vote(
        &mut self,
        id: &Hash,
        voter: Address,
        option: u32,
        ctx: &BlockContext,
        weight_at: impl FnOnce(u64) -> U256,
    ) -> Result<U256, GovernanceError> {
        let proposal = self.get_mut(id)?;
        if proposal.canceled
            || ctx.number < proposal.start_block
            || ctx.number >= proposal.end_block
        {
            return Err(GovernanceError::VotingNotActive {
                start: proposal.start_block,
                end: proposal.end_block,
                current: ctx.number,
            });
        }
        if proposal.has_voted(&voter) {
            return Err(GovernanceError::AlreadyVoted(voter));
        }
        if option >= proposal.option_count() {
            return Err(GovernanceError::InvalidOption {
                index: option,
                count: proposal.option_count(),
            });
        }

        let weight = weight_at(proposal.snapshot_block());
        let tally = proposal.tallies[option as usize]
            .checked_add(&weight)
            .ok_or(GovernanceError::Overflow)?;
        proposal
            .total_votes()
            .and_then(|total| total.checked_add(&weight))
            .ok_or(GovernanceError::Overflow)?;

        proposal.tallies[option as usize] = tally;
        proposal.receipts.insert(voter, Receipt { option, weight });
        debug!(%id, %voter, option, %weight, "Vote counted");
        Ok(weight)
    }

    /// Current state of a proposal.
    pub fn state(
        &self,
        id: &Hash,
        ctx: &BlockContext,
        quorum_at: impl FnOnce(u64) -> U256,
    ) -> Result<ProposalState, GovernanceError> {
        Ok(self.get(id)?.state(ctx, self.grace_period, quorum_at))
    }

    /// Highest tallied option, lowest index on ties.
    pub fn winning_option(&self, id: &Hash) -> Result<Option<u32>, GovernanceError> {
        Ok(self.get(id)?.winning_option())
    }

    /// Tally of every option in index order.
    pub fn option_votes(&self, id: &Hash) -> Result<Vec<(String, U256)>, GovernanceError> {
        let proposal = self.get(id)?;
        Ok(proposal
            .options
            .iter()
            .zip(&proposal.tallies)
            .map(|(option, tally)| (option.label.clone(), *tally))
            .collect())
    }

    pub fn has_voted(&self, id: &Hash, voter: &Address) -> Result<bool, GovernanceError> {
        Ok(self.get(id)?.has_voted(voter))
    }

    pub fn mark_queued(&mut self, id: &Hash, block: u64, eta: u64) -> Result<(), GovernanceError> {
        let proposal = self.get_mut(id)?;
        proposal.queued_at = Some(block);
        proposal.eta = Some(eta);
        Ok(())
    }

    pub fn mark_executed(&mut self, id: &Hash) -> Result<(), GovernanceError> {
        let proposal = self.get_mut(id)?;
        if proposal.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        proposal.executed = true;
        Ok(())
    }

    pub fn mark_canceled(&mut self, id: &Hash) -> Result<(), GovernanceError> {
        let proposal = self.get_mut(id)?;
        if proposal.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        if proposal.canceled {
            return Err(GovernanceError::AlreadyCanceled);
        }
        proposal.canceled = true;
        Ok(())
    }

    /// Get a proposal.
    pub fn get(&self, id: &Hash) -> Result<&Proposal, GovernanceError> {
        self.proposals
            .get(id)
            .ok_or(GovernanceError::UnknownProposal(*id))
    }

    fn get_mut(&mut self, id: &Hash) -> Result<&mut Proposal, GovernanceError> {
        self.proposals
            .get_mut(id)
            .ok_or(GovernanceError::UnknownProposal(*id))
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.proposals.contains_key(id)
    }

    /// All proposals in creation order.
    pub fn all(&self) -> impl Iterator<Item = &Proposal> {
        self.order.iter().filter_map(|id| self.proposals.get(id))
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn voting_delay(&self) -> u64 {
        self.voting_delay
    }

    pub fn voting_period(&self) -> u64 {
        self.voting_period
    }

    pub fn grace_period(&self) -> u64 {
        self.grace_period
    }
}
