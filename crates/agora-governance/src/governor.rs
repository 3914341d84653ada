//! Governor engine.
//!
//! Composes the proposal registry, the votes source and the timelock into the
//! full lifecycle: propose, add options, vote, queue and execute.

use agora_types::{Address, Hash, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::BlockContext;
use crate::config::GovernorConfig;
use crate::error::GovernanceError;
use crate::host::{Call, CallHost};
use crate::option::{OptionKind, OptionValue};
use crate::proposal::{self, Proposal, ProposalRegistry, ProposalState};
use crate::roles::RoleRegistry;
use crate::timelock::{hash_operation_batch, OperationState, TimelockQueue};
use crate::token::VotesSource;

/// Labels and tallies of a proposal's options, index aligned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionVotes {
    pub labels: Vec<String>,
    pub tallies: Vec<U256>,
}

/// Governance engine.
#[derive(Debug, Clone)]
pub struct GovernorEngine<R> {
    /// Account the governor acts as towards the timelock
    address: Address,
    config: GovernorConfig,
    registry: ProposalRegistry,
    timelock: TimelockQueue<R>,
}

impl<R: RoleRegistry> GovernorEngine<R> {
    /// Create an engine. The timelock must grant `address` the Proposer role
    /// for `queue` and `cancel` to reach it.
    pub fn new(
        address: Address,
        config: GovernorConfig,
        timelock: TimelockQueue<R>,
    ) -> Result<Self, GovernanceError> {
        config.validate()?;
        let registry = ProposalRegistry::new(
            config.voting_delay,
            config.voting_period,
            config.grace_period,
        );
        Ok(Self {
            address,
            config,
            registry,
            timelock,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProposalRegistry {
        &self.registry
    }

    pub fn timelock(&self) -> &TimelockQueue<R> {
        &self.timelock
    }

    pub fn timelock_mut(&mut self) -> &mut TimelockQueue<R> {
        &mut self.timelock
    }

    pub fn voting_delay(&self) -> u64 {
        self.config.voting_delay
    }

    pub fn voting_period(&self) -> u64 {
        self.config.voting_period
    }

    /// Open a classic Against/For proposal.
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &mut self,
        proposer: Address,
        targets: &[Address],
        values: &[U256],
        calldatas: &[Vec<u8>],
        description: &str,
        ctx: &BlockContext,
        votes: &impl VotesSource,
    ) -> Result<Hash, GovernanceError> {
        self.propose_with_options(
            proposer,
            targets,
            values,
            calldatas,
            description,
            OptionKind::Single,
            ctx,
            votes,
        )
    }

    /// Open a proposal of the given option kind.
    #[allow(clippy::too_many_arguments)]
    pub fn propose_with_options(
        &mut self,
        proposer: Address,
        targets: &[Address],
        values: &[U256],
        calldatas: &[Vec<u8>],
        description: &str,
        kind: OptionKind,
        ctx: &BlockContext,
        votes: &impl VotesSource,
    ) -> Result<Hash, GovernanceError> {
        if !self.config.proposal_threshold.is_zero() {
            let weight = self.get_ballot_weight_from_block_number(
                &proposer,
                ctx.number.saturating_sub(1),
                votes,
            );
            if weight < self.config.proposal_threshold {
                return Err(GovernanceError::BelowProposalThreshold { proposer });
            }
        }

        let id = self
            .registry
            .create(proposer, targets, values, calldatas, description, kind, ctx)?;
        info!(%id, %proposer, ?kind, block = ctx.number, "Proposal created");
        Ok(id)
    }

    /// Append an option to a pending proposal.
    pub fn add_option(
        &mut self,
        id: &Hash,
        label: &str,
        payload: Option<OptionValue>,
        ctx: &BlockContext,
    ) -> Result<u32, GovernanceError> {
        let index = self.registry.add_option(id, label, payload, ctx)?;
        info!(%id, index, label, "Option added to proposal");
        Ok(index)
    }

    /// Vote for `option` with the voter's weight at the snapshot block.
    pub fn cast_vote(
        &mut self,
        id: &Hash,
        voter: Address,
        option: u32,
        ctx: &BlockContext,
        votes: &impl VotesSource,
    ) -> Result<U256, GovernanceError> {
        self.cast_vote_with_reason(id, voter, option, "", ctx, votes)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn cast_vote_with_reason(
        &mut self,
        id: &Hash,
        voter: Address,
        option: u32,
        reason: &str,
        ctx: &BlockContext,
        votes: &impl VotesSource,
    ) -> Result<U256, GovernanceError> {
        let decay = self.config.weight_decay;
        let weight = self.registry.cast_vote(id, voter, option, ctx, |block| {
            decay.apply(votes.past_votes(&voter, block), block)
        })?;
        info!(%id, %voter, option, %weight, reason, "Vote cast");
        Ok(weight)
    }

    /// Schedule the winning action of a succeeded proposal in the timelock.
    ///
    /// Returns the timelock operation id.
    pub fn queue(
        &mut self,
        id: &Hash,
        ctx: &BlockContext,
        votes: &impl VotesSource,
    ) -> Result<Hash, GovernanceError> {
        if self.state(id, ctx, votes)? != ProposalState::Succeeded {
            return Err(GovernanceError::ProposalNotSucceeded);
        }
        let proposal = self.registry.get(id)?;
        let calls = queued_calls(proposal);
        let salt = proposal.description_hash;
        let delay = self.timelock.min_delay();
        let eta = ctx
            .timestamp
            .checked_add(delay)
            .ok_or(GovernanceError::Overflow)?;

        let op_id = self
            .timelock
            .schedule(&self.address, calls, None, salt, delay, ctx.timestamp)?;
        self.registry.mark_queued(id, ctx.number, eta)?;
        info!(%id, operation = %op_id, eta, "Proposal queued");
        Ok(op_id)
    }

    /// Execute a queued proposal through the timelock.
    pub fn execute<H: CallHost>(
        &mut self,
        id: &Hash,
        ctx: &BlockContext,
        votes: &impl VotesSource,
        host: &mut H,
    ) -> Result<Vec<Vec<u8>>, GovernanceError> {
        match self.state(id, ctx, votes)? {
            ProposalState::Queued => {}
            ProposalState::Executed => return Err(GovernanceError::AlreadyExecuted),
            _ => return Err(GovernanceError::ProposalNotQueued),
        }
        let op_id = self.operation_id(id)?;
        let results = self
            .timelock
            .execute(&self.address, &op_id, ctx.timestamp, host)?;
        self.registry.mark_executed(id)?;
        info!(%id, operation = %op_id, "Proposal executed");
        Ok(results)
    }

    /// Cancel a proposal. Only the proposer may cancel, and only before
    /// execution; a queued proposal also loses its timelock operation.
    pub fn cancel(
        &mut self,
        id: &Hash,
        caller: &Address,
        ctx: &BlockContext,
        votes: &impl VotesSource,
    ) -> Result<(), GovernanceError> {
        let proposer = self.registry.get(id)?.proposer;
        if *caller != proposer {
            return Err(GovernanceError::Unauthorized(format!(
                "{} is not the proposer of {}",
                caller, id
            )));
        }
        match self.state(id, ctx, votes)? {
            ProposalState::Executed => return Err(GovernanceError::AlreadyExecuted),
            ProposalState::Canceled => return Err(GovernanceError::AlreadyCanceled),
            ProposalState::Defeated | ProposalState::Expired => {
                return Err(GovernanceError::ProposalNotCancelable)
            }
            ProposalState::Queued => {
                let op_id = self.operation_id(id)?;
                self.timelock.cancel(&self.address, &op_id)?;
            }
            ProposalState::Pending | ProposalState::Active | ProposalState::Succeeded => {}
        }
        self.registry.mark_canceled(id)?;
        info!(%id, %caller, "Proposal canceled");
        Ok(())
    }

    /// Current state of a proposal.
    ///
    /// A queued proposal follows its timelock operation, so an operation run
    /// or canceled directly on the timelock shows up as Executed or Canceled.
    pub fn state(
        &self,
        id: &Hash,
        ctx: &BlockContext,
        votes: &impl VotesSource,
    ) -> Result<ProposalState, GovernanceError> {
        let state = self
            .registry
            .state(id, ctx, |block| self.quorum(block, votes))?;
        if !matches!(state, ProposalState::Queued | ProposalState::Expired) {
            return Ok(state);
        }
        let op_id = self.operation_id(id)?;
        Ok(match self.timelock.operation_state(&op_id, ctx.timestamp) {
            OperationState::Done => ProposalState::Executed,
            OperationState::Canceled => ProposalState::Canceled,
            _ => state,
        })
    }

    /// Proposal id for the given action and description hash.
    pub fn hash_proposal(
        &self,
        targets: &[Address],
        values: &[U256],
        calldatas: &[Vec<u8>],
        description_hash: &Hash,
    ) -> Result<Hash, GovernanceError> {
        if targets.is_empty() {
            return Err(GovernanceError::EmptyAction);
        }
        let calls = Call::zip(targets, values, calldatas).ok_or(GovernanceError::EmptyAction)?;
        Ok(proposal::hash_proposal(&calls, description_hash))
    }

    pub fn proposal(&self, id: &Hash) -> Result<&Proposal, GovernanceError> {
        self.registry.get(id)
    }

    /// Block whose weights count for the proposal.
    pub fn proposal_snapshot(&self, id: &Hash) -> Result<u64, GovernanceError> {
        Ok(self.registry.get(id)?.snapshot_block())
    }

    /// First block after the voting window.
    pub fn proposal_deadline(&self, id: &Hash) -> Result<u64, GovernanceError> {
        Ok(self.registry.get(id)?.end_block)
    }

    /// Timestamp the queued action becomes executable, once queued.
    pub fn proposal_eta(&self, id: &Hash) -> Result<Option<u64>, GovernanceError> {
        Ok(self.registry.get(id)?.eta)
    }

    pub fn proposal_option_count(&self, id: &Hash) -> Result<u32, GovernanceError> {
        Ok(self.registry.get(id)?.option_count())
    }

    pub fn option_votes(&self, id: &Hash) -> Result<OptionVotes, GovernanceError> {
        let (labels, tallies) = self.registry.option_votes(id)?.into_iter().unzip();
        Ok(OptionVotes { labels, tallies })
    }

    /// Index of the leading option, lowest index on ties.
    pub fn option_succeeded(&self, id: &Hash) -> Result<Option<u32>, GovernanceError> {
        self.registry.winning_option(id)
    }

    pub fn has_voted(&self, id: &Hash, voter: &Address) -> Result<bool, GovernanceError> {
        self.registry.has_voted(id, voter)
    }

    /// Weight needed at `block`: a percentage of the (decayed) total supply.
    pub fn quorum(&self, block: u64, votes: &impl VotesSource) -> U256 {
        let supply = self
            .config
            .weight_decay
            .apply(votes.past_total_supply(block), block);
        let pct = U256::from(self.config.quorum_percentage as u64);
        let hundred = U256::from(100u64);
        let quorum = supply.mul_div(&pct, &hundred).unwrap_or_else(|| {
            supply
                .checked_div(&hundred)
                .and_then(|s| s.checked_mul(&pct))
                .unwrap_or(U256::MAX)
        });
        debug!(block, %supply, %quorum, "Quorum computed");
        quorum
    }

    /// Voting weight of `account` at `block`, decay applied.
    pub fn get_ballot_weight_from_block_number(
        &self,
        account: &Address,
        block: u64,
        votes: &impl VotesSource,
    ) -> U256 {
        self.config
            .weight_decay
            .apply(votes.past_votes(account, block), block)
    }

    /// Timelock operation id of a proposal's queued batch.
    fn operation_id(&self, id: &Hash) -> Result<Hash, GovernanceError> {
        let proposal = self.registry.get(id)?;
        Ok(hash_operation_batch(
            &queued_calls(proposal),
            None,
            &proposal.description_hash,
        ))
    }
}

/// The proposal's calls with the winning payload appended to each calldata
/// as one 32-byte word.
fn queued_calls(proposal: &Proposal) -> Vec<Call> {
    let word = proposal.winning_payload().map(|payload| payload.encode_word());
    proposal
        .calls
        .iter()
        .map(|call| {
            let mut calldata = call.calldata.clone();
            if let Some(word) = &word {
                calldata.extend_from_slice(word);
            }
            Call::new(call.target, call.value, calldata)
        })
        .collect()
}
