use agora_types::{Address, Hash};
use thiserror::Error;

/// Errors that can occur in governance operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("Proposal must carry at least one call and matching targets/values/calldatas")]
    EmptyAction,

    #[error("Invalid option {index}: proposal has {count} options")]
    InvalidOption { index: u32, count: u32 },

    #[error("Invalid option payload: {0}")]
    InvalidOptionPayload(String),

    #[error("Option label must not be empty")]
    EmptyOptionLabel,

    #[error("Proposal already exists: {0}")]
    DuplicateProposal(Hash),

    #[error("Unknown proposal: {0}")]
    UnknownProposal(Hash),

    #[error("Unknown timelock operation: {0}")]
    UnknownOperation(Hash),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Checkpoint block {block} precedes last recorded block {last}")]
    NonMonotonicCheckpoint { block: u64, last: u64 },

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Delay {delay}s is below the minimum delay of {min}s")]
    DelayTooShort { delay: u64, min: u64 },

    #[error("Voting is not active (window {start}..{end}, current block {current})")]
    VotingNotActive { start: u64, end: u64, current: u64 },

    #[error("Voting already started at block {0}")]
    VotingAlreadyStarted(u64),

    #[error("Proposal has not succeeded")]
    ProposalNotSucceeded,

    #[error("Proposal is not queued")]
    ProposalNotQueued,

    #[error("Operation not ready until {ready_at} (now {now})")]
    NotReady { ready_at: u64, now: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Proposer {proposer} is below the proposal threshold")]
    BelowProposalThreshold { proposer: Address },

    #[error("Already voted: {0}")]
    AlreadyVoted(Address),

    #[error("Already executed")]
    AlreadyExecuted,

    #[error("Already canceled")]
    AlreadyCanceled,

    #[error("Proposal cannot be canceled in its current state")]
    ProposalNotCancelable,

    #[error("Operation already scheduled: {0}")]
    OperationAlreadyScheduled(Hash),

    #[error("Operation canceled: {0}")]
    OperationCanceled(Hash),

    #[error("Predecessor operation not executed: {0}")]
    PredecessorNotExecuted(Hash),

    #[error("Call {index} failed: {reason}")]
    CallFailed { index: usize, reason: String },
}

/// Coarse classification of governance errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unknown input.
    Validation,
    /// Precondition depends on block height or time and may become true later.
    Temporal,
    /// Caller lacks the required capability.
    Authorization,
    /// The target already moved past the requested transition.
    StateConflict,
    /// A downstream call rejected the batch.
    Execution,
}

impl ErrorKind {
    /// Only temporal failures can succeed on a later retry of the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Temporal)
    }
}

impl GovernanceError {
    pub fn kind(&self) -> ErrorKind {
        use GovernanceError::*;
        match self {
            EmptyAction
            | InvalidOption { .. }
            | InvalidOptionPayload(_)
            | EmptyOptionLabel
            | DuplicateProposal(_)
            | UnknownProposal(_)
            | UnknownOperation(_)
            | InvalidParameter(_)
            | NonMonotonicCheckpoint { .. }
            | InsufficientBalance(_)
            | Overflow
            | DelayTooShort { .. } => ErrorKind::Validation,
            VotingNotActive { .. }
            | VotingAlreadyStarted(_)
            | ProposalNotSucceeded
            | ProposalNotQueued
            | NotReady { .. } => ErrorKind::Temporal,
            Unauthorized(_) | BelowProposalThreshold { .. } => ErrorKind::Authorization,
            AlreadyVoted(_)
            | AlreadyExecuted
            | AlreadyCanceled
            | ProposalNotCancelable
            | OperationAlreadyScheduled(_)
            | OperationCanceled(_)
            | PredecessorNotExecuted(_) => ErrorKind::StateConflict,
            CallFailed { .. } => ErrorKind::Execution,
        }
    }
}
