//! Agora Governance - multi-option on-chain governance.
//!
//! This crate provides:
//! - Vote weight checkpoints with binary-search history lookups
//! - A votes token collaborator (balances, delegation, supply history)
//! - Proposals with ranked, typed options and a derived state machine
//! - A role-gated timelock with atomic batch execution
//! - The governor engine that drives proposals through the timelock

pub mod chain;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod governor;
pub mod host;
pub mod option;
pub mod proposal;
pub mod roles;
pub mod timelock;
pub mod token;

pub use chain::BlockContext;
pub use checkpoint::{Checkpoint, CheckpointHistory, WeightDecay, WeightSnapshotStore};
pub use config::GovernorConfig;
pub use error::{ErrorKind, GovernanceError};
pub use governor::{GovernorEngine, OptionVotes};
pub use host::{Call, CallHost};
pub use option::{OptionKind, OptionValue, ProposalOption};
pub use proposal::{hash_description, Proposal, ProposalRegistry, ProposalState, Receipt};
pub use roles::{AccessControl, Role, RoleRegistry, OPEN_ROLE};
pub use timelock::{OperationState, TimelockOperation, TimelockQueue};
pub use token::{VotesSource, VotesToken};
