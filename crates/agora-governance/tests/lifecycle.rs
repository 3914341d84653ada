//! End-to-end tests for the governor lifecycle.
//!
//! These drive a governor, a votes token, a timelock and a recording host
//! together the way a ledger would, block by block.

use agora_governance::{
    hash_description, AccessControl, BlockContext, Call, CallHost, GovernanceError,
    GovernorConfig, GovernorEngine, OperationState, OptionKind, OptionValue, ProposalState,
    Role, TimelockQueue, VotesToken, OPEN_ROLE,
};
use agora_types::{Address, Hash, U256};
use proptest::prelude::*;

const BLOCK_TIME: u64 = 12;

/// Host ledger holding a single "bond desk" contract.
///
/// `start_bond(flag)` calldata is a 4-byte selector followed by 32-byte
/// words; the desk reads its flag from the last word.
#[derive(Debug, Clone, Default)]
struct RecordingHost {
    desk: Address,
    owner: Address,
    started: bool,
    calls: Vec<Call>,
    reject_all: bool,
}

impl RecordingHost {
    fn new(desk: Address, owner: Address) -> Self {
        Self { desk, owner, ..Self::default() }
    }
}

impl CallHost for RecordingHost {
    type Snapshot = (bool, Vec<Call>);

    fn snapshot(&self) -> Self::Snapshot {
        (self.started, self.calls.clone())
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        self.started = snapshot.0;
        self.calls = snapshot.1;
    }

    fn call(&mut self, caller: &Address, call: &Call) -> Result<Vec<u8>, String> {
        self.calls.push(call.clone());
        if self.reject_all {
            return Err("desk paused".to_string());
        }
        if call.target != self.desk {
            return Err(format!("no contract at {}", call.target));
        }
        if *caller != self.owner {
            return Err("caller is not the owner".to_string());
        }
        if call.calldata.len() < 36 || call.calldata[..4] != selector() {
            return Err("unknown selector".to_string());
        }
        let last = &call.calldata[call.calldata.len() - 32..];
        self.started = last.iter().any(|b| *b != 0);
        Ok(vec![self.started as u8])
    }
}

fn selector() -> [u8; 4] {
    let digest = Hash::compute(b"start_bond(bool)");
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest.as_bytes()[..4]);
    out
}

fn start_bond(flag: bool) -> Vec<u8> {
    let mut data = selector().to_vec();
    data.extend_from_slice(&OptionValue::Bool(flag).encode_word());
    data
}

struct World {
    governor: GovernorEngine<AccessControl>,
    token: VotesToken,
    host: RecordingHost,
    ctx: BlockContext,
    owner: Address,
    desk: Address,
}

impl World {
    fn new(config: GovernorConfig) -> Self {
        let owner = Address::from_name("owner");
        let governor_addr = Address::from_name("governor");
        let timelock_addr = Address::from_name("timelock");
        let desk = Address::from_name("bond-desk");
        let mut ctx = BlockContext::new(100, 1_700_000_000);

        let mut token = VotesToken::new();
        token
            .mint(owner, U256::from(1_000_000u64), ctx.number)
            .unwrap();
        token.delegate(owner, owner, ctx.number).unwrap();
        ctx = ctx.advance(1, BLOCK_TIME);

        let roles = AccessControl::with_members(owner, &[governor_addr], &[OPEN_ROLE]);
        let timelock = TimelockQueue::new(timelock_addr, roles, config.min_timelock_delay);
        let governor = GovernorEngine::new(governor_addr, config, timelock).unwrap();

        Self {
            governor,
            token,
            host: RecordingHost::new(desk, timelock_addr),
            ctx,
            owner,
            desk,
        }
    }

    fn mine(&mut self, blocks: u64) {
        self.ctx = self.ctx.advance(blocks, BLOCK_TIME);
    }

    fn propose(&mut self, description: &str, kind: OptionKind) -> Hash {
        self.governor
            .propose_with_options(
                self.owner,
                &[self.desk],
                &[U256::ZERO],
                &[start_bond(true)],
                description,
                kind,
                &self.ctx,
                &self.token,
            )
            .unwrap()
    }

    fn state(&self, id: &Hash) -> ProposalState {
        self.governor.state(id, &self.ctx, &self.token).unwrap()
    }

    /// Boolean proposal with "Vote true"/"Vote false", voted and closed.
    fn succeeded_boolean(&mut self, description: &str) -> Hash {
        let id = self.propose(description, OptionKind::Boolean);
        self.governor
            .add_option(&id, "Vote true", Some(OptionValue::Bool(true)), &self.ctx)
            .unwrap();
        self.governor
            .add_option(&id, "Vote false", Some(OptionValue::Bool(false)), &self.ctx)
            .unwrap();
        self.mine(1);
        self.governor
            .cast_vote(&id, self.owner, 1, &self.ctx, &self.token)
            .unwrap();
        self.mine(self.governor.voting_period());
        assert_eq!(self.state(&id), ProposalState::Succeeded);
        id
    }
}

#[test]
fn test_boolean_proposal_end_to_end() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.propose("Proposal #2: Create DAI bond!", OptionKind::Boolean);
    assert_eq!(world.state(&id), ProposalState::Pending);

    world
        .governor
        .add_option(&id, "Vote true", Some(OptionValue::Bool(true)), &world.ctx)
        .unwrap();
    world
        .governor
        .add_option(&id, "Vote false", Some(OptionValue::Bool(false)), &world.ctx)
        .unwrap();
    assert_eq!(world.governor.proposal_option_count(&id).unwrap(), 3);

    world.mine(1);
    let weight = world
        .governor
        .cast_vote(&id, world.owner, 1, &world.ctx, &world.token)
        .unwrap();
    assert_eq!(weight, U256::from(1_000_000u64));
    assert_eq!(world.state(&id), ProposalState::Active);

    // the window runs to start + voting_period, so three blocks is not enough
    world.mine(3);
    assert_eq!(world.state(&id), ProposalState::Active);
    world.mine(2);
    assert_eq!(world.state(&id), ProposalState::Succeeded);

    let votes = world.governor.option_votes(&id).unwrap();
    assert_eq!(votes.labels, vec!["Against", "Vote true", "Vote false"]);
    assert_eq!(
        votes.tallies,
        vec![U256::ZERO, U256::from(1_000_000u64), U256::ZERO]
    );
    assert_eq!(world.governor.option_succeeded(&id).unwrap(), Some(1));

    world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap();
    assert_eq!(world.state(&id), ProposalState::Queued);
    let err = world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap_err();
    assert_eq!(err, GovernanceError::ProposalNotSucceeded);

    world.ctx = world.ctx.wait(1);
    world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap();
    assert!(world.host.started);
    assert_eq!(world.state(&id), ProposalState::Executed);

    let err = world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap_err();
    assert_eq!(err, GovernanceError::AlreadyExecuted);
    assert_eq!(world.host.calls.len(), 1);
}

#[test]
fn test_timelock_round_trip() {
    let mut world = World::new(GovernorConfig::default());
    let scheduler = world.governor.address();
    let now = world.ctx.timestamp;
    let calls = vec![Call::new(world.desk, U256::ZERO, start_bond(true))];
    let timelock = world.governor.timelock_mut();
    let delay = timelock.min_delay();

    let id = timelock
        .schedule(&scheduler, calls, None, Hash::ZERO, delay, now)
        .unwrap();
    let stranger = Address::from_name("stranger");

    let err = timelock
        .execute(&stranger, &id, now + delay - 1, &mut world.host)
        .unwrap_err();
    assert_eq!(err, GovernanceError::NotReady { ready_at: now + delay, now: now + delay - 1 });

    timelock
        .execute(&stranger, &id, now + delay, &mut world.host)
        .unwrap();
    assert!(world.host.started);

    let err = timelock
        .execute(&stranger, &id, now + delay, &mut world.host)
        .unwrap_err();
    assert_eq!(err, GovernanceError::AlreadyExecuted);
}

#[test]
fn test_window_boundaries() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.propose("boundaries", OptionKind::Single);

    let err = world
        .governor
        .cast_vote(&id, world.owner, 1, &world.ctx, &world.token)
        .unwrap_err();
    assert!(matches!(err, GovernanceError::VotingNotActive { .. }));
    assert!(!world.governor.has_voted(&id, &world.owner).unwrap());

    world.mine(2);
    let err = world
        .governor
        .add_option(&id, "Late", None, &world.ctx)
        .unwrap_err();
    assert!(matches!(err, GovernanceError::VotingAlreadyStarted(_)));
    assert_eq!(world.governor.proposal_option_count(&id).unwrap(), 2);
}

#[test]
fn test_duplicate_and_empty_proposals() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.propose("same", OptionKind::Single);
    let err = world
        .governor
        .propose(
            world.owner,
            &[world.desk],
            &[U256::ZERO],
            &[start_bond(true)],
            "same",
            &world.ctx,
            &world.token,
        )
        .unwrap_err();
    assert_eq!(err, GovernanceError::DuplicateProposal(id));

    let err = world
        .governor
        .propose(world.owner, &[], &[], &[], "empty", &world.ctx, &world.token)
        .unwrap_err();
    assert_eq!(err, GovernanceError::EmptyAction);

    let expected = world
        .governor
        .hash_proposal(&[world.desk], &[U256::ZERO], &[start_bond(true)], &hash_description("same"))
        .unwrap();
    assert_eq!(expected, id);
}

#[test]
fn test_tie_is_defeated() {
    let mut world = World::new(GovernorConfig::default());
    let other = Address::from_name("other");
    world
        .token
        .transfer(world.owner, other, U256::from(500_000u64), world.ctx.number)
        .unwrap();
    world.token.delegate(other, other, world.ctx.number).unwrap();
    world.mine(1);

    let id = world.propose("tie", OptionKind::UNumber);
    world
        .governor
        .add_option(&id, "low", Some(OptionValue::UNumber(U256::from(1u64))), &world.ctx)
        .unwrap();
    world
        .governor
        .add_option(&id, "high", Some(OptionValue::UNumber(U256::from(2u64))), &world.ctx)
        .unwrap();
    world.mine(1);
    world
        .governor
        .cast_vote(&id, world.owner, 0, &world.ctx, &world.token)
        .unwrap();
    world
        .governor
        .cast_vote(&id, other, 1, &world.ctx, &world.token)
        .unwrap();
    world.mine(5);

    assert_eq!(world.governor.option_succeeded(&id).unwrap(), Some(0));
    assert_eq!(world.state(&id), ProposalState::Defeated);
    let err = world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap_err();
    assert_eq!(err, GovernanceError::ProposalNotSucceeded);
}

#[test]
fn test_below_quorum_is_defeated() {
    let mut world = World::new(GovernorConfig::default());
    let minnow = Address::from_name("minnow");
    world
        .token
        .transfer(world.owner, minnow, U256::from(39_999u64), world.ctx.number)
        .unwrap();
    world.token.delegate(minnow, minnow, world.ctx.number).unwrap();
    world.mine(1);

    let id = world.propose("quorum", OptionKind::Single);
    world.mine(1);
    world
        .governor
        .cast_vote(&id, minnow, 1, &world.ctx, &world.token)
        .unwrap();
    world.mine(5);
    assert_eq!(world.governor.quorum(world.ctx.number, &world.token), U256::from(40_000u64));
    assert_eq!(world.state(&id), ProposalState::Defeated);
}

#[test]
fn test_queued_proposal_expires() {
    let config = GovernorConfig {
        grace_period: 60,
        ..GovernorConfig::default()
    };
    let mut world = World::new(config);
    let id = world.succeeded_boolean("expiring");
    world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap();
    let eta = world.governor.proposal_eta(&id).unwrap().unwrap();

    world.ctx = BlockContext::new(world.ctx.number + 1, eta + 59);
    assert_eq!(world.state(&id), ProposalState::Queued);
    world.ctx = BlockContext::new(world.ctx.number + 1, eta + 60);
    assert_eq!(world.state(&id), ProposalState::Expired);

    let err = world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap_err();
    assert_eq!(err, GovernanceError::ProposalNotQueued);
    assert!(!world.host.started);
}

#[test]
fn test_cancel_queued_proposal_cancels_operation() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.succeeded_boolean("cancel me");
    let op = world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap();
    assert!(world.governor.timelock().is_operation_pending(&op));

    world
        .governor
        .cancel(&id, &world.owner, &world.ctx, &world.token)
        .unwrap();
    assert_eq!(world.state(&id), ProposalState::Canceled);
    assert_eq!(
        world.governor.timelock().operation_state(&op, world.ctx.timestamp),
        OperationState::Canceled
    );

    world.ctx = world.ctx.wait(10);
    let err = world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap_err();
    assert_eq!(err, GovernanceError::ProposalNotQueued);
}

#[test]
fn test_operation_run_on_timelock_marks_proposal_executed() {
    let config = GovernorConfig {
        grace_period: 60,
        ..GovernorConfig::default()
    };
    let mut world = World::new(config);
    let id = world.succeeded_boolean("run elsewhere");
    let op = world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap();
    world.ctx = world.ctx.wait(1);

    let stranger = Address::from_name("stranger");
    world
        .governor
        .timelock_mut()
        .execute(&stranger, &op, world.ctx.timestamp, &mut world.host)
        .unwrap();
    assert!(world.host.started);
    assert_eq!(world.state(&id), ProposalState::Executed);

    let err = world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap_err();
    assert_eq!(err, GovernanceError::AlreadyExecuted);

    world.ctx = world.ctx.wait(120);
    assert_eq!(world.state(&id), ProposalState::Executed);
}

#[test]
fn test_operation_canceled_on_timelock_marks_proposal_canceled() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.succeeded_boolean("cancel elsewhere");
    let op = world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap();

    let owner = world.owner;
    world
        .governor
        .timelock_mut()
        .roles_mut()
        .grant_role(&owner, Role::Proposer, owner)
        .unwrap();
    world.governor.timelock_mut().cancel(&owner, &op).unwrap();
    assert_eq!(world.state(&id), ProposalState::Canceled);

    let err = world
        .governor
        .cancel(&id, &owner, &world.ctx, &world.token)
        .unwrap_err();
    assert_eq!(err, GovernanceError::AlreadyCanceled);

    world.ctx = world.ctx.wait(10);
    let err = world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap_err();
    assert_eq!(err, GovernanceError::ProposalNotQueued);
    assert!(!world.host.started);
}

#[test]
fn test_failed_call_keeps_proposal_queued() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.succeeded_boolean("retry");
    let op = world
        .governor
        .queue(&id, &world.ctx, &world.token)
        .unwrap();
    world.ctx = world.ctx.wait(1);

    world.host.reject_all = true;
    let err = world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap_err();
    assert_eq!(
        err,
        GovernanceError::CallFailed { index: 0, reason: "desk paused".to_string() }
    );
    assert!(world.host.calls.is_empty());
    assert!(!world.host.started);
    assert_eq!(world.state(&id), ProposalState::Queued);
    assert!(world.governor.timelock().is_operation_pending(&op));

    world.host.reject_all = false;
    world
        .governor
        .execute(&id, &world.ctx, &world.token, &mut world.host)
        .unwrap();
    assert!(world.host.started);
    assert!(world.governor.timelock().is_operation_done(&op));
}

#[test]
fn test_state_read_is_idempotent() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.succeeded_boolean("idempotent");
    let first = world.state(&id);
    let second = world.state(&id);
    assert_eq!(first, second);
    assert_eq!(
        world.governor.option_succeeded(&id).unwrap(),
        world.governor.option_succeeded(&id).unwrap()
    );
}

#[test]
fn test_weight_is_read_at_snapshot() {
    let mut world = World::new(GovernorConfig::default());
    let id = world.propose("snapshot", OptionKind::Single);
    let late = Address::from_name("late");
    world.mine(1);
    // Tokens moved after the snapshot do not vote.
    world
        .token
        .transfer(world.owner, late, U256::from(400_000u64), world.ctx.number)
        .unwrap();
    world.token.delegate(late, late, world.ctx.number).unwrap();

    let weight = world
        .governor
        .cast_vote(&id, late, 1, &world.ctx, &world.token)
        .unwrap();
    assert_eq!(weight, U256::ZERO);
    let weight = world
        .governor
        .cast_vote(&id, world.owner, 1, &world.ctx, &world.token)
        .unwrap();
    assert_eq!(weight, U256::from(1_000_000u64));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_each_voter_counted_once(ballots in proptest::collection::vec((0u8..6, 0u32..4), 1..40)) {
        let mut world = World::new(GovernorConfig::default());
        let voters: Vec<Address> = (0..6u8).map(|i| Address::from_name(&format!("voter-{}", i))).collect();
        for (i, voter) in voters.iter().enumerate() {
            world
                .token
                .transfer(world.owner, *voter, U256::from(1_000u64 * (i as u64 + 1)), world.ctx.number)
                .unwrap();
            world.token.delegate(*voter, *voter, world.ctx.number).unwrap();
        }
        world.mine(1);
        let id = world.propose("property", OptionKind::Single);
        world.mine(1);

        let mut counted = U256::ZERO;
        let mut seen = std::collections::HashSet::new();
        for (voter, option) in ballots {
            let voter = voters[voter as usize];
            let result = world.governor.cast_vote(&id, voter, option, &world.ctx, &world.token);
            match result {
                Ok(weight) => {
                    prop_assert!(seen.insert(voter));
                    counted = counted + weight;
                }
                Err(GovernanceError::AlreadyVoted(v)) => prop_assert!(seen.contains(&v)),
                Err(GovernanceError::InvalidOption { .. }) => prop_assert!(option >= 2),
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }

        let tallies = world.governor.option_votes(&id).unwrap().tallies;
        let total: U256 = tallies.into_iter().sum();
        prop_assert_eq!(total, counted);
    }
}
