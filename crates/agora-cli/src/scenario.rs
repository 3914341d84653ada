//! Scenario runner.
//!
//! A scenario is a TOML file describing token holders and a list of steps
//! (propose, add options, vote, mine blocks, queue, execute...). The runner
//! plays the steps against an in-memory ledger with a single "bond desk"
//! contract as the call target and reports every proposal's outcome.

use std::collections::HashMap;

use agora_governance::{
    AccessControl, BlockContext, Call, CallHost, GovernorConfig, GovernorEngine, OptionKind,
    OptionValue, ProposalState, TimelockQueue, VotesToken, OPEN_ROLE,
};
use agora_types::{Address, Hash, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Name of the contract every proposal in a scenario targets.
pub const DESK_NAME: &str = "bond-desk";
const GOVERNOR_NAME: &str = "governor";
const TIMELOCK_NAME: &str = "timelock";
const ADMIN_NAME: &str = "admin";

/// Scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub chain: ChainSetup,
    /// Initial token holders
    pub holders: Vec<Holder>,
    /// Steps played in order
    pub steps: Vec<Step>,
}

/// Starting block and block spacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSetup {
    pub start_block: u64,
    pub start_timestamp: u64,
    /// Seconds between blocks
    pub block_time: u64,
}

impl Default for ChainSetup {
    fn default() -> Self {
        Self {
            start_block: 1,
            start_timestamp: 1_700_000_000,
            block_time: 12,
        }
    }
}

/// Token holder minted at the start block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holder {
    pub name: String,
    pub balance: U256,
    /// Delegatee name; holders without one do not vote
    pub delegate: Option<String>,
}

/// One scenario step. Proposal-scoped steps act on the most recent proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Propose {
        proposer: String,
        description: String,
        #[serde(default = "default_kind")]
        kind: OptionKind,
        /// Desk function to call
        function: String,
        /// Bool argument encoded after the selector
        flag: Option<bool>,
    },
    AddOption {
        label: String,
        value: Option<OptionValue>,
    },
    Vote {
        voter: String,
        option: u32,
        reason: Option<String>,
    },
    Mine {
        blocks: u64,
    },
    Wait {
        seconds: u64,
    },
    Queue,
    Execute,
    Cancel {
        caller: String,
    },
    Transfer {
        from: String,
        to: String,
        amount: U256,
    },
    Delegate {
        from: String,
        to: String,
    },
    ExpectState {
        state: ProposalState,
    },
    ExpectFlag {
        started: bool,
    },
}

fn default_kind() -> OptionKind {
    OptionKind::Single
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Propose { .. } => "propose",
            Step::AddOption { .. } => "add_option",
            Step::Vote { .. } => "vote",
            Step::Mine { .. } => "mine",
            Step::Wait { .. } => "wait",
            Step::Queue => "queue",
            Step::Execute => "execute",
            Step::Cancel { .. } => "cancel",
            Step::Transfer { .. } => "transfer",
            Step::Delegate { .. } => "delegate",
            Step::ExpectState { .. } => "expect_state",
            Step::ExpectFlag { .. } => "expect_flag",
        }
    }
}

impl Scenario {
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = toml::from_str(contents)?;
        if scenario.holders.is_empty() {
            anyhow::bail!("Scenario needs at least one holder");
        }
        Ok(scenario)
    }

    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario '{}'", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse scenario '{}'", path.display()))
    }
}

/// Desk function selector: first four bytes of the hashed signature.
pub fn selector(function: &str) -> [u8; 4] {
    let digest = Hash::compute(function.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest.as_bytes()[..4]);
    out
}

/// State of the bond desk contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeskState {
    /// Flag set by the last `create_another_bond` call
    pub started: bool,
    /// Bonds created so far
    pub bonds: u32,
}

/// Host ledger with a single bond desk contract owned by the timelock.
#[derive(Debug, Clone)]
pub struct BondDesk {
    address: Address,
    owner: Address,
    state: DeskState,
}

impl BondDesk {
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            owner,
            state: DeskState::default(),
        }
    }

    pub fn state(&self) -> &DeskState {
        &self.state
    }
}

impl CallHost for BondDesk {
    type Snapshot = DeskState;

    fn snapshot(&self) -> DeskState {
        self.state.clone()
    }

    fn restore(&mut self, snapshot: DeskState) {
        self.state = snapshot;
    }

    fn call(&mut self, caller: &Address, call: &Call) -> Result<Vec<u8>, String> {
        if call.target != self.address {
            return Err(format!("no contract at {}", call.target));
        }
        if *caller != self.owner {
            return Err(format!("{} is not the desk owner", caller));
        }
        let data = &call.calldata;
        if data.len() < 4 {
            return Err("calldata too short".to_string());
        }
        if data[..4] == selector("create_another_bond") {
            // The last argument word decides the flag; no argument means true.
            let started = match data.len() {
                4 => true,
                n if n >= 36 => data[n - 32..].iter().any(|b| *b != 0),
                _ => return Err("malformed argument".to_string()),
            };
            self.state.started = started;
            self.state.bonds += 1;
            debug!(started, bonds = self.state.bonds, "Bond desk called");
            Ok(vec![started as u8])
        } else if data[..4] == selector("pause") {
            Err("desk is paused".to_string())
        } else {
            Err("unknown selector".to_string())
        }
    }
}

/// Outcome of one proposal.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalReport {
    pub id: Hash,
    pub description: String,
    pub kind: OptionKind,
    pub state: ProposalState,
    pub labels: Vec<String>,
    pub tallies: Vec<U256>,
    pub leading_option: Option<u32>,
    pub eta: Option<u64>,
}

/// Result of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub final_block: BlockContext,
    pub steps: usize,
    pub proposals: Vec<ProposalReport>,
    pub desk: DeskState,
}

/// In-memory world a scenario runs against.
pub struct Simulation {
    governor: GovernorEngine<AccessControl>,
    token: VotesToken,
    desk: BondDesk,
    ctx: BlockContext,
    block_time: u64,
    current: Option<Hash>,
    steps: usize,
}

impl Simulation {
    pub fn new(config: GovernorConfig, scenario: &Scenario) -> anyhow::Result<Self> {
        let governor_addr = Address::from_name(GOVERNOR_NAME);
        let timelock_addr = Address::from_name(TIMELOCK_NAME);
        let roles = AccessControl::with_members(
            Address::from_name(ADMIN_NAME),
            &[governor_addr],
            &[OPEN_ROLE],
        );
        let timelock = TimelockQueue::new(timelock_addr, roles, config.min_timelock_delay);
        let governor = GovernorEngine::new(governor_addr, config, timelock)?;

        let ctx = BlockContext::new(scenario.chain.start_block, scenario.chain.start_timestamp);
        let mut token = VotesToken::new();
        for holder in &scenario.holders {
            let account = Address::from_name(&holder.name);
            token.mint(account, holder.balance, ctx.number)?;
            if let Some(delegatee) = &holder.delegate {
                token.delegate(account, Address::from_name(delegatee), ctx.number)?;
            }
            debug!(name = %holder.name, %account, balance = %holder.balance, "Holder minted");
        }

        Ok(Self {
            governor,
            token,
            desk: BondDesk::new(Address::from_name(DESK_NAME), timelock_addr),
            ctx,
            block_time: scenario.chain.block_time,
            current: None,
            steps: 0,
        })
    }

    /// Play every step, stopping at the first failure.
    pub fn run(mut self, steps: &[Step]) -> anyhow::Result<ScenarioReport> {
        for (index, step) in steps.iter().enumerate() {
            self.apply(step)
                .with_context(|| format!("step {} ({}) failed", index + 1, step.name()))?;
            self.steps += 1;
        }
        self.report()
    }

    fn apply(&mut self, step: &Step) -> anyhow::Result<()> {
        match step {
            Step::Propose {
                proposer,
                description,
                kind,
                function,
                flag,
            } => {
                let mut calldata = selector(function).to_vec();
                if let Some(flag) = flag {
                    calldata.extend_from_slice(&OptionValue::Bool(*flag).encode_word());
                }
                let id = self.governor.propose_with_options(
                    Address::from_name(proposer),
                    &[Address::from_name(DESK_NAME)],
                    &[U256::ZERO],
                    &[calldata],
                    description,
                    *kind,
                    &self.ctx,
                    &self.token,
                )?;
                self.current = Some(id);
            }
            Step::AddOption { label, value } => {
                let id = self.current()?;
                self.governor.add_option(&id, label, *value, &self.ctx)?;
            }
            Step::Vote {
                voter,
                option,
                reason,
            } => {
                let id = self.current()?;
                self.governor.cast_vote_with_reason(
                    &id,
                    Address::from_name(voter),
                    *option,
                    reason.as_deref().unwrap_or(""),
                    &self.ctx,
                    &self.token,
                )?;
            }
            Step::Mine { blocks } => {
                self.ctx = self.ctx.advance(*blocks, self.block_time);
                debug!(block = self.ctx.number, timestamp = self.ctx.timestamp, "Mined");
            }
            Step::Wait { seconds } => {
                self.ctx = self.ctx.wait(*seconds);
            }
            Step::Queue => {
                let id = self.current()?;
                self.governor.queue(&id, &self.ctx, &self.token)?;
            }
            Step::Execute => {
                let id = self.current()?;
                self.governor
                    .execute(&id, &self.ctx, &self.token, &mut self.desk)?;
            }
            Step::Cancel { caller } => {
                let id = self.current()?;
                self.governor.cancel(
                    &id,
                    &Address::from_name(caller),
                    &self.ctx,
                    &self.token,
                )?;
            }
            Step::Transfer { from, to, amount } => {
                self.token.transfer(
                    Address::from_name(from),
                    Address::from_name(to),
                    *amount,
                    self.ctx.number,
                )?;
            }
            Step::Delegate { from, to } => {
                self.token.delegate(
                    Address::from_name(from),
                    Address::from_name(to),
                    self.ctx.number,
                )?;
            }
            Step::ExpectState { state } => {
                let id = self.current()?;
                let actual = self.governor.state(&id, &self.ctx, &self.token)?;
                if actual != *state {
                    anyhow::bail!("expected state {:?}, found {:?}", state, actual);
                }
            }
            Step::ExpectFlag { started } => {
                if self.desk.state().started != *started {
                    anyhow::bail!(
                        "expected desk flag {}, found {}",
                        started,
                        self.desk.state().started
                    );
                }
            }
        }
        Ok(())
    }

    fn current(&self) -> anyhow::Result<Hash> {
        self.current
            .ok_or_else(|| anyhow::anyhow!("no proposal has been created yet"))
    }

    fn report(&self) -> anyhow::Result<ScenarioReport> {
        let mut proposals = Vec::new();
        for proposal in self.governor.registry().all() {
            let votes = self.governor.option_votes(&proposal.id)?;
            proposals.push(ProposalReport {
                id: proposal.id,
                description: proposal.description.clone(),
                kind: proposal.kind,
                state: self.governor.state(&proposal.id, &self.ctx, &self.token)?,
                labels: votes.labels,
                tallies: votes.tallies,
                leading_option: proposal.winning_option(),
                eta: proposal.eta,
            });
        }
        info!(
            steps = self.steps,
            proposals = proposals.len(),
            block = self.ctx.number,
            "Scenario finished"
        );
        Ok(ScenarioReport {
            final_block: self.ctx,
            steps: self.steps,
            proposals,
            desk: self.desk.state().clone(),
        })
    }
}

/// Parse and run a scenario.
pub fn run_scenario(config: GovernorConfig, scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
    Simulation::new(config, scenario)?.run(&scenario.steps)
}

/// Bundled example: the boolean bond proposal from the README.
pub const BOND_SCENARIO: &str = include_str!("../../../scenarios/bond.toml");
