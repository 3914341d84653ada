//! Delayed execution queue.
//!
//! Operations are identified by the hash of their call batch, predecessor and
//! salt. Scheduling needs the Proposer role, execution the Executor role (or an
//! open executor role), and a batch only runs once its delay has elapsed.

use std::collections::HashMap;

use agora_types::{Address, Hash, HashBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GovernanceError;
use crate::host::{hash_calls, Call, CallHost};
use crate::roles::{Role, RoleRegistry};

/// Lifecycle of a timelock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Never scheduled
    Unset,
    /// Scheduled, delay not yet elapsed
    Waiting,
    /// Delay elapsed, can execute
    Ready,
    /// Executed
    Done,
    /// Canceled before execution
    Canceled,
}

/// A scheduled call batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockOperation {
    pub id: Hash,
    pub calls: Vec<Call>,
    /// Operation that must execute first
    pub predecessor: Option<Hash>,
    pub salt: Hash,
    /// Timestamp from which the batch may run
    pub ready_at: u64,
    pub executed: bool,
    pub canceled: bool,
}

impl TimelockOperation {
    pub fn state(&self, now: u64) -> OperationState {
        if self.executed {
            OperationState::Done
        } else if self.canceled {
            OperationState::Canceled
        } else if now >= self.ready_at {
            OperationState::Ready
        } else {
            OperationState::Waiting
        }
    }
}

/// Identity of a call batch scheduled with `predecessor` and `salt`.
pub fn hash_operation_batch(calls: &[Call], predecessor: Option<&Hash>, salt: &Hash) -> Hash {
    let mut builder = HashBuilder::new("operation");
    hash_calls(&mut builder, calls);
    builder
        .fixed(predecessor.unwrap_or(&Hash::ZERO).as_bytes())
        .fixed(salt.as_bytes());
    builder.finalize()
}

/// Timelock controller.
#[derive(Debug, Clone)]
pub struct TimelockQueue<R> {
    /// Account the timelock calls targets as
    address: Address,
    roles: R,
    /// Minimum delay in seconds
    min_delay: u64,
    operations: HashMap<Hash, TimelockOperation>,
}

impl<R: RoleRegistry> TimelockQueue<R> {
    pub fn new(address: Address, roles: R, min_delay: u64) -> Self {
        Self {
            address,
            roles,
            min_delay,
            operations: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn min_delay(&self) -> u64 {
        self.min_delay
    }

    pub fn roles(&self) -> &R {
        &self.roles
    }

    /// Mutable access to the role registry, for granting and revoking roles.
    pub fn roles_mut(&mut self) -> &mut R {
        &mut self.roles
    }

    pub fn hash_operation_batch(
        &self,
        calls: &[Call],
        predecessor: Option<&Hash>,
        salt: &Hash,
    ) -> Hash {
        hash_operation_batch(calls, predecessor, salt)
    }

    /// Schedule `calls` to become executable `delay` seconds after `now`.
    ///
    /// A canceled operation with the same id may be scheduled again.
    pub fn schedule(
        &mut self,
        caller: &Address,
        calls: Vec<Call>,
        predecessor: Option<Hash>,
        salt: Hash,
        delay: u64,
        now: u64,
    ) -> Result<Hash, GovernanceError> {
        self.require_role(Role::Proposer, caller)?;
        if calls.is_empty() {
            return Err(GovernanceError::EmptyAction);
        }
        if delay < self.min_delay {
            return Err(GovernanceError::DelayTooShort {
                delay,
                min: self.min_delay,
            });
        }
        let id = hash_operation_batch(&calls, predecessor.as_ref(), &salt);
        if let Some(existing) = self.operations.get(&id) {
            if !existing.canceled {
                return Err(GovernanceError::OperationAlreadyScheduled(id));
            }
        }
        let ready_at = now.checked_add(delay).ok_or(GovernanceError::Overflow)?;

        self.operations.insert(
            id,
            TimelockOperation {
                id,
                calls,
                predecessor,
                salt,
                ready_at,
                executed: false,
                canceled: false,
            },
        );
        info!(%id, ready_at, delay, "Operation scheduled");
        Ok(id)
    }

    /// Run a ready operation's calls in order.
    ///
    /// The batch is all-or-nothing: when any call fails the host is restored
    /// and the operation stays pending.
    pub fn execute<H: CallHost>(
        &mut self,
        caller: &Address,
        id: &Hash,
        now: u64,
        host: &mut H,
    ) -> Result<Vec<Vec<u8>>, GovernanceError> {
        self.require_role(Role::Executor, caller)?;
        let op = self.get(id)?;
        match op.state(now) {
            OperationState::Done => return Err(GovernanceError::AlreadyExecuted),
            OperationState::Canceled => return Err(GovernanceError::OperationCanceled(*id)),
            OperationState::Waiting => {
                return Err(GovernanceError::NotReady {
                    ready_at: op.ready_at,
                    now,
                })
            }
            OperationState::Ready | OperationState::Unset => {}
        }
        if let Some(predecessor) = op.predecessor {
            if !self.is_operation_done(&predecessor) {
                return Err(GovernanceError::PredecessorNotExecuted(predecessor));
            }
        }

        let snapshot = host.snapshot();
        let mut results = Vec::with_capacity(op.calls.len());
        for (index, call) in op.calls.iter().enumerate() {
            match host.call(&self.address, call) {
                Ok(output) => results.push(output),
                Err(reason) => {
                    host.restore(snapshot);
                    warn!(%id, index, %reason, "Operation call reverted, batch rolled back");
                    return Err(GovernanceError::CallFailed { index, reason });
                }
            }
        }

        if let Some(op) = self.operations.get_mut(id) {
            op.executed = true;
        }
        info!(%id, %caller, calls = results.len(), "Operation executed");
        Ok(results)
    }

    /// Cancel a pending operation.
    pub fn cancel(&mut self, caller: &Address, id: &Hash) -> Result<(), GovernanceError> {
        self.require_role(Role::Proposer, caller)?;
        let op = self
            .operations
            .get_mut(id)
            .ok_or(GovernanceError::UnknownOperation(*id))?;
        if op.executed {
            return Err(GovernanceError::AlreadyExecuted);
        }
        if op.canceled {
            return Err(GovernanceError::OperationCanceled(*id));
        }
        op.canceled = true;
        info!(%id, %caller, "Operation canceled");
        Ok(())
    }

    pub fn get(&self, id: &Hash) -> Result<&TimelockOperation, GovernanceError> {
        self.operations
            .get(id)
            .ok_or(GovernanceError::UnknownOperation(*id))
    }

    pub fn operation_state(&self, id: &Hash, now: u64) -> OperationState {
        self.operations
            .get(id)
            .map(|op| op.state(now))
            .unwrap_or(OperationState::Unset)
    }

    /// Scheduled and neither executed nor canceled.
    pub fn is_operation_pending(&self, id: &Hash) -> bool {
        self.operations
            .get(id)
            .map(|op| !op.executed && !op.canceled)
            .unwrap_or(false)
    }

    pub fn is_operation_ready(&self, id: &Hash, now: u64) -> bool {
        self.operation_state(id, now) == OperationState::Ready
    }

    pub fn is_operation_done(&self, id: &Hash) -> bool {
        self.operations.get(id).map(|op| op.executed).unwrap_or(false)
    }

    /// Ready timestamp of a scheduled operation.
    pub fn timestamp(&self, id: &Hash) -> Option<u64> {
        self.operations.get(id).map(|op| op.ready_at)
    }

    fn require_role(&self, role: Role, caller: &Address) -> Result<(), GovernanceError> {
        if !self.roles.can_act(role, caller) {
            return Err(GovernanceError::Unauthorized(format!(
                "{} lacks the {} role",
                caller,
                role.name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::{AccessControl, OPEN_ROLE};
    use agora_types::U256;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from_bytes(bytes)
    }

    /// Host that appends each call's first calldata byte to a log and
    /// reverts on 0xff.
    #[derive(Default)]
    struct LogHost {
        log: Vec<u8>,
    }

    impl CallHost for LogHost {
        type Snapshot = Vec<u8>;

        fn snapshot(&self) -> Vec<u8> {
            self.log.clone()
        }

        fn restore(&mut self, snapshot: Vec<u8>) {
            self.log = snapshot;
        }

        fn call(&mut self, _caller: &Address, call: &Call) -> Result<Vec<u8>, String> {
            let byte = call.calldata.first().copied().unwrap_or(0);
            if byte == 0xff {
                return Err("boom".to_string());
            }
            self.log.push(byte);
            Ok(vec![byte])
        }
    }

    const PROPOSER: u8 = 1;
    const EXECUTOR: u8 = 2;

    fn timelock() -> TimelockQueue<AccessControl> {
        let roles = AccessControl::with_members(addr(100), &[addr(PROPOSER)], &[addr(EXECUTOR)]);
        TimelockQueue::new(addr(50), roles, 10)
    }

    fn batch(bytes: &[u8]) -> Vec<Call> {
        bytes
            .iter()
            .map(|b| Call::new(addr(9), U256::ZERO, vec![*b]))
            .collect()
    }

    #[test]
    fn test_schedule_execute_round_trip() {
        let mut tl = timelock();
        let mut host = LogHost::default();
        let id = tl
            .schedule(&addr(PROPOSER), batch(&[1, 2]), None, Hash::ZERO, 10, 1_000)
            .unwrap();
        assert_eq!(tl.timestamp(&id), Some(1_010));
        assert_eq!(tl.operation_state(&id, 1_000), OperationState::Waiting);

        let err = tl.execute(&addr(EXECUTOR), &id, 1_009, &mut host).unwrap_err();
        assert_eq!(err, GovernanceError::NotReady { ready_at: 1_010, now: 1_009 });

        let results = tl.execute(&addr(EXECUTOR), &id, 1_010, &mut host).unwrap();
        assert_eq!(results, vec![vec![1], vec![2]]);
        assert_eq!(host.log, vec![1, 2]);
        assert!(tl.is_operation_done(&id));

        let err = tl.execute(&addr(EXECUTOR), &id, 1_011, &mut host).unwrap_err();
        assert_eq!(err, GovernanceError::AlreadyExecuted);
        assert_eq!(host.log, vec![1, 2]);
    }

    #[test]
    fn test_schedule_checks() {
        let mut tl = timelock();
        let err = tl
            .schedule(&addr(7), batch(&[1]), None, Hash::ZERO, 10, 0)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthorized(_)));

        let err = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::ZERO, 9, 0)
            .unwrap_err();
        assert_eq!(err, GovernanceError::DelayTooShort { delay: 9, min: 10 });

        let err = tl
            .schedule(&addr(PROPOSER), Vec::new(), None, Hash::ZERO, 10, 0)
            .unwrap_err();
        assert_eq!(err, GovernanceError::EmptyAction);

        let id = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::ZERO, 10, 0)
            .unwrap();
        let err = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::ZERO, 10, 5)
            .unwrap_err();
        assert_eq!(err, GovernanceError::OperationAlreadyScheduled(id));

        // A different salt gives a different operation.
        let salted = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::compute(b"salt"), 10, 5)
            .unwrap();
        assert_ne!(id, salted);
    }

    #[test]
    fn test_executor_role_required_unless_open() {
        let mut tl = timelock();
        let mut host = LogHost::default();
        let id = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::ZERO, 10, 0)
            .unwrap();
        let err = tl.execute(&addr(7), &id, 10, &mut host).unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthorized(_)));

        tl.roles_mut()
            .grant_role(&addr(100), Role::Executor, OPEN_ROLE)
            .unwrap();
        tl.execute(&addr(7), &id, 10, &mut host).unwrap();
        assert_eq!(host.log, vec![1]);
    }

    #[test]
    fn test_failed_call_rolls_back_batch() {
        let mut tl = timelock();
        let mut host = LogHost::default();
        let id = tl
            .schedule(&addr(PROPOSER), batch(&[1, 0xff, 3]), None, Hash::ZERO, 10, 0)
            .unwrap();

        let err = tl.execute(&addr(EXECUTOR), &id, 10, &mut host).unwrap_err();
        assert_eq!(
            err,
            GovernanceError::CallFailed { index: 1, reason: "boom".to_string() }
        );
        assert!(host.log.is_empty());
        assert!(tl.is_operation_pending(&id));
        assert_eq!(tl.operation_state(&id, 10), OperationState::Ready);
    }

    #[test]
    fn test_predecessor_ordering() {
        let mut tl = timelock();
        let mut host = LogHost::default();
        let first = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::ZERO, 10, 0)
            .unwrap();
        let second = tl
            .schedule(&addr(PROPOSER), batch(&[2]), Some(first), Hash::ZERO, 10, 0)
            .unwrap();

        let err = tl.execute(&addr(EXECUTOR), &second, 10, &mut host).unwrap_err();
        assert_eq!(err, GovernanceError::PredecessorNotExecuted(first));

        tl.execute(&addr(EXECUTOR), &first, 10, &mut host).unwrap();
        tl.execute(&addr(EXECUTOR), &second, 10, &mut host).unwrap();
        assert_eq!(host.log, vec![1, 2]);
    }

    #[test]
    fn test_cancel() {
        let mut tl = timelock();
        let mut host = LogHost::default();
        let id = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::ZERO, 10, 0)
            .unwrap();

        let err = tl.cancel(&addr(EXECUTOR), &id).unwrap_err();
        assert!(matches!(err, GovernanceError::Unauthorized(_)));

        tl.cancel(&addr(PROPOSER), &id).unwrap();
        assert_eq!(tl.operation_state(&id, 10), OperationState::Canceled);
        let err = tl.execute(&addr(EXECUTOR), &id, 10, &mut host).unwrap_err();
        assert_eq!(err, GovernanceError::OperationCanceled(id));

        // Canceled operations can be scheduled again.
        let again = tl
            .schedule(&addr(PROPOSER), batch(&[1]), None, Hash::ZERO, 10, 20)
            .unwrap();
        assert_eq!(again, id);
        assert_eq!(tl.operation_state(&id, 25), OperationState::Waiting);

        tl.execute(&addr(EXECUTOR), &id, 30, &mut host).unwrap();
        assert_eq!(tl.cancel(&addr(PROPOSER), &id).unwrap_err(), GovernanceError::AlreadyExecuted);
        assert_eq!(
            tl.cancel(&addr(PROPOSER), &Hash::ZERO).unwrap_err(),
            GovernanceError::UnknownOperation(Hash::ZERO)
        );
    }

    #[test]
    fn test_unknown_operation() {
        let mut tl = timelock();
        let mut host = LogHost::default();
        assert_eq!(tl.operation_state(&Hash::ZERO, 0), OperationState::Unset);
        let err = tl.execute(&addr(EXECUTOR), &Hash::ZERO, 0, &mut host).unwrap_err();
        assert_eq!(err, GovernanceError::UnknownOperation(Hash::ZERO));
    }
}
