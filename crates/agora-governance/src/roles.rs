//! Role-based capabilities for the timelock.
//!
//! The timelock never decides who may act on its own; it asks an injected
//! [`RoleRegistry`].

use std::collections::{HashMap, HashSet};

use agora_types::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GovernanceError;

/// Sentinel account: granting a role to it opens the role to everyone.
pub const OPEN_ROLE: Address = Address::ZERO;

/// Capabilities recognised by the timelock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Grants and revokes roles
    Admin,
    /// Schedules and cancels operations
    Proposer,
    /// Executes ready operations
    Executor,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Proposer => "proposer",
            Role::Executor => "executor",
        }
    }
}

/// Capability check consumed by the timelock.
pub trait RoleRegistry {
    fn has_role(&self, role: Role, account: &Address) -> bool;

    /// True when `account` holds `role` directly or the role is open.
    fn can_act(&self, role: Role, account: &Address) -> bool {
        self.has_role(role, account) || self.has_role(role, &OPEN_ROLE)
    }
}

/// In-memory role table.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    members: HashMap<Role, HashSet<Address>>,
}

impl AccessControl {
    /// Table with `admin` holding the admin role.
    pub fn new(admin: Address) -> Self {
        let mut acl = Self::default();
        acl.insert(Role::Admin, admin);
        acl
    }

    /// Table with admin, proposers and executors set up front.
    pub fn with_members(admin: Address, proposers: &[Address], executors: &[Address]) -> Self {
        let mut acl = Self::new(admin);
        for p in proposers {
            acl.insert(Role::Proposer, *p);
        }
        for e in executors {
            acl.insert(Role::Executor, *e);
        }
        acl
    }

    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<(), GovernanceError> {
        self.require_admin(caller)?;
        if self.insert(role, account) {
            info!(role = role.name(), %account, "Role granted");
        }
        Ok(())
    }

    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<(), GovernanceError> {
        self.require_admin(caller)?;
        let removed = self
            .members
            .get_mut(&role)
            .map(|set| set.remove(account))
            .unwrap_or(false);
        if removed {
            info!(role = role.name(), %account, "Role revoked");
        }
        Ok(())
    }

    /// Accounts holding `role`, sorted.
    pub fn members(&self, role: Role) -> Vec<Address> {
        let mut out: Vec<Address> = self
            .members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    fn insert(&mut self, role: Role, account: Address) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    fn require_admin(&self, caller: &Address) -> Result<(), GovernanceError> {
        if !self.has_role(Role::Admin, caller) {
            return Err(GovernanceError::Unauthorized(format!(
                "{} lacks the admin role",
                caller
            )));
        }
        Ok(())
    }
}

impl RoleRegistry for AccessControl {
    fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }
}
