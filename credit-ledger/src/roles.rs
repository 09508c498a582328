//! Access control transitions
//!
//! Role membership and the global pause flag. These transitions are the one
//! family that stays callable while the ledger is paused, otherwise a paused
//! ledger could never be unpaused or re-keyed.

use crate::{
    error::{Error, Result},
    state::LedgerState,
    types::{AccountId, Fact, Role},
};
use chrono::{DateTime, Utc};

impl LedgerState {
    /// Bootstrap the ledger by seating the first administrator. Fails once
    /// any role has been granted.
    pub fn genesis(&mut self, admin: AccountId, now: DateTime<Utc>) -> Result<Fact> {
        if !self.roles.is_empty() {
            return Err(Error::InvalidArgument(
                "ledger already initialized".to_string(),
            ));
        }
        if admin.is_zero() {
            return Err(Error::InvalidArgument(
                "admin is the null account".to_string(),
            ));
        }

        let fact = Fact::RoleGranted {
            role: Role::Admin,
            account: admin,
            by: admin,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Grant `role` to `account`. Admin only. Granting an already-held role
    /// is a no-op success and emits no fact.
    pub fn grant_role(
        &mut self,
        caller: AccountId,
        role: Role,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Fact>> {
        self.require_role(&caller, Role::Admin)?;
        if account.is_zero() {
            return Err(Error::InvalidArgument(
                "grantee is the null account".to_string(),
            ));
        }
        if self.has_role(role, &account) {
            return Ok(None);
        }

        let fact = Fact::RoleGranted {
            role,
            account,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(Some(fact))
    }

    /// Revoke `role` from `account`. Admin only. Revoking a role not held
    /// is a no-op success. Revoking the last Admin fails: the administrator
    /// capability must always have a holder.
    pub fn revoke_role(
        &mut self,
        caller: AccountId,
        role: Role,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<Fact>> {
        self.require_role(&caller, Role::Admin)?;
        if !self.has_role(role, &account) {
            return Ok(None);
        }
        if role == Role::Admin && self.count_role_holders(Role::Admin) == 1 {
            return Err(Error::LastAdmin);
        }

        let fact = Fact::RoleRevoked {
            role,
            account,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(Some(fact))
    }

    /// Halt all registry, attestation, credit, and buffer transitions.
    pub fn pause(&mut self, caller: AccountId, now: DateTime<Utc>) -> Result<Fact> {
        self.require_role(&caller, Role::Pauser)?;
        if self.paused {
            return Err(Error::InvalidArgument("ledger already paused".to_string()));
        }

        let fact = Fact::Paused {
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Resume normal operation.
    pub fn unpause(&mut self, caller: AccountId, now: DateTime<Utc>) -> Result<Fact> {
        self.require_role(&caller, Role::Pauser)?;
        if !self.paused {
            return Err(Error::InvalidArgument("ledger is not paused".to_string()));
        }

        let fact = Fact::Unpaused {
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    fn count_role_holders(&self, role: Role) -> usize {
        self.roles.values().filter(|set| set.contains(&role)).count()
    }
}
