//! Permanence-risk buffer pool
//!
//! Each batch can set aside a slice of its issuance into a pool holding
//! account. When a reversal is later discovered (sequestration that did not
//! hold), governance consumes buffer credits instead of clawing back
//! circulating supply: `total_used` grows and the consumed portion stays in
//! the pool holding, unreachable by withdrawal.

use crate::{
    error::{Error, Result},
    state::LedgerState,
    types::{AccountId, EvidenceHash, Fact, Role, BPS_DENOMINATOR, MAX_BUFFER_BPS},
};
use chrono::{DateTime, Utc};

/// Reserve percentage used when a reservation carries no custom value, basis points
pub const DEFAULT_BUFFER_BPS: u16 = 1_000;

/// Floor of `issued * bps / 10000`, widened to avoid overflow.
pub fn calculate_buffer_amount(issued: u64, bps: u16) -> u64 {
    (u128::from(issued) * u128::from(bps) / u128::from(BPS_DENOMINATOR)) as u64
}

impl LedgerState {
    /// Carve a buffer reserve out of a batch. Buffer-Manager only; the
    /// credits move from the caller's balance into the pool holding.
    ///
    /// A `custom_bps` of 0 means "use the ledger default".
    #[allow(clippy::too_many_arguments)]
    pub fn reserve_buffer(
        &mut self,
        caller: AccountId,
        token_id: u64,
        project_id: String,
        total_issued: u64,
        custom_bps: u16,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::BufferManager)?;
        let batch = self
            .batches
            .get(&token_id)
            .ok_or_else(|| Error::NotFound(format!("batch {}", token_id)))?;
        if batch.project_id != project_id {
            return Err(Error::InvalidArgument(format!(
                "batch {} belongs to project {}, not {}",
                token_id, batch.project_id, project_id
            )));
        }
        if batch.total_issued != total_issued {
            return Err(Error::InvalidArgument(format!(
                "batch {} issued {}, caller claimed {}",
                token_id, batch.total_issued, total_issued
            )));
        }
        if self.reserves.get(&token_id).is_some_and(|r| r.active) {
            return Err(Error::Duplicate(format!(
                "batch {} already has an active buffer reserve",
                token_id
            )));
        }
        let bps = if custom_bps > 0 {
            custom_bps
        } else {
            self.default_buffer_bps
        };
        if bps > MAX_BUFFER_BPS {
            return Err(Error::InvalidArgument(format!(
                "reserve percentage {}bps exceeds ceiling {}bps",
                bps, MAX_BUFFER_BPS
            )));
        }
        let amount = calculate_buffer_amount(total_issued, bps);
        if amount == 0 {
            return Err(Error::InvalidArgument(
                "reserve rounds down to zero credits".to_string(),
            ));
        }
        let balance = self.balance(&caller, token_id);
        if balance < amount {
            return Err(Error::InsufficientBalance(format!(
                "manager {} has {} of batch {}, reserve needs {}",
                caller, balance, token_id, amount
            )));
        }

        let fact = Fact::BufferReserved {
            token_id,
            project_id,
            amount,
            percentage_bps: bps,
            manager: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Absorb a discovered reversal against a batch's buffer. Governance
    /// only. Consumed credits are tombstoned in the pool holding; the bound
    /// is `available = total_reserved - total_used`.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_reversal(
        &mut self,
        caller: AccountId,
        id: String,
        project_id: String,
        token_id: u64,
        credits_affected: u64,
        evidence_hash: EvidenceHash,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        if self.reversals.contains_key(&id) {
            return Err(Error::Duplicate(format!("reversal {} already executed", id)));
        }
        if credits_affected == 0 {
            return Err(Error::InvalidArgument(
                "reversal amount must be positive".to_string(),
            ));
        }
        if evidence_hash.is_empty() {
            return Err(Error::InvalidArgument(
                "missing reversal evidence hash".to_string(),
            ));
        }
        let reserve = self
            .reserves
            .get(&token_id)
            .filter(|r| r.active)
            .ok_or_else(|| Error::NotFound(format!("active buffer for batch {}", token_id)))?;
        if reserve.project_id != project_id {
            return Err(Error::InvalidArgument(format!(
                "buffer for batch {} belongs to project {}, not {}",
                token_id, reserve.project_id, project_id
            )));
        }
        let available = reserve.available();
        if available < credits_affected {
            return Err(Error::InsufficientBuffer(format!(
                "batch {} has {} buffer credits available, reversal needs {}",
                token_id, available, credits_affected
            )));
        }

        let fact = Fact::ReversalExecuted {
            id,
            project_id,
            token_id,
            credits_affected,
            evidence_hash,
            executor: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Retune an existing reserve's percentage. Metadata only: credits
    /// already in the pool do not move, the new value governs nothing
    /// retroactively.
    pub fn update_buffer_percentage(
        &mut self,
        caller: AccountId,
        token_id: u64,
        new_bps: u16,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        if !self.reserves.contains_key(&token_id) {
            return Err(Error::NotFound(format!("buffer for batch {}", token_id)));
        }
        Self::validate_bps(new_bps)?;

        let fact = Fact::BufferPercentageChanged {
            token_id,
            percentage_bps: new_bps,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Retune the percentage applied to future reservations that do not
    /// carry a custom value.
    pub fn set_default_buffer_percentage(
        &mut self,
        caller: AccountId,
        new_bps: u16,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        Self::validate_bps(new_bps)?;

        let fact = Fact::DefaultBufferPercentageChanged {
            percentage_bps: new_bps,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Release unconsumed buffer credits from the pool holding back to a
    /// real account. Governance only; the audit reason is mandatory.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_buffer(
        &mut self,
        caller: AccountId,
        token_id: u64,
        to: AccountId,
        amount: u64,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        if to.is_zero() || to == AccountId::POOL {
            return Err(Error::InvalidArgument(
                "withdrawal recipient must be a real account".to_string(),
            ));
        }
        if amount == 0 {
            return Err(Error::InvalidArgument(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if reason.is_empty() {
            return Err(Error::InvalidArgument(
                "withdrawal reason is required".to_string(),
            ));
        }
        let reserve = self
            .reserves
            .get(&token_id)
            .filter(|r| r.active)
            .ok_or_else(|| Error::NotFound(format!("active buffer for batch {}", token_id)))?;
        let available = reserve.available();
        if available < amount {
            return Err(Error::InsufficientBuffer(format!(
                "batch {} has {} buffer credits available, withdrawal needs {}",
                token_id, available, amount
            )));
        }

        let fact = Fact::BufferWithdrawn {
            token_id,
            to,
            amount,
            reason,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    fn validate_bps(bps: u16) -> Result<()> {
        if bps == 0 || bps > MAX_BUFFER_BPS {
            return Err(Error::InvalidArgument(format!(
                "reserve percentage {}bps outside (0, {}]",
                bps, MAX_BUFFER_BPS
            )));
        }
        Ok(())
    }
}
