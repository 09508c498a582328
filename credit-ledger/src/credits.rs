//! Credit ledger transitions (batch token)
//!
//! Credits live in batches: `total_issued` is fixed at mint, balances move
//! by transfer, and retirement permanently removes credits from circulation
//! on behalf of a beneficiary. Retirement is irreversible; there is no
//! un-retire.

use crate::{
    error::{Error, Result},
    state::LedgerState,
    types::{AccountId, EvidenceHash, Fact, Role},
};
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;

/// Earliest vintage year the ledger accepts
pub const MIN_VINTAGE_YEAR: u16 = 2020;

impl LedgerState {
    /// Mint a new credit batch against an anchored MRV. Issuer only.
    /// Returns the allocated token id alongside the fact.
    ///
    /// Whether the MRV must carry a valid, unexpired attestation is a
    /// policy knob (`require_attested_mint`); the default ledger is
    /// policy-agnostic and leaves that judgement to the issuer.
    #[allow(clippy::too_many_arguments)]
    pub fn mint_batch(
        &mut self,
        caller: AccountId,
        recipient: AccountId,
        project_id: String,
        mrv_id: String,
        amount: u64,
        vintage_year: u16,
        evidence_hash: EvidenceHash,
        now: DateTime<Utc>,
    ) -> Result<(u64, Fact)> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Issuer)?;
        if recipient.is_zero() || recipient == AccountId::POOL {
            return Err(Error::InvalidArgument(
                "recipient must be a real account".to_string(),
            ));
        }
        if amount == 0 {
            return Err(Error::InvalidArgument(
                "mint amount must be positive".to_string(),
            ));
        }
        let max_vintage = now.year() + 1;
        if vintage_year < MIN_VINTAGE_YEAR || i32::from(vintage_year) > max_vintage {
            return Err(Error::InvalidArgument(format!(
                "vintage {} outside [{}, {}]",
                vintage_year, MIN_VINTAGE_YEAR, max_vintage
            )));
        }
        if evidence_hash.is_empty() {
            return Err(Error::InvalidArgument(
                "missing batch evidence hash".to_string(),
            ));
        }
        if !self.projects.contains_key(&project_id) {
            return Err(Error::NotFound(format!("project {}", project_id)));
        }
        if !self.mrvs.contains_key(&mrv_id) {
            return Err(Error::NotFound(format!("mrv {}", mrv_id)));
        }
        if self.require_attested_mint {
            let (valid, expired) = self.is_attestation_valid(&mrv_id, now);
            if !valid || expired {
                return Err(Error::InvalidArgument(format!(
                    "mrv {} has no valid unexpired attestation",
                    mrv_id
                )));
            }
        }

        let token_id = self.next_token_id;
        let fact = Fact::CreditsMinted {
            token_id,
            project_id,
            mrv_id,
            recipient,
            amount,
            vintage_year,
            evidence_hash,
            issuer: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok((token_id, fact))
    }

    /// Move credits between holders. The caller must be `from` or an
    /// operator `from` has approved.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        &mut self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        token_id: u64,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        if !self.batches.contains_key(&token_id) {
            return Err(Error::NotFound(format!("batch {}", token_id)));
        }
        if to.is_zero() || to == AccountId::POOL {
            return Err(Error::InvalidArgument(
                "transfer recipient must be a real account".to_string(),
            ));
        }
        if amount == 0 {
            return Err(Error::InvalidArgument(
                "transfer amount must be positive".to_string(),
            ));
        }
        if caller != from && !self.is_approved_operator(&from, &caller) {
            return Err(Error::Unauthorized(format!(
                "{} is neither holder nor approved operator of {}",
                caller, from
            )));
        }
        let balance = self.balance(&from, token_id);
        if balance < amount {
            return Err(Error::InsufficientBalance(format!(
                "holder {} has {} of batch {}, needs {}",
                from, balance, token_id, amount
            )));
        }

        let fact = Fact::CreditsTransferred {
            from,
            to,
            token_id,
            amount,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Approve or clear an operator over the caller's balances. Setting the
    /// current value is a no-op success.
    pub fn set_operator_approval(
        &mut self,
        caller: AccountId,
        operator: AccountId,
        approved: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Fact>> {
        self.require_not_paused()?;
        if operator.is_zero() || operator == caller {
            return Err(Error::InvalidArgument(
                "operator must be another real account".to_string(),
            ));
        }
        if self.is_approved_operator(&caller, &operator) == approved {
            return Ok(None);
        }

        let fact = Fact::OperatorApprovalSet {
            owner: caller,
            operator,
            approved,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(Some(fact))
    }

    /// Permanently retire credits from the caller's balance on behalf of a
    /// beneficiary.
    pub fn retire(
        &mut self,
        caller: AccountId,
        token_id: u64,
        amount: u64,
        beneficiary: AccountId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.validate_retirement(&caller, token_id, amount, &beneficiary, self.balance(&caller, token_id))?;

        let fact = Fact::CreditsRetired {
            token_id,
            amount,
            holder: caller,
            beneficiary,
            reason,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Retire across several batches as one all-or-nothing unit. Balance
    /// checks are cumulative, so a token id repeated within the call cannot
    /// spend the same credits twice.
    pub fn retire_batch(
        &mut self,
        caller: AccountId,
        token_ids: Vec<u64>,
        amounts: Vec<u64>,
        beneficiary: AccountId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Vec<Fact>> {
        self.require_not_paused()?;
        if token_ids.len() != amounts.len() {
            return Err(Error::LengthMismatch(format!(
                "{} token ids, {} amounts",
                token_ids.len(),
                amounts.len()
            )));
        }

        // Validate the full set before emitting anything, tracking pending
        // debits per token id.
        let mut pending: BTreeMap<u64, u64> = BTreeMap::new();
        for (token_id, amount) in token_ids.iter().zip(amounts.iter()) {
            let already = pending.get(token_id).copied().unwrap_or(0);
            let remaining = self.balance(&caller, *token_id).saturating_sub(already);
            self.validate_retirement(&caller, *token_id, *amount, &beneficiary, remaining)?;
            *pending.entry(*token_id).or_insert(0) += amount;
        }

        let mut facts = Vec::with_capacity(token_ids.len());
        for (token_id, amount) in token_ids.into_iter().zip(amounts) {
            let fact = Fact::CreditsRetired {
                token_id,
                amount,
                holder: caller,
                beneficiary,
                reason: reason.clone(),
                at: now,
            };
            self.apply_fact(&fact);
            facts.push(fact);
        }
        Ok(facts)
    }

    fn validate_retirement(
        &self,
        holder: &AccountId,
        token_id: u64,
        amount: u64,
        beneficiary: &AccountId,
        available: u64,
    ) -> Result<()> {
        if !self.batches.contains_key(&token_id) {
            return Err(Error::NotFound(format!("batch {}", token_id)));
        }
        if amount == 0 {
            return Err(Error::InvalidArgument(
                "retirement amount must be positive".to_string(),
            ));
        }
        if beneficiary.is_zero() {
            return Err(Error::InvalidArgument(
                "beneficiary is the null account".to_string(),
            ));
        }
        if available < amount {
            return Err(Error::InsufficientBalance(format!(
                "holder {} has {} of batch {}, needs {}",
                holder, available, token_id, amount
            )));
        }
        Ok(())
    }

    /// Replace a batch's evidence pointer. Issuer only; accounting fields
    /// untouched.
    pub fn update_batch_metadata(
        &mut self,
        caller: AccountId,
        token_id: u64,
        new_hash: EvidenceHash,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Issuer)?;
        if !self.batches.contains_key(&token_id) {
            return Err(Error::NotFound(format!("batch {}", token_id)));
        }
        if new_hash.is_empty() {
            return Err(Error::InvalidArgument(
                "missing batch evidence hash".to_string(),
            ));
        }

        let fact = Fact::BatchMetadataUpdated {
            token_id,
            evidence_hash: new_hash,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId::new([byte; 32])
    }

    /// Issuer admin with project P1 and MRV M1 in place.
    fn seeded() -> (LedgerState, AccountId) {
        let mut state = LedgerState::default();
        let issuer = account(1);
        let now = Utc::now();
        state.genesis(issuer, now).unwrap();
        state.grant_role(issuer, Role::Issuer, issuer, now).unwrap();
        state
            .register_project(
                issuer,
                "P1".to_string(),
                account(2),
                EvidenceHash::new("QmP1"),
                now,
            )
            .unwrap();
        state
            .anchor_mrv(
                issuer,
                "M1".to_string(),
                "P1".to_string(),
                EvidenceHash::new("QmM1"),
                100,
                account(3),
                now,
            )
            .unwrap();
        (state, issuer)
    }

    fn mint_100(state: &mut LedgerState, issuer: AccountId, recipient: AccountId) -> u64 {
        let (token_id, _) = state
            .mint_batch(
                issuer,
                recipient,
                "P1".to_string(),
                "M1".to_string(),
                100,
                2023,
                EvidenceHash::new("QmB1"),
                Utc::now(),
            )
            .unwrap();
        token_id
    }

    #[test]
    fn test_mint_allocates_monotonic_token_ids() {
        let (mut state, issuer) = seeded();
        let user = account(4);

        let first = mint_100(&mut state, issuer, user);
        let second = mint_100(&mut state, issuer, user);
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(state.balance(&user, 1), 100);
        assert_eq!(state.project_tokens("P1"), vec![1, 2]);

        let batch = state.batch(1).unwrap();
        assert_eq!(batch.total_issued, 100);
        assert_eq!(batch.total_retired, 0);
        assert!(state.check_conservation(1));
    }

    #[test]
    fn test_mint_vintage_bounds() {
        let (mut state, issuer) = seeded();
        let now = Utc::now();
        let too_new = (now.year() + 2) as u16;

        for vintage in [2019u16, too_new] {
            let result = state.mint_batch(
                issuer,
                account(4),
                "P1".to_string(),
                "M1".to_string(),
                100,
                vintage,
                EvidenceHash::new("QmB1"),
                now,
            );
            assert!(matches!(result, Err(Error::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_mint_policy_requires_attestation_when_enabled() {
        let policy = crate::config::PolicyConfig {
            require_attested_mint: true,
            ..Default::default()
        };
        let mut state = LedgerState::new(&policy);
        let issuer = account(1);
        let now = Utc::now();
        state.genesis(issuer, now).unwrap();
        for role in [Role::Issuer, Role::Governance] {
            state.grant_role(issuer, role, issuer, now).unwrap();
        }
        state
            .register_project(
                issuer,
                "P1".to_string(),
                account(2),
                EvidenceHash::new("QmP1"),
                now,
            )
            .unwrap();
        state
            .anchor_mrv(
                issuer,
                "M1".to_string(),
                "P1".to_string(),
                EvidenceHash::new("QmM1"),
                100,
                account(3),
                now,
            )
            .unwrap();

        // No attestation yet: mint refused.
        let result = state.mint_batch(
            issuer,
            account(4),
            "P1".to_string(),
            "M1".to_string(),
            100,
            2023,
            EvidenceHash::new("QmB1"),
            now,
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        // With an oracle attestation in place the mint goes through.
        let oracle = account(5);
        state
            .register_oracle(issuer, oracle, "https://oracle.example".to_string(), now)
            .unwrap();
        state
            .create_oracle_attestation(
                oracle,
                "M1".to_string(),
                "P1".to_string(),
                account(3),
                100,
                now,
            )
            .unwrap();
        state
            .mint_batch(
                issuer,
                account(4),
                "P1".to_string(),
                "M1".to_string(),
                100,
                2023,
                EvidenceHash::new("QmB1"),
                now,
            )
            .unwrap();
    }

    #[test]
    fn test_transfer_and_operator_approval() {
        let (mut state, issuer) = seeded();
        let alice = account(4);
        let bob = account(5);
        let operator = account(6);
        let token = mint_100(&mut state, issuer, alice);
        let now = Utc::now();

        state.transfer(alice, alice, bob, token, 30, now).unwrap();
        assert_eq!(state.balance(&alice, token), 70);
        assert_eq!(state.balance(&bob, token), 30);

        // Operator cannot move funds before approval.
        assert!(matches!(
            state.transfer(operator, alice, bob, token, 10, now),
            Err(Error::Unauthorized(_))
        ));

        state
            .set_operator_approval(alice, operator, true, now)
            .unwrap();
        state.transfer(operator, alice, bob, token, 10, now).unwrap();
        assert_eq!(state.balance(&alice, token), 60);

        state
            .set_operator_approval(alice, operator, false, now)
            .unwrap();
        assert!(matches!(
            state.transfer(operator, alice, bob, token, 10, now),
            Err(Error::Unauthorized(_))
        ));
        assert!(state.check_conservation(token));
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let (mut state, issuer) = seeded();
        let alice = account(4);
        let token = mint_100(&mut state, issuer, alice);

        let result = state.transfer(alice, alice, account(5), token, 101, Utc::now());
        assert!(matches!(result, Err(Error::InsufficientBalance(_))));
        assert_eq!(state.balance(&alice, token), 100);
    }

    #[test]
    fn test_retire_accumulates_per_beneficiary() {
        let (mut state, issuer) = seeded();
        let alice = account(4);
        let beneficiary = account(7);
        let token = mint_100(&mut state, issuer, alice);
        let now = Utc::now();

        state
            .retire(alice, token, 40, beneficiary, "offset 2023".to_string(), now)
            .unwrap();
        state
            .retire(alice, token, 10, beneficiary, "offset 2024".to_string(), now)
            .unwrap();

        assert_eq!(state.balance(&alice, token), 50);
        assert_eq!(state.retired_balance(&beneficiary, token), 50);
        assert_eq!(state.batch(token).unwrap().total_retired, 50);
        assert!(state.check_conservation(token));
    }

    #[test]
    fn test_retire_batch_cumulative_balance_check() {
        let (mut state, issuer) = seeded();
        let alice = account(4);
        let token = mint_100(&mut state, issuer, alice);
        let now = Utc::now();

        // 60 + 60 over the same batch exceeds the balance of 100; the whole
        // call must fail with nothing retired.
        let snapshot = state.clone();
        let result = state.retire_batch(
            alice,
            vec![token, token],
            vec![60, 60],
            account(7),
            "offset".to_string(),
            now,
        );
        assert!(matches!(result, Err(Error::InsufficientBalance(_))));
        assert_eq!(state, snapshot);

        // 60 + 40 fits exactly.
        let facts = state
            .retire_batch(
                alice,
                vec![token, token],
                vec![60, 40],
                account(7),
                "offset".to_string(),
                now,
            )
            .unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(state.balance(&alice, token), 0);
        assert_eq!(state.retired_balance(&account(7), token), 100);
        assert!(state.check_conservation(token));
    }

    #[test]
    fn test_retire_batch_length_mismatch() {
        let (mut state, issuer) = seeded();
        let alice = account(4);
        let token = mint_100(&mut state, issuer, alice);

        let result = state.retire_batch(
            alice,
            vec![token],
            vec![10, 20],
            account(7),
            "offset".to_string(),
            Utc::now(),
        );
        assert!(matches!(result, Err(Error::LengthMismatch(_))));
    }

    #[test]
    fn test_update_batch_metadata_preserves_accounting() {
        let (mut state, issuer) = seeded();
        let token = mint_100(&mut state, issuer, account(4));

        state
            .update_batch_metadata(issuer, token, EvidenceHash::new("QmNew"), Utc::now())
            .unwrap();
        let batch = state.batch(token).unwrap();
        assert_eq!(batch.evidence_hash.as_str(), "QmNew");
        assert_eq!(batch.total_issued, 100);

        assert!(matches!(
            state.update_batch_metadata(issuer, 99, EvidenceHash::new("QmX"), Utc::now()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_batch_queries_return_sentinels() {
        let state = LedgerState::default();
        assert!(state.batch(42).is_none());
        assert_eq!(state.balance(&account(4), 42), 0);
        assert_eq!(state.retired_balance(&account(4), 42), 0);
        assert!(state.project_tokens("nope").is_empty());
    }
}
