//! Verification and attestation transitions
//!
//! Per MRV id the attestation state machine is
//! `NonExistent -> Attested -> Revoked`, with revocation terminal. Two
//! audit paths create attestations: a direct auditor signature over the
//! canonical digest (nonce-consumed, replay-protected), or a registered
//! oracle vouched by role membership. Expiry is advisory: the validity
//! window passing never auto-revokes.

use crate::{
    crypto,
    error::{Error, Result},
    state::LedgerState,
    types::{AccountId, AttestationKind, Fact, Role, Signature},
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Default attestation validity window
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Lower bound for the governance-tunable validity window
pub const MIN_VALIDITY_DAYS: u32 = 30;

/// Upper bound for the governance-tunable validity window
pub const MAX_VALIDITY_DAYS: u32 = 1095;

impl LedgerState {
    /// Create an attestation backed by the auditor's signature over the
    /// canonical digest. Attestor only.
    ///
    /// On success the auditor's nonce advances, so the consumed signature
    /// can never be replayed; a message resigned with a stale nonce no
    /// longer matches the digest and is rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn create_direct_attestation(
        &mut self,
        caller: AccountId,
        mrv_id: String,
        project_id: String,
        auditor: AccountId,
        t_co2e: u64,
        deadline: DateTime<Utc>,
        signature: &Signature,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Attestor)?;
        if self.attestations.contains_key(&mrv_id) {
            return Err(Error::Duplicate(format!("attestation for mrv {}", mrv_id)));
        }
        if now > deadline {
            return Err(Error::Expired);
        }
        if t_co2e == 0 {
            return Err(Error::InvalidArgument(
                "attested tCO2e must be positive".to_string(),
            ));
        }
        if auditor.is_zero() {
            return Err(Error::InvalidArgument(
                "auditor is the null account".to_string(),
            ));
        }

        let digest = crypto::attestation_digest(
            &mrv_id,
            &project_id,
            &auditor,
            t_co2e,
            self.nonce(&auditor),
            deadline,
        );
        if !crypto::verify_signature(&digest, signature, &auditor) {
            return Err(Error::InvalidSignature);
        }

        let fact = Fact::AttestationCreated {
            mrv_id,
            project_id,
            auditor,
            attestor: caller,
            t_co2e,
            kind: AttestationKind::DirectSignature,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Create an attestation on the authority of a registered, active
    /// oracle. No per-call signature; trust is delegated to the oracle's
    /// role membership. Increments the oracle's attestation count.
    pub fn create_oracle_attestation(
        &mut self,
        caller: AccountId,
        mrv_id: String,
        project_id: String,
        auditor: AccountId,
        t_co2e: u64,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Oracle)?;
        let active = self.oracles.get(&caller).map(|o| o.active).unwrap_or(false);
        if !active {
            return Err(Error::Unauthorized(format!(
                "oracle {} is not registered and active",
                caller
            )));
        }
        self.validate_oracle_item(&mrv_id, &auditor, t_co2e)?;

        let fact = Fact::AttestationCreated {
            mrv_id,
            project_id,
            auditor,
            attestor: caller,
            t_co2e,
            kind: AttestationKind::OracleAttestation,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Create several oracle attestations as one all-or-nothing unit. Any
    /// element failing the per-item checks (including a duplicate MRV id
    /// within the batch itself) fails the whole call with no state change.
    pub fn create_batch_attestation(
        &mut self,
        caller: AccountId,
        mrv_ids: Vec<String>,
        project_ids: Vec<String>,
        auditors: Vec<AccountId>,
        amounts: Vec<u64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Fact>> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Oracle)?;
        let active = self.oracles.get(&caller).map(|o| o.active).unwrap_or(false);
        if !active {
            return Err(Error::Unauthorized(format!(
                "oracle {} is not registered and active",
                caller
            )));
        }
        if mrv_ids.len() != project_ids.len()
            || mrv_ids.len() != auditors.len()
            || mrv_ids.len() != amounts.len()
        {
            return Err(Error::LengthMismatch(format!(
                "{} mrv ids, {} project ids, {} auditors, {} amounts",
                mrv_ids.len(),
                project_ids.len(),
                auditors.len(),
                amounts.len()
            )));
        }

        // Validate the full batch before emitting anything.
        let mut seen = BTreeSet::new();
        for (mrv_id, (auditor, amount)) in
            mrv_ids.iter().zip(auditors.iter().zip(amounts.iter()))
        {
            self.validate_oracle_item(mrv_id, auditor, *amount)?;
            if !seen.insert(mrv_id.clone()) {
                return Err(Error::Duplicate(format!(
                    "mrv {} repeated within batch",
                    mrv_id
                )));
            }
        }

        let mut facts = Vec::with_capacity(mrv_ids.len());
        for (((mrv_id, project_id), auditor), amount) in mrv_ids
            .into_iter()
            .zip(project_ids)
            .zip(auditors)
            .zip(amounts)
        {
            let fact = Fact::AttestationCreated {
                mrv_id,
                project_id,
                auditor,
                attestor: caller,
                t_co2e: amount,
                kind: AttestationKind::OracleAttestation,
                at: now,
            };
            self.apply_fact(&fact);
            facts.push(fact);
        }
        Ok(facts)
    }

    fn validate_oracle_item(&self, mrv_id: &str, auditor: &AccountId, t_co2e: u64) -> Result<()> {
        if self.attestations.contains_key(mrv_id) {
            return Err(Error::Duplicate(format!("attestation for mrv {}", mrv_id)));
        }
        if t_co2e == 0 {
            return Err(Error::InvalidArgument(
                "attested tCO2e must be positive".to_string(),
            ));
        }
        if auditor.is_zero() {
            return Err(Error::InvalidArgument(
                "auditor is the null account".to_string(),
            ));
        }
        Ok(())
    }

    /// Permanently revoke an attestation. Governance only; non-empty
    /// reason required for the audit trail. There is no un-revoke.
    pub fn revoke_attestation(
        &mut self,
        caller: AccountId,
        mrv_id: &str,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        let attestation = self
            .attestations
            .get(mrv_id)
            .ok_or_else(|| Error::NotFound(format!("attestation for mrv {}", mrv_id)))?;
        if attestation.revoked {
            return Err(Error::Duplicate(format!(
                "attestation for mrv {} already revoked",
                mrv_id
            )));
        }
        if reason.is_empty() {
            return Err(Error::InvalidArgument(
                "revocation reason must be non-empty".to_string(),
            ));
        }

        let fact = Fact::AttestationRevoked {
            mrv_id: mrv_id.to_string(),
            reason,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }

    /// Register an oracle. Governance only. The oracle starts active and
    /// receives the Oracle role, emitted as a linked role fact.
    pub fn register_oracle(
        &mut self,
        caller: AccountId,
        account: AccountId,
        endpoint: String,
        now: DateTime<Utc>,
    ) -> Result<Vec<Fact>> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        if account.is_zero() {
            return Err(Error::InvalidArgument(
                "oracle is the null account".to_string(),
            ));
        }
        if self.oracles.contains_key(&account) {
            return Err(Error::Duplicate(format!("oracle {}", account)));
        }

        let mut facts = vec![Fact::OracleRegistered {
            account,
            endpoint,
            by: caller,
            at: now,
        }];
        if !self.has_role(Role::Oracle, &account) {
            facts.push(Fact::RoleGranted {
                role: Role::Oracle,
                account,
                by: caller,
                at: now,
            });
        }
        for fact in &facts {
            self.apply_fact(fact);
        }
        Ok(facts)
    }

    /// Toggle an oracle's active flag. Governance only. Oracle role
    /// membership follows the flag as a linked side effect. Setting the
    /// current value is a no-op success.
    pub fn set_oracle_status(
        &mut self,
        caller: AccountId,
        account: AccountId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Fact>> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        let oracle = self
            .oracles
            .get(&account)
            .ok_or_else(|| Error::NotFound(format!("oracle {}", account)))?;
        if oracle.active == active {
            return Ok(Vec::new());
        }

        let mut facts = vec![Fact::OracleStatusChanged {
            account,
            active,
            by: caller,
            at: now,
        }];
        if active && !self.has_role(Role::Oracle, &account) {
            facts.push(Fact::RoleGranted {
                role: Role::Oracle,
                account,
                by: caller,
                at: now,
            });
        } else if !active && self.has_role(Role::Oracle, &account) {
            facts.push(Fact::RoleRevoked {
                role: Role::Oracle,
                account,
                by: caller,
                at: now,
            });
        }
        for fact in &facts {
            self.apply_fact(fact);
        }
        Ok(facts)
    }

    /// Retune the attestation validity window. Governance only, bounded to
    /// [30, 1095] days.
    pub fn set_validity_period(
        &mut self,
        caller: AccountId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Fact> {
        self.require_not_paused()?;
        self.require_role(&caller, Role::Governance)?;
        if !(MIN_VALIDITY_DAYS..=MAX_VALIDITY_DAYS).contains(&days) {
            return Err(Error::InvalidArgument(format!(
                "validity period {} days outside [{}, {}]",
                days, MIN_VALIDITY_DAYS, MAX_VALIDITY_DAYS
            )));
        }

        let fact = Fact::ValidityPeriodChanged {
            days,
            by: caller,
            at: now,
        };
        self.apply_fact(&fact);
        Ok(fact)
    }
}
