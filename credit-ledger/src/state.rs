//! The ledger state aggregate
//!
//! `LedgerState` owns every table of the carbon-credit registry and is
//! mutated only by applying facts. Transitions (in `roles`, `registry`,
//! `attestation`, `credits`, `buffer`) validate against the current state,
//! build facts, and feed them through [`LedgerState::apply_fact`]; replaying
//! a persisted fact log through the same function reproduces the state
//! bit-exactly.

use crate::{
    config::PolicyConfig,
    error::{Error, Result},
    types::{
        AccountId, Attestation, AttestationKind, BufferReserve, CreditBatch, Fact, MrvInfo,
        MrvRecord, OracleInfo, Project, ReversalEvent, Role,
    },
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Full registry state: role tables, projects, MRVs, attestations, credit
/// batches, balances, and buffer reserves, folded from the fact log.
///
/// BTreeMaps keep iteration deterministic, which makes conservation checks
/// and state snapshots reproducible across replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub(crate) paused: bool,
    pub(crate) roles: BTreeMap<AccountId, BTreeSet<Role>>,
    pub(crate) projects: BTreeMap<String, Project>,
    pub(crate) mrvs: BTreeMap<String, MrvRecord>,
    pub(crate) attestations: BTreeMap<String, Attestation>,
    pub(crate) nonces: BTreeMap<AccountId, u64>,
    pub(crate) oracles: BTreeMap<AccountId, OracleInfo>,
    pub(crate) validity_period_days: u32,
    pub(crate) batches: BTreeMap<u64, CreditBatch>,
    pub(crate) next_token_id: u64,
    pub(crate) balances: BTreeMap<(AccountId, u64), u64>,
    pub(crate) retired: BTreeMap<(AccountId, u64), u64>,
    pub(crate) approvals: BTreeSet<(AccountId, AccountId)>,
    pub(crate) reserves: BTreeMap<u64, BufferReserve>,
    pub(crate) project_buffer_tokens: BTreeMap<String, Vec<u64>>,
    pub(crate) reversals: BTreeMap<String, ReversalEvent>,
    pub(crate) default_buffer_bps: u16,
    pub(crate) require_attested_mint: bool,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl LedgerState {
    /// Empty state seeded with policy knobs. Governance can retune the
    /// validity period and default buffer percentage later via transitions.
    pub fn new(policy: &PolicyConfig) -> Self {
        Self {
            paused: false,
            roles: BTreeMap::new(),
            projects: BTreeMap::new(),
            mrvs: BTreeMap::new(),
            attestations: BTreeMap::new(),
            nonces: BTreeMap::new(),
            oracles: BTreeMap::new(),
            validity_period_days: policy.attestation_validity_days.max(1),
            batches: BTreeMap::new(),
            next_token_id: 1,
            balances: BTreeMap::new(),
            retired: BTreeMap::new(),
            approvals: BTreeSet::new(),
            reserves: BTreeMap::new(),
            project_buffer_tokens: BTreeMap::new(),
            reversals: BTreeMap::new(),
            default_buffer_bps: policy.default_buffer_bps,
            require_attested_mint: policy.require_attested_mint,
        }
    }

    // ---- guards --------------------------------------------------------

    pub(crate) fn require_not_paused(&self) -> Result<()> {
        if self.paused {
            return Err(Error::SystemPaused);
        }
        Ok(())
    }

    pub(crate) fn require_role(&self, account: &AccountId, role: Role) -> Result<()> {
        if !self.has_role(role, account) {
            return Err(Error::Unauthorized(format!(
                "account {} lacks role {:?}",
                account, role
            )));
        }
        Ok(())
    }

    // ---- fact application ---------------------------------------------

    /// Apply one fact to the state. Pure mutation, no validation; the
    /// transition that built the fact already established every
    /// precondition. Replay feeds persisted facts through here.
    pub fn apply_fact(&mut self, fact: &Fact) {
        match fact {
            Fact::RoleGranted { role, account, .. } => {
                self.roles.entry(*account).or_default().insert(*role);
            }
            Fact::RoleRevoked { role, account, .. } => {
                if let Some(set) = self.roles.get_mut(account) {
                    set.remove(role);
                    if set.is_empty() {
                        self.roles.remove(account);
                    }
                }
            }
            Fact::Paused { .. } => self.paused = true,
            Fact::Unpaused { .. } => self.paused = false,
            Fact::ProjectRegistered {
                id,
                owner,
                evidence_hash,
                at,
                ..
            } => {
                self.projects.insert(
                    id.clone(),
                    Project {
                        id: id.clone(),
                        owner: *owner,
                        evidence_hash: evidence_hash.clone(),
                        created_at: *at,
                        active: true,
                        mrv_ids: Vec::new(),
                        token_ids: Vec::new(),
                    },
                );
            }
            Fact::ProjectStatusChanged { id, active, .. } => {
                if let Some(project) = self.projects.get_mut(id) {
                    project.active = *active;
                }
            }
            Fact::MrvAnchored {
                id,
                project_id,
                evidence_hash,
                t_co2e,
                auditor,
                at,
                ..
            } => {
                self.mrvs.insert(
                    id.clone(),
                    MrvRecord {
                        id: id.clone(),
                        project_id: project_id.clone(),
                        evidence_hash: evidence_hash.clone(),
                        t_co2e: *t_co2e,
                        auditor: *auditor,
                        created_at: *at,
                    },
                );
                if let Some(project) = self.projects.get_mut(project_id) {
                    project.mrv_ids.push(id.clone());
                }
            }
            Fact::MrvHashUpdated {
                id, evidence_hash, ..
            } => {
                if let Some(mrv) = self.mrvs.get_mut(id) {
                    mrv.evidence_hash = evidence_hash.clone();
                }
            }
            Fact::AttestationCreated {
                mrv_id,
                project_id,
                auditor,
                attestor,
                t_co2e,
                kind,
                at,
            } => {
                self.attestations.insert(
                    mrv_id.clone(),
                    Attestation {
                        mrv_id: mrv_id.clone(),
                        project_id: project_id.clone(),
                        auditor: *auditor,
                        attestor: *attestor,
                        t_co2e: *t_co2e,
                        kind: *kind,
                        created_at: *at,
                        revoked: false,
                        revocation_reason: None,
                    },
                );
                match kind {
                    AttestationKind::DirectSignature => {
                        *self.nonces.entry(*auditor).or_insert(0) += 1;
                    }
                    AttestationKind::OracleAttestation => {
                        if let Some(oracle) = self.oracles.get_mut(attestor) {
                            oracle.attestation_count += 1;
                        }
                    }
                    AttestationKind::MultiSig => {}
                }
            }
            Fact::AttestationRevoked { mrv_id, reason, .. } => {
                if let Some(attestation) = self.attestations.get_mut(mrv_id) {
                    attestation.revoked = true;
                    attestation.revocation_reason = Some(reason.clone());
                }
            }
            Fact::OracleRegistered {
                account,
                endpoint,
                at,
                ..
            } => {
                self.oracles.insert(
                    *account,
                    OracleInfo {
                        account: *account,
                        active: true,
                        attestation_count: 0,
                        registered_at: *at,
                        endpoint: endpoint.clone(),
                    },
                );
            }
            Fact::OracleStatusChanged {
                account, active, ..
            } => {
                if let Some(oracle) = self.oracles.get_mut(account) {
                    oracle.active = *active;
                }
            }
            Fact::ValidityPeriodChanged { days, .. } => {
                self.validity_period_days = *days;
            }
            Fact::OperatorApprovalSet {
                owner,
                operator,
                approved,
                ..
            } => {
                if *approved {
                    self.approvals.insert((*owner, *operator));
                } else {
                    self.approvals.remove(&(*owner, *operator));
                }
            }
            Fact::CreditsMinted {
                token_id,
                project_id,
                mrv_id,
                recipient,
                amount,
                vintage_year,
                evidence_hash,
                issuer,
                at,
            } => {
                self.batches.insert(
                    *token_id,
                    CreditBatch {
                        token_id: *token_id,
                        project_id: project_id.clone(),
                        mrv_id: mrv_id.clone(),
                        vintage_year: *vintage_year,
                        evidence_hash: evidence_hash.clone(),
                        total_issued: *amount,
                        total_retired: 0,
                        issuer: *issuer,
                        issued_at: *at,
                    },
                );
                self.next_token_id = token_id + 1;
                self.credit(*recipient, *token_id, *amount);
                if let Some(project) = self.projects.get_mut(project_id) {
                    project.token_ids.push(*token_id);
                }
            }
            Fact::CreditsTransferred {
                from,
                to,
                token_id,
                amount,
                ..
            } => {
                self.debit(*from, *token_id, *amount);
                self.credit(*to, *token_id, *amount);
            }
            Fact::CreditsRetired {
                token_id,
                amount,
                holder,
                beneficiary,
                ..
            } => {
                self.debit(*holder, *token_id, *amount);
                if let Some(batch) = self.batches.get_mut(token_id) {
                    batch.total_retired += amount;
                }
                *self.retired.entry((*beneficiary, *token_id)).or_insert(0) += amount;
            }
            Fact::BatchMetadataUpdated {
                token_id,
                evidence_hash,
                ..
            } => {
                if let Some(batch) = self.batches.get_mut(token_id) {
                    batch.evidence_hash = evidence_hash.clone();
                }
            }
            Fact::BufferReserved {
                token_id,
                project_id,
                amount,
                percentage_bps,
                manager,
                at,
            } => {
                self.debit(*manager, *token_id, *amount);
                self.credit(AccountId::POOL, *token_id, *amount);
                self.reserves.insert(
                    *token_id,
                    BufferReserve {
                        token_id: *token_id,
                        project_id: project_id.clone(),
                        total_reserved: *amount,
                        total_used: 0,
                        reserve_percentage_bps: *percentage_bps,
                        active: true,
                        created_at: *at,
                    },
                );
                self.project_buffer_tokens
                    .entry(project_id.clone())
                    .or_default()
                    .push(*token_id);
            }
            Fact::BufferPercentageChanged {
                token_id,
                percentage_bps,
                ..
            } => {
                if let Some(reserve) = self.reserves.get_mut(token_id) {
                    reserve.reserve_percentage_bps = *percentage_bps;
                }
            }
            Fact::DefaultBufferPercentageChanged { percentage_bps, .. } => {
                self.default_buffer_bps = *percentage_bps;
            }
            Fact::ReversalExecuted {
                id,
                project_id,
                token_id,
                credits_affected,
                evidence_hash,
                executor,
                at,
            } => {
                if let Some(reserve) = self.reserves.get_mut(token_id) {
                    reserve.total_used += credits_affected;
                }
                self.reversals.insert(
                    id.clone(),
                    ReversalEvent {
                        id: id.clone(),
                        project_id: project_id.clone(),
                        token_id: *token_id,
                        credits_affected: *credits_affected,
                        buffer_used: *credits_affected,
                        evidence_hash: evidence_hash.clone(),
                        executor: *executor,
                        created_at: *at,
                        executed: true,
                    },
                );
            }
            Fact::BufferWithdrawn {
                token_id,
                to,
                amount,
                ..
            } => {
                self.debit(AccountId::POOL, *token_id, *amount);
                self.credit(*to, *token_id, *amount);
                if let Some(reserve) = self.reserves.get_mut(token_id) {
                    reserve.total_reserved = reserve.total_reserved.saturating_sub(*amount);
                }
            }
        }
    }

    fn credit(&mut self, holder: AccountId, token_id: u64, amount: u64) {
        *self.balances.entry((holder, token_id)).or_insert(0) += amount;
    }

    fn debit(&mut self, holder: AccountId, token_id: u64, amount: u64) {
        let key = (holder, token_id);
        if let Some(balance) = self.balances.get_mut(&key) {
            *balance = balance.saturating_sub(amount);
            if *balance == 0 {
                self.balances.remove(&key);
            }
        }
    }

    // ---- queries -------------------------------------------------------
    //
    // Queries never fail on unknown keys: they return sentinels (None,
    // zero, empty, exists=false) so callers can probe without error-driven
    // control flow.

    /// Whether the ledger is currently paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether `account` holds `role`
    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.roles
            .get(account)
            .map(|set| set.contains(&role))
            .unwrap_or(false)
    }

    /// Project by id
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    /// MRV ids anchored against a project, in insertion order
    pub fn project_mrvs(&self, project_id: &str) -> Vec<String> {
        self.projects
            .get(project_id)
            .map(|p| p.mrv_ids.clone())
            .unwrap_or_default()
    }

    /// Batch token ids minted against a project, in insertion order
    pub fn project_tokens(&self, project_id: &str) -> Vec<u64> {
        self.projects
            .get(project_id)
            .map(|p| p.token_ids.clone())
            .unwrap_or_default()
    }

    /// Batch token ids with buffer reserves under a project
    pub fn project_buffer_tokens(&self, project_id: &str) -> Vec<u64> {
        self.project_buffer_tokens
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// MRV record by id
    pub fn mrv(&self, id: &str) -> Option<&MrvRecord> {
        self.mrvs.get(id)
    }

    /// Query-safe MRV lookup; `exists = false` for unknown ids
    pub fn mrv_info(&self, id: &str) -> MrvInfo {
        match self.mrvs.get(id) {
            Some(mrv) => MrvInfo {
                exists: true,
                project_id: mrv.project_id.clone(),
                t_co2e: mrv.t_co2e,
                auditor: mrv.auditor,
            },
            None => MrvInfo::default(),
        }
    }

    /// Attestation by MRV id
    pub fn attestation(&self, mrv_id: &str) -> Option<&Attestation> {
        self.attestations.get(mrv_id)
    }

    /// `(valid, expired)` for an MRV's attestation.
    ///
    /// `valid` means the attestation exists and is not revoked. `expired`
    /// is advisory: the validity window has passed without auto-revoking.
    pub fn is_attestation_valid(&self, mrv_id: &str, now: DateTime<Utc>) -> (bool, bool) {
        match self.attestations.get(mrv_id) {
            Some(attestation) => {
                let valid = !attestation.revoked;
                let expiry =
                    attestation.created_at + Duration::days(i64::from(self.validity_period_days));
                (valid, now > expiry)
            }
            None => (false, false),
        }
    }

    /// Current nonce for a direct-attestation signer
    pub fn nonce(&self, signer: &AccountId) -> u64 {
        self.nonces.get(signer).copied().unwrap_or(0)
    }

    /// Oracle metadata by account
    pub fn oracle(&self, account: &AccountId) -> Option<&OracleInfo> {
        self.oracles.get(account)
    }

    /// Credit batch by token id
    pub fn batch(&self, token_id: u64) -> Option<&CreditBatch> {
        self.batches.get(&token_id)
    }

    /// Next token id the ledger will allocate
    pub fn next_token_id(&self) -> u64 {
        self.next_token_id
    }

    /// Holder balance, zero for unknown keys
    pub fn balance(&self, holder: &AccountId, token_id: u64) -> u64 {
        self.balances.get(&(*holder, token_id)).copied().unwrap_or(0)
    }

    /// Accumulated retired balance for a beneficiary
    pub fn retired_balance(&self, beneficiary: &AccountId, token_id: u64) -> u64 {
        self.retired
            .get(&(*beneficiary, token_id))
            .copied()
            .unwrap_or(0)
    }

    /// Whether `operator` may move `owner`'s balances
    pub fn is_approved_operator(&self, owner: &AccountId, operator: &AccountId) -> bool {
        self.approvals.contains(&(*owner, *operator))
    }

    /// Buffer reserve by token id
    pub fn buffer_reserve(&self, token_id: u64) -> Option<&BufferReserve> {
        self.reserves.get(&token_id)
    }

    /// Reversal event by id
    pub fn reversal(&self, id: &str) -> Option<&ReversalEvent> {
        self.reversals.get(id)
    }

    /// Attestation validity window in days
    pub fn validity_period_days(&self) -> u32 {
        self.validity_period_days
    }

    /// Default buffer percentage in basis points
    pub fn default_buffer_bps(&self) -> u16 {
        self.default_buffer_bps
    }

    /// Check credit conservation for one batch:
    /// circulating balances + retired + pool holding == issued.
    ///
    /// Unknown token ids trivially conserve.
    pub fn check_conservation(&self, token_id: u64) -> bool {
        let Some(batch) = self.batches.get(&token_id) else {
            return true;
        };

        let circulating: u64 = self
            .balances
            .iter()
            .filter(|((holder, tid), _)| *tid == token_id && *holder != AccountId::POOL)
            .map(|(_, amount)| *amount)
            .sum();
        let pool = self.balance(&AccountId::POOL, token_id);

        circulating + batch.total_retired + pool == batch.total_issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EvidenceHash;

    fn account(byte: u8) -> AccountId {
        AccountId::new([byte; 32])
    }

    #[test]
    fn test_apply_role_facts() {
        let mut state = LedgerState::default();
        let admin = account(1);
        let issuer = account(2);

        state.apply_fact(&Fact::RoleGranted {
            role: Role::Admin,
            account: admin,
            by: admin,
            at: Utc::now(),
        });
        state.apply_fact(&Fact::RoleGranted {
            role: Role::Issuer,
            account: issuer,
            by: admin,
            at: Utc::now(),
        });

        assert!(state.has_role(Role::Admin, &admin));
        assert!(state.has_role(Role::Issuer, &issuer));
        assert!(!state.has_role(Role::Issuer, &admin));

        state.apply_fact(&Fact::RoleRevoked {
            role: Role::Issuer,
            account: issuer,
            by: admin,
            at: Utc::now(),
        });
        assert!(!state.has_role(Role::Issuer, &issuer));
    }

    #[test]
    fn test_replay_reproduces_state() {
        let now = Utc::now();
        let admin = account(1);
        let facts = vec![
            Fact::RoleGranted {
                role: Role::Admin,
                account: admin,
                by: admin,
                at: now,
            },
            Fact::ProjectRegistered {
                id: "P1".to_string(),
                owner: account(2),
                evidence_hash: EvidenceHash::new("QmP1"),
                by: admin,
                at: now,
            },
            Fact::MrvAnchored {
                id: "M1".to_string(),
                project_id: "P1".to_string(),
                evidence_hash: EvidenceHash::new("QmM1"),
                t_co2e: 100,
                auditor: account(3),
                by: admin,
                at: now,
            },
            Fact::CreditsMinted {
                token_id: 1,
                project_id: "P1".to_string(),
                mrv_id: "M1".to_string(),
                recipient: account(4),
                amount: 100,
                vintage_year: 2023,
                evidence_hash: EvidenceHash::new("QmB1"),
                issuer: admin,
                at: now,
            },
        ];

        let mut first = LedgerState::default();
        let mut second = LedgerState::default();
        for fact in &facts {
            first.apply_fact(fact);
        }
        for fact in &facts {
            second.apply_fact(fact);
        }

        assert_eq!(first, second);
        assert_eq!(first.balance(&account(4), 1), 100);
        assert_eq!(first.next_token_id(), 2);
        assert_eq!(first.project_tokens("P1"), vec![1]);
        assert!(first.check_conservation(1));
    }

    #[test]
    fn test_mrv_info_sentinel() {
        let state = LedgerState::default();
        let info = state.mrv_info("no-such-mrv");
        assert!(!info.exists);
        assert_eq!(info.t_co2e, 0);
        assert!(info.auditor.is_zero());
    }

    #[test]
    fn test_conservation_over_buffer_and_retire() {
        let now = Utc::now();
        let mut state = LedgerState::default();
        let holder = account(5);

        state.apply_fact(&Fact::CreditsMinted {
            token_id: 1,
            project_id: "P1".to_string(),
            mrv_id: "M1".to_string(),
            recipient: holder,
            amount: 100,
            vintage_year: 2023,
            evidence_hash: EvidenceHash::new("QmB1"),
            issuer: account(1),
            at: now,
        });
        state.apply_fact(&Fact::BufferReserved {
            token_id: 1,
            project_id: "P1".to_string(),
            amount: 10,
            percentage_bps: 1000,
            manager: holder,
            at: now,
        });
        state.apply_fact(&Fact::CreditsRetired {
            token_id: 1,
            amount: 40,
            holder,
            beneficiary: account(6),
            reason: "offset".to_string(),
            at: now,
        });

        assert_eq!(state.balance(&holder, 1), 50);
        assert_eq!(state.balance(&AccountId::POOL, 1), 10);
        assert_eq!(state.retired_balance(&account(6), 1), 40);
        assert!(state.check_conservation(1));
    }
}
