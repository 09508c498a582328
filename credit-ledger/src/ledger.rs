//! Main ledger orchestration layer
//!
//! Ties together state machine, storage, and actor components into a
//! high-level API. Callers submit [`Command`]s; the single-writer actor
//! applies each as one atomic transition, persists the resulting facts,
//! and replies with them.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Command, Config, Ledger};
//! use credit_ledger::types::AccountId;
//!
//! #[tokio::main]
//! async fn main() -> credit_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     let admin = AccountId::new([1u8; 32]);
//!     ledger.submit(Command::Genesis { admin }).await?;
//!
//!     ledger.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    error::{Error, Result},
    metrics::Metrics,
    state::LedgerState,
    types::{AccountId, EvidenceHash, Fact, Role, Signature},
    Config, Storage,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One requested ledger transition. Every variant carries the submitting
/// account; the executor stamps the ordering timestamp at apply time.
#[derive(Debug, Clone)]
pub enum Command {
    /// Bootstrap the role table with the first administrator
    Genesis {
        /// First administrator
        admin: AccountId,
    },
    /// Grant a role (Admin only)
    GrantRole {
        /// Submitting account
        caller: AccountId,
        /// Capability to grant
        role: Role,
        /// Receiving account
        account: AccountId,
    },
    /// Revoke a role (Admin only)
    RevokeRole {
        /// Submitting account
        caller: AccountId,
        /// Capability to revoke
        role: Role,
        /// Losing account
        account: AccountId,
    },
    /// Halt mutating transitions (Pauser only)
    Pause {
        /// Submitting account
        caller: AccountId,
    },
    /// Resume mutating transitions (Pauser only)
    Unpause {
        /// Submitting account
        caller: AccountId,
    },
    /// Register a new project (Issuer only)
    RegisterProject {
        /// Submitting account
        caller: AccountId,
        /// Project id
        id: String,
        /// External owner
        owner: AccountId,
        /// Design-document pointer
        evidence_hash: EvidenceHash,
    },
    /// Toggle a project's active flag (Governance only)
    SetProjectStatus {
        /// Submitting account
        caller: AccountId,
        /// Project id
        id: String,
        /// New flag value
        active: bool,
    },
    /// Anchor MRV evidence against a project (Issuer only)
    AnchorMrv {
        /// Submitting account
        caller: AccountId,
        /// MRV id
        id: String,
        /// Referenced project
        project_id: String,
        /// Evidence-package pointer
        evidence_hash: EvidenceHash,
        /// Claimed tonnes CO2e
        t_co2e: u64,
        /// Auditor identity
        auditor: AccountId,
    },
    /// Replace an MRV's evidence pointer (Issuer only)
    UpdateMrvHash {
        /// Submitting account
        caller: AccountId,
        /// MRV id
        id: String,
        /// Replacement pointer
        evidence_hash: EvidenceHash,
    },
    /// Attest an MRV with an auditor signature (Attestor only)
    CreateDirectAttestation {
        /// Submitting account
        caller: AccountId,
        /// MRV to attest
        mrv_id: String,
        /// Project the MRV reports on
        project_id: String,
        /// Signing auditor
        auditor: AccountId,
        /// Approved tonnes CO2e
        t_co2e: u64,
        /// Signature expiry, checked against the transition clock
        deadline: DateTime<Utc>,
        /// Auditor's signature over the canonical digest
        signature: Signature,
    },
    /// Attest an MRV on oracle authority (active Oracle only)
    CreateOracleAttestation {
        /// Submitting account
        caller: AccountId,
        /// MRV to attest
        mrv_id: String,
        /// Project the MRV reports on
        project_id: String,
        /// Auditor whose claim is approved
        auditor: AccountId,
        /// Approved tonnes CO2e
        t_co2e: u64,
    },
    /// Attest several MRVs as one all-or-nothing unit (active Oracle only)
    CreateBatchAttestation {
        /// Submitting account
        caller: AccountId,
        /// MRVs to attest
        mrv_ids: Vec<String>,
        /// Parallel project ids
        project_ids: Vec<String>,
        /// Parallel auditors
        auditors: Vec<AccountId>,
        /// Parallel approved amounts
        amounts: Vec<u64>,
    },
    /// Terminally revoke an attestation (Governance only)
    RevokeAttestation {
        /// Submitting account
        caller: AccountId,
        /// Attested MRV id
        mrv_id: String,
        /// Audit-trail reason
        reason: String,
    },
    /// Register an oracle, granting it the Oracle role (Governance only)
    RegisterOracle {
        /// Submitting account
        caller: AccountId,
        /// Oracle account
        account: AccountId,
        /// Off-ledger endpoint descriptor
        endpoint: String,
    },
    /// Toggle an oracle's active flag and Oracle role (Governance only)
    SetOracleStatus {
        /// Submitting account
        caller: AccountId,
        /// Oracle account
        account: AccountId,
        /// New flag value
        active: bool,
    },
    /// Retune the attestation validity window (Governance only)
    SetValidityPeriod {
        /// Submitting account
        caller: AccountId,
        /// New period in days
        days: u32,
    },
    /// Mint a credit batch against an anchored MRV (Issuer only)
    MintBatch {
        /// Submitting account
        caller: AccountId,
        /// Receiving account
        recipient: AccountId,
        /// Source project
        project_id: String,
        /// Source MRV
        mrv_id: String,
        /// Issued amount, whole tonnes
        amount: u64,
        /// Vintage year
        vintage_year: u16,
        /// Issuance-documentation pointer
        evidence_hash: EvidenceHash,
    },
    /// Move credits between holders
    Transfer {
        /// Submitting account (holder or approved operator)
        caller: AccountId,
        /// Sending holder
        from: AccountId,
        /// Receiving holder
        to: AccountId,
        /// Batch token id
        token_id: u64,
        /// Moved amount
        amount: u64,
    },
    /// Approve or clear an operator over the caller's balances
    SetOperatorApproval {
        /// Submitting account (balance owner)
        caller: AccountId,
        /// Operator account
        operator: AccountId,
        /// Approval state
        approved: bool,
    },
    /// Permanently retire credits on behalf of a beneficiary
    Retire {
        /// Submitting account (holder)
        caller: AccountId,
        /// Batch token id
        token_id: u64,
        /// Retired amount
        amount: u64,
        /// Offset-claiming beneficiary
        beneficiary: AccountId,
        /// Free-form retirement reason
        reason: String,
    },
    /// Retire across several batches as one all-or-nothing unit
    RetireBatch {
        /// Submitting account (holder)
        caller: AccountId,
        /// Batch token ids
        token_ids: Vec<u64>,
        /// Parallel amounts
        amounts: Vec<u64>,
        /// Offset-claiming beneficiary
        beneficiary: AccountId,
        /// Free-form retirement reason
        reason: String,
    },
    /// Replace a batch's evidence pointer (Issuer only)
    UpdateBatchMetadata {
        /// Submitting account
        caller: AccountId,
        /// Batch token id
        token_id: u64,
        /// Replacement pointer
        evidence_hash: EvidenceHash,
    },
    /// Carve a buffer reserve out of a batch (Buffer-Manager only)
    ReserveBuffer {
        /// Submitting account
        caller: AccountId,
        /// Batch token id
        token_id: u64,
        /// Project of the batch
        project_id: String,
        /// Claimed issuance, checked against the batch
        total_issued: u64,
        /// Reserve percentage in basis points, 0 for the ledger default
        custom_bps: u16,
    },
    /// Absorb a discovered reversal against a batch's buffer (Governance only)
    ExecuteReversal {
        /// Submitting account
        caller: AccountId,
        /// Reversal id
        id: String,
        /// Affected project
        project_id: String,
        /// Affected batch
        token_id: u64,
        /// Buffer credits to consume
        credits_affected: u64,
        /// Reversal-evidence pointer
        evidence_hash: EvidenceHash,
    },
    /// Retune an existing reserve's percentage (Governance only)
    UpdateBufferPercentage {
        /// Submitting account
        caller: AccountId,
        /// Batch token id
        token_id: u64,
        /// New percentage in basis points
        bps: u16,
    },
    /// Retune the default reserve percentage (Governance only)
    SetDefaultBufferPercentage {
        /// Submitting account
        caller: AccountId,
        /// New percentage in basis points
        bps: u16,
    },
    /// Release unconsumed buffer credits from the pool (Governance only)
    WithdrawBuffer {
        /// Submitting account
        caller: AccountId,
        /// Batch token id
        token_id: u64,
        /// Receiving account
        to: AccountId,
        /// Withdrawn amount
        amount: u64,
        /// Audit-trail reason
        reason: String,
    },
}

impl Command {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Genesis { .. } => "genesis",
            Command::GrantRole { .. } => "grant_role",
            Command::RevokeRole { .. } => "revoke_role",
            Command::Pause { .. } => "pause",
            Command::Unpause { .. } => "unpause",
            Command::RegisterProject { .. } => "register_project",
            Command::SetProjectStatus { .. } => "set_project_status",
            Command::AnchorMrv { .. } => "anchor_mrv",
            Command::UpdateMrvHash { .. } => "update_mrv_hash",
            Command::CreateDirectAttestation { .. } => "create_direct_attestation",
            Command::CreateOracleAttestation { .. } => "create_oracle_attestation",
            Command::CreateBatchAttestation { .. } => "create_batch_attestation",
            Command::RevokeAttestation { .. } => "revoke_attestation",
            Command::RegisterOracle { .. } => "register_oracle",
            Command::SetOracleStatus { .. } => "set_oracle_status",
            Command::SetValidityPeriod { .. } => "set_validity_period",
            Command::MintBatch { .. } => "mint_batch",
            Command::Transfer { .. } => "transfer",
            Command::SetOperatorApproval { .. } => "set_operator_approval",
            Command::Retire { .. } => "retire",
            Command::RetireBatch { .. } => "retire_batch",
            Command::UpdateBatchMetadata { .. } => "update_batch_metadata",
            Command::ReserveBuffer { .. } => "reserve_buffer",
            Command::ExecuteReversal { .. } => "execute_reversal",
            Command::UpdateBufferPercentage { .. } => "update_buffer_percentage",
            Command::SetDefaultBufferPercentage { .. } => "set_default_buffer_percentage",
            Command::WithdrawBuffer { .. } => "withdraw_buffer",
        }
    }
}

impl LedgerState {
    /// Apply one command as an atomic transition at ordering time `now`.
    /// On success the returned facts have already been applied; on error
    /// the state is untouched.
    pub fn execute(&mut self, command: Command, now: DateTime<Utc>) -> Result<Vec<Fact>> {
        match command {
            Command::Genesis { admin } => self.genesis(admin, now).map(|f| vec![f]),
            Command::GrantRole {
                caller,
                role,
                account,
            } => self
                .grant_role(caller, role, account, now)
                .map(Vec::from_iter),
            Command::RevokeRole {
                caller,
                role,
                account,
            } => self
                .revoke_role(caller, role, account, now)
                .map(Vec::from_iter),
            Command::Pause { caller } => self.pause(caller, now).map(|f| vec![f]),
            Command::Unpause { caller } => self.unpause(caller, now).map(|f| vec![f]),
            Command::RegisterProject {
                caller,
                id,
                owner,
                evidence_hash,
            } => self
                .register_project(caller, id, owner, evidence_hash, now)
                .map(|f| vec![f]),
            Command::SetProjectStatus { caller, id, active } => self
                .set_project_status(caller, &id, active, now)
                .map(Vec::from_iter),
            Command::AnchorMrv {
                caller,
                id,
                project_id,
                evidence_hash,
                t_co2e,
                auditor,
            } => self
                .anchor_mrv(caller, id, project_id, evidence_hash, t_co2e, auditor, now)
                .map(|f| vec![f]),
            Command::UpdateMrvHash {
                caller,
                id,
                evidence_hash,
            } => self
                .update_mrv_hash(caller, &id, evidence_hash, now)
                .map(|f| vec![f]),
            Command::CreateDirectAttestation {
                caller,
                mrv_id,
                project_id,
                auditor,
                t_co2e,
                deadline,
                signature,
            } => self
                .create_direct_attestation(
                    caller, mrv_id, project_id, auditor, t_co2e, deadline, &signature, now,
                )
                .map(|f| vec![f]),
            Command::CreateOracleAttestation {
                caller,
                mrv_id,
                project_id,
                auditor,
                t_co2e,
            } => self
                .create_oracle_attestation(caller, mrv_id, project_id, auditor, t_co2e, now)
                .map(|f| vec![f]),
            Command::CreateBatchAttestation {
                caller,
                mrv_ids,
                project_ids,
                auditors,
                amounts,
            } => self.create_batch_attestation(caller, mrv_ids, project_ids, auditors, amounts, now),
            Command::RevokeAttestation {
                caller,
                mrv_id,
                reason,
            } => self
                .revoke_attestation(caller, &mrv_id, reason, now)
                .map(|f| vec![f]),
            Command::RegisterOracle {
                caller,
                account,
                endpoint,
            } => self.register_oracle(caller, account, endpoint, now),
            Command::SetOracleStatus {
                caller,
                account,
                active,
            } => self.set_oracle_status(caller, account, active, now),
            Command::SetValidityPeriod { caller, days } => {
                self.set_validity_period(caller, days, now).map(|f| vec![f])
            }
            Command::MintBatch {
                caller,
                recipient,
                project_id,
                mrv_id,
                amount,
                vintage_year,
                evidence_hash,
            } => self
                .mint_batch(
                    caller,
                    recipient,
                    project_id,
                    mrv_id,
                    amount,
                    vintage_year,
                    evidence_hash,
                    now,
                )
                .map(|(_, f)| vec![f]),
            Command::Transfer {
                caller,
                from,
                to,
                token_id,
                amount,
            } => self
                .transfer(caller, from, to, token_id, amount, now)
                .map(|f| vec![f]),
            Command::SetOperatorApproval {
                caller,
                operator,
                approved,
            } => self
                .set_operator_approval(caller, operator, approved, now)
                .map(Vec::from_iter),
            Command::Retire {
                caller,
                token_id,
                amount,
                beneficiary,
                reason,
            } => self
                .retire(caller, token_id, amount, beneficiary, reason, now)
                .map(|f| vec![f]),
            Command::RetireBatch {
                caller,
                token_ids,
                amounts,
                beneficiary,
                reason,
            } => self.retire_batch(caller, token_ids, amounts, beneficiary, reason, now),
            Command::UpdateBatchMetadata {
                caller,
                token_id,
                evidence_hash,
            } => self
                .update_batch_metadata(caller, token_id, evidence_hash, now)
                .map(|f| vec![f]),
            Command::ReserveBuffer {
                caller,
                token_id,
                project_id,
                total_issued,
                custom_bps,
            } => self
                .reserve_buffer(caller, token_id, project_id, total_issued, custom_bps, now)
                .map(|f| vec![f]),
            Command::ExecuteReversal {
                caller,
                id,
                project_id,
                token_id,
                credits_affected,
                evidence_hash,
            } => self
                .execute_reversal(
                    caller,
                    id,
                    project_id,
                    token_id,
                    credits_affected,
                    evidence_hash,
                    now,
                )
                .map(|f| vec![f]),
            Command::UpdateBufferPercentage {
                caller,
                token_id,
                bps,
            } => self
                .update_buffer_percentage(caller, token_id, bps, now)
                .map(|f| vec![f]),
            Command::SetDefaultBufferPercentage { caller, bps } => self
                .set_default_buffer_percentage(caller, bps, now)
                .map(|f| vec![f]),
            Command::WithdrawBuffer {
                caller,
                token_id,
                to,
                amount,
                reason,
            } => self
                .withdraw_buffer(caller, token_id, to, amount, reason, now)
                .map(|f| vec![f]),
        }
    }
}

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for command submission and reads
    handle: LedgerHandle,

    /// Metrics shared with the actor
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open the ledger: recover state from the latest snapshot plus fact
    /// log, then spawn the single-writer actor.
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("metrics registration: {}", e)))?;

        // Recover: snapshot if present, then replay the log tail.
        let (mut state, mut replay_from) = match storage.latest_snapshot()? {
            Some((seq, state)) => (state, seq + 1),
            None => (LedgerState::new(&config.policy), 1),
        };
        let mut last_seq = replay_from - 1;
        for (seq, fact) in storage.facts_from(replay_from)? {
            state.apply_fact(&fact);
            last_seq = seq;
        }
        replay_from = last_seq + 1;
        tracing::info!(last_seq, next_seq = replay_from, "Ledger state recovered");

        let handle = spawn_ledger_actor(
            state,
            last_seq,
            storage,
            metrics.clone(),
            config.snapshot_interval_facts,
        );

        Ok(Self {
            handle,
            metrics,
            config,
        })
    }

    /// Submit a command; resolves once the transition is committed and its
    /// facts are durable.
    pub async fn submit(&self, command: Command) -> Result<Vec<Fact>> {
        self.handle.submit(command).await
    }

    /// Read a consistent snapshot of the current state
    pub async fn state(&self) -> Result<LedgerState> {
        self.handle.read_state().await
    }

    /// Metrics collector (for the exporter endpoint)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
