//! Core types for the credit ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (whole tonnes CO2e as u64)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis-point denominator: 10000 = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Ceiling for any buffer reserve percentage (50%).
pub const MAX_BUFFER_BPS: u16 = 5_000;

/// Account identifier: an ed25519 verifying key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct AccountId([u8; 32]);

impl AccountId {
    /// The null identity. Never a valid owner, recipient, or auditor.
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    /// Distinguished holding account for the buffer pool. No signing key
    /// corresponds to it; credits move in and out only via buffer
    /// transitions.
    pub const POOL: AccountId = AccountId([0xFF; 32]);

    /// Create from raw key bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the null identity
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..")
    }
}

/// Opaque content-address pointer into the evidence store (e.g. an IPFS CID).
///
/// The ledger never fetches or validates the referenced payload; it only
/// stores and compares the pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EvidenceHash(String);

impl EvidenceHash {
    /// Create from a pointer string
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the pointer is missing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EvidenceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named capability checked at the start of every gated transition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Role {
    /// Grants and revokes all other roles
    Admin = 1,
    /// Registers projects, anchors MRVs, mints credit batches
    Issuer = 2,
    /// Signs direct attestations over MRV claims
    Auditor = 3,
    /// Submits oracle attestations (membership linked to oracle status)
    Oracle = 4,
    /// Submits direct-signature attestations on behalf of auditors
    Attestor = 5,
    /// Revocation, oracle registry, buffer policy, reversals
    Governance = 6,
    /// Pauses and unpauses the ledger
    Pauser = 7,
    /// Reserves batch buffers
    BufferManager = 8,
}

/// Registered sequestration project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Registry-unique project id, immutable
    pub id: String,

    /// External owner identity (not the registry)
    pub owner: AccountId,

    /// Pointer to the project design document
    pub evidence_hash: EvidenceHash,

    /// Registration timestamp (ordering clock)
    pub created_at: DateTime<Utc>,

    /// Governance-toggled active flag
    pub active: bool,

    /// MRV ids anchored against this project, insertion order
    pub mrv_ids: Vec<String>,

    /// Credit batch token ids minted against this project, insertion order
    pub token_ids: Vec<u64>,
}

/// Monitoring-Reporting-Verification evidence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrvRecord {
    /// Ledger-unique MRV id
    pub id: String,

    /// Project this MRV reports on
    pub project_id: String,

    /// Pointer to the evidence package; replaceable via hash update
    pub evidence_hash: EvidenceHash,

    /// Claimed sequestration in whole tonnes CO2e, immutable after anchoring
    pub t_co2e: u64,

    /// Auditor that produced the evidence package
    pub auditor: AccountId,

    /// Anchoring timestamp
    pub created_at: DateTime<Utc>,
}

/// How an attestation was authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttestationKind {
    /// Auditor signature over the canonical digest
    DirectSignature = 1,
    /// Registered oracle vouched by role membership
    OracleAttestation = 2,
    /// Reserved for multi-signature schemes
    MultiSig = 3,
}

/// Approval of an MRV's claimed quantity. Created at most once per MRV id;
/// revocation is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    /// MRV this attestation approves
    pub mrv_id: String,

    /// Project the MRV reports on
    pub project_id: String,

    /// Auditor whose claim is approved
    pub auditor: AccountId,

    /// Account that submitted the attestation
    pub attestor: AccountId,

    /// Approved quantity in tonnes CO2e
    pub t_co2e: u64,

    /// Authentication path
    pub kind: AttestationKind,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Monotonic: false -> true only
    pub revoked: bool,

    /// Audit-trail reason recorded on revocation
    pub revocation_reason: Option<String>,
}

/// Fungible-within-batch issued credits tied to one project/MRV/vintage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBatch {
    /// Monotonic token id allocated by the ledger, starting at 1
    pub token_id: u64,

    /// Project the credits derive from
    pub project_id: String,

    /// MRV the credits derive from
    pub mrv_id: String,

    /// Vintage year of the sequestration
    pub vintage_year: u16,

    /// Pointer to issuance documentation
    pub evidence_hash: EvidenceHash,

    /// Fixed at mint; no re-mint into the same batch
    pub total_issued: u64,

    /// Monotonically increasing retired amount
    pub total_retired: u64,

    /// Issuer account
    pub issuer: AccountId,

    /// Mint timestamp
    pub issued_at: DateTime<Utc>,
}

/// Per-batch permanence-risk reserve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferReserve {
    /// Batch this reserve backs
    pub token_id: u64,

    /// Project of the batch
    pub project_id: String,

    /// Credits held in the pool for this batch; shrinks only on withdrawal
    pub total_reserved: u64,

    /// Credits consumed by reversals; monotone, `<= total_reserved`
    pub total_used: u64,

    /// Percentage applied at reserve time, basis points
    pub reserve_percentage_bps: u16,

    /// Whether the reserve exists and is live
    pub active: bool,

    /// Reservation timestamp
    pub created_at: DateTime<Utc>,
}

impl BufferReserve {
    /// Buffer still available to absorb reversals or be withdrawn
    pub fn available(&self) -> u64 {
        self.total_reserved.saturating_sub(self.total_used)
    }
}

/// Record of a post-issuance sequestration reversal absorbed by the buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalEvent {
    /// Ledger-unique reversal id
    pub id: String,

    /// Affected project
    pub project_id: String,

    /// Affected batch
    pub token_id: u64,

    /// Overstated credits discovered
    pub credits_affected: u64,

    /// Buffer consumed (equals `credits_affected`)
    pub buffer_used: u64,

    /// Pointer to the reversal evidence
    pub evidence_hash: EvidenceHash,

    /// Governance account that executed the reversal
    pub executor: AccountId,

    /// Execution timestamp
    pub created_at: DateTime<Utc>,

    /// Always true once recorded; reversals are never staged
    pub executed: bool,
}

/// Registered oracle metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleInfo {
    /// Oracle account (also carries the Oracle role while active)
    pub account: AccountId,

    /// Whether the oracle may currently attest
    pub active: bool,

    /// Number of attestations submitted
    pub attestation_count: u64,

    /// Registration timestamp
    pub registered_at: DateTime<Utc>,

    /// Off-ledger endpoint descriptor
    pub endpoint: String,
}

/// Query-safe MRV lookup result; `exists = false` instead of an error
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MrvInfo {
    /// Whether the MRV id is known
    pub exists: bool,

    /// Project id, empty when unknown
    pub project_id: String,

    /// Claimed tonnes CO2e, zero when unknown
    pub t_co2e: u64,

    /// Auditor, null when unknown
    pub auditor: AccountId,
}

/// Ed25519 signature over an attestation digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Verify against a message and verifying key
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};

        let signature = DalekSignature::from_bytes(&self.bytes);

        let verifying_key = match VerifyingKey::from_bytes(public_key) {
            Ok(key) => key,
            Err(_) => return false,
        };

        verifying_key.verify(message, &signature).is_ok()
    }
}

/// One logical state change, carrying every field needed to replay it.
///
/// The fact log is the single durable record of the ledger: every mutating
/// operation emits exactly one fact per logical change, in commit order.
/// Replaying the log from genesis reproduces the state bit-exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Fact {
    /// Role granted to an account
    RoleGranted {
        /// Capability granted
        role: Role,
        /// Receiving account
        account: AccountId,
        /// Granting administrator
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Role revoked from an account
    RoleRevoked {
        /// Capability revoked
        role: Role,
        /// Losing account
        account: AccountId,
        /// Revoking administrator
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Ledger paused; mutating registry/credit/buffer transitions rejected
    Paused {
        /// Pauser account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Ledger unpaused
    Unpaused {
        /// Pauser account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// New project registered
    ProjectRegistered {
        /// Project id
        id: String,
        /// External owner
        owner: AccountId,
        /// Design-document pointer
        evidence_hash: EvidenceHash,
        /// Issuing account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Project active flag toggled by governance
    ProjectStatusChanged {
        /// Project id
        id: String,
        /// New flag value
        active: bool,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// MRV evidence anchored against a project
    MrvAnchored {
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
        /// Issuing account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// MRV evidence pointer replaced; amount and auditor stay fixed
    MrvHashUpdated {
        /// MRV id
        id: String,
        /// Replacement pointer
        evidence_hash: EvidenceHash,
        /// Issuing account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Attestation created; for direct signatures this also consumes the
    /// auditor's current nonce
    AttestationCreated {
        /// Attested MRV id
        mrv_id: String,
        /// Project the MRV reports on
        project_id: String,
        /// Auditor whose claim is approved
        auditor: AccountId,
        /// Submitting account
        attestor: AccountId,
        /// Approved tonnes CO2e
        t_co2e: u64,
        /// Authentication path
        kind: AttestationKind,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Attestation permanently revoked
    AttestationRevoked {
        /// Attested MRV id
        mrv_id: String,
        /// Audit-trail reason
        reason: String,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Oracle registered (also grants the Oracle role)
    OracleRegistered {
        /// Oracle account
        account: AccountId,
        /// Off-ledger endpoint descriptor
        endpoint: String,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Oracle active flag toggled (role membership follows via a role fact)
    OracleStatusChanged {
        /// Oracle account
        account: AccountId,
        /// New flag value
        active: bool,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Attestation validity period retuned by governance
    ValidityPeriodChanged {
        /// New period in days
        days: u32,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Operator approval set or cleared on a holder's balances
    OperatorApprovalSet {
        /// Balance owner
        owner: AccountId,
        /// Approved operator
        operator: AccountId,
        /// Approval state
        approved: bool,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Credit batch minted
    CreditsMinted {
        /// Allocated token id
        token_id: u64,
        /// Source project
        project_id: String,
        /// Source MRV
        mrv_id: String,
        /// Receiving account
        recipient: AccountId,
        /// Issued amount
        amount: u64,
        /// Vintage year
        vintage_year: u16,
        /// Issuance-documentation pointer
        evidence_hash: EvidenceHash,
        /// Issuing account
        issuer: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Credits moved between holders
    CreditsTransferred {
        /// Sending holder
        from: AccountId,
        /// Receiving holder
        to: AccountId,
        /// Batch token id
        token_id: u64,
        /// Moved amount
        amount: u64,
        /// Caller (holder or approved operator)
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Credits permanently retired on behalf of a beneficiary
    CreditsRetired {
        /// Batch token id
        token_id: u64,
        /// Retired amount
        amount: u64,
        /// Holder whose balance was debited
        holder: AccountId,
        /// Offset-claiming beneficiary
        beneficiary: AccountId,
        /// Free-form retirement reason
        reason: String,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Batch evidence pointer replaced; accounting fields untouched
    BatchMetadataUpdated {
        /// Batch token id
        token_id: u64,
        /// Replacement pointer
        evidence_hash: EvidenceHash,
        /// Issuing account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Buffer reserved: credits moved from the manager into the pool holding
    BufferReserved {
        /// Batch token id
        token_id: u64,
        /// Project of the batch
        project_id: String,
        /// Credits moved into the pool
        amount: u64,
        /// Percentage applied, basis points
        percentage_bps: u16,
        /// Buffer manager whose balance was debited
        manager: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Existing reserve's percentage retuned (metadata only, no movement)
    BufferPercentageChanged {
        /// Batch token id
        token_id: u64,
        /// New percentage, basis points
        percentage_bps: u16,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Default reserve percentage retuned
    DefaultBufferPercentageChanged {
        /// New percentage, basis points
        percentage_bps: u16,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Reversal executed against a batch's buffer
    ReversalExecuted {
        /// Reversal id
        id: String,
        /// Affected project
        project_id: String,
        /// Affected batch
        token_id: u64,
        /// Buffer consumed
        credits_affected: u64,
        /// Reversal-evidence pointer
        evidence_hash: EvidenceHash,
        /// Governance account
        executor: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
    /// Buffer credits withdrawn from the pool holding by governance
    BufferWithdrawn {
        /// Batch token id
        token_id: u64,
        /// Receiving account
        to: AccountId,
        /// Withdrawn amount
        amount: u64,
        /// Audit-trail reason
        reason: String,
        /// Governance account
        by: AccountId,
        /// Ordering timestamp
        at: DateTime<Utc>,
    },
}

impl Fact {
    /// Short name for logging and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Fact::RoleGranted { .. } => "role_granted",
            Fact::RoleRevoked { .. } => "role_revoked",
            Fact::Paused { .. } => "paused",
            Fact::Unpaused { .. } => "unpaused",
            Fact::ProjectRegistered { .. } => "project_registered",
            Fact::ProjectStatusChanged { .. } => "project_status_changed",
            Fact::MrvAnchored { .. } => "mrv_anchored",
            Fact::MrvHashUpdated { .. } => "mrv_hash_updated",
            Fact::AttestationCreated { .. } => "attestation_created",
            Fact::AttestationRevoked { .. } => "attestation_revoked",
            Fact::OracleRegistered { .. } => "oracle_registered",
            Fact::OracleStatusChanged { .. } => "oracle_status_changed",
            Fact::ValidityPeriodChanged { .. } => "validity_period_changed",
            Fact::OperatorApprovalSet { .. } => "operator_approval_set",
            Fact::CreditsMinted { .. } => "credits_minted",
            Fact::CreditsTransferred { .. } => "credits_transferred",
            Fact::CreditsRetired { .. } => "credits_retired",
            Fact::BatchMetadataUpdated { .. } => "batch_metadata_updated",
            Fact::BufferReserved { .. } => "buffer_reserved",
            Fact::BufferPercentageChanged { .. } => "buffer_percentage_changed",
            Fact::DefaultBufferPercentageChanged { .. } => "default_buffer_percentage_changed",
            Fact::ReversalExecuted { .. } => "reversal_executed",
            Fact::BufferWithdrawn { .. } => "buffer_withdrawn",
        }
    }
}
