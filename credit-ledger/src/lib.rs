//! Sequestra Credit Ledger Core
//!
//! Deterministic state machine for a carbon-credit registry: project and
//! MRV registration, attestation, batch credit issuance and retirement, and
//! a permanence-risk buffer pool.
//!
//! # Architecture
//!
//! - **Event sourcing**: every mutating operation emits facts; state is a
//!   pure fold over the fact log
//! - **Single writer**: one actor task applies transitions in total order
//! - **All-or-nothing**: transitions validate fully before emitting a fact,
//!   so a rejected call leaves no trace
//!
//! # Invariants
//!
//! - Credit conservation: Σ(balances) + retired + buffered == issued, per batch
//! - Monotone counters: retired amounts, buffer usage, and signer nonces
//!   never decrease
//! - Append-only: facts are never modified or deleted

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod actor;
pub mod attestation;
pub mod buffer;
pub mod config;
pub mod credits;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod roles;
pub mod state;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, PolicyConfig};
pub use error::{Error, Result};
pub use ledger::{Command, Ledger};
pub use state::LedgerState;
pub use storage::Storage;
pub use types::{
    AccountId, Attestation, AttestationKind, CreditBatch, BufferReserve, EvidenceHash, Fact,
    MrvRecord, OracleInfo, Project, ReversalEvent, Role, Signature,
};
