//! Error types for the credit ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every failure aborts the whole transition with no partial state change;
/// atomicity is the only recovery mechanism. Read-only queries never produce
/// these for missing keys.
#[derive(Error, Debug)]
pub enum Error {
    /// Role check failed
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Ledger is paused; mutating transition rejected
    #[error("ledger is paused")]
    SystemPaused,

    /// Unknown project, MRV, batch, reserve, attestation, or reversal
    #[error("not found: {0}")]
    NotFound(String),

    /// Re-registration of an existing id, or re-application of a terminal
    /// operation (revoke, reserve, reversal)
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Zero amount, null account, empty hash or reason, out-of-range
    /// percentage or vintage
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Signature deadline passed by the time the transition was applied
    #[error("signature deadline expired")]
    Expired,

    /// Signature did not verify against the claimed auditor
    #[error("invalid signature")]
    InvalidSignature,

    /// Holder balance too small for transfer, retire, or reserve
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Reversal or withdrawal larger than the available buffer
    #[error("insufficient buffer: {0}")]
    InsufficientBuffer(String),

    /// Batch-call array lengths differ
    #[error("length mismatch: {0}")]
    LengthMismatch(String),

    /// The administrator capability must always have a holder
    #[error("cannot revoke the last administrator")]
    LastAdmin,

    /// Storage error (RocksDB)
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
