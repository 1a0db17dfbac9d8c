//! Error types for the GradeChain ledger.
//!
//! Every fallible operation in the crate returns [`LedgerError`]. The core
//! never retries and never auto-corrects: a broken digest or a missing
//! instructor is reported to the caller exactly once, with the height at
//! which it was found.

use std::time::Duration;

use thiserror::Error;

use crate::consensus::policy::ProtocolVersion;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Why a block (or a proposed block) failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    /// The stored digest does not match the digest recomputed from the block.
    #[error("invalid digest: stored={stored}, computed={computed}")]
    DigestMismatch { stored: String, computed: String },

    /// `previous_digest` does not point at the prior block's digest.
    #[error("broken chain link: expected previous digest {expected}, got {actual}")]
    BrokenLink { expected: String, actual: String },

    /// The digest does not carry the difficulty prefix mandated at this height.
    #[error("invalid proof-of-work: digest does not start with {required:?}")]
    InsufficientWork { required: String },

    /// The Merkle root stored in the block disagrees with its records.
    #[error("invalid merkle root: stored={stored:?}, computed={computed:?}")]
    MerkleRootMismatch {
        stored: Option<String>,
        computed: Option<String>,
    },

    /// The instructor field is mandatory at this height but was left blank.
    #[error("instructor is required from the soft fork on (record {record})")]
    MissingInstructor { record: usize },

    /// A block must carry at least one record.
    #[error("block has no records")]
    EmptyBlock,

    /// The version tag disagrees with the one the fork policy derives from
    /// the block's height.
    #[error("wrong protocol version: expected {expected} at this height, found {found}")]
    VersionMismatch {
        expected: ProtocolVersion,
        found: ProtocolVersion,
    },

    /// Heights must increase by exactly one.
    #[error("height gap: expected {expected}, found {found}")]
    HeightGap { expected: u64, found: u64 },

    /// A snapshot without a genesis block cannot be turned into a chain.
    #[error("chain has no blocks (missing genesis)")]
    MissingGenesis,
}

/// Top-level error for every ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A block failed a consensus check.
    #[error("block {height}: {failure}")]
    Validation {
        height: u64,
        failure: ValidationFailure,
    },

    /// A named chain failed validation while being compared or resolved.
    #[error("chain '{chain}' validation failed: {source}")]
    ChainInvalid {
        chain: String,
        #[source]
        source: Box<LedgerError>,
    },

    /// Unknown chain, absent snapshot, or out-of-range block/record index.
    #[error("not found: {0}")]
    NotFound(String),

    /// Chains cannot be reconciled, or a name is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed or inconsistent fork configuration.
    #[error("invalid fork configuration: {0}")]
    Config(String),

    /// Failure reported by the persistence collaborator.
    #[error("storage error: {0}")]
    Storage(String),

    /// The mining budget ran out before a satisfying nonce was found.
    #[error("mining block {height} timed out after {attempts} attempts ({elapsed:?})")]
    MiningTimeout {
        height: u64,
        attempts: u64,
        elapsed: Duration,
    },
}

impl LedgerError {
    /// Shorthand for a [`LedgerError::Validation`] at `height`.
    pub fn validation(height: u64, failure: ValidationFailure) -> Self {
        Self::Validation { height, failure }
    }

    /// Height of the first failing block, if this is a validation error.
    pub fn failing_height(&self) -> Option<u64> {
        match self {
            Self::Validation { height, .. } => Some(*height),
            Self::ChainInvalid { source, .. } => source.failing_height(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("serialization: {e}"))
    }
}
