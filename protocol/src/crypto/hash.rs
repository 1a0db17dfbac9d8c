//! # Hashing Utilities
//!
//! Every digest in GradeChain is a member of the SHA-2 family, encoded as
//! lowercase hex so that proof-of-work can be checked as a textual prefix:
//!
//! - **SHA-384** — block digests before the hard fork (48 bytes, 96 hex chars).
//! - **SHA-512** — block digests from the hard fork on (64 bytes, 128 hex chars).
//! - **SHA-256** — Merkle leaves and inner nodes, at every height.
//!
//! Which block digest applies is never stored on a block; it is derived from
//! the height by the fork policy and handed in as a [`DigestAlgorithm`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Block digest algorithm selected by height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// Pre-hard-fork digest.
    Sha384,
    /// Post-hard-fork digest.
    Sha512,
}

impl DigestAlgorithm {
    /// Hash `data` and return the lowercase hex digest.
    pub fn digest_hex(self, data: &[u8]) -> String {
        match self {
            Self::Sha384 => sha384_hex(data),
            Self::Sha512 => sha512_hex(data),
        }
    }

    /// Raw digest width in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Width of the hex encoding.
    pub fn hex_len(self) -> usize {
        self.output_len() * 2
    }

    /// Display name used in logs and terminal output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use gradechain_protocol::crypto::sha256;
///
/// let hash = sha256(b"grade record");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// SHA-256 as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// SHA-384 as lowercase hex (96 characters).
pub fn sha384_hex(data: &[u8]) -> String {
    let mut hasher = Sha384::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-512 as lowercase hex (128 characters).
pub fn sha512_hex(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash several byte slices as if they were concatenated.
///
/// Feeds each part into the hasher in turn instead of allocating a joined
/// buffer. Used for Merkle inner nodes: `SHA-256(left_hex || right_hex)`.
pub fn sha256_hex_multi(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
