//! # Block Structure
//!
//! A block is the unit of append: an ordered batch of grade records sealed
//! by proof-of-work and linked to its parent by digest.
//!
//! ## Block Layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  height: u64            (genesis = 0)         │
//! │  timestamp: i64         (Unix seconds)        │
//! │  protocol_version       (derived from height) │
//! │  records: Vec<Record>   (ordered, >= 1)       │
//! │  merkle_root: Option    (only if > 1 record)  │
//! │  previous_digest: hex                         │
//! │  nonce: u64             (found by mining)     │
//! │  digest: hex            (SHA-384 or SHA-512)  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Digest Computation
//!
//! The digest covers `height || timestamp || version || body ||
//! previous_digest || nonce`, where `body` is the Merkle root for
//! multi-record blocks and the flattened records otherwise. The nonce comes
//! last so the miner can reuse the rest of the preimage between attempts.

use serde::{Deserialize, Serialize};

use crate::consensus::policy::ProtocolVersion;
use crate::crypto::hash::DigestAlgorithm;
use crate::crypto::merkle::merkle_root;
use crate::error::ValidationFailure;
use crate::storage::record::{put_str, Record};

/// A sealed (or about-to-be-mined) block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: i64,
    pub records: Vec<Record>,
    pub previous_digest: String,
    /// Empty until the block has been mined.
    pub digest: String,
    pub nonce: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    pub protocol_version: ProtocolVersion,
}

impl Block {
    /// Assemble an unmined block. The Merkle root is computed here when the
    /// block carries more than one record.
    pub fn unmined(
        height: u64,
        timestamp: i64,
        records: Vec<Record>,
        previous_digest: impl Into<String>,
        protocol_version: ProtocolVersion,
    ) -> Self {
        let merkle_root = if records.len() > 1 {
            merkle_root(&records)
        } else {
            None
        };
        Self {
            height,
            timestamp,
            records,
            previous_digest: previous_digest.into(),
            digest: String::new(),
            nonce: 0,
            merkle_root,
            protocol_version,
        }
    }

    /// Everything the digest covers except the nonce.
    pub fn preimage_without_nonce(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.push(self.protocol_version as u8);
        match &self.merkle_root {
            Some(root) => {
                buf.push(1);
                put_str(&mut buf, root);
            }
            None => {
                buf.push(0);
                buf.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
                for record in &self.records {
                    record.write_canonical(&mut buf);
                }
            }
        }
        put_str(&mut buf, &self.previous_digest);
        buf
    }

    /// Recompute the digest with the given algorithm.
    pub fn compute_digest(&self, algorithm: DigestAlgorithm) -> String {
        let mut preimage = self.preimage_without_nonce();
        preimage.extend_from_slice(&self.nonce.to_le_bytes());
        algorithm.digest_hex(&preimage)
    }

    /// Check the Merkle commitment: multi-record blocks must carry the root
    /// of their records, single-record blocks must carry none.
    pub fn check_merkle_root(&self) -> Result<(), ValidationFailure> {
        let expected = if self.records.len() > 1 {
            merkle_root(&self.records)
        } else {
            None
        };
        if self.merkle_root == expected {
            Ok(())
        } else {
            Err(ValidationFailure::MerkleRootMismatch {
                stored: self.merkle_root.clone(),
                computed: expected,
            })
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// First `len` characters of the digest, for display.
    pub fn short_digest(&self, len: usize) -> &str {
        &self.digest[..self.digest.len().min(len)]
    }
}
