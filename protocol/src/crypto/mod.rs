//! # Cryptographic Primitives for GradeChain
//!
//! Hashing only: there are no keys, signatures or encryption in a
//! single-writer grade ledger. Two things live here:
//!
//! - **hash** — SHA-2 helpers and the height-selected [`DigestAlgorithm`].
//! - **merkle** — the record Merkle tree with inclusion proofs.

pub mod hash;
pub mod merkle;

pub use hash::{sha256, sha256_hex, sha384_hex, sha512_hex, DigestAlgorithm};
pub use merkle::{merkle_root, verify_proof, MerkleProof, MerkleTree};
