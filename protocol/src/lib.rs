// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # GradeChain — Core Library
//!
//! A proof-of-work ledger for academic grade records. Every block carries
//! one or more records, commits to them with a Merkle root when there are
//! several, and links to its predecessor by digest. The consensus rules
//! change at two configured heights:
//!
//! | Heights            | Version  | Difficulty      | Block digest | Instructor |
//! |--------------------|----------|-----------------|--------------|------------|
//! | `< soft`           | Original | `difficulty_old`| SHA-384      | optional   |
//! | `soft ..< hard`    | Soft     | `difficulty_new`| SHA-384      | required   |
//! | `>= hard`          | Hard     | `difficulty_new`| SHA-512      | required   |
//!
//! ## Architecture
//!
//! - **crypto** — SHA-2 digests and the Merkle tree over record leaves.
//! - **consensus** — height-indexed fork policy and the bounded miner.
//! - **storage** — records, blocks, chains and the snapshot store seam.
//! - **fork** — the named-chain registry and the fork resolver.
//! - **config** — protocol constants and the fork configuration.
//! - **error** — `LedgerError`, the one error type of the crate.
//!
//! ## Example
//!
//! ```no_run
//! use gradechain_protocol::{Chain, ForkPolicyConfig, Record};
//!
//! let mut chain = Chain::new(ForkPolicyConfig::default())?;
//! chain.append(vec![Record::new("Ada Lovelace", "RB-001", "CS-1", "Analysis", 1, 5)])?;
//! chain.validate()?;
//! # Ok::<(), gradechain_protocol::LedgerError>(())
//! ```

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod fork;
pub mod storage;

pub use config::ForkPolicyConfig;
pub use consensus::{ForkPolicy, Miner, MiningBudget, ProtocolVersion};
pub use crypto::{MerkleProof, MerkleTree};
pub use error::{LedgerError, Result, ValidationFailure};
pub use fork::{ForkRegistry, Resolution, Resolver};
pub use storage::{Block, Chain, ChainSnapshot, ChainStore, JsonFileStore, MemoryStore, Record};
