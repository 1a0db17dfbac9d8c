//! # Consensus Rules
//!
//! - **policy** — height → {version, difficulty, digest algorithm, required fields}.
//! - **miner** — bounded proof-of-work nonce search.

pub mod miner;
pub mod policy;

pub use miner::{Miner, MiningBudget};
pub use policy::{ConsensusRules, ForkActivation, ForkPolicy, ForkStatus, ProtocolVersion};
