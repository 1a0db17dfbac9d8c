//! # Storage Module
//!
//! The ledger's data model and its persistence seam.
//!
//! ## Architecture
//!
//! ```text
//! record.rs  — Grade record, canonical encoding, leaf hash
//! block.rs   — Block structure, digest preimage, Merkle commitment check
//! chain.rs   — Append / validate / search over an ordered block sequence
//! store.rs   — ChainStore trait with JSON-file and in-memory backends
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Record → Chain::append → Block (mined) → ChainSnapshot → ChainStore
//! ```

pub mod block;
pub mod chain;
pub mod record;
pub mod store;

pub use block::Block;
pub use chain::{Chain, ChainSnapshot, ChainStats};
pub use record::Record;
pub use store::{ChainStore, JsonFileStore, MemoryStore};
