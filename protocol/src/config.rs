//! # Protocol Configuration & Constants
//!
//! Every magic number in GradeChain lives here: default fork heights, the
//! difficulty prefixes, the genesis record and the file naming convention
//! used by the JSON store.
//!
//! The fork configuration is captured once, when a chain's genesis block is
//! mined, and travels with every snapshot of that chain afterwards. Changing
//! the defaults below never rewrites the rules of an existing chain.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

// ---------------------------------------------------------------------------
// Fork Defaults
// ---------------------------------------------------------------------------

/// Height at which the soft fork activates: difficulty goes up and the
/// instructor field becomes mandatory.
pub const DEFAULT_SOFT_FORK_HEIGHT: u64 = 5;

/// Height at which the hard fork activates: the block digest switches from
/// SHA-384 to SHA-512. Blocks mined before it stay valid under SHA-384.
pub const DEFAULT_HARD_FORK_HEIGHT: u64 = 10;

/// Difficulty prefix before the soft fork.
pub const DEFAULT_DIFFICULTY_OLD: &str = "00";

/// Difficulty prefix from the soft fork on.
pub const DEFAULT_DIFFICULTY_NEW: &str = "000";

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Placeholder value for every text field of the genesis record.
pub const GENESIS_LABEL: &str = "GENESIS";

/// Record-book number of the genesis record.
pub const GENESIS_RECORD_BOOK: &str = "000000";

/// `previous_digest` of the genesis block. There is nothing before it.
pub const GENESIS_PREVIOUS_DIGEST: &str = "0";

// ---------------------------------------------------------------------------
// Mining
// ---------------------------------------------------------------------------

/// Default cap on nonce attempts per block.
///
/// Expected attempts for a prefix of length k are 16^k, so this covers
/// prefixes up to six hex characters with a wide margin and turns anything
/// harder into a `MiningTimeout` instead of a hung process.
pub const DEFAULT_MAX_MINING_ATTEMPTS: u64 = 50_000_000;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// File name of the fork registry inside a data directory.
pub const REGISTRY_FILE: &str = "fork_config.json";

/// Name of the chain used when the caller does not pick one.
pub const DEFAULT_CHAIN_NAME: &str = "main";

/// Storage location assigned to a newly registered or forked chain.
pub fn chain_file_name(chain: &str) -> String {
    format!("blockchain_{chain}.json")
}

// ---------------------------------------------------------------------------
// ForkPolicyConfig
// ---------------------------------------------------------------------------

/// Consensus parameters that change at configured heights.
///
/// Invariant: `0 < soft_fork_height < hard_fork_height`, and both difficulty
/// prefixes are made of lowercase hex characters (otherwise no digest could
/// ever satisfy them).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkPolicyConfig {
    pub soft_fork_height: u64,
    pub hard_fork_height: u64,
    pub difficulty_old: String,
    pub difficulty_new: String,
}

impl Default for ForkPolicyConfig {
    fn default() -> Self {
        Self {
            soft_fork_height: DEFAULT_SOFT_FORK_HEIGHT,
            hard_fork_height: DEFAULT_HARD_FORK_HEIGHT,
            difficulty_old: DEFAULT_DIFFICULTY_OLD.to_string(),
            difficulty_new: DEFAULT_DIFFICULTY_NEW.to_string(),
        }
    }
}

impl ForkPolicyConfig {
    /// Check the height ordering and the difficulty alphabets.
    pub fn validate(&self) -> Result<()> {
        if self.soft_fork_height == 0 {
            return Err(LedgerError::Config(
                "soft fork height must be greater than 0".to_string(),
            ));
        }
        if self.soft_fork_height >= self.hard_fork_height {
            return Err(LedgerError::Config(format!(
                "soft fork height ({}) must be below hard fork height ({})",
                self.soft_fork_height, self.hard_fork_height
            )));
        }
        for (label, prefix) in [
            ("old", &self.difficulty_old),
            ("new", &self.difficulty_new),
        ] {
            if !is_hex_prefix(prefix) {
                return Err(LedgerError::Config(format!(
                    "{label} difficulty {prefix:?} must contain only lowercase hex characters"
                )));
            }
        }
        Ok(())
    }
}

fn is_hex_prefix(prefix: &str) -> bool {
    prefix
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
