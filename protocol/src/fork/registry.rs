//! # Fork Registry
//!
//! Maps chain names to their storage location and lineage. A chain without
//! a parent is an *original*; a chain created by [`ForkRegistry::fork`]
//! records where it came from and the height it branched at.
//!
//! ```text
//! main ──●──●──●──●           fork_point(branch_a) = 1
//!           └──●──●  branch_a
//! ```
//!
//! The registry itself is plain data; it is loaded from and saved to a
//! [`ChainStore`] by the caller.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{chain_file_name, ForkPolicyConfig};
use crate::consensus::miner::MiningBudget;
use crate::error::{LedgerError, Result};
use crate::storage::chain::Chain;
use crate::storage::store::ChainStore;

/// Registry entry for one named chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Storage location handed to the [`ChainStore`].
    pub file: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Parent chain, if this chain is a fork.
    pub fork_from: Option<String>,
    /// Parent's highest height at the time of the fork.
    pub fork_point: Option<u64>,
}

impl ChainEntry {
    pub fn is_original(&self) -> bool {
        self.fork_from.is_none()
    }
}

/// Named chains and their parent/fork-point relationships.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkRegistry {
    #[serde(default)]
    chains: BTreeMap<String, ChainEntry>,
}

impl ForkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry from `store`, or start an empty one.
    pub fn load(store: &impl ChainStore) -> Result<Self> {
        Ok(store.load_registry()?.unwrap_or_default())
    }

    pub fn save(&self, store: &impl ChainStore) -> Result<()> {
        store.save_registry(self)
    }

    /// Register an original chain. No-op if the name is already taken.
    /// Returns `true` if a new entry was created.
    pub fn register(&mut self, name: &str) -> bool {
        if self.chains.contains_key(name) {
            return false;
        }
        self.chains.insert(
            name.to_string(),
            ChainEntry {
                file: chain_file_name(name),
                created_at: Utc::now().timestamp(),
                fork_from: None,
                fork_point: None,
            },
        );
        info!(chain = name, "chain registered");
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&ChainEntry> {
        self.chains
            .get(name)
            .ok_or_else(|| LedgerError::NotFound(format!("chain '{name}' not found in registry")))
    }

    /// All entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ChainEntry)> {
        self.chains.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn location(&self, name: &str) -> Result<&str> {
        Ok(self.get(name)?.file.as_str())
    }

    /// Point `name` at a different storage location.
    pub fn set_location(&mut self, name: &str, location: impl Into<String>) -> Result<()> {
        let entry = self
            .chains
            .get_mut(name)
            .ok_or_else(|| LedgerError::NotFound(format!("chain '{name}' not found in registry")))?;
        entry.file = location.into();
        Ok(())
    }

    /// Branch `target` off the current persisted state of `source`.
    ///
    /// The source snapshot is copied to the target's own location; the
    /// fork point is the source's highest height at this moment.
    pub fn fork(
        &mut self,
        store: &impl ChainStore,
        source: &str,
        target: &str,
    ) -> Result<&ChainEntry> {
        let source_location = self.location(source)?.to_string();
        if self.contains(target) {
            return Err(LedgerError::Conflict(format!(
                "target chain '{target}' already exists"
            )));
        }

        let snapshot = store.load_chain(&source_location)?.ok_or_else(|| {
            LedgerError::NotFound(format!("source chain '{source}' has no stored snapshot"))
        })?;
        let fork_point = snapshot
            .blocks
            .last()
            .map(|block| block.height)
            .ok_or_else(|| LedgerError::NotFound(format!("source chain '{source}' is empty")))?;

        let target_location = chain_file_name(target);
        store.save_chain(&target_location, &snapshot)?;

        self.chains.insert(
            target.to_string(),
            ChainEntry {
                file: target_location,
                created_at: Utc::now().timestamp(),
                fork_from: Some(source.to_string()),
                fork_point: Some(fork_point),
            },
        );
        info!(source, target, fork_point, "chain forked");
        self.get(target)
    }

    /// Load the chain registered as `name`.
    pub fn load_chain(&self, store: &impl ChainStore, name: &str) -> Result<Chain> {
        let location = self.location(name)?;
        let snapshot = store.load_chain(location)?.ok_or_else(|| {
            LedgerError::NotFound(format!("chain '{name}' has no stored snapshot"))
        })?;
        Chain::from_snapshot(snapshot)
    }

    /// Register `name` if needed and load it, mining and persisting a fresh
    /// genesis under `config` when nothing is stored yet. An existing chain
    /// keeps the fork configuration it was created with.
    pub fn open_or_create(
        &mut self,
        store: &impl ChainStore,
        name: &str,
        config: ForkPolicyConfig,
        budget: MiningBudget,
    ) -> Result<Chain> {
        self.register(name);
        let location = self.location(name)?.to_string();
        let mut chain = match store.load_chain(&location)? {
            Some(snapshot) => Chain::from_snapshot(snapshot)?,
            None => {
                let chain = Chain::with_budget(config, budget)?;
                store.save_chain(&location, &chain.snapshot())?;
                info!(chain = name, "genesis created");
                chain
            }
        };
        chain.set_budget(budget);
        Ok(chain)
    }

    /// Persist `chain` at the location registered for `name`.
    pub fn save_chain(&self, store: &impl ChainStore, name: &str, chain: &Chain) -> Result<()> {
        store.save_chain(self.location(name)?, &chain.snapshot())
    }
}

/// Highest height at which both chains still carry the same digest.
///
/// Scans from genesis and stops at the first disagreement. `None` means the
/// genesis blocks differ: the chains share no history at all.
pub fn find_common_ancestor(a: &Chain, b: &Chain) -> Option<u64> {
    a.blocks()
        .iter()
        .zip(b.blocks())
        .take_while(|(x, y)| x.digest == y.digest)
        .last()
        .map(|(x, _)| x.height)
}
