//! # Snapshot Persistence
//!
//! The core never touches the filesystem on its own. Chains and the fork
//! registry go through a [`ChainStore`], called before and after core
//! operations and never while mining.
//!
//! | Backend         | Chains                       | Registry                  |
//! |-----------------|------------------------------|---------------------------|
//! | `JsonFileStore` | `<root>/<location>` (JSON)   | `<root>/fork_config.json` |
//! | `MemoryStore`   | `HashMap<location, snapshot>`| `Option<ForkRegistry>`    |
//!
//! A chain's *location* is the opaque storage handle recorded in its
//! registry entry (`blockchain_<name>.json` by default).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::REGISTRY_FILE;
use crate::error::Result;
use crate::fork::registry::ForkRegistry;
use crate::storage::chain::ChainSnapshot;

/// Persistence collaborator for chain snapshots and the fork registry.
pub trait ChainStore {
    /// Load the snapshot at `location`, or `None` if nothing is stored there.
    fn load_chain(&self, location: &str) -> Result<Option<ChainSnapshot>>;

    /// Store `snapshot` at `location`, replacing what was there.
    fn save_chain(&self, location: &str, snapshot: &ChainSnapshot) -> Result<()>;

    /// Load the fork registry, or `None` if it was never saved.
    fn load_registry(&self) -> Result<Option<ForkRegistry>>;

    fn save_registry(&self, registry: &ForkRegistry) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Pretty-printed JSON files under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Use `root` as the data directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a storage location.
    pub fn path_of(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write through a sibling temp file and rename, so a crash mid-write
    /// never leaves a truncated snapshot behind.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "snapshot written");
        Ok(())
    }
}

impl ChainStore for JsonFileStore {
    fn load_chain(&self, location: &str) -> Result<Option<ChainSnapshot>> {
        self.read_json(&self.path_of(location))
    }

    fn save_chain(&self, location: &str, snapshot: &ChainSnapshot) -> Result<()> {
        self.write_json(&self.path_of(location), snapshot)
    }

    fn load_registry(&self) -> Result<Option<ForkRegistry>> {
        self.read_json(&self.path_of(REGISTRY_FILE))
    }

    fn save_registry(&self, registry: &ForkRegistry) -> Result<()> {
        self.write_json(&self.path_of(REGISTRY_FILE), registry)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chains: Mutex<HashMap<String, ChainSnapshot>>,
    registry: Mutex<Option<ForkRegistry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chain snapshots.
    pub fn chain_count(&self) -> usize {
        self.chains.lock().len()
    }
}

impl ChainStore for MemoryStore {
    fn load_chain(&self, location: &str) -> Result<Option<ChainSnapshot>> {
        Ok(self.chains.lock().get(location).cloned())
    }

    fn save_chain(&self, location: &str, snapshot: &ChainSnapshot) -> Result<()> {
        self.chains
            .lock()
            .insert(location.to_string(), snapshot.clone());
        Ok(())
    }

    fn load_registry(&self) -> Result<Option<ForkRegistry>> {
        Ok(self.registry.lock().clone())
    }

    fn save_registry(&self, registry: &ForkRegistry) -> Result<()> {
        *self.registry.lock() = Some(registry.clone());
        Ok(())
    }
}
