//! # Proof-of-Work Miner
//!
//! Brute-force nonce search: starting from 0, increment the nonce until the
//! block digest begins with the difficulty prefix. The first satisfying
//! nonce is always the smallest one, so mining the same block twice yields
//! the same nonce and digest.
//!
//! Expected work for a prefix of k hex characters is 16^k digests. The
//! search is bounded by a [`MiningBudget`]; running out of budget yields
//! [`LedgerError::MiningTimeout`] and the block is discarded.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::DEFAULT_MAX_MINING_ATTEMPTS;
use crate::crypto::hash::DigestAlgorithm;
use crate::error::{LedgerError, Result};
use crate::storage::block::Block;

/// How often (in attempts) the wall clock is consulted.
const CLOCK_CHECK_INTERVAL: u64 = 4_096;

/// Upper bound on the work spent mining one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MiningBudget {
    /// Maximum number of digests to try. `None` = unbounded.
    pub max_attempts: Option<u64>,
    /// Maximum wall-clock time. `None` = unbounded.
    pub timeout: Option<Duration>,
}

impl Default for MiningBudget {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_MINING_ATTEMPTS),
            timeout: None,
        }
    }
}

impl MiningBudget {
    /// No limit at all. Only sensible for tiny difficulties.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            timeout: None,
        }
    }

    pub fn attempts(max_attempts: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Proof-of-work searcher.
#[derive(Clone, Copy, Debug, Default)]
pub struct Miner {
    budget: MiningBudget,
}

impl Miner {
    pub fn new(budget: MiningBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> MiningBudget {
        self.budget
    }

    /// Find the smallest nonce whose digest starts with `difficulty`.
    ///
    /// Returns the sealed block and the time spent searching.
    pub fn mine(
        &self,
        mut block: Block,
        difficulty: &str,
        algorithm: DigestAlgorithm,
    ) -> Result<(Block, Duration)> {
        let start = Instant::now();
        let mut preimage = block.preimage_without_nonce();
        let base_len = preimage.len();
        let mut nonce: u64 = 0;

        loop {
            if let Some(max) = self.budget.max_attempts {
                if nonce >= max {
                    return Err(self.timed_out(block.height, nonce, start.elapsed()));
                }
            }
            if nonce % CLOCK_CHECK_INTERVAL == 0 && nonce > 0 {
                if let Some(timeout) = self.budget.timeout {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        return Err(self.timed_out(block.height, nonce, elapsed));
                    }
                }
            }

            preimage.truncate(base_len);
            preimage.extend_from_slice(&nonce.to_le_bytes());
            let digest = algorithm.digest_hex(&preimage);

            if digest.starts_with(difficulty) {
                let elapsed = start.elapsed();
                block.nonce = nonce;
                block.digest = digest;
                debug!(
                    height = block.height,
                    nonce,
                    algorithm = %algorithm,
                    difficulty,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "block mined"
                );
                return Ok((block, elapsed));
            }

            // The nonce space is u64; wrapping would repeat earlier digests.
            nonce = match nonce.checked_add(1) {
                Some(next) => next,
                None => return Err(self.timed_out(block.height, nonce, start.elapsed())),
            };
        }
    }

    fn timed_out(&self, height: u64, attempts: u64, elapsed: Duration) -> LedgerError {
        warn!(height, attempts, elapsed_ms = elapsed.as_millis() as u64, "mining budget exhausted");
        LedgerError::MiningTimeout {
            height,
            attempts,
            elapsed,
        }
    }
}
