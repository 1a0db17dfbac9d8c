//! # Fork Policy
//!
//! Maps a block height to the consensus rules in force at that height.
//! Everything here is a pure function of `(height, config)`:
//!
//! | Height range              | Version  | Difficulty       | Digest  | Instructor |
//! |---------------------------|----------|------------------|---------|------------|
//! | `h < soft`                | Original | `difficulty_old` | SHA-384 | optional   |
//! | `soft <= h < hard`        | Soft     | `difficulty_new` | SHA-384 | required   |
//! | `h >= hard`               | Hard     | `difficulty_new` | SHA-512 | required   |
//!
//! Versions only ever move forward along height: once a chain passes a fork
//! height there is no way back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ForkPolicyConfig;
use crate::crypto::hash::DigestAlgorithm;
use crate::error::Result;

/// Protocol generation derived from height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    Original,
    Soft,
    Hard,
}

impl ProtocolVersion {
    pub fn name(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Soft => "soft-fork",
            Self::Hard => "hard-fork",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which optional record fields are mandatory at a height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldRequirement {
    pub instructor: bool,
}

/// Everything the chain needs to know to build or check a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusRules {
    pub version: ProtocolVersion,
    pub difficulty: String,
    pub algorithm: DigestAlgorithm,
    pub fields: FieldRequirement,
}

/// Activation state of one fork, relative to the next block to be mined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkActivation {
    Active { since: u64 },
    Pending { at: u64, blocks_remaining: u64 },
}

/// Soft- and hard-fork activation for the next block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkStatus {
    pub next_height: u64,
    pub soft: ForkActivation,
    pub hard: ForkActivation,
}

/// Height-indexed consensus rules for one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkPolicy {
    config: ForkPolicyConfig,
}

impl ForkPolicy {
    /// Wrap a configuration after checking its invariants.
    pub fn new(config: ForkPolicyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ForkPolicyConfig {
        &self.config
    }

    pub fn protocol_version(&self, height: u64) -> ProtocolVersion {
        if height >= self.config.hard_fork_height {
            ProtocolVersion::Hard
        } else if height >= self.config.soft_fork_height {
            ProtocolVersion::Soft
        } else {
            ProtocolVersion::Original
        }
    }

    /// Required digest prefix at `height`.
    pub fn difficulty(&self, height: u64) -> &str {
        match self.protocol_version(height) {
            ProtocolVersion::Original => &self.config.difficulty_old,
            ProtocolVersion::Soft | ProtocolVersion::Hard => &self.config.difficulty_new,
        }
    }

    pub fn digest_algorithm(&self, height: u64) -> DigestAlgorithm {
        match self.protocol_version(height) {
            ProtocolVersion::Original | ProtocolVersion::Soft => DigestAlgorithm::Sha384,
            ProtocolVersion::Hard => DigestAlgorithm::Sha512,
        }
    }

    pub fn field_requirement(&self, height: u64) -> FieldRequirement {
        FieldRequirement {
            instructor: self.protocol_version(height) != ProtocolVersion::Original,
        }
    }

    /// All rules for `height` at once.
    pub fn rules(&self, height: u64) -> ConsensusRules {
        ConsensusRules {
            version: self.protocol_version(height),
            difficulty: self.difficulty(height).to_string(),
            algorithm: self.digest_algorithm(height),
            fields: self.field_requirement(height),
        }
    }

    /// Where the forks stand for a chain whose next block is `next_height`.
    pub fn status(&self, next_height: u64) -> ForkStatus {
        let activation = |at: u64| {
            if next_height >= at {
                ForkActivation::Active { since: at }
            } else {
                ForkActivation::Pending {
                    at,
                    blocks_remaining: at - next_height,
                }
            }
        };
        ForkStatus {
            next_height,
            soft: activation(self.config.soft_fork_height),
            hard: activation(self.config.hard_fork_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    fn policy() -> ForkPolicy {
        ForkPolicy::new(ForkPolicyConfig {
            soft_fork_height: 5,
            hard_fork_height: 10,
            difficulty_old: "00".into(),
            difficulty_new: "000".into(),
        })
        .unwrap()
    }

    #[test]
    fn threshold_heights() {
        let p = policy();

        assert_eq!(p.protocol_version(4), ProtocolVersion::Original);
        assert_eq!(p.difficulty(4), "00");
        assert_eq!(p.digest_algorithm(4), DigestAlgorithm::Sha384);

        assert_eq!(p.protocol_version(5), ProtocolVersion::Soft);
        assert_eq!(p.difficulty(5), "000");
        assert_eq!(p.digest_algorithm(5), DigestAlgorithm::Sha384);

        assert_eq!(p.protocol_version(9), ProtocolVersion::Soft);
        assert_eq!(p.digest_algorithm(9), DigestAlgorithm::Sha384);

        assert_eq!(p.protocol_version(10), ProtocolVersion::Hard);
        assert_eq!(p.difficulty(10), "000");
        assert_eq!(p.digest_algorithm(10), DigestAlgorithm::Sha512);
    }

    #[test]
    fn version_is_monotonic_in_height() {
        let p = policy();
        let versions: Vec<ProtocolVersion> = (0..20).map(|h| p.protocol_version(h)).collect();
        assert!(versions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn instructor_required_from_soft_fork() {
        let p = policy();
        assert!(!p.field_requirement(0).instructor);
        assert!(!p.field_requirement(4).instructor);
        assert!(p.field_requirement(5).instructor);
        assert!(p.field_requirement(42).instructor);
    }

    #[test]
    fn rules_bundle_matches_individual_lookups() {
        let p = policy();
        let rules = p.rules(10);
        assert_eq!(rules.version, ProtocolVersion::Hard);
        assert_eq!(rules.difficulty, "000");
        assert_eq!(rules.algorithm, DigestAlgorithm::Sha512);
        assert!(rules.fields.instructor);
    }

    #[test]
    fn status_counts_down_to_activation() {
        let p = policy();
        let status = p.status(3);
        assert_eq!(status.soft, ForkActivation::Pending { at: 5, blocks_remaining: 2 });
        assert_eq!(status.hard, ForkActivation::Pending { at: 10, blocks_remaining: 7 });

        let status = p.status(10);
        assert_eq!(status.soft, ForkActivation::Active { since: 5 });
        assert_eq!(status.hard, ForkActivation::Active { since: 10 });
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = ForkPolicy::new(ForkPolicyConfig {
            soft_fork_height: 8,
            hard_fork_height: 3,
            ..ForkPolicyConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
