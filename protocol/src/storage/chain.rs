//! # Chain
//!
//! An append-only sequence of blocks together with the fork policy captured
//! at genesis. The chain is the only component that mutates its blocks:
//! [`Chain::append`] checks the records against the policy, commits to them
//! with a Merkle root when there are several, mines the block and pushes
//! it. Nothing ever edits a block after that.
//!
//! [`Chain::validate`] replays every consensus check from height 1 upward
//! and stops at the first failure, reporting its height.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ForkPolicyConfig, GENESIS_PREVIOUS_DIGEST};
use crate::consensus::miner::{Miner, MiningBudget};
use crate::consensus::policy::{ForkPolicy, ProtocolVersion};
use crate::crypto::merkle::MerkleTree;
use crate::error::{LedgerError, Result, ValidationFailure};
use crate::storage::block::Block;
use crate::storage::record::Record;

/// Everything needed to rebuild a chain without re-mining it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub config: ForkPolicyConfig,
    pub blocks: Vec<Block>,
}

/// Aggregate counts over the non-genesis records of a chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainStats {
    pub total_blocks: usize,
    pub total_records: usize,
    pub by_grade: BTreeMap<u8, usize>,
    pub by_course: BTreeMap<u32, usize>,
    pub by_version: BTreeMap<ProtocolVersion, usize>,
}

/// Ordered, validated chain of blocks.
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    policy: ForkPolicy,
    miner: Miner,
}

impl Chain {
    /// Create a chain and mine its genesis block under the default budget.
    pub fn new(config: ForkPolicyConfig) -> Result<Self> {
        Self::with_budget(config, MiningBudget::default())
    }

    /// Create a chain with an explicit mining budget.
    pub fn with_budget(config: ForkPolicyConfig, budget: MiningBudget) -> Result<Self> {
        let policy = ForkPolicy::new(config)?;
        let miner = Miner::new(budget);

        let genesis = Block::unmined(
            0,
            Utc::now().timestamp(),
            vec![Record::genesis()],
            GENESIS_PREVIOUS_DIGEST,
            policy.protocol_version(0),
        );
        let (genesis, _) = miner.mine(genesis, policy.difficulty(0), policy.digest_algorithm(0))?;
        debug!(digest = %genesis.digest, "genesis block mined");

        Ok(Self {
            blocks: vec![genesis],
            policy,
            miner,
        })
    }

    /// Rebuild a chain from a persisted snapshot. Blocks are taken as-is;
    /// call [`Chain::validate`] to check them.
    pub fn from_snapshot(snapshot: ChainSnapshot) -> Result<Self> {
        if snapshot.blocks.is_empty() {
            return Err(LedgerError::validation(0, ValidationFailure::MissingGenesis));
        }
        Ok(Self {
            blocks: snapshot.blocks,
            policy: ForkPolicy::new(snapshot.config)?,
            miner: Miner::default(),
        })
    }

    /// Replace the mining budget used by subsequent appends.
    pub fn set_budget(&mut self, budget: MiningBudget) {
        self.miner = Miner::new(budget);
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            config: self.policy.config().clone(),
            blocks: self.blocks.clone(),
        }
    }

    pub fn into_snapshot(self) -> ChainSnapshot {
        ChainSnapshot {
            config: self.policy.config().clone(),
            blocks: self.blocks,
        }
    }

    pub fn policy(&self) -> &ForkPolicy {
        &self.policy
    }

    pub fn config(&self) -> &ForkPolicyConfig {
        self.policy.config()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always `false` for a constructed chain; genesis is mandatory.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The most recent block.
    pub fn tip(&self) -> Result<&Block> {
        self.blocks
            .last()
            .ok_or_else(|| LedgerError::validation(0, ValidationFailure::MissingGenesis))
    }

    /// Height the next appended block will get.
    pub fn next_height(&self) -> Result<u64> {
        Ok(self.tip()?.height + 1)
    }

    /// Block at `height`.
    pub fn block(&self, height: u64) -> Result<&Block> {
        usize::try_from(height)
            .ok()
            .and_then(|i| self.blocks.get(i))
            .ok_or_else(|| {
                LedgerError::NotFound(format!(
                    "block {height} out of range (chain has {} blocks)",
                    self.blocks.len()
                ))
            })
    }

    /// Record `index` of the block at `height`.
    pub fn record(&self, height: u64, index: usize) -> Result<&Record> {
        let block = self.block(height)?;
        block.records.get(index).ok_or_else(|| {
            LedgerError::NotFound(format!(
                "record index {index} out of range for block {height} ({} records)",
                block.records.len()
            ))
        })
    }

    /// Rebuild the Merkle tree over the records of the block at `height`.
    pub fn merkle_tree(&self, height: u64) -> Result<MerkleTree> {
        let block = self.block(height)?;
        MerkleTree::build(&block.records)
            .ok_or_else(|| LedgerError::NotFound(format!("block {height} has no records")))
    }

    /// Mine a new block carrying `records` and append it.
    ///
    /// Records without an identifier get a fresh UUID. Fails without
    /// touching the chain if the batch is empty, a mandated field is
    /// missing, or the mining budget runs out.
    pub fn append(&mut self, mut records: Vec<Record>) -> Result<(&Block, Duration)> {
        let height = self.next_height()?;
        if records.is_empty() {
            return Err(LedgerError::validation(height, ValidationFailure::EmptyBlock));
        }

        for record in &mut records {
            record.ensure_id();
        }

        let rules = self.policy.rules(height);
        if rules.fields.instructor {
            if let Some(index) = records.iter().position(|r| !r.has_instructor()) {
                return Err(LedgerError::validation(
                    height,
                    ValidationFailure::MissingInstructor { record: index },
                ));
            }
        }

        let previous_digest = self.tip()?.digest.clone();
        let block = Block::unmined(
            height,
            Utc::now().timestamp(),
            records,
            previous_digest,
            rules.version,
        );
        let (block, elapsed) = self.miner.mine(block, &rules.difficulty, rules.algorithm)?;

        debug!(
            height,
            records = block.records.len(),
            version = %rules.version,
            digest = %block.short_digest(16),
            "block appended"
        );
        self.blocks.push(block);

        let tip = &self.blocks[self.blocks.len() - 1];
        Ok((tip, elapsed))
    }

    /// Check every block after genesis, in height order. Fail-fast.
    pub fn validate(&self) -> Result<()> {
        let result = self.blocks.windows(2).try_for_each(|pair| {
            let (prev, current) = (&pair[0], &pair[1]);
            self.validate_block(prev, current)
                .map_err(|failure| LedgerError::validation(current.height, failure))
        });
        if let Err(err) = &result {
            warn!(error = %err, "chain validation failed");
        }
        result
    }

    fn validate_block(
        &self,
        prev: &Block,
        current: &Block,
    ) -> std::result::Result<(), ValidationFailure> {
        if current.records.is_empty() {
            return Err(ValidationFailure::EmptyBlock);
        }

        let algorithm = self.policy.digest_algorithm(current.height);
        let computed = current.compute_digest(algorithm);
        if current.digest != computed {
            return Err(ValidationFailure::DigestMismatch {
                stored: current.digest.clone(),
                computed,
            });
        }

        if current.previous_digest != prev.digest {
            return Err(ValidationFailure::BrokenLink {
                expected: prev.digest.clone(),
                actual: current.previous_digest.clone(),
            });
        }

        let difficulty = self.policy.difficulty(current.height);
        if !current.digest.starts_with(difficulty) {
            return Err(ValidationFailure::InsufficientWork {
                required: difficulty.to_string(),
            });
        }

        current.check_merkle_root()?;

        let expected = self.policy.protocol_version(current.height);
        if current.protocol_version != expected {
            return Err(ValidationFailure::VersionMismatch {
                expected,
                found: current.protocol_version,
            });
        }

        if current.height != prev.height + 1 {
            return Err(ValidationFailure::HeightGap {
                expected: prev.height + 1,
                found: current.height,
            });
        }

        Ok(())
    }

    /// Blocks with at least one record matching `keyword` (case-insensitive
    /// substring over name, record book, group, subject and instructor).
    pub fn search(&self, keyword: &str) -> Vec<&Block> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.blocks_where(|r| r.matches_keyword(&needle))
    }

    pub fn filter_by_grade(&self, grade: u8) -> Vec<&Block> {
        self.blocks_where(|r| r.grade == grade)
    }

    pub fn filter_by_course(&self, course: u32) -> Vec<&Block> {
        self.blocks_where(|r| r.course == course)
    }

    fn blocks_where(&self, pred: impl Fn(&Record) -> bool) -> Vec<&Block> {
        self.blocks
            .iter()
            .filter(|block| block.records.iter().any(&pred))
            .collect()
    }

    /// Identifiers of every record in the chain.
    pub fn record_ids(&self) -> HashSet<Uuid> {
        self.blocks
            .iter()
            .flat_map(|block| block.records.iter())
            .filter_map(|record| record.id)
            .collect()
    }

    pub fn stats(&self) -> ChainStats {
        let mut stats = ChainStats {
            total_blocks: self.blocks.len(),
            ..ChainStats::default()
        };
        for block in self.blocks.iter().filter(|b| !b.is_genesis()) {
            *stats.by_version.entry(block.protocol_version).or_default() += 1;
            for record in &block.records {
                stats.total_records += 1;
                *stats.by_grade.entry(record.grade).or_default() += 1;
                *stats.by_course.entry(record.course).or_default() += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::DigestAlgorithm;

    fn config() -> ForkPolicyConfig {
        ForkPolicyConfig {
            soft_fork_height: 5,
            hard_fork_height: 10,
            difficulty_old: "00".into(),
            difficulty_new: "000".into(),
        }
    }

    fn rec(name: &str, grade: u8, course: u32) -> Record {
        Record::new(name, "202434", "5.507M", "Mathematics", course, grade)
            .with_instructor("Kuznetsova E.A.")
    }

    fn chain_with(n: usize) -> Chain {
        let mut chain = Chain::new(config()).unwrap();
        for i in 0..n {
            chain
                .append(vec![rec(&format!("Student {i}"), 3 + (i % 3) as u8, 1 + i as u32 % 4)])
                .unwrap();
        }
        chain
    }

    #[test]
    fn genesis_properties() {
        let chain = Chain::new(config()).unwrap();
        let genesis = chain.block(0).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.previous_digest, GENESIS_PREVIOUS_DIGEST);
        assert!(genesis.digest.starts_with("00"));
        assert_eq!(genesis.digest.len(), 96);
        assert_eq!(genesis.records, vec![Record::genesis()]);
    }

    #[test]
    fn appended_chain_validates() {
        let chain = chain_with(12);
        assert_eq!(chain.len(), 13);
        chain.validate().unwrap();
    }

    #[test]
    fn append_assigns_ids_and_links() {
        let mut chain = chain_with(1);
        let prev = chain.tip().unwrap().digest.clone();
        let (block, _) = chain.append(vec![rec("A", 5, 1), rec("B", 4, 1)]).unwrap();
        assert_eq!(block.height, 2);
        assert_eq!(block.previous_digest, prev);
        assert!(block.records.iter().all(|r| r.id.is_some()));
        assert!(block.merkle_root.is_some());
    }

    #[test]
    fn append_keeps_existing_ids() {
        let mut chain = chain_with(0);
        let id = Uuid::from_u128(77);
        let (block, _) = chain.append(vec![rec("A", 5, 1).with_id(id)]).unwrap();
        assert_eq!(block.records[0].id, Some(id));
    }

    #[test]
    fn empty_append_rejected() {
        let mut chain = chain_with(0);
        let err = chain.append(Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation { height: 1, failure: ValidationFailure::EmptyBlock }
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn fork_thresholds_apply_on_append() {
        let chain = chain_with(10);
        let b4 = chain.block(4).unwrap();
        assert!(b4.digest.starts_with("00"));
        assert_eq!(b4.digest.len(), DigestAlgorithm::Sha384.hex_len());
        assert_eq!(b4.protocol_version, ProtocolVersion::Original);

        let b5 = chain.block(5).unwrap();
        assert!(b5.digest.starts_with("000"));
        assert_eq!(b5.digest.len(), DigestAlgorithm::Sha384.hex_len());
        assert_eq!(b5.protocol_version, ProtocolVersion::Soft);

        let b10 = chain.block(10).unwrap();
        assert!(b10.digest.starts_with("000"));
        assert_eq!(b10.digest.len(), DigestAlgorithm::Sha512.hex_len());
        assert_eq!(b10.protocol_version, ProtocolVersion::Hard);
    }

    #[test]
    fn instructor_gating() {
        let mut chain = chain_with(3);
        let bare = Record::new("No Instructor", "1", "g", "s", 1, 4);

        // Height 4 < soft fork: fine.
        chain.append(vec![bare.clone()]).unwrap();

        // Height 5 >= soft fork: rejected, chain unchanged.
        let err = chain.append(vec![bare.clone().with_instructor(" ")]).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation {
                height: 5,
                failure: ValidationFailure::MissingInstructor { record: 0 }
            }
        ));
        assert_eq!(chain.len(), 5);
    }

    #[test]
    fn tampered_digest_fails_at_its_height() {
        for height in 1..=4u64 {
            let mut chain = chain_with(4);
            chain.blocks[height as usize].digest.replace_range(0..1, "f");
            let err = chain.validate().unwrap_err();
            assert_eq!(err.failing_height(), Some(height));
        }
    }

    #[test]
    fn tampered_link_fails_at_its_height() {
        let mut chain = chain_with(4);
        chain.blocks[3].previous_digest = "00".repeat(48);
        let err = chain.validate().unwrap_err();
        assert_eq!(err.failing_height(), Some(3));
    }

    #[test]
    fn resealed_broken_link_is_reported_as_link() {
        // Re-mine a block over a wrong parent: the digest is self-consistent
        // but the link is not.
        let mut chain = chain_with(3);
        let mut forged = chain.blocks[2].clone();
        forged.previous_digest = "00".repeat(48);
        let (forged, _) = Miner::default()
            .mine(forged, "00", DigestAlgorithm::Sha384)
            .unwrap();
        chain.blocks[2] = forged;
        let err = chain.validate().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation { height: 2, failure: ValidationFailure::BrokenLink { .. } }
        ));
    }

    #[test]
    fn tampered_merkle_root_fails_at_its_height() {
        let mut chain = chain_with(2);
        chain.append(vec![rec("A", 5, 1), rec("B", 4, 1), rec("C", 3, 1)]).unwrap();
        chain.blocks[3].merkle_root = Some("ab".repeat(32));
        assert_eq!(chain.validate().unwrap_err().failing_height(), Some(3));
    }

    #[test]
    fn resealed_merkle_root_is_reported_as_merkle() {
        let mut chain = chain_with(1);
        chain.append(vec![rec("A", 5, 1), rec("B", 4, 1)]).unwrap();
        let mut forged = chain.blocks[2].clone();
        forged.merkle_root = Some("ab".repeat(32));
        let (forged, _) = Miner::default()
            .mine(forged, "00", DigestAlgorithm::Sha384)
            .unwrap();
        chain.blocks[2] = forged;
        assert!(matches!(
            chain.validate().unwrap_err(),
            LedgerError::Validation {
                height: 2,
                failure: ValidationFailure::MerkleRootMismatch { .. }
            }
        ));
    }

    #[test]
    fn resealed_wrong_version_tag_is_reported() {
        let mut chain = chain_with(6);
        let mut forged = chain.blocks[6].clone();
        assert_eq!(forged.protocol_version, ProtocolVersion::Soft);
        forged.protocol_version = ProtocolVersion::Original;
        let (forged, _) = Miner::default()
            .mine(forged, "000", DigestAlgorithm::Sha384)
            .unwrap();
        chain.blocks[6] = forged;
        assert!(matches!(
            chain.validate().unwrap_err(),
            LedgerError::Validation {
                height: 6,
                failure: ValidationFailure::VersionMismatch {
                    expected: ProtocolVersion::Soft,
                    found: ProtocolVersion::Original,
                }
            }
        ));
    }

    #[test]
    fn insufficient_work_detected() {
        let mut chain = chain_with(2);
        let mut weak = chain.blocks[2].clone();
        // Find a nonce whose digest is consistent but lacks the prefix.
        weak.nonce = 0;
        while weak.compute_digest(DigestAlgorithm::Sha384).starts_with("00") {
            weak.nonce += 1;
        }
        weak.digest = weak.compute_digest(DigestAlgorithm::Sha384);
        chain.blocks[2] = weak;
        assert!(matches!(
            chain.validate().unwrap_err(),
            LedgerError::Validation {
                height: 2,
                failure: ValidationFailure::InsufficientWork { .. }
            }
        ));
    }

    #[test]
    fn first_failure_wins() {
        let mut chain = chain_with(5);
        chain.blocks[4].digest.replace_range(0..1, "f");
        chain.blocks[2].digest.replace_range(0..1, "f");
        assert_eq!(chain.validate().unwrap_err().failing_height(), Some(2));
    }

    #[test]
    fn search_and_filters() {
        let mut chain = chain_with(0);
        chain.append(vec![rec("Ivanov I.I.", 5, 1)]).unwrap();
        chain.append(vec![rec("Petrov P.P.", 4, 2)]).unwrap();
        chain
            .append(vec![rec("Sidorov S.S.", 3, 2), rec("IVANOVA A.A.", 5, 3)])
            .unwrap();

        let hits: Vec<u64> = chain.search("ivanov").iter().map(|b| b.height).collect();
        assert_eq!(hits, vec![1, 3]);
        assert!(chain.search("   ").is_empty());
        assert_eq!(chain.search("kuznetsova").len(), 3);

        let fives: Vec<u64> = chain.filter_by_grade(5).iter().map(|b| b.height).collect();
        assert_eq!(fives, vec![1, 3]);
        let second_year: Vec<u64> = chain.filter_by_course(2).iter().map(|b| b.height).collect();
        assert_eq!(second_year, vec![2, 3]);
    }

    #[test]
    fn lookups_out_of_range() {
        let chain = chain_with(1);
        assert!(matches!(chain.block(2), Err(LedgerError::NotFound(_))));
        assert!(matches!(chain.record(1, 1), Err(LedgerError::NotFound(_))));
        assert!(chain.record(1, 0).is_ok());
    }

    #[test]
    fn snapshot_roundtrip_preserves_chain() {
        let chain = chain_with(3);
        let restored = Chain::from_snapshot(chain.snapshot()).unwrap();
        assert_eq!(restored.blocks(), chain.blocks());
        assert_eq!(restored.config(), chain.config());
        restored.validate().unwrap();
    }

    #[test]
    fn empty_snapshot_rejected() {
        let err = Chain::from_snapshot(ChainSnapshot {
            config: config(),
            blocks: Vec::new(),
        })
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation { failure: ValidationFailure::MissingGenesis, .. }
        ));
    }

    #[test]
    fn mining_timeout_leaves_chain_unchanged() {
        let mut chain = Chain::new(ForkPolicyConfig {
            difficulty_new: "0".repeat(40),
            soft_fork_height: 2,
            ..config()
        })
        .unwrap();
        chain.append(vec![rec("A", 5, 1)]).unwrap();
        chain.set_budget(MiningBudget::attempts(100));
        let err = chain.append(vec![rec("B", 5, 1)]).unwrap_err();
        assert!(matches!(err, LedgerError::MiningTimeout { height: 2, .. }));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn stats_skip_genesis() {
        let mut chain = chain_with(0);
        chain.append(vec![rec("A", 5, 1), rec("B", 5, 2)]).unwrap();
        chain.append(vec![rec("C", 3, 2)]).unwrap();
        let stats = chain.stats();
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.by_grade.get(&5), Some(&2));
        assert_eq!(stats.by_course.get(&2), Some(&2));
        assert_eq!(stats.by_version.get(&ProtocolVersion::Original), Some(&2));
        assert_eq!(chain.record_ids().len(), 3);
    }
}
