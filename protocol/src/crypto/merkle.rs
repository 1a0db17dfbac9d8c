//! # Merkle Tree over Block Records
//!
//! A binary SHA-256 tree stored as a flat array of levels: `levels[0]` are
//! the leaf hashes, `levels.last()` is the one-element root level. Proofs
//! are pure index arithmetic over that arena.
//!
//! ## Construction
//!
//! ```text
//!            root
//!          /      \
//!       h01        h22          h01 = SHA-256(h0 || h1)
//!      /   \      /   \         h22 = SHA-256(h2 || h2)
//!    h0    h1   h2    h2'       h2' = duplicate of h2 (odd level)
//! ```
//!
//! Any level with an odd number of nodes (other than the root level) gets
//! its last hash duplicated before pairing. Inner nodes combine the hex
//! text of their children, left then right.
//!
//! A tree over one record has no inner nodes: the root *is* the leaf hash,
//! and the inclusion proof for it is empty.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::sha256_hex_multi;
use crate::error::{LedgerError, Result};
use crate::storage::record::Record;

/// Combine two child hashes into their parent.
pub fn combine(left: &str, right: &str) -> String {
    sha256_hex_multi(&[left.as_bytes(), right.as_bytes()])
}

/// Inclusion proof for one leaf: the sibling hashes from the leaf level up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the proven leaf among the original records.
    pub index: usize,
    /// Sibling hashes, bottom-up. Empty for a single-record tree.
    pub siblings: Vec<String>,
}

impl MerkleProof {
    /// Number of hashes in the proof path.
    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }
}

/// Ephemeral Merkle tree rebuilt from a block's records on demand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` = leaves (padded), last = `[root]`.
    levels: Vec<Vec<String>>,
    /// Number of real (non-duplicated) leaves.
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree over `records` in order. `None` for an empty slice.
    pub fn build(records: &[Record]) -> Option<Self> {
        let leaves: Vec<String> = records.iter().map(Record::leaf_hash).collect();
        Self::from_leaf_hashes(leaves)
    }

    /// Build a tree from precomputed leaf hashes. `None` for an empty list.
    pub fn from_leaf_hashes(leaves: Vec<String>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let leaf_count = leaves.len();

        let mut levels = Vec::new();
        let mut current = leaves;
        while current.len() > 1 {
            if current.len() % 2 == 1 {
                let last = current[current.len() - 1].clone();
                current.push(last);
            }
            let next: Vec<String> = current
                .chunks(2)
                .map(|pair| combine(&pair[0], &pair[1]))
                .collect();
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Some(Self { levels, leaf_count })
    }

    /// The root hash.
    pub fn root(&self) -> &str {
        // Construction guarantees a non-empty final level.
        &self.levels[self.levels.len() - 1][0]
    }

    /// Number of records the tree was built over.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Leaf hash at `index`, if in range.
    pub fn leaf(&self, index: usize) -> Option<&str> {
        if index < self.leaf_count {
            Some(&self.levels[0][index])
        } else {
            None
        }
    }

    /// All levels, leaves first. Padding duplicates are included.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Tree height in edges (0 for a single leaf).
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Inclusion proof for the record at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        if index >= self.leaf_count {
            return Err(LedgerError::NotFound(format!(
                "record index {index} out of range (tree has {} leaves)",
                self.leaf_count
            )));
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            // Every non-root level has even length after padding.
            siblings.push(level[position ^ 1].clone());
            position /= 2;
        }

        Ok(MerkleProof { index, siblings })
    }
}

/// Merkle root over `records`, or `None` when there are none.
pub fn merkle_root(records: &[Record]) -> Option<String> {
    MerkleTree::build(records).map(|tree| tree.root().to_string())
}

/// Replay a proof from `leaf_hash` and compare against `expected_root`.
pub fn verify_proof(leaf_hash: &str, proof: &MerkleProof, expected_root: &str) -> bool {
    let mut current = leaf_hash.to_string();
    let mut position = proof.index;
    for sibling in &proof.siblings {
        current = if position % 2 == 0 {
            combine(&current, sibling)
        } else {
            combine(sibling, &current)
        };
        position /= 2;
    }
    current == expected_root
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new(
                    format!("Student {i}"),
                    format!("2024{i:02}"),
                    "5.507M",
                    "Physics",
                    5,
                    4,
                )
                    .with_id(Uuid::from_u128(i as u128 + 1))
            })
            .collect()
    }

    #[test]
    fn empty_input_has_no_tree() {
        assert!(MerkleTree::build(&[]).is_none());
        assert!(merkle_root(&[]).is_none());
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let recs = records(1);
        let tree = MerkleTree::build(&recs).unwrap();
        assert_eq!(tree.root(), recs[0].leaf_hash());
        assert_eq!(tree.depth(), 0);

        let proof = tree.proof(0).unwrap();
        assert!(proof.is_empty());
        assert!(verify_proof(&recs[0].leaf_hash(), &proof, tree.root()));
    }

    #[test]
    fn two_leaf_root() {
        let recs = records(2);
        let tree = MerkleTree::build(&recs).unwrap();
        let expected = combine(&recs[0].leaf_hash(), &recs[1].leaf_hash());
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn odd_leaf_count_duplicates_last() {
        let recs = records(3);
        let tree = MerkleTree::build(&recs).unwrap();
        let (h0, h1, h2) = (recs[0].leaf_hash(), recs[1].leaf_hash(), recs[2].leaf_hash());
        let expected = combine(&combine(&h0, &h1), &combine(&h2, &h2));
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.levels()[0].len(), 4);
        assert!(tree.leaf(3).is_none());
    }

    #[test]
    fn odd_inner_level_is_padded_too() {
        // 5 leaves -> 6 -> 3 -> 4 -> 2 -> 1
        let tree = MerkleTree::build(&records(5)).unwrap();
        let widths: Vec<usize> = tree.levels().iter().map(Vec::len).collect();
        assert_eq!(widths, vec![6, 4, 2, 1]);
    }

    #[test]
    fn rebuild_is_deterministic_and_order_sensitive() {
        let recs = records(3);
        let root_a = merkle_root(&recs).unwrap();
        let root_b = merkle_root(&recs).unwrap();
        assert_eq!(root_a, root_b);

        let reordered = vec![recs[2].clone(), recs[0].clone(), recs[1].clone()];
        assert_ne!(root_a, merkle_root(&reordered).unwrap());
    }

    #[test]
    fn every_leaf_proves_inclusion() {
        for n in 1..=9 {
            let recs = records(n);
            let tree = MerkleTree::build(&recs).unwrap();
            for (i, record) in recs.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert_eq!(proof.len(), tree.depth());
                assert!(
                    verify_proof(&record.leaf_hash(), &proof, tree.root()),
                    "leaf {i} of {n} failed to verify"
                );
            }
        }
    }

    #[test]
    fn proof_for_wrong_leaf_fails() {
        let recs = records(4);
        let tree = MerkleTree::build(&recs).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(!verify_proof(&recs[2].leaf_hash(), &proof, tree.root()));
    }

    #[test]
    fn tampered_sibling_fails() {
        let recs = records(4);
        let tree = MerkleTree::build(&recs).unwrap();
        let mut proof = tree.proof(0).unwrap();
        proof.siblings[1] = "00".repeat(32);
        assert!(!verify_proof(&recs[0].leaf_hash(), &proof, tree.root()));
    }

    #[test]
    fn out_of_range_proof_is_not_found() {
        let tree = MerkleTree::build(&records(3)).unwrap();
        // Index 3 is the padding duplicate, not a real record.
        assert!(matches!(tree.proof(3), Err(LedgerError::NotFound(_))));
    }
}
