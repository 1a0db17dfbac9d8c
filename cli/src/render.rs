//! # Terminal Rendering
//!
//! Plain-text views of blocks, Merkle trees, proofs and chain summaries.
//! Everything returns a `String`; the command layer decides where it goes.

use std::fmt::Write as _;

use chrono::{TimeZone, Utc};

use gradechain_protocol::consensus::{ConsensusRules, ForkActivation, ForkStatus};
use gradechain_protocol::fork::{PairReport, Resolution};
use gradechain_protocol::storage::ChainStats;
use gradechain_protocol::{Block, MerkleProof, MerkleTree, Record};

/// Hex digests are shown truncated to this many characters.
const SHORT: usize = 16;

/// Leading `len` characters of an ASCII digest.
pub fn short(digest: &str, len: usize) -> &str {
    digest.get(..len).unwrap_or(digest)
}

fn timestamp(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => secs.to_string(),
    }
}

pub fn record_line(index: usize, record: &Record) -> String {
    let mut line = format!(
        "[{index}] {} ({}, {}) - {} course {} grade {}",
        record.full_name,
        record.record_book,
        record.group,
        record.subject,
        record.course,
        record.grade
    );
    if let Some(instructor) = &record.instructor {
        let _ = write!(line, " by {instructor}");
    }
    line
}

pub fn block(block: &Block) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "========== Block #{} ==========", block.height);
    let _ = writeln!(s, "Timestamp:    {}", timestamp(block.timestamp));
    let _ = writeln!(s, "Version:      {}", block.protocol_version);
    let _ = writeln!(s, "Records:      {}", block.records.len());
    for (i, record) in block.records.iter().enumerate() {
        let _ = writeln!(s, "  {}", record_line(i, record));
    }
    if let Some(root) = &block.merkle_root {
        let _ = writeln!(s, "MerkleRoot:   {}...", short(root, SHORT));
    }
    let _ = writeln!(s, "Digest:       {}...", short(&block.digest, SHORT));
    let _ = writeln!(s, "Previous:     {}", short(&block.previous_digest, SHORT));
    let _ = writeln!(s, "Nonce:        {}", block.nonce);
    s
}

/// Levels from the root down, one indented line per node.
pub fn tree(tree: &MerkleTree) -> String {
    let mut s = String::new();
    let levels = tree.levels();
    for (depth, level) in levels.iter().rev().enumerate() {
        let label = match depth {
            0 => "root".to_string(),
            d if d + 1 == levels.len() => "leaves".to_string(),
            d => format!("level {d}"),
        };
        let _ = writeln!(s, "{label}:");
        for (i, hash) in level.iter().enumerate() {
            let indent = 2 + depth * 2;
            let _ = writeln!(s, "{:indent$}[{i}] {}...", "", short(hash, 32));
        }
    }
    s
}

pub fn proof(leaf_hash: &str, proof: &MerkleProof, root: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Leaf hash:    {}...", short(leaf_hash, 32));
    let _ = writeln!(s, "Merkle root:  {}...", short(root, 32));
    let _ = writeln!(s, "Proof path ({} hashes):", proof.len());
    for (i, sibling) in proof.siblings.iter().enumerate() {
        let side = if (proof.index >> i) & 1 == 0 { "right" } else { "left" };
        let _ = writeln!(s, "  [{i}] {}... ({side})", short(sibling, 32));
    }
    s
}

pub fn fork_status(status: &ForkStatus, rules: &ConsensusRules) -> String {
    let activation = |a: &ForkActivation| match a {
        ForkActivation::Active { since } => format!("active since height {since}"),
        ForkActivation::Pending { at, blocks_remaining } => {
            format!("pending at height {at} ({blocks_remaining} blocks remaining)")
        }
    };
    let mut s = String::new();
    let _ = writeln!(s, "Next height:  {}", status.next_height);
    let _ = writeln!(s, "Soft fork:    {}", activation(&status.soft));
    let _ = writeln!(s, "Hard fork:    {}", activation(&status.hard));
    let _ = writeln!(s, "Version:      {}", rules.version);
    let _ = writeln!(s, "Difficulty:   {}", rules.difficulty);
    let _ = writeln!(s, "Digest:       {}", rules.algorithm);
    let _ = writeln!(
        s,
        "Instructor:   {}",
        if rules.fields.instructor { "required" } else { "optional" }
    );
    s
}

pub fn stats(stats: &ChainStats) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Blocks:       {}", stats.total_blocks);
    let _ = writeln!(s, "Records:      {}", stats.total_records);
    let _ = writeln!(s, "By grade:");
    for (grade, count) in &stats.by_grade {
        let _ = writeln!(s, "  {grade}: {count}");
    }
    let _ = writeln!(s, "By course:");
    for (course, count) in &stats.by_course {
        let _ = writeln!(s, "  {course}: {count}");
    }
    let _ = writeln!(s, "By version:");
    for (version, count) in &stats.by_version {
        let _ = writeln!(s, "  {version}: {count} blocks");
    }
    s
}

pub fn pair_report(report: &PairReport) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "✓ '{}' is valid ({} blocks)", report.first, report.first_length);
    let _ = writeln!(s, "✓ '{}' is valid ({} blocks)", report.second, report.second_length);
    let h = report.common_ancestor;
    if report.identical() {
        let _ = writeln!(s, "Chains are identical up to height {h}");
    } else {
        let _ = writeln!(s, "Common ancestor: height {h}");
    }
    s
}

pub fn resolution(r: &Resolution) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Winner:          {}", r.winner);
    let _ = writeln!(s, "Loser:           {}", r.loser);
    let _ = writeln!(s, "Common ancestor: height {}", r.common_ancestor);
    let _ = writeln!(s, "Records merged:  {}", r.records_merged);
    if r.records_skipped > 0 {
        let _ = writeln!(s, "Records skipped: {} (missing instructor)", r.records_skipped);
    }
    let _ = writeln!(s, "Final length:    {} blocks", r.final_length);
    s
}
