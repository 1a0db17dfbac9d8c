//! # CLI Interface
//!
//! Defines the command-line argument structure for `gradechain` using
//! `clap` derive. Every subcommand operates on one named chain inside one
//! data directory; both, like the fork and mining settings, fall back to
//! `GRADECHAIN_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use gradechain_protocol::config::{
    DEFAULT_CHAIN_NAME, DEFAULT_DIFFICULTY_NEW, DEFAULT_DIFFICULTY_OLD, DEFAULT_HARD_FORK_HEIGHT,
    DEFAULT_MAX_MINING_ATTEMPTS, DEFAULT_SOFT_FORK_HEIGHT,
};
use gradechain_protocol::{ForkPolicyConfig, MiningBudget};

use crate::logging::LogFormat;

/// Proof-of-work ledger of academic grade records.
///
/// Blocks of grade records are mined under height-dependent consensus
/// rules. Named chains can be forked, diverge, and be resolved back into
/// one.
#[derive(Parser, Debug)]
#[command(
    name = "gradechain",
    about = "Fork-aware proof-of-work ledger of grade records",
    version,
    propagate_version = true
)]
pub struct GradeChainCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Name of the chain to operate on.
    #[arg(
        long,
        short = 'c',
        env = "GRADECHAIN_CHAIN",
        default_value = DEFAULT_CHAIN_NAME,
        value_parser = parse_chain_name,
        global = true
    )]
    pub chain: String,

    /// Directory holding chain snapshots and the fork registry.
    ///
    /// Created on first use if it does not exist.
    #[arg(long, short = 'd', env = "GRADECHAIN_DATA_DIR", default_value = ".", global = true)]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub fork: ForkArgs,

    #[command(flatten)]
    pub mining: MiningArgs,
}

/// Fork configuration. Only used when a chain's genesis block is created;
/// an existing chain keeps the configuration stored in its snapshot.
#[derive(Args, Debug, Clone)]
pub struct ForkArgs {
    /// Height at which the soft fork activates.
    #[arg(
        long,
        env = "GRADECHAIN_SOFT_FORK_HEIGHT",
        default_value_t = DEFAULT_SOFT_FORK_HEIGHT,
        global = true
    )]
    pub soft_fork_height: u64,

    /// Height at which the hard fork activates.
    #[arg(
        long,
        env = "GRADECHAIN_HARD_FORK_HEIGHT",
        default_value_t = DEFAULT_HARD_FORK_HEIGHT,
        global = true
    )]
    pub hard_fork_height: u64,

    /// Difficulty prefix before the soft fork.
    #[arg(
        long,
        env = "GRADECHAIN_DIFFICULTY_OLD",
        default_value = DEFAULT_DIFFICULTY_OLD,
        global = true
    )]
    pub difficulty_old: String,

    /// Difficulty prefix from the soft fork on.
    #[arg(
        long,
        env = "GRADECHAIN_DIFFICULTY_NEW",
        default_value = DEFAULT_DIFFICULTY_NEW,
        global = true
    )]
    pub difficulty_new: String,
}

impl ForkArgs {
    pub fn to_config(&self) -> ForkPolicyConfig {
        ForkPolicyConfig {
            soft_fork_height: self.soft_fork_height,
            hard_fork_height: self.hard_fork_height,
            difficulty_old: self.difficulty_old.clone(),
            difficulty_new: self.difficulty_new.clone(),
        }
    }
}

/// Bounds on the proof-of-work search for each mined block.
#[derive(Args, Debug, Clone)]
pub struct MiningArgs {
    /// Maximum nonce attempts per block. 0 removes the cap.
    #[arg(
        long,
        env = "GRADECHAIN_MAX_ATTEMPTS",
        default_value_t = DEFAULT_MAX_MINING_ATTEMPTS,
        global = true
    )]
    pub max_attempts: u64,

    /// Wall-clock limit per block, in seconds.
    #[arg(long, env = "GRADECHAIN_MINING_TIMEOUT_SECS", global = true)]
    pub mining_timeout_secs: Option<u64>,
}

impl MiningArgs {
    pub fn budget(&self) -> MiningBudget {
        let budget = match self.max_attempts {
            0 => MiningBudget::unbounded(),
            n => MiningBudget::attempts(n),
        };
        match self.mining_timeout_secs {
            Some(secs) => budget.with_timeout(Duration::from_secs(secs)),
            None => budget,
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every block of the chain.
    List,

    /// Validate the chain, or compare it with another chain.
    Validate {
        /// Second chain to validate and compare against.
        other: Option<String>,
    },

    /// Find blocks whose records mention a keyword (case-insensitive).
    Search {
        keyword: String,
    },

    /// Find blocks by exact grade and/or course.
    Filter(FilterArgs),

    /// Mine a new block holding one or more records.
    Add(AddArgs),

    /// Branch a new chain off the current one.
    Fork {
        /// Name of the new chain.
        #[arg(value_parser = parse_chain_name)]
        target: String,
    },

    /// Resolve the current chain against another, merging the loser's
    /// unique records into the winner.
    Resolve {
        #[arg(value_parser = parse_chain_name)]
        other: String,
    },

    /// Merkle tree inspection.
    #[command(subcommand)]
    Merkle(MerkleCommand),

    /// Show which forks are active and how far the next one is.
    Status,

    /// Record counts per grade, course and protocol version.
    Stats,
}

/// Arguments for the `filter` subcommand.
#[derive(Args, Debug)]
#[command(group(
    clap::ArgGroup::new("criteria")
        .required(true)
        .multiple(true)
        .args(["grade", "course"])
))]
pub struct FilterArgs {
    #[arg(long)]
    pub grade: Option<u8>,

    #[arg(long)]
    pub course: Option<u32>,
}

/// Arguments for the `add` subcommand.
///
/// Each option takes a comma-separated list; the i-th entries of every
/// list form the i-th record. `--names` decides how many records there are.
/// Missing entries fall back to placeholders; `--instructors` entries may be
/// left empty.
#[derive(Args, Debug, Default)]
pub struct AddArgs {
    /// Full names of the students.
    #[arg(long, required = true)]
    pub names: String,

    /// Record-book numbers.
    #[arg(long, default_value = "")]
    pub record_books: String,

    #[arg(long, default_value = "")]
    pub groups: String,

    #[arg(long, default_value = "")]
    pub subjects: String,

    /// Course numbers.
    #[arg(long, default_value = "")]
    pub courses: String,

    /// Grades, usually 2 to 5.
    #[arg(long, default_value = "")]
    pub grades: String,

    /// Instructor names. Mandatory from the soft fork on.
    #[arg(long, default_value = "")]
    pub instructors: String,
}

/// `merkle` subcommands. Heights and record indices are zero-based.
#[derive(Subcommand, Debug)]
pub enum MerkleCommand {
    /// Print the full tree of a block.
    Build {
        block: u64,
    },
    /// Print the inclusion proof of one record.
    Proof {
        block: u64,
        tx: usize,
    },
    /// Verify that one record is included under the block's stored root.
    Verify {
        block: u64,
        tx: usize,
    },
}

/// Chain names end up in file names, so keep them to a safe alphabet.
fn parse_chain_name(s: &str) -> Result<String, String> {
    let valid = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(s.to_string())
    } else {
        Err(format!(
            "invalid chain name '{s}': use letters, digits, '_' or '-'"
        ))
    }
}
