//! # Command Handlers
//!
//! One function per subcommand. Each opens the data directory through a
//! [`Workspace`], runs the ledger operation and writes its human-readable
//! result to `out`. Errors bubble up as `anyhow` errors with context.

use std::io::Write;

use anyhow::{bail, ensure, Context, Result};
use tracing::info;

use gradechain_protocol::crypto::verify_proof;
use gradechain_protocol::{
    Block, Chain, ForkPolicyConfig, ForkRegistry, JsonFileStore, MiningBudget, Record, Resolver,
};

use crate::cli::{AddArgs, Commands, FilterArgs, GlobalArgs, GradeChainCli, MerkleCommand};
use crate::render;

/// Data directory, registry and the settings for the selected chain.
pub struct Workspace {
    store: JsonFileStore,
    registry: ForkRegistry,
    chain_name: String,
    config: ForkPolicyConfig,
    budget: MiningBudget,
}

impl Workspace {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let store = JsonFileStore::open(&global.data_dir).with_context(|| {
            format!("failed to open data directory {}", global.data_dir.display())
        })?;
        let registry = ForkRegistry::load(&store).context("failed to load fork registry")?;
        Ok(Self {
            store,
            registry,
            chain_name: global.chain.clone(),
            config: global.fork.to_config(),
            budget: global.mining.budget(),
        })
    }

    /// Load the selected chain, creating its genesis block if it has none.
    fn chain(&mut self) -> Result<Chain> {
        let chain = self
            .registry
            .open_or_create(&self.store, &self.chain_name, self.config.clone(), self.budget)
            .with_context(|| format!("failed to open chain '{}'", self.chain_name))?;
        self.registry
            .save(&self.store)
            .context("failed to save fork registry")?;
        Ok(chain)
    }

    fn save(&self, chain: &Chain) -> Result<()> {
        self.registry
            .save_chain(&self.store, &self.chain_name, chain)
            .with_context(|| format!("failed to save chain '{}'", self.chain_name))
    }
}

/// Dispatch a parsed command line.
pub fn run(cli: GradeChainCli, out: &mut impl Write) -> Result<()> {
    let mut ws = Workspace::open(&cli.global)?;
    match cli.command {
        Commands::List => list(&mut ws, out),
        Commands::Validate { other } => validate(&mut ws, other.as_deref(), out),
        Commands::Search { keyword } => search(&mut ws, &keyword, out),
        Commands::Filter(args) => filter(&mut ws, &args, out),
        Commands::Add(args) => add(&mut ws, &args, out),
        Commands::Fork { target } => fork(&mut ws, &target, out),
        Commands::Resolve { other } => resolve(&mut ws, &other, out),
        Commands::Merkle(cmd) => merkle(&mut ws, cmd, out),
        Commands::Status => status(&mut ws, out),
        Commands::Stats => stats(&mut ws, out),
    }
}

fn print_blocks<'a>(
    out: &mut impl Write,
    blocks: impl IntoIterator<Item = &'a Block>,
) -> Result<usize> {
    let mut count = 0;
    for block in blocks {
        writeln!(out, "{}", render::block(block))?;
        count += 1;
    }
    Ok(count)
}

fn list(ws: &mut Workspace, out: &mut impl Write) -> Result<()> {
    let chain = ws.chain()?;
    writeln!(out, "Chain '{}': {} blocks\n", ws.chain_name, chain.len())?;
    print_blocks(out, chain.blocks())?;
    Ok(())
}

fn validate(ws: &mut Workspace, other: Option<&str>, out: &mut impl Write) -> Result<()> {
    match other {
        None => {
            let chain = ws.chain()?;
            chain
                .validate()
                .with_context(|| format!("chain '{}' is invalid", ws.chain_name))?;
            writeln!(out, "✓ Chain '{}' is valid ({} blocks)", ws.chain_name, chain.len())?;
            writeln!(out, "✓ All Merkle roots are correct")?;
        }
        Some(other) => {
            ws.chain()?;
            let report = Resolver::new(&ws.registry, &ws.store)
                .check(&ws.chain_name, other)
                .with_context(|| format!("cannot compare '{}' with '{other}'", ws.chain_name))?;
            write!(out, "{}", render::pair_report(&report))?;
        }
    }
    Ok(())
}

fn search(ws: &mut Workspace, keyword: &str, out: &mut impl Write) -> Result<()> {
    let chain = ws.chain()?;
    let found = print_blocks(out, chain.search(keyword))?;
    writeln!(out, "{found} block(s) match '{keyword}'")?;
    Ok(())
}

fn filter(ws: &mut Workspace, args: &FilterArgs, out: &mut impl Write) -> Result<()> {
    let chain = ws.chain()?;
    let blocks = match (args.grade, args.course) {
        (Some(grade), None) => chain.filter_by_grade(grade),
        (None, Some(course)) => chain.filter_by_course(course),
        // Both criteria must hold for the same record.
        (Some(grade), Some(course)) => chain
            .filter_by_grade(grade)
            .into_iter()
            .filter(|block| {
                block
                    .records
                    .iter()
                    .any(|r| r.grade == grade && r.course == course)
            })
            .collect(),
        (None, None) => bail!("filter needs --grade and/or --course"),
    };
    let found = print_blocks(out, blocks)?;
    writeln!(out, "{found} block(s) found")?;
    Ok(())
}

/// The i-th entry of a comma-separated list, trimmed.
fn nth_field(list: &str, i: usize) -> Option<&str> {
    list.split(',')
        .map(str::trim)
        .nth(i)
        .filter(|field| !field.is_empty())
}

/// Build records from the comma-separated `add` options.
pub fn parse_records(args: &AddArgs) -> Result<Vec<Record>> {
    let names: Vec<&str> = args
        .names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    ensure!(!names.is_empty(), "at least one name is required");

    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let course = match nth_field(&args.courses, i) {
                Some(c) => c
                    .parse::<u32>()
                    .with_context(|| format!("invalid course '{c}' for record {i}"))?,
                None => 0,
            };
            let grade = match nth_field(&args.grades, i) {
                Some(g) => g
                    .parse::<u8>()
                    .with_context(|| format!("invalid grade '{g}' for record {i}"))?,
                None => 0,
            };
            let mut record = Record::new(
                *name,
                nth_field(&args.record_books, i).unwrap_or("000000"),
                nth_field(&args.groups, i).unwrap_or("Unknown"),
                nth_field(&args.subjects, i).unwrap_or("Unknown"),
                course,
                grade,
            );
            if let Some(instructor) = nth_field(&args.instructors, i) {
                record = record.with_instructor(instructor);
            }
            Ok(record)
        })
        .collect()
}

fn add(ws: &mut Workspace, args: &AddArgs, out: &mut impl Write) -> Result<()> {
    let records = parse_records(args)?;
    let mut chain = ws.chain()?;
    writeln!(out, "Mining block with {} record(s)...", records.len())?;

    let (height, nonce, elapsed) = {
        let (block, elapsed) = chain
            .append(records)
            .with_context(|| format!("failed to add block to '{}'", ws.chain_name))?;
        (block.height, block.nonce, elapsed)
    };
    ws.save(&chain)?;

    info!(chain = %ws.chain_name, height, "block added");
    writeln!(out, "✓ Block #{height} mined in {elapsed:?} (nonce {nonce})")?;
    Ok(())
}

fn fork(ws: &mut Workspace, target: &str, out: &mut impl Write) -> Result<()> {
    ws.chain()?;
    let entry = ws
        .registry
        .fork(&ws.store, &ws.chain_name, target)
        .with_context(|| format!("failed to fork '{}' into '{target}'", ws.chain_name))?
        .clone();
    ws.registry
        .save(&ws.store)
        .context("failed to save fork registry")?;

    writeln!(out, "✓ Created chain '{target}' from '{}'", ws.chain_name)?;
    if let Some(point) = entry.fork_point {
        writeln!(out, "  Fork point: height {point}")?;
    }
    writeln!(out, "  Stored at:  {}", ws.store.path_of(&entry.file).display())?;
    Ok(())
}

fn resolve(ws: &mut Workspace, other: &str, out: &mut impl Write) -> Result<()> {
    ws.chain()?;
    let resolution = Resolver::new(&ws.registry, &ws.store)
        .with_budget(ws.budget)
        .resolve(&ws.chain_name, other)
        .with_context(|| format!("failed to resolve '{}' against '{other}'", ws.chain_name))?;
    write!(out, "{}", render::resolution(&resolution))?;
    Ok(())
}

fn merkle(ws: &mut Workspace, cmd: MerkleCommand, out: &mut impl Write) -> Result<()> {
    let chain = ws.chain()?;
    match cmd {
        MerkleCommand::Build { block } => {
            let tree = chain.merkle_tree(block)?;
            writeln!(out, "=== Merkle Tree for Block #{block} ===")?;
            writeln!(out, "Records:     {}", tree.leaf_count())?;
            writeln!(out, "Merkle root: {}\n", tree.root())?;
            write!(out, "{}", render::tree(&tree))?;
        }
        MerkleCommand::Proof { block, tx } => {
            let record = chain.record(block, tx)?;
            let tree = chain.merkle_tree(block)?;
            let proof = tree.proof(tx)?;
            writeln!(out, "=== Merkle Proof ===")?;
            writeln!(out, "Block:  #{block}")?;
            writeln!(out, "Record: {}", render::record_line(tx, record))?;
            write!(out, "{}", render::proof(&record.leaf_hash(), &proof, tree.root()))?;
        }
        MerkleCommand::Verify { block, tx } => {
            let record = chain.record(block, tx)?;
            let tree = chain.merkle_tree(block)?;
            let proof = tree.proof(tx)?;
            let stored = chain.block(block)?;
            // A single-record block commits to its record through the digest
            // alone; its tree root is the leaf hash.
            let root = stored.merkle_root.as_deref().unwrap_or(tree.root());
            let leaf = record.leaf_hash();

            writeln!(out, "=== Inclusion Check ===")?;
            writeln!(out, "Block:  #{block}")?;
            writeln!(out, "Record: {}", render::record_line(tx, record))?;
            write!(out, "{}", render::proof(&leaf, &proof, root))?;
            if !verify_proof(&leaf, &proof, root) {
                bail!("record {tx} is not included under the stored root of block {block}");
            }
            writeln!(out, "✓ Record is included in block #{block}")?;
        }
    }
    Ok(())
}

fn status(ws: &mut Workspace, out: &mut impl Write) -> Result<()> {
    let chain = ws.chain()?;
    let next = chain.next_height()?;
    let policy = chain.policy();
    writeln!(out, "Chain '{}'", ws.chain_name)?;
    write!(out, "{}", render::fork_status(&policy.status(next), &policy.rules(next)))?;
    Ok(())
}

fn stats(ws: &mut Workspace, out: &mut impl Write) -> Result<()> {
    let chain = ws.chain()?;
    writeln!(out, "Chain '{}'", ws.chain_name)?;
    write!(out, "{}", render::stats(&chain.stats()))?;
    Ok(())
}
