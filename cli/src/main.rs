// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # GradeChain CLI
//!
//! Entry point for the `gradechain` binary. Parses CLI arguments,
//! initializes logging and runs one ledger command against a data
//! directory:
//!
//! - `list`, `search`, `filter`, `stats`, `status` — read the chain
//! - `add`      — mine a block of grade records
//! - `validate` — check one chain, or two chains against each other
//! - `fork`     — branch a new named chain
//! - `resolve`  — converge two diverged chains
//! - `merkle`   — build trees, produce and verify inclusion proofs
//!
//! Command output goes to stdout, logs to stderr. Any failure exits with a
//! non-zero status and the error chain on stderr.

mod cli;
mod commands;
mod logging;
mod render;

use std::io;

use anyhow::Result;
use clap::Parser;

use cli::GradeChainCli;

fn main() -> Result<()> {
    let cli = GradeChainCli::parse();

    logging::init_logging(
        logging::default_filter(cli.global.verbose),
        cli.global.log_format,
    );
    tracing::debug!(
        chain = %cli.global.chain,
        data_dir = %cli.global.data_dir.display(),
        "gradechain starting"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    commands::run(cli, &mut out)
}
