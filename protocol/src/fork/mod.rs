//! # Forks
//!
//! - **registry** — named chains, their storage locations and lineage.
//! - **resolver** — elect a winner between two diverged chains and merge.

pub mod registry;
pub mod resolver;

pub use registry::{find_common_ancestor, ChainEntry, ForkRegistry};
pub use resolver::{
    check_pair, elect_winner, resolve, Contender, PairReport, Resolution, Resolver, Side,
};
