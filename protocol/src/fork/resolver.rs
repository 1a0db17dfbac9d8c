//! # Fork Resolution
//!
//! Reconciles two diverged chains into one. The longer chain wins; on a tie
//! lineage decides (an original beats a fork, a parent beats its child) and
//! finally the smaller name. Records the loser holds after the common
//! ancestor and the winner lacks are re-mined onto the winner, one record
//! per block, so nothing accepted on either side is lost.
//!
//! ```text
//!   A: G─1─2a─3a              A': G─1─2a─3a─[b2]─[b3]
//!   B: G─1─2b─3b     ──▶      B': (same as A')
//! ```

use std::collections::HashSet;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::consensus::miner::MiningBudget;
use crate::error::{LedgerError, Result, ValidationFailure};
use crate::fork::registry::{find_common_ancestor, ForkRegistry};
use crate::storage::chain::Chain;
use crate::storage::store::ChainStore;

/// A named chain entering resolution, with its registered parent.
#[derive(Clone, Debug)]
pub struct Contender {
    pub name: String,
    pub chain: Chain,
    pub parent: Option<String>,
}

impl Contender {
    pub fn new(name: impl Into<String>, chain: Chain, parent: Option<String>) -> Self {
        Self {
            name: name.into(),
            chain,
            parent,
        }
    }

    fn validate(&self) -> Result<()> {
        self.chain.validate().map_err(|source| LedgerError::ChainInvalid {
            chain: self.name.clone(),
            source: Box::new(source),
        })
    }
}

/// Which side of a pair won the election.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

/// Outcome of [`resolve`].
#[derive(Clone, Debug)]
pub struct Resolution {
    pub winner: String,
    pub loser: String,
    pub common_ancestor: u64,
    pub records_merged: usize,
    /// Loser records that cannot satisfy the field rules at the winner's
    /// heights and were left out.
    pub records_skipped: usize,
    pub final_length: usize,
    /// The converged chain.
    pub chain: Chain,
}

/// Outcome of [`check_pair`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairReport {
    pub first: String,
    pub second: String,
    pub first_length: usize,
    pub second_length: usize,
    pub common_ancestor: u64,
}

impl PairReport {
    /// Both chains carry exactly the same blocks.
    pub fn identical(&self) -> bool {
        self.first_length == self.second_length
            && self.common_ancestor + 1 == self.first_length as u64
    }
}

/// Pick the winner of two contenders.
pub fn elect_winner(a: &Contender, b: &Contender) -> Side {
    use std::cmp::Ordering;

    match a.chain.len().cmp(&b.chain.len()) {
        Ordering::Greater => return Side::First,
        Ordering::Less => return Side::Second,
        Ordering::Equal => {}
    }

    let a_parent = a.parent.as_deref();
    let b_parent = b.parent.as_deref();
    let mutual = a_parent == Some(b.name.as_str()) && b_parent == Some(a.name.as_str());

    match (a_parent, b_parent) {
        _ if mutual => by_name(a, b),
        (None, Some(_)) => Side::First,
        (Some(_), None) => Side::Second,
        (Some(pa), _) if pa == b.name => Side::Second,
        (_, Some(pb)) if pb == a.name => Side::First,
        _ => by_name(a, b),
    }
}

fn by_name(a: &Contender, b: &Contender) -> Side {
    if a.name <= b.name {
        Side::First
    } else {
        Side::Second
    }
}

/// Last height both chains agree on. Unrelated chains cannot be compared
/// or merged.
fn shared_ancestor(a: &Contender, b: &Contender) -> Result<u64> {
    find_common_ancestor(&a.chain, &b.chain).ok_or_else(|| {
        LedgerError::Conflict(format!(
            "chains '{}' and '{}' share no common ancestor",
            a.name, b.name
        ))
    })
}

/// Validate both chains and describe how they relate, without changing
/// either.
pub fn check_pair(a: &Contender, b: &Contender) -> Result<PairReport> {
    a.validate()?;
    b.validate()?;
    Ok(PairReport {
        first: a.name.clone(),
        second: b.name.clone(),
        first_length: a.chain.len(),
        second_length: b.chain.len(),
        common_ancestor: shared_ancestor(a, b)?,
    })
}

/// Converge two chains on the elected winner.
pub fn resolve(a: Contender, b: Contender) -> Result<Resolution> {
    a.validate()?;
    b.validate()?;

    let ancestor = shared_ancestor(&a, &b)?;

    let (mut winner, loser) = match elect_winner(&a, &b) {
        Side::First => (a, b),
        Side::Second => (b, a),
    };
    info!(
        winner = %winner.name,
        loser = %loser.name,
        common_ancestor = ancestor,
        "resolving fork"
    );

    let mut seen: HashSet<Uuid> = winner.chain.record_ids();
    let mut merged = 0usize;
    let mut skipped = 0usize;

    let pending = loser
        .chain
        .blocks()
        .iter()
        .filter(|block| block.height > ancestor)
        .flat_map(|block| block.records.iter());

    for record in pending {
        if record.id.is_some_and(|id| seen.contains(&id)) {
            continue;
        }
        match winner.chain.append(vec![record.clone()]) {
            Ok((block, _)) => {
                if let Some(id) = block.records.first().and_then(|r| r.id) {
                    seen.insert(id);
                }
                debug!(height = block.height, name = %record.full_name, "record merged");
                merged += 1;
            }
            Err(LedgerError::Validation {
                height,
                failure: ValidationFailure::MissingInstructor { .. },
            }) => {
                warn!(height, name = %record.full_name, "record lacks instructor, not merged");
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    let final_length = winner.chain.len();
    info!(
        winner = %winner.name,
        records_merged = merged,
        final_length,
        "fork resolved"
    );

    Ok(Resolution {
        winner: winner.name,
        loser: loser.name,
        common_ancestor: ancestor,
        records_merged: merged,
        records_skipped: skipped,
        final_length,
        chain: winner.chain,
    })
}

/// Registry-aware front end: loads named chains from a store and writes the
/// converged state back to both of their locations.
pub struct Resolver<'a, S: ChainStore> {
    registry: &'a ForkRegistry,
    store: &'a S,
    budget: MiningBudget,
}

impl<'a, S: ChainStore> Resolver<'a, S> {
    pub fn new(registry: &'a ForkRegistry, store: &'a S) -> Self {
        Self {
            registry,
            store,
            budget: MiningBudget::default(),
        }
    }

    /// Budget for the blocks mined while merging.
    pub fn with_budget(mut self, budget: MiningBudget) -> Self {
        self.budget = budget;
        self
    }

    fn contender(&self, name: &str) -> Result<Contender> {
        let entry = self.registry.get(name)?;
        let mut chain = self.registry.load_chain(self.store, name)?;
        chain.set_budget(self.budget);
        Ok(Contender::new(name, chain, entry.fork_from.clone()))
    }

    /// Resolve `first` against `second` and persist the winner to both.
    pub fn resolve(&self, first: &str, second: &str) -> Result<Resolution> {
        if first == second {
            return Err(LedgerError::Conflict(format!(
                "cannot resolve chain '{first}' against itself"
            )));
        }
        let resolution = resolve(self.contender(first)?, self.contender(second)?)?;

        let snapshot = resolution.chain.snapshot();
        self.store
            .save_chain(self.registry.location(&resolution.winner)?, &snapshot)?;
        self.store
            .save_chain(self.registry.location(&resolution.loser)?, &snapshot)?;
        Ok(resolution)
    }

    pub fn check(&self, first: &str, second: &str) -> Result<PairReport> {
        check_pair(&self.contender(first)?, &self.contender(second)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForkPolicyConfig;
    use crate::consensus::miner::Miner;
    use crate::crypto::hash::DigestAlgorithm;
    use crate::storage::chain::ChainSnapshot;
    use crate::storage::record::Record;
    use crate::storage::store::MemoryStore;

    fn rec(name: &str) -> Record {
        Record::new(name, "RB-1", "G-1", "Math", 1, 5).with_instructor("Smith")
    }

    /// A = genesis + 3, B = A[..=1] + 2 different blocks.
    fn diverged() -> (Chain, Chain) {
        let mut a = Chain::new(ForkPolicyConfig::default()).unwrap();
        a.append(vec![rec("shared")]).unwrap();
        let mut b = a.clone();
        a.append(vec![rec("a2")]).unwrap();
        a.append(vec![rec("a3")]).unwrap();
        b.append(vec![rec("b2")]).unwrap();
        b.append(vec![rec("b3")]).unwrap();
        (a, b)
    }

    /// A valid chain whose genesis differs from any chain built by `Chain::new`.
    fn unrelated() -> Chain {
        let base = Chain::new(ForkPolicyConfig::default()).unwrap();
        let mut genesis = base.blocks()[0].clone();
        genesis.timestamp -= 86_400;
        let (genesis, _) = Miner::default()
            .mine(genesis, "00", DigestAlgorithm::Sha384)
            .unwrap();
        let mut chain = Chain::from_snapshot(ChainSnapshot {
            config: ForkPolicyConfig::default(),
            blocks: vec![genesis],
        })
        .unwrap();
        chain.append(vec![rec("x")]).unwrap();
        chain
    }

    fn names(chain: &Chain) -> Vec<String> {
        chain
            .blocks()
            .iter()
            .flat_map(|b| b.records.iter().map(|r| r.full_name.clone()))
            .collect()
    }

    #[test]
    fn tie_prefers_original_over_fork() {
        let (a, b) = diverged();
        let orig = Contender::new("zeta", a, None);
        let fork = Contender::new("alpha", b, Some("zeta".into()));
        assert_eq!(elect_winner(&orig, &fork), Side::First);
        assert_eq!(elect_winner(&fork, &orig), Side::Second);
    }

    #[test]
    fn tie_prefers_parent_over_child() {
        let (a, b) = diverged();
        let parent = Contender::new("zz", a, Some("root".into()));
        let child = Contender::new("aa", b, Some("zz".into()));
        assert_eq!(elect_winner(&parent, &child), Side::First);
        assert_eq!(elect_winner(&child, &parent), Side::Second);
    }

    #[test]
    fn tie_falls_back_to_name() {
        let (a, b) = diverged();
        let x = Contender::new("branch_a", a.clone(), Some("main".into()));
        let y = Contender::new("branch_b", b.clone(), Some("main".into()));
        assert_eq!(elect_winner(&x, &y), Side::First);
        assert_eq!(elect_winner(&y, &x), Side::Second);

        let x = Contender::new("left", a, None);
        let y = Contender::new("right", b, None);
        assert_eq!(elect_winner(&y, &x), Side::Second);
    }

    #[test]
    fn longer_chain_wins_regardless_of_lineage() {
        let (a, mut b) = diverged();
        b.append(vec![rec("b4")]).unwrap();
        let orig = Contender::new("main", a, None);
        let fork = Contender::new("branch", b, Some("main".into()));
        assert_eq!(elect_winner(&orig, &fork), Side::Second);
    }

    #[test]
    fn resolve_merges_loser_records() {
        let (a, b) = diverged();
        let resolution = resolve(
            Contender::new("main", a, None),
            Contender::new("branch", b, Some("main".into())),
        )
        .unwrap();

        assert_eq!(resolution.winner, "main");
        assert_eq!(resolution.loser, "branch");
        assert_eq!(resolution.common_ancestor, 1);
        assert_eq!(resolution.records_merged, 2);
        assert_eq!(resolution.records_skipped, 0);
        assert_eq!(resolution.final_length, 6);
        resolution.chain.validate().unwrap();

        let all = names(&resolution.chain);
        assert!(all.contains(&"b2".to_string()));
        assert!(all.contains(&"b3".to_string()));
        assert_eq!(all.iter().filter(|n| *n == "shared").count(), 1);
    }

    #[test]
    fn records_already_in_winner_are_not_duplicated() {
        let (mut a, b) = diverged();
        let dup = b.blocks()[2].records[0].clone();
        a.append(vec![dup]).unwrap();

        let resolution = resolve(
            Contender::new("main", a, None),
            Contender::new("branch", b, Some("main".into())),
        )
        .unwrap();
        assert_eq!(resolution.records_merged, 1);
        assert_eq!(names(&resolution.chain).iter().filter(|n| *n == "b2").count(), 1);
    }

    #[test]
    fn resolve_without_ancestor_is_a_conflict() {
        let (a, _) = diverged();
        let err = resolve(
            Contender::new("a", a, None),
            Contender::new("b", unrelated(), None),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn comparing_unrelated_chains_is_a_conflict() {
        let (a, _) = diverged();
        let err = check_pair(
            &Contender::new("a", a, None),
            &Contender::new("b", unrelated(), None),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn mutual_parents_fall_back_to_name_in_either_order() {
        let (a, b) = diverged();
        let x = Contender::new("alpha", a, Some("beta".into()));
        let y = Contender::new("beta", b, Some("alpha".into()));
        assert_eq!(elect_winner(&x, &y), Side::First);
        assert_eq!(elect_winner(&y, &x), Side::Second);

        let first = resolve(x.clone(), y.clone()).unwrap();
        let second = resolve(y, x).unwrap();
        assert_eq!(first.winner, "alpha");
        assert_eq!(second.winner, "alpha");
    }

    #[test]
    fn invalid_chain_is_named() {
        let (a, b) = diverged();
        let mut snapshot = b.into_snapshot();
        snapshot.blocks[2].digest = "00".repeat(48);
        let broken = Chain::from_snapshot(snapshot).unwrap();

        let err = resolve(
            Contender::new("good", a, None),
            Contender::new("bad", broken, None),
        )
        .unwrap_err();
        match err {
            LedgerError::ChainInvalid { chain, source } => {
                assert_eq!(chain, "bad");
                assert_eq!(source.failing_height(), Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn check_pair_reports_without_merging() {
        let (a, b) = diverged();
        let report = check_pair(
            &Contender::new("a", a.clone(), None),
            &Contender::new("b", b, None),
        )
        .unwrap();
        assert_eq!(report.common_ancestor, 1);
        assert_eq!(report.first_length, 4);
        assert!(!report.identical());

        let same = check_pair(
            &Contender::new("a", a.clone(), None),
            &Contender::new("c", a, None),
        )
        .unwrap();
        assert!(same.identical());
    }

    #[test]
    fn resolver_persists_winner_to_both_locations() {
        let store = MemoryStore::new();
        let mut registry = ForkRegistry::new();
        let mut main = registry
            .open_or_create(&store, "main", ForkPolicyConfig::default(), MiningBudget::default())
            .unwrap();
        main.append(vec![rec("shared")]).unwrap();
        registry.save_chain(&store, "main", &main).unwrap();
        registry.fork(&store, "main", "branch").unwrap();

        main.append(vec![rec("main-only")]).unwrap();
        registry.save_chain(&store, "main", &main).unwrap();
        let mut branch = registry.load_chain(&store, "branch").unwrap();
        branch.append(vec![rec("branch-only")]).unwrap();
        registry.save_chain(&store, "branch", &branch).unwrap();

        let resolution = Resolver::new(&registry, &store)
            .resolve("main", "branch")
            .unwrap();
        assert_eq!(resolution.winner, "main");
        assert_eq!(resolution.records_merged, 1);

        let main = registry.load_chain(&store, "main").unwrap();
        let branch = registry.load_chain(&store, "branch").unwrap();
        assert_eq!(main.len(), branch.len());
        assert_eq!(main.tip().unwrap().digest, branch.tip().unwrap().digest);
        assert!(names(&main).contains(&"branch-only".to_string()));
    }

    #[test]
    fn resolver_rejects_self_resolution() {
        let store = MemoryStore::new();
        let mut registry = ForkRegistry::new();
        registry
            .open_or_create(&store, "main", ForkPolicyConfig::default(), MiningBudget::default())
            .unwrap();
        assert!(matches!(
            Resolver::new(&registry, &store).resolve("main", "main"),
            Err(LedgerError::Conflict(_))
        ));
    }
}
