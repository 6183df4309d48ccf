//! Per-replica seeds.
//!
//! Each base seed drives its own generator; replica `r` (1-based) uses the
//! `r`-th draw. Seeds are therefore stable when more replicas are added.

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

const SEED_RANGE: u64 = 1 << 31;

/// Base seeds from the runcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedSettings {
    /// Training/validation split.
    pub trvlseed: u64,
    /// Minimizer initialization and mutations.
    pub nnseed: u64,
    /// Pseudo-data generation.
    pub mcseed: u64,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            trvlseed: 1,
            nnseed: 2,
            mcseed: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSeeds {
    pub trvl: u64,
    pub nn: u64,
    /// `None` when pseudo-data generation is disabled.
    pub mc: Option<u64>,
}

impl ReplicaSeeds {
    pub fn derive(replica: usize, base: &SeedSettings, genrep: bool) -> Self {
        Self {
            trvl: nth_draw(base.trvlseed, replica),
            nn: nth_draw(base.nnseed, replica),
            mc: genrep.then(|| nth_draw(base.mcseed, replica)),
        }
    }
}

fn nth_draw(base: u64, replica: usize) -> u64 {
    let mut rng = StdRng::seed_from_u64(base);
    let mut seed = base;
    for _ in 0..replica {
        seed = rng.gen_range(0..SEED_RANGE);
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_stable_and_distinct() {
        let base = SeedSettings::default();
        let a = ReplicaSeeds::derive(1, &base, true);
        let b = ReplicaSeeds::derive(2, &base, true);
        assert_eq!(a, ReplicaSeeds::derive(1, &base, true));
        assert_ne!(a.trvl, b.trvl);
        assert!(a.trvl < SEED_RANGE && a.nn < SEED_RANGE);
    }

    #[test]
    fn replica_seed_does_not_depend_on_replica_count() {
        let base = SeedSettings::default();
        let r3 = ReplicaSeeds::derive(3, &base, true);
        // Drawing sequentially yields the same third value.
        let mut rng = StdRng::seed_from_u64(base.trvlseed);
        let third = (0..3).map(|_| rng.gen_range(0..SEED_RANGE)).last().unwrap();
        assert_eq!(r3.trvl, third);
    }

    #[test]
    fn no_mc_seed_without_genrep() {
        let seeds = ReplicaSeeds::derive(1, &SeedSettings::default(), false);
        assert!(seeds.mc.is_none());
    }
}
