//! Deterministic seed hierarchy for synthetic candle generation.
//!
//! A master seed expands into per-`(symbol, timeframe, epoch)` sub-seeds via
//! BLAKE3, so a replay of the same instrument at the same resolution produces
//! the same synthetic tail no matter what was replayed before it.

use crate::domain::Timeframe;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Hierarchy seeded from OS entropy, for non-reproducible sessions.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive the sub-seed for one replay epoch of `symbol` at `timeframe`.
    ///
    /// `epoch` counts replay resets, so each fresh replay draws a new but
    /// reproducible stream.
    pub fn sub_seed(&self, symbol: &str, timeframe: Timeframe, epoch: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(timeframe.label().as_bytes());
        hasher.update(&epoch.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn rng_for(&self, symbol: &str, timeframe: Timeframe, epoch: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(symbol, timeframe, epoch))
    }
}
