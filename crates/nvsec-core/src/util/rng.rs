use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::Serialize;

/// Seedable random number generator.
///
/// Wraps StdRng so that randomized page fields and pool placements can be
/// reproduced from the recorded seed.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Rng {
    seed: u64,
    #[serde(skip_serializing)]
    rng: StdRng,
}

impl Rng {
    /// Creates a new RNG from a seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed this generator was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }
}

/// Restarts from the seed, so a clone replays the original sequence.
impl Clone for Rng {
    fn clone(&self) -> Self {
        Self::from_seed(self.seed)
    }
}
