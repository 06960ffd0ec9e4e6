use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::Uniform;

use crate::{GdErr, Result, storage::WeightStore};

/// Draws the starting base weights uniformly from `[-bound, bound)`.
pub struct RandomWeights {
    rng: StdRng,
    distribution: Uniform<f32>,
}

impl RandomWeights {
    /// Creates a new `RandomWeights`.
    ///
    /// # Arguments
    /// * `seed` - The seed for reproducible runs, or `None` to seed from the OS.
    /// * `bound` - The half width of the range.
    pub fn new(seed: Option<u64>, bound: f32) -> Result<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let distribution = Uniform::new(-bound, bound)
            .map_err(|e| GdErr::InvalidConfig(format!("bad initial weight range: {e}")))?;

        Ok(Self { rng, distribution })
    }

    /// Overwrites slot `0` of every weight group with a fresh draw, in table order.
    pub fn fill(&mut self, weights: &mut WeightStore) {
        for group in weights.groups_mut() {
            group[0] = self.rng.sample(&self.distribution);
        }
    }
}
