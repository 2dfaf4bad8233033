//! Randomized door parameters for batch runs.
//!
//! The sampler is seeded, so a batch can be reproduced from its sampler seed.

use rand::distributions::uniform::SampleUniform;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::{BatchConfig, DoorConfig, SampleRange};
use crate::error::PipelineResult;

/// Draws door configurations from the ranges in a [`BatchConfig`]
pub struct ParameterSampler {
    rng: StdRng,
    batch: BatchConfig,
}

impl ParameterSampler {
    pub fn new(batch: BatchConfig) -> PipelineResult<Self> {
        batch.validate()?;
        Ok(Self {
            rng: StdRng::seed_from_u64(batch.sampler_seed),
            batch,
        })
    }

    /// Sample the next door, keeping every non-sampled field of `base`
    pub fn sample(&mut self, base: &DoorConfig) -> DoorConfig {
        // validate() guarantees non-empty lists
        let door_type = *self
            .batch
            .door_types
            .choose(&mut self.rng)
            .unwrap_or(&base.door_type);
        let handle_type = *self
            .batch
            .handle_types
            .choose(&mut self.rng)
            .unwrap_or(&base.handle_type);

        DoorConfig {
            door_type,
            handle_type,
            x_subdivisions: draw(&mut self.rng, self.batch.x_subdivisions),
            y_subdivisions: draw(&mut self.rng, self.batch.y_subdivisions),
            seed: draw(&mut self.rng, self.batch.seeds),
            ..base.clone()
        }
    }
}

fn draw<T>(rng: &mut StdRng, range: SampleRange<T>) -> T
where
    T: SampleUniform + PartialOrd,
{
    rng.gen_range(range.min..=range.max)
}
