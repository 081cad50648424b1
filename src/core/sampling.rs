//! Seeded random sky sampling for demo batches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SamplingConfig;
use crate::core::types::{CoordinateSystem, SkyCoordinate};

/// Infinite, reproducible source of sky coordinates.
///
/// `alpha` is drawn uniformly from `[alpha_range[0], alpha_range[1])` and
/// `delta` uniformly from `[delta_range[0], delta_range[1]]`. Two samplers
/// built with the same seed yield the same sequence.
///
/// # Example
///
/// ```
/// use cosmicflows_pipeline::core::sampling::SkySampler;
/// use cosmicflows_pipeline::core::types::CoordinateSystem;
///
/// let a: Vec<_> = SkySampler::seeded(42, CoordinateSystem::Supergalactic).take(5).collect();
/// let b: Vec<_> = SkySampler::seeded(42, CoordinateSystem::Supergalactic).take(5).collect();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct SkySampler {
    rng: StdRng,
    system: CoordinateSystem,
    alpha_range: [f64; 2],
    delta_range: [f64; 2],
}

impl SkySampler {
    /// Whole-sky sampler with a fixed seed.
    pub fn seeded(seed: u64, system: CoordinateSystem) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), system)
    }

    /// Whole-sky sampler seeded from the OS.
    pub fn from_entropy(system: CoordinateSystem) -> Self {
        Self::with_rng(StdRng::from_entropy(), system)
    }

    fn with_rng(rng: StdRng, system: CoordinateSystem) -> Self {
        Self {
            rng,
            system,
            alpha_range: [0.0, 360.0],
            delta_range: [-90.0, 90.0],
        }
    }

    /// Sampler following `config`; an unset seed draws from the OS.
    pub fn from_config(config: &SamplingConfig, system: CoordinateSystem) -> Self {
        let base = match config.seed {
            Some(seed) => Self::seeded(seed, system),
            None => Self::from_entropy(system),
        };
        base.with_ranges(config.alpha_range, config.delta_range)
    }

    pub fn with_ranges(mut self, alpha_range: [f64; 2], delta_range: [f64; 2]) -> Self {
        self.alpha_range = alpha_range;
        self.delta_range = delta_range;
        self
    }
}

impl Iterator for SkySampler {
    type Item = SkyCoordinate;

    fn next(&mut self) -> Option<SkyCoordinate> {
        let [a0, a1] = self.alpha_range;
        let [d0, d1] = self.delta_range;
        let alpha = if a0 < a1 { self.rng.gen_range(a0..a1) } else { a0 };
        let delta = if d0 <= d1 { self.rng.gen_range(d0..=d1) } else { d0 };
        Some(SkyCoordinate::new(alpha, delta, self.system))
    }
}
