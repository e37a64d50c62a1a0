//! Uniform random source for idle action selection

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform samples in `[0, 1)`
pub trait UnitRandom: Send {
    /// Next sample
    fn next_unit(&mut self) -> f64;
}

/// `StdRng`-backed source, seeded from entropy or a fixed seed
pub struct StdRandom(StdRng);

impl StdRandom {
    /// Seed from OS entropy
    #[must_use]
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Reproducible sequence from a fixed seed
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl UnitRandom for StdRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Replays a fixed list of samples, then repeats a fallback
#[derive(Clone, Debug)]
pub struct ScriptedRandom {
    values: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedRandom {
    /// Replay `values` in order, then return 0.0 forever
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().collect(),
            fallback: 0.0,
        }
    }

    /// Value returned once the script runs out
    #[must_use]
    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }
}

impl UnitRandom for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        self.values.pop_front().unwrap_or(self.fallback)
    }
}
