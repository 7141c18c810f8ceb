//! Randomness seam for round outcomes and item draws

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

/// Source of uniform randomness.
///
/// Implemented for every `rand::Rng`, so a seeded `StdRng` gives
/// reproducible rounds and draws.
pub trait RandomSource {
    /// Uniform value in `[0, 1)`
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `0..len` (0 when `len <= 1`)
    fn index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let idx = (self.next_unit() * len as f64) as usize;
        idx.min(len - 1)
    }
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn next_unit(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.gen_range(0..len)
    }
}

/// RNG shared between request handlers
pub type SharedRng = Arc<Mutex<StdRng>>;

/// Build a `StdRng`, seeded when a seed is given and from entropy otherwise
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Build a shared RNG for handlers
pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    Arc::new(Mutex::new(make_rng(seed)))
}

/// Scripted source replaying fixed values, for tests
#[cfg(test)]
pub(crate) struct ScriptedSource {
    values: Vec<f64>,
    pos: usize,
}

#[cfg(test)]
impl ScriptedSource {
    pub(crate) fn new(values: &[f64]) -> Self {
        Self {
            values: values.to_vec(),
            pos: 0,
        }
    }
}

#[cfg(test)]
impl RandomSource for ScriptedSource {
    fn next_unit(&mut self) -> f64 {
        let value = self.values[self.pos % self.values.len()];
        self.pos += 1;
        value
    }
}
