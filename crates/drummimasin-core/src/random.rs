//! Injectable randomness for pattern fills and remix rolls

/// Source of uniform random numbers in `[0, 1)`
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;

    /// Uniform index in `0..len`; `len` must be non-zero
    fn next_index(&mut self, len: usize) -> usize {
        ((self.next_f64() * len as f64) as usize).min(len.saturating_sub(1))
    }
}

/// `fastrand`-backed generator, reproducible when seeded
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: fastrand::Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self { rng: fastrand::Rng::with_seed(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: fastrand::Rng::new() }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.f64()
    }

    fn next_index(&mut self, len: usize) -> usize {
        self.rng.usize(..len)
    }
}

/// Replays a fixed cycle of values; handy for pinning down remix rolls
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        let Some(value) = self.values.get(self.cursor % self.values.len().max(1)).copied() else {
            return 0.0;
        };
        self.cursor += 1;
        value
    }
}
