//! Random draws for spontaneous participation

use rand::Rng;

/// Source of uniform draws in `[0, 1)` for the reply-eligibility check
pub trait TriggerSampler: Send + Sync {
    /// Draw one sample
    fn sample(&self) -> f64;
}

/// Thread-local RNG sampler
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSampler;

impl TriggerSampler for RandomSampler {
    fn sample(&self) -> f64 {
        rand::thread_rng().r#gen::<f64>()
    }
}

/// Always returns the same draw.
///
/// `FixedSampler(0.0)` triggers whenever heartbeat is above zero;
/// `FixedSampler(1.0)` never triggers.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub f64);

impl TriggerSampler for FixedSampler {
    fn sample(&self) -> f64 {
        self.0
    }
}
