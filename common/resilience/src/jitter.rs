use std::time::Duration;

use rand::Rng;

/// Jitter strategy applied to a computed backoff delay.
#[derive(Debug, Clone, Copy)]
pub enum Jitter {
    /// No jitter; delay passes through unchanged.
    None,
    /// Uniformly sampled in `[0, delay]`.
    Full,
    /// Uniformly sampled in `[delay/2, delay]`.
    Equal,
    /// `delay * (1 + U(-factor, +factor))`, clamped to non-negative. This is
    /// the shape used by the retry executor's default policy.
    Symmetric { factor: f64 },
    /// AWS-style decorrelated jitter: `U(base, prev * 3)`, capped at `max`.
    Decorrelated { base: Duration, max: Duration },
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        self.apply_with_rng(delay, &mut rng)
    }

    pub fn apply_with_rng<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = delay.as_millis() as u64;
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(rng.gen_range(0..=millis))
                }
            }
            Jitter::Equal => {
                let millis = delay.as_millis() as u64;
                let half = millis / 2;
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(rng.gen_range(half..=millis))
                }
            }
            Jitter::Symmetric { factor } => {
                let factor = factor.clamp(0.0, 1.0);
                let sample: f64 = rng.gen_range(-factor..=factor);
                let scaled = delay.as_secs_f64() * (1.0 + sample);
                Duration::from_secs_f64(scaled.max(0.0))
            }
            Jitter::Decorrelated { base, max } => {
                let lower = base.as_millis() as u64;
                let upper = (delay.as_millis() as u64).saturating_mul(3).max(lower);
                let sampled = if upper <= lower {
                    lower
                } else {
                    rng.gen_range(lower..=upper)
                };
                Duration::from_millis(sampled).min(*max)
            }
        }
    }
}
