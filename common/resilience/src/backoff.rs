use std::time::Duration;

/// Backoff shape used between retry attempts. `attempt` is 1-indexed: the
/// count of attempts that have already failed, so the first retry calls
/// `delay(1)`.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    Constant {
        delay: Duration,
    },
    Linear {
        base: Duration,
    },
    Exponential {
        base: Duration,
        max: Option<Duration>,
        /// Growth factor between attempts (§3.5 `multiplier`, default 2.0).
        /// Delay for attempt `n` is `base * multiplier^(n-1)` (§4.F).
        multiplier: f64,
    },
}

impl Backoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential {
            base,
            max: Some(max),
            multiplier: 2.0,
        }
    }

    pub fn exponential_with_multiplier(base: Duration, max: Duration, multiplier: f64) -> Self {
        Backoff::Exponential {
            base,
            max: Some(max),
            multiplier,
        }
    }

    pub fn delay(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Backoff::Constant { delay } => *delay,
            Backoff::Linear { base } => base
                .checked_mul(attempt as u32)
                .unwrap_or(Duration::MAX),
            Backoff::Exponential { base, max, multiplier } => {
                let exponent = (attempt - 1) as i32;
                let factor = multiplier.powi(exponent);
                let computed = if factor.is_finite() && factor >= 0.0 {
                    let secs = base.as_secs_f64() * factor;
                    if secs.is_finite() {
                        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
                    } else {
                        Duration::MAX
                    }
                } else {
                    Duration::MAX
                };
                match max {
                    Some(cap) => computed.min(*cap),
                    None => computed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_ignores_attempt() {
        let b = Backoff::Constant {
            delay: Duration::from_millis(50),
        };
        assert_eq!(b.delay(1), Duration::from_millis(50));
        assert_eq!(b.delay(10), Duration::from_millis(50));
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let b = Backoff::exponential(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(400));
        assert_eq!(b.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn exponential_does_not_overflow() {
        let b = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: None,
            multiplier: 2.0,
        };
        assert_eq!(b.delay(1000), Duration::MAX);
    }

    #[test]
    fn exponential_honours_configured_multiplier() {
        let b = Backoff::exponential_with_multiplier(
            Duration::from_millis(100),
            Duration::from_secs(60),
            3.0,
        );
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(300));
        assert_eq!(b.delay(3), Duration::from_millis(900));
    }
}
