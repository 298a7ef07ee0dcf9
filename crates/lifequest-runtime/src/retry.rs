//! Exponential backoff with seeded jitter.

use crate::config::RetryConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max: Duration,
    rng: ChaCha8Rng,
}

impl RetryPolicy {
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base: Duration::from_millis(cfg.base_delay_ms),
            max: Duration::from_millis(cfg.max_delay_ms.max(cfg.base_delay_ms)),
            rng: ChaCha8Rng::seed_from_u64(cfg.jitter_seed),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)` plus up to 25% jitter, capped at the maximum.
    pub fn delay_for(&mut self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.base.saturating_mul(1u32 << exp).min(self.max);
        let jitter_ms = (raw.as_millis() as u64) / 4;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            self.rng.gen_range(0..=jitter_ms)
        };
        (raw + Duration::from_millis(jitter)).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter_seed: 7,
        }
    }

    #[test]
    fn delays_grow_and_stay_bounded() {
        let mut p = RetryPolicy::new(&cfg());
        let d1 = p.delay_for(1);
        let d2 = p.delay_for(2);
        let d3 = p.delay_for(3);
        assert!(d1 >= Duration::from_millis(100) && d1 <= Duration::from_millis(125));
        assert!(d2 >= Duration::from_millis(200) && d2 <= Duration::from_millis(250));
        assert!(d3 >= Duration::from_millis(400) && d3 <= Duration::from_millis(500));
        for attempt in 4..40 {
            assert!(p.delay_for(attempt) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn same_seed_same_schedule() {
        let mut a = RetryPolicy::new(&cfg());
        let mut b = RetryPolicy::new(&cfg());
        for attempt in 1..6 {
            assert_eq!(a.delay_for(attempt), b.delay_for(attempt));
        }
    }

    #[test]
    fn zero_attempts_means_one() {
        let p = RetryPolicy::new(&RetryConfig {
            max_attempts: 0,
            ..cfg()
        });
        assert_eq!(p.max_attempts(), 1);
    }
}
