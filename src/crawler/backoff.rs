use rand::Rng;
use std::time::Duration;

/// Delay before retry attempt `n`: `base * 2^n` plus uniform jitter in `[0, max_jitter]`
#[derive(Debug, Clone, Copy)]
pub struct RetryBackoff {
    base: Duration,
    max_jitter: Duration,
}

impl RetryBackoff {
    pub const fn new(base: Duration, max_jitter: Duration) -> Self {
        Self { base, max_jitter }
    }

    /// Deterministic part of the delay, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base.saturating_mul(factor)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let backoff = RetryBackoff::new(Duration::from_millis(100), Duration::ZERO);
        assert_eq!(backoff.delay(0).as_millis(), 100);
        assert_eq!(backoff.delay(1).as_millis(), 200);
        assert_eq!(backoff.delay(2).as_millis(), 400);
    }

    #[test]
    fn test_jitter_bounds() {
        let backoff = RetryBackoff::new(Duration::from_millis(100), Duration::from_millis(50));
        for _ in 0..100 {
            let d = backoff.delay(1).as_millis();
            assert!((200..=250).contains(&d), "delay {} out of bounds", d);
        }
    }

    #[test]
    fn test_large_attempt_saturates() {
        let backoff = RetryBackoff::new(Duration::from_secs(2), Duration::ZERO);
        assert!(backoff.delay(100) >= backoff.delay(16));
    }
}
