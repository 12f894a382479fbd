//! Backoff strategies for the retry executor.

use std::time::Duration;

/// Backoff strategy for retries. Attempt numbers are 0-indexed, matching the
/// retry executor's attempt counter.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Fixed delay between retries.
    Fixed { delay: Duration },
    /// Linearly increasing delay: `base * (attempt + 1)`.
    Linear { base: Duration },
    /// Exponentially increasing delay: `base * multiplier^attempt`, capped.
    Exponential { base: Duration, multiplier: f64, max: Option<Duration> },
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed { delay }
    }

    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base }
    }

    /// Exponential backoff with the default multiplier of 2.
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, multiplier: 2.0, max: None }
    }

    pub fn exponential_with_multiplier(base: Duration, multiplier: f64) -> Self {
        Backoff::Exponential { base, multiplier, max: None }
    }

    /// Set a maximum delay (applies to all variants via [`Backoff::delay`]'s caller,
    /// but is stored here for `Exponential` so it composes with the builder).
    pub fn with_max(mut self, max: Duration) -> Self {
        if let Backoff::Exponential { max: ref mut m, .. } = self {
            *m = Some(max);
        }
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Fixed { delay } => *delay,
            Backoff::Linear { base } => {
                base.checked_mul((attempt as u32).saturating_add(1))
                    .unwrap_or(Duration::from_secs(u64::MAX))
            }
            Backoff::Exponential { base, multiplier, max } => {
                let factor = multiplier.powi(attempt as i32);
                let millis = (base.as_millis() as f64) * factor;
                let exp_delay = if millis.is_finite() && millis >= 0.0 {
                    Duration::from_millis(millis.min(u64::MAX as f64) as u64)
                } else {
                    Duration::from_secs(u64::MAX)
                };
                match max {
                    Some(max) => exp_delay.min(*max),
                    None => exp_delay,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_returns_same_delay() {
        let backoff = Backoff::fixed(Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let backoff = Backoff::linear(Duration::from_millis(100));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_matches_base_times_multiplier_pow_attempt() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn exponential_backoff_respects_max() {
        let backoff = Backoff::exponential(Duration::from_millis(100)).with_max(Duration::from_secs(1));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
        assert_eq!(backoff.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn exponential_backoff_handles_large_attempts_without_panicking() {
        let backoff = Backoff::exponential(Duration::from_secs(1));
        let delay = backoff.delay(64);
        assert!(delay >= Duration::from_secs(1));
    }

    #[test]
    fn custom_multiplier_is_honored() {
        let backoff = Backoff::exponential_with_multiplier(Duration::from_millis(100), 3.0);
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(300));
        assert_eq!(backoff.delay(2), Duration::from_millis(900));
    }
}
