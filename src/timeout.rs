//! Timeout policy for bounding a single async operation's duration.
//!
//! Used for the per-request and per-attempt timeouts in the transport layer.
//! Wraps `tokio::time::timeout`; on expiry the inner future is dropped, not
//! forcibly aborted, so cancellation-unsafe work may leave partial state.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum allowed timeout duration (30 days), guarding against accidental
/// `Duration::MAX` timeouts while permitting long-running jobs.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("timeout duration must be > 0")]
    ZeroDuration,
    #[error("timeout duration {requested:?} exceeds maximum allowed {limit:?}")]
    ExceedsMaximum { requested: Duration, limit: Duration },
}

/// Marker returned when an operation did not complete before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub elapsed: Duration,
    pub timeout: Duration,
}

/// Policy that enforces a maximum duration on async operations.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl TimeoutPolicy {
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        Self::new_with_max(duration, MAX_TIMEOUT)
    }

    pub fn new_with_max(duration: Duration, max: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() {
            return Err(TimeoutError::ZeroDuration);
        }
        if duration > max {
            return Err(TimeoutError::ExceedsMaximum { requested: duration, limit: max });
        }
        Ok(Self { duration })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Execute `operation`, returning `Err(Elapsed)` if the deadline passes first.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, Elapsed>
    where
        Fut: Future<Output = T> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.duration, operation()).await {
            Ok(value) => Ok(value),
            Err(_) => Err(Elapsed { elapsed: start.elapsed(), timeout: self.duration }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_timeout() {
        let timeout = TimeoutPolicy::new(Duration::from_millis(100)).unwrap();
        let result = timeout
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                42
            })
            .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn times_out_long_operation() {
        tokio::time::pause();
        let timeout = TimeoutPolicy::new(Duration::from_millis(50)).unwrap();
        let fut = timeout.execute(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            42
        });
        tokio::pin!(fut);
        tokio::time::advance(Duration::from_millis(51)).await;
        let result = fut.await;
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_duration() {
        assert_eq!(TimeoutPolicy::new(Duration::ZERO).unwrap_err(), TimeoutError::ZeroDuration);
    }

    #[test]
    fn rejects_excessive_duration() {
        let too_big = MAX_TIMEOUT + Duration::from_secs(1);
        assert!(matches!(
            TimeoutPolicy::new(too_big).unwrap_err(),
            TimeoutError::ExceedsMaximum { .. }
        ));
    }
}
