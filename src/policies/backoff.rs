//! # Delay between resubscription attempts.
//!
//! [`BackoffPolicy`] computes the wait before attempt `n` as
//! `first × factor^n`, clamped to `max`. With `factor = 1.0` the delay is
//! constant, which is what the watcher uses.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use gosei::BackoffPolicy;
//!
//! let fixed = BackoffPolicy::fixed(Duration::from_secs(5));
//! assert_eq!(fixed.next(0), Duration::from_secs(5));
//! assert_eq!(fixed.next(7), Duration::from_secs(5));
//!
//! let growing = BackoffPolicy { first: Duration::from_millis(100), max: Duration::from_secs(1), factor: 2.0 };
//! assert_eq!(growing.next(1), Duration::from_millis(200));
//! assert_eq!(growing.next(10), Duration::from_secs(1));
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry delay policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth factor; `1.0` keeps the delay constant.
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Constant 5s delay.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl BackoffPolicy {
    /// Constant delay of `delay` for every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
        }
    }

    /// Delay before the given attempt (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Sleeps for `next(attempt)`.
    ///
    /// Returns `false` if `cancel` fired first.
    pub async fn wait(&self, attempt: u32, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.next(attempt)) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(500));
        for attempt in [0, 1, 5, 1_000, u32::MAX] {
            assert_eq!(policy.next(attempt), Duration::from_millis(500));
        }
    }

    #[test]
    fn growth_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
        };
        assert_eq!(policy.next(3), Duration::from_millis(800));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn first_above_max_uses_max() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 1.0,
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_elapses_or_aborts() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        assert!(policy.wait(0, &cancel).await);
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        cancel.cancel();
        assert!(!policy.wait(1, &cancel).await);
    }
}
