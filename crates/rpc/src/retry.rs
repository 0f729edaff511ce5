use std::time::Duration;

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// How often an endpoint is retried, and how long to wait between retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Consecutive retryable failures tolerated before failing over. At least 1.
    pub max_retries: usize,

    /// Delay before the first retry against the same endpoint. Zero disables backoff.
    pub base_delay: Duration,

    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    /// Retries without waiting.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the number of consecutive failures tolerated per endpoint.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retrying after the `consecutive_errors`-th failure in a row.
    ///
    /// Doubles with every failure, with up to 10% jitter, capped at `max_delay`.
    #[must_use]
    pub fn delay(&self, consecutive_errors: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let exponent = consecutive_errors.saturating_sub(1).min(16) as i32;
        let factor = 2f64.powi(exponent) * fastrand::f64().mul_add(0.1, 1.0);

        std::cmp::min(self.base_delay.mul_f64(factor), self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let retry = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };

        let first = retry.delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));

        let third = retry.delay(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(440));

        assert_eq!(retry.delay(9), Duration::from_secs(1));
    }

    #[test]
    fn test_immediate_never_waits() {
        let retry = RetryConfig::immediate();

        assert_eq!(retry.max_retries, 3);
        for errors in 0..10 {
            assert_eq!(retry.delay(errors), Duration::ZERO);
        }
    }
}
