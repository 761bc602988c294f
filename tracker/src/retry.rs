use crate::client::CallError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound of the uniform jitter fraction added on top of the
/// exponential term.
pub const JITTER_FRACTION_MAX: f64 = 0.1;

/// Custom retry predicate: receives the classified error and the number of
/// attempts still available after the current one.
pub type ShouldRetry = Arc<dyn Fn(&CallError, u32) -> bool + Send + Sync>;

/// Immutable retry policy. Holds no state across attempts; the delay for a
/// given attempt is computed by [`backoff_delay`].
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (3 means up to 4 calls total).
    pub retries: u32,
    pub factor: f64,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    /// Overrides the default error classification when set.
    pub should_retry: Option<ShouldRetry>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            factor: 2.0,
            min_timeout: Duration::from_millis(1000),
            max_timeout: Duration::from_millis(10_000),
            should_retry: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("factor", &self.factor)
            .field("min_timeout", &self.min_timeout)
            .field("max_timeout", &self.max_timeout)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl RetryPolicy {
    /// Decide whether the error warrants another attempt. The custom
    /// predicate, when present, fully replaces the default classification.
    pub fn wants_retry(&self, error: &CallError, remaining_attempts: u32) -> bool {
        if remaining_attempts == 0 {
            return false;
        }
        match &self.should_retry {
            Some(predicate) => predicate(error, remaining_attempts),
            None => error.is_retryable(),
        }
    }
}

/// Delay before the retry following `attempt` (counted from 1).
///
/// `delay = min(max_timeout, min_timeout * factor^(attempt-1) * (1 + jitter))`
///
/// The jitter fraction is passed in rather than sampled here so the
/// computation stays deterministic; callers sample it uniformly from
/// `[0, JITTER_FRACTION_MAX)`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, jitter_fraction: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let raw = policy.min_timeout.as_millis() as f64
        * policy.factor.powi(exponent)
        * (1.0 + jitter_fraction);
    let capped = raw.min(policy.max_timeout.as_millis() as f64);
    Duration::from_millis(capped as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn test_first_attempt_delay_window() {
        // factor=2, min=1000ms: attempt 1 lands in [1000, 1100).
        assert_eq!(backoff_delay(&policy(), 1, 0.0).as_millis(), 1000);
        assert!(backoff_delay(&policy(), 1, 0.0999).as_millis() < 1100);
    }

    #[test]
    fn test_second_attempt_delay_window() {
        assert_eq!(backoff_delay(&policy(), 2, 0.0).as_millis(), 2000);
        assert!(backoff_delay(&policy(), 2, 0.0999).as_millis() < 2200);
    }

    #[test]
    fn test_delay_monotonic_without_jitter() {
        let mut last = Duration::ZERO;
        for attempt in 1..=4 {
            let delay = backoff_delay(&policy(), attempt, 0.0);
            assert!(delay >= last);
            last = delay;
        }
    }

    #[test]
    fn test_delay_never_exceeds_max() {
        for attempt in 1..=20 {
            let delay = backoff_delay(&policy(), attempt, JITTER_FRACTION_MAX);
            assert!(delay <= policy().max_timeout, "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_large_attempt_saturates() {
        let delay = backoff_delay(&policy(), u32::MAX, 0.0);
        assert_eq!(delay, policy().max_timeout);
    }

    #[test]
    fn test_custom_predicate_overrides_classification() {
        let policy = RetryPolicy {
            should_retry: Some(Arc::new(|_, _| true)),
            ..RetryPolicy::default()
        };
        // Timeout is not retryable by default; the predicate says otherwise.
        let timeout = CallError::Timeout {
            url: "http://upstream".into(),
        };
        assert!(policy.wants_retry(&timeout, 1));
        assert!(!policy.wants_retry(&timeout, 0));
    }

    #[test]
    fn test_default_classification_used_without_predicate() {
        let policy = RetryPolicy::default();
        let timeout = CallError::Timeout {
            url: "http://upstream".into(),
        };
        let server_error = CallError::UpstreamStatus {
            url: "http://upstream".into(),
            status: 503,
        };
        assert!(!policy.wants_retry(&timeout, 3));
        assert!(policy.wants_retry(&server_error, 3));
    }
}
