// Retry logic with server reset-time hint support
// Author: kelexine (https://github.com/kelexine)

use crate::config::FetchConfig;
use backoff::{backoff::Backoff, ExponentialBackoff};
use chrono::{DateTime, Utc};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest wait honoured from a server-provided hint.
const MAX_HINT_DELAY: Duration = Duration::from_secs(60);

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            randomization_factor: 0.3,
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.retry_count.max(1),
            initial_interval: Duration::from_millis(config.retry_initial_delay_ms),
            max_interval: Duration::from_millis(config.retry_max_delay_ms),
            ..Self::default()
        }
    }
}

/// Failure of a single attempt.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Worth another attempt, optionally after a server-suggested delay.
    Transient { error: E, retry_after: Option<Duration> },
    /// Give up immediately.
    Permanent(E),
}

impl<E> RetryError<E> {
    pub fn transient(error: E) -> Self {
        RetryError::Transient {
            error,
            retry_after: None,
        }
    }

    pub fn permanent(error: E) -> Self {
        RetryError::Permanent(error)
    }
}

/// Create exponential backoff configuration for retries
pub fn create_backoff(policy: &RetryPolicy) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: policy.initial_interval,
        initial_interval: policy.initial_interval,
        randomization_factor: policy.randomization_factor,
        multiplier: policy.multiplier,
        max_interval: policy.max_interval,
        // Attempts are bounded by max_attempts instead
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Delay until a reset instant reported by the server, capped at 60 seconds.
pub fn delay_until(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (reset_at - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .min(MAX_HINT_DELAY)
}

/// Execute operation with retry logic
/// - The operation receives the 1-based attempt number
/// - Uses the server's hint if one came with the failure
/// - Falls back to exponential backoff
/// - Gives up after `max_attempts` or on a permanent error
pub async fn with_retry<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
    E: Display,
{
    let mut backoff = create_backoff(policy);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(RetryError::Permanent(error)) => return Err(error),
            Err(RetryError::Transient { error, retry_after }) => {
                if attempt >= policy.max_attempts {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, error
                    );
                    return Err(error);
                }

                let delay = match retry_after {
                    Some(hint) => hint.min(MAX_HINT_DELAY),
                    None => backoff.next_backoff().unwrap_or(policy.max_interval),
                };
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying after {}ms",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    error,
                    delay.as_millis()
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry("test op", &fast_policy(5), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(RetryError::transient(format!("attempt {} failed", attempt)))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry("test op", &fast_policy(4), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RetryError::transient("quota exceeded".to_string())) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "quota exceeded");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry("test op", &fast_policy(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RetryError::permanent("not found".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_until_is_capped() {
        let now = Utc::now();
        assert_eq!(delay_until(now + chrono::Duration::seconds(5), now).as_secs(), 5);
        assert_eq!(delay_until(now + chrono::Duration::minutes(30), now).as_secs(), 60);
        assert_eq!(delay_until(now - chrono::Duration::seconds(5), now), Duration::ZERO);
    }
}
