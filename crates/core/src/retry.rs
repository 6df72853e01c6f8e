//! Exponential backoff
//!
//! Two shapes are provided:
//!
//! - [`retry_with_backoff`] for bounded operations that should eventually give up
//! - [`Backoff`] for supervisor loops (stream and bus reconnects) that retry forever
//!
//! Both compute delays as `min(base * 2^attempt, max)` plus up to 30% jitter.
//!
//! # Examples
//!
//! ```
//! use sentinel_core::retry::{retry_with_backoff, RetryPolicy};
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let value = retry_with_backoff(
//!     || async { Ok::<_, std::io::Error>(42) },
//!     RetryPolicy::default(),
//!     |err: &std::io::Error| err.kind() == std::io::ErrorKind::ConnectionRefused,
//! )
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 means only the initial attempt)
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Cap on the exponential growth, in milliseconds
    pub max_delay_ms: u64,

    /// Add up to 30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 3 retries, 100ms base, 5s cap, jitter on
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64, jitter: bool) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    /// 5 retries, 50ms base, 5s cap
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 5000,
            jitter: true,
        }
    }

    /// 2 retries, 500ms base, 3s cap
    pub fn gentle() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 3000,
            jitter: true,
        }
    }

    /// Unbounded retries for upstream reconnect loops: 250ms base, 30s cap
    pub fn reconnect() -> Self {
        Self {
            max_retries: u32::MAX,
            base_delay_ms: 250,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));

        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.jitter {
            let jitter_range = (capped_delay as f64 * 0.3) as u64;
            if jitter_range > 0 {
                // Sub-second clock noise is enough to de-synchronise sibling instances.
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                capped_delay.saturating_add(nanos % (jitter_range + 1))
            } else {
                capped_delay
            }
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay)
    }
}

/// Stateful backoff for loops that never give up
///
/// ```
/// use sentinel_core::retry::{Backoff, RetryPolicy};
///
/// let mut backoff = Backoff::new(RetryPolicy::new(0, 100, 1000, false));
/// assert_eq!(backoff.next_delay().as_millis(), 100);
/// assert_eq!(backoff.next_delay().as_millis(), 200);
/// backoff.reset();
/// assert_eq!(backoff.next_delay().as_millis(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay for the current attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.calculate_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Sleep for the next delay
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        sleep(delay).await;
    }

    /// Call after a successful (re)connect
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RetryPolicy::reconnect())
    }
}

/// Retries an async operation with exponential backoff
///
/// `operation` is invoked until it succeeds, `is_retryable` rejects the error,
/// or `policy.max_retries` retries have been spent. The last error is returned.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    mut operation: F,
    policy: RetryPolicy,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_retries = policy.max_retries;
    let mut backoff = Backoff::new(policy);

    loop {
        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        let spent = backoff.attempt();
        if spent >= max_retries {
            tracing::warn!(retries = spent, "Giving up after exhausting retries");
            return Err(error);
        }
        if !is_retryable(&error) {
            tracing::debug!(retries = spent, "Giving up on non-retryable error");
            return Err(error);
        }

        let delay = backoff.next_delay();
        tracing::debug!(retry = spent + 1, delay_ms = delay.as_millis() as u64, "Retrying");
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_policy_presets() {
        let default = RetryPolicy::default();
        assert_eq!(default.max_retries, 3);
        assert_eq!(default.base_delay_ms, 100);

        let aggressive = RetryPolicy::aggressive();
        assert_eq!(aggressive.max_retries, 5);
        assert_eq!(aggressive.base_delay_ms, 50);

        let gentle = RetryPolicy::gentle();
        assert_eq!(gentle.max_retries, 2);
        assert_eq!(gentle.max_delay_ms, 3000);

        let reconnect = RetryPolicy::reconnect();
        assert_eq!(reconnect.max_retries, u32::MAX);
        assert_eq!(reconnect.max_delay_ms, 30_000);
    }

    #[test]
    fn test_calculate_delay_exponential_progression() {
        let policy = RetryPolicy::new(5, 100, 10000, false);

        assert_eq!(policy.calculate_delay(0).as_millis(), 100);
        assert_eq!(policy.calculate_delay(1).as_millis(), 200);
        assert_eq!(policy.calculate_delay(2).as_millis(), 400);
        assert_eq!(policy.calculate_delay(3).as_millis(), 800);
        assert_eq!(policy.calculate_delay(4).as_millis(), 1600);
    }

    #[test]
    fn test_calculate_delay_max_cap() {
        let policy = RetryPolicy::new(10, 100, 500, false);
        assert_eq!(policy.calculate_delay(5).as_millis(), 500);
        assert_eq!(policy.calculate_delay(63).as_millis(), 500);
    }

    #[test]
    fn test_calculate_delay_with_jitter_bounds() {
        let policy = RetryPolicy::new(3, 1000, 5000, true);
        let delay_ms = policy.calculate_delay(0).as_millis();
        assert!(delay_ms >= 1000);
        assert!(delay_ms <= 1300);
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let mut backoff = Backoff::new(RetryPolicy::new(0, 10, 40, false));

        assert_eq!(backoff.next_delay().as_millis(), 10);
        assert_eq!(backoff.next_delay().as_millis(), 20);
        assert_eq!(backoff.next_delay().as_millis(), 40);
        assert_eq!(backoff.next_delay().as_millis(), 40);
        assert_eq!(backoff.attempt(), 4);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay().as_millis(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_wait_sleeps() {
        let mut backoff = Backoff::new(RetryPolicy::new(0, 1000, 1000, false));
        let start = tokio::time::Instant::now();
        backoff.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_retry_succeeds_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("success")
                }
            },
            RetryPolicy::default(),
            |_: &String| true,
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_eventually_succeeds() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("temporary failure".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            RetryPolicy::new(3, 1, 5, false),
            |_: &String| true,
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), String> = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
            RetryPolicy::new(5, 1, 5, false),
            |e: &String| e != "fatal",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), String> = retry_with_backoff(
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("still down".to_string())
                }
            },
            RetryPolicy::new(2, 1, 5, false),
            |_: &String| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
