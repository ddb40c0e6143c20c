//! Retry policy for remote listing calls
//!
//! Every directory listing goes through [`RetryPolicy::execute`], which:
//! - classifies a failure as rate limited, server error, network error or fatal
//! - retries the retryable classes with capped exponential backoff
//! - paces consecutive requests with a per-worker adaptive delay
//!
//! The adaptive delay is AIMD-style congestion control: it doubles after a
//! rate-limited response and halves after a run of clean successes. It is
//! private to the worker that owns the policy; workers never coordinate.

use crate::error::{ListError, ListResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// Granularity of cancellable sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Failure taxonomy used to pick a retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// 429-equivalent
    RateLimited,
    /// 5xx-equivalent
    ServerError,
    /// Timeout or connection failure
    NetworkError,
    /// Permission, not-found or malformed request; never retried
    Fatal,
}

impl FailureClass {
    /// Whether a failure of this class is worth another attempt
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }
}

/// Retry and pacing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempt ceiling shared by all retryable classes
    pub max_attempts: u32,

    /// Base of the exponential backoff
    pub base_delay: Duration,

    /// Backoff cap for rate-limited responses
    pub rate_limit_cap: Duration,

    /// Backoff cap for server and network errors
    pub transient_cap: Duration,

    /// Floor (and starting value) of the adaptive inter-request delay
    pub min_pacing: Duration,

    /// Ceiling of the adaptive inter-request delay
    pub max_pacing: Duration,

    /// Consecutive successes before the adaptive delay is halved
    pub decay_after: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            rate_limit_cap: Duration::from_secs(32),
            transient_cap: Duration::from_secs(16),
            min_pacing: Duration::from_millis(50),
            max_pacing: Duration::from_secs(1),
            decay_after: 10,
        }
    }
}

impl RetryConfig {
    /// Backoff cap for a failure class
    pub fn cap_for(&self, class: FailureClass) -> Duration {
        match class {
            FailureClass::RateLimited => self.rate_limit_cap,
            FailureClass::ServerError | FailureClass::NetworkError => self.transient_cap,
            FailureClass::Fatal => Duration::ZERO,
        }
    }
}

/// Compute `min(base * 2^n, cap)` for the given class
pub fn backoff_delay(config: &RetryConfig, class: FailureClass, n: u32) -> Duration {
    let cap = config.cap_for(class);
    let factor = 1u32.checked_shl(n).unwrap_or(u32::MAX);
    config.base_delay.saturating_mul(factor).min(cap)
}

/// Per-call retry bookkeeping, discarded once the call resolves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Failed attempts so far
    pub attempt: u32,

    /// Delay before the next attempt
    pub next_delay: Duration,
}

/// AIMD inter-request delay owned by one worker
#[derive(Debug, Clone)]
pub struct AdaptiveDelay {
    current: Duration,
    min: Duration,
    max: Duration,
    decay_after: u32,
    success_streak: u32,
}

impl AdaptiveDelay {
    /// Create a delay starting at its floor
    pub fn new(min: Duration, max: Duration, decay_after: u32) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
            decay_after: decay_after.max(1),
            success_streak: 0,
        }
    }

    /// Current delay between requests
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Multiplicative increase after a rate-limited response
    pub fn on_rate_limited(&mut self) {
        self.success_streak = 0;
        self.current = self.current.saturating_mul(2).clamp(self.min, self.max);
    }

    /// Count a success; halve the delay after enough of them in a row
    pub fn on_success(&mut self) {
        self.success_streak += 1;
        if self.success_streak >= self.decay_after {
            self.success_streak = 0;
            self.current = (self.current / 2).max(self.min);
        }
    }
}

/// Counters kept by a policy over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Remote calls issued, including retries
    pub requests: u64,

    /// Retries performed
    pub retries: u64,

    /// Rate-limited responses seen
    pub rate_limited: u64,

    /// Calls that gave up at the attempt ceiling
    pub exhausted: u64,
}

/// Retry policy wrapping remote listing calls for one worker
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    pacing: AdaptiveDelay,
    cancel: Option<Arc<AtomicBool>>,
    stats: RetryStats,
}

impl RetryPolicy {
    /// Create a policy with its own pacing state
    pub fn new(config: RetryConfig) -> Self {
        let pacing = AdaptiveDelay::new(config.min_pacing, config.max_pacing, config.decay_after);
        Self {
            config,
            pacing,
            cancel: None,
            stats: RetryStats::default(),
        }
    }

    /// Abort waits and pending calls once this flag is raised
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Current adaptive inter-request delay
    pub fn pacing(&self) -> Duration {
        self.pacing.current()
    }

    /// Lifetime counters
    pub fn stats(&self) -> RetryStats {
        self.stats
    }

    /// Whether shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run one remote call under the policy
    ///
    /// Fatal failures return immediately. Retryable failures are retried
    /// until `max_attempts` failures have been seen, after which the last
    /// cause is surfaced inside [`ListError::RetriesExhausted`].
    pub fn execute<T, F>(&mut self, path: &str, mut op: F) -> ListResult<T>
    where
        F: FnMut() -> ListResult<T>,
    {
        let mut state = RetryState::default();

        loop {
            if self.stats.requests > 0 {
                self.pause(self.pacing.current(), path)?;
            } else if self.is_cancelled() {
                return Err(ListError::Cancelled { path: path.into() });
            }

            self.stats.requests += 1;
            let error = match op() {
                Ok(value) => {
                    self.pacing.on_success();
                    return Ok(value);
                }
                Err(e) => e,
            };

            let class = error.class();
            if !class.is_retryable() {
                return Err(error);
            }

            if class == FailureClass::RateLimited {
                self.stats.rate_limited += 1;
                self.pacing.on_rate_limited();
            }

            state.attempt += 1;
            if state.attempt >= self.config.max_attempts {
                self.stats.exhausted += 1;
                debug!(path, attempts = state.attempt, error = %error, "Retries exhausted");
                return Err(ListError::RetriesExhausted {
                    path: path.into(),
                    attempts: state.attempt,
                    last: Box::new(error),
                });
            }

            state.next_delay = backoff_delay(&self.config, class, state.attempt);
            self.stats.retries += 1;
            debug!(
                path,
                attempt = state.attempt,
                class = ?class,
                delay_ms = state.next_delay.as_millis() as u64,
                pacing_ms = self.pacing.current().as_millis() as u64,
                "Retrying listing"
            );
            self.pause(state.next_delay, path)?;
        }
    }

    /// Sleep in slices so shutdown is noticed promptly
    fn pause(&self, delay: Duration, path: &str) -> ListResult<()> {
        let mut remaining = delay;
        loop {
            if self.is_cancelled() {
                trace!(path, "Wait cancelled");
                return Err(ListError::Cancelled { path: path.into() });
            }
            if remaining.is_zero() {
                return Ok(());
            }
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining -= slice;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            rate_limit_cap: Duration::ZERO,
            transient_cap: Duration::ZERO,
            min_pacing: Duration::ZERO,
            max_pacing: Duration::ZERO,
            decay_after: 3,
        }
    }

    #[test]
    fn test_backoff_monotonic_and_capped() {
        let config = RetryConfig::default();
        for class in [
            FailureClass::RateLimited,
            FailureClass::ServerError,
            FailureClass::NetworkError,
        ] {
            let cap = config.cap_for(class);
            for n in 0..40 {
                let this = backoff_delay(&config, class, n);
                let next = backoff_delay(&config, class, n + 1);
                assert!(this <= next, "{class:?} n={n}");
                assert!(next <= cap);
            }
        }
    }

    #[test]
    fn test_backoff_values() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(&config, FailureClass::RateLimited, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, FailureClass::RateLimited, 5), Duration::from_secs(32));
        assert_eq!(backoff_delay(&config, FailureClass::RateLimited, 9), Duration::from_secs(32));
        assert_eq!(backoff_delay(&config, FailureClass::ServerError, 5), Duration::from_secs(16));
        assert_eq!(backoff_delay(&config, FailureClass::Fatal, 3), Duration::ZERO);
    }

    #[test]
    fn test_retries_until_success() {
        let mut policy = RetryPolicy::new(instant_config());
        let mut calls = 0;

        let result = policy.execute("/p", || {
            calls += 1;
            if calls < 3 {
                Err(ListError::RateLimited { path: "/p".into() })
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result, Ok(3));
        assert_eq!(policy.pacing(), Duration::ZERO);
        assert_eq!(policy.stats().retries, 2);
        assert_eq!(policy.stats().rate_limited, 2);
    }

    #[test]
    fn test_pacing_grows_on_rate_limits_and_decays() {
        let config = RetryConfig {
            min_pacing: Duration::from_millis(1),
            max_pacing: Duration::from_millis(8),
            decay_after: 2,
            ..instant_config()
        };
        let mut policy = RetryPolicy::new(config);
        let mut calls = 0;

        let result = policy.execute("/p", || {
            calls += 1;
            if calls <= 4 {
                Err(ListError::RateLimited { path: "/p".into() })
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Ok(()));
        assert_eq!(policy.stats().rate_limited, 4);
        // 1 -> 2 -> 4 -> 8, then held at the ceiling
        assert_eq!(policy.pacing(), Duration::from_millis(8));

        policy.execute("/p", || Ok(())).unwrap();
        assert_eq!(policy.pacing(), Duration::from_millis(4));

        for _ in 0..4 {
            policy.execute("/p", || Ok(())).unwrap();
        }
        assert_eq!(policy.pacing(), Duration::from_millis(1));
        assert_eq!(policy.stats().requests, 10);
    }

    #[test]
    fn test_exhaustion_surfaces_last_cause() {
        let mut policy = RetryPolicy::new(instant_config());
        let mut calls = 0;

        let result: ListResult<()> = policy.execute("/p", || {
            calls += 1;
            Err(ListError::Network {
                path: "/p".into(),
                reason: format!("timeout {calls}"),
            })
        });

        assert_eq!(calls, 5);
        match result {
            Err(ListError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 5);
                assert!(matches!(*last, ListError::Network { ref reason, .. } if reason == "timeout 5"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(policy.stats().exhausted, 1);
    }

    #[test]
    fn test_fatal_is_not_retried() {
        let mut policy = RetryPolicy::new(instant_config());
        let mut calls = 0;

        let result: ListResult<()> = policy.execute("/p", || {
            calls += 1;
            Err(ListError::PermissionDenied { path: "/p".into() })
        });

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(ListError::PermissionDenied { .. })));
    }

    #[test]
    fn test_cancelled_before_call() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut policy = RetryPolicy::new(instant_config()).with_cancel(flag);
        let mut calls = 0;

        let result = policy.execute("/p", || {
            calls += 1;
            Ok(())
        });

        assert_eq!(calls, 0);
        assert!(matches!(result, Err(ListError::Cancelled { .. })));
    }

    #[test]
    fn test_adaptive_delay_aimd() {
        let mut delay = AdaptiveDelay::new(Duration::from_millis(50), Duration::from_millis(400), 2);
        assert_eq!(delay.current(), Duration::from_millis(50));

        delay.on_rate_limited();
        assert_eq!(delay.current(), Duration::from_millis(100));
        delay.on_rate_limited();
        delay.on_rate_limited();
        delay.on_rate_limited();
        assert_eq!(delay.current(), Duration::from_millis(400));

        delay.on_success();
        assert_eq!(delay.current(), Duration::from_millis(400));
        delay.on_success();
        assert_eq!(delay.current(), Duration::from_millis(200));

        for _ in 0..20 {
            delay.on_success();
        }
        assert_eq!(delay.current(), Duration::from_millis(50));
    }

    #[test]
    fn test_rate_limit_resets_success_streak() {
        let mut delay = AdaptiveDelay::new(Duration::from_millis(10), Duration::from_secs(1), 2);
        delay.on_rate_limited();
        delay.on_success();
        delay.on_rate_limited();
        delay.on_success();
        assert_eq!(delay.current(), Duration::from_millis(40));
    }
}
