//! Account-wide request rate limiting and retry with exponential backoff.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

/// Caps outbound requests to `max_requests` per rolling `window`.
///
/// Each acquisition holds its permit for the full window before returning it,
/// so no window of that length can ever contain more than `max_requests`
/// requests. Clones share the same budget.
#[derive(Clone)]
pub struct RequestRateLimiter {
    semaphore: Arc<Semaphore>,
    max_requests: usize,
    window: Duration,
}

impl RequestRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_requests)),
            max_requests,
            window,
        }
    }

    /// Requests that could be sent right now without waiting.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait until a request may be sent, then consume one slot.
    pub async fn acquire(&self) {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed.
            Err(_) => return,
        };
        if self.semaphore.available_permits() == 0 {
            log::debug!(
                "rate limit reached: {} requests per {:?}",
                self.max_requests,
                self.window
            );
        }

        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            drop(permit);
        });
    }
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each subsequent one.
    pub factor: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            factor: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }
}

/// The last error seen once retrying stops.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Delay to wait after the `failed_attempt`-th attempt (1-indexed) fails.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.factor
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
    /// or `max_attempts` is reached.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        is_retryable: P,
        mut op: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= max_attempts || !is_retryable(&error) {
                        return Err(RetryFailure {
                            error,
                            attempts: attempt,
                        });
                    }
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "attempt {attempt}/{max_attempts} failed: {error}; retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
