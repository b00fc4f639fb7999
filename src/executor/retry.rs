//! Bounded retry with a capped, growing delay.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::cloud::CloudError;

/// Attempts used when propagating tags to a freshly copied image.
pub const TAG_ATTEMPTS: u32 = 11;
/// First delay between tag attempts.
pub const TAG_INITIAL_DELAY: Duration = Duration::from_millis(200);
/// Growth factor applied to the delay after every wait.
pub const TAG_DELAY_MULTIPLIER: u32 = 2;
/// Upper bound on a single wait.
pub const TAG_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry policy: `attempts` tries separated by delays that start at
/// `initial_delay`, grow by `multiplier`, and never exceed `max_delay`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    initial_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            TAG_ATTEMPTS,
            TAG_INITIAL_DELAY,
            TAG_DELAY_MULTIPLIER,
            TAG_MAX_DELAY,
        )
    }
}

impl RetryPolicy {
    /// Creates a policy. Zero attempts are treated as one.
    #[must_use]
    pub const fn new(
        attempts: u32,
        initial_delay: Duration,
        multiplier: u32,
        max_delay: Duration,
    ) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    /// Total number of attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Waits inserted between consecutive attempts, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        let mut next = self.initial_delay.min(self.max_delay);
        let mut delays = Vec::new();
        for _ in 1..self.attempts {
            delays.push(next);
            next = next.saturating_mul(self.multiplier).min(self.max_delay);
        }
        delays
    }

    /// Runs `operation` until it succeeds, fails with an error that
    /// `should_retry` rejects, or the attempts run out. The last error is
    /// returned on exhaustion.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable [`CloudError`], or the final error once
    /// every attempt has been used.
    pub async fn run<T, Op, Fut, Retry>(
        &self,
        mut operation: Op,
        should_retry: Retry,
    ) -> Result<T, CloudError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CloudError>>,
        Retry: Fn(&CloudError) -> bool,
    {
        let mut delays = self.delays().into_iter();
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !should_retry(&err) {
                return Err(err);
            }
            let Some(delay) = delays.next() else {
                return Err(err);
            };
            debug!(attempt, ?delay, error = %err, "retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }
}
