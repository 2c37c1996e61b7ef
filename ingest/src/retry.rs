//! Bounded fixed-interval retries.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// Pauses between attempts. Injected so tests need no wall clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry an operation a fixed number of times with a fixed pause.
///
/// There is no backoff growth and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt bound and pause.
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// `operation` receives the 1-based attempt number. `on_retry` is called
    /// with the attempt number and error of every failure that is followed
    /// by another attempt; the pause happens right after it. The error of
    /// the last attempt is returned as is.
    pub async fn run<T, E, F, Fut, R>(
        &self,
        sleeper: &dyn Sleeper,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut(u32, &E),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    on_retry(attempt, &err);
                    sleeper.sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
