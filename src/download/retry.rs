//! Retry logic for streaming attempts

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::CerberusError;

/// Retry configuration with a linearly growing delay
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `base_delay * (1 + n)` before the next one
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Delay after the given 1-based attempt failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * (1 + attempt)
    }
}

/// Retry executor
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with default configuration
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    /// Create a new retry executor with configuration
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `func` until it succeeds, fails with a non-retryable error, or
    /// the attempts run out. The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, mut func: F) -> Result<T, CerberusError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CerberusError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match func(attempt).await {
                Ok(result) => return Ok(result),
                Err(error) if !error.is_retryable() || attempt >= attempts => return Err(error),
                Err(error) => {
                    let delay = self.config.delay_after(attempt);
                    debug!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}
