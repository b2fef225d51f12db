//! Retry utilities with exponential backoff for provider calls.
//!
//! Every attempt runs under its own timeout; dropping the timed-out future
//! cancels the underlying request.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::config::VerificationConfig;
use crate::sources::SourceError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Timeout applied to each individual attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            backoff_multiplier: 2.0,
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&VerificationConfig> for RetryConfig {
    fn from(config: &VerificationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            backoff_multiplier: 2.0,
            attempt_timeout: config.timeout(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based)
    fn backoff(&self, retry: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powf(retry.saturating_sub(1) as f64);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Network connectivity issues
    Network,
    /// Rate limit exceeded (with optional retry-after seconds)
    RateLimit(Option<u64>),
    /// Server error (5xx)
    ServerError,
    /// Attempt timed out
    Timeout,
}

impl TransientError {
    /// Check if a SourceError represents a transient error
    pub fn from_source_error(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::Network(_) => Some(TransientError::Network),
            SourceError::Timeout => Some(TransientError::Timeout),
            SourceError::RateLimit(after) => Some(TransientError::RateLimit(*after)),
            SourceError::Server(_) => Some(TransientError::ServerError),
            _ => None,
        }
    }

    /// Minimum delay this error asks for before the next attempt
    fn requested_delay(&self) -> Duration {
        match self {
            TransientError::RateLimit(Some(seconds)) => Duration::from_secs(*seconds),
            _ => Duration::ZERO,
        }
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded
    Success(T),
    /// Operation failed with a transient error after all retries
    TransientFailure(SourceError, TransientError, u32),
    /// Operation failed with a permanent error
    PermanentFailure(SourceError),
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, SourceError> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::TransientFailure(error, _, _) => Err(error),
            RetryResult::PermanentFailure(error) => Err(error),
        }
    }
}

/// Execute an async operation with a per-attempt timeout and retries
///
/// Permanent errors (not found, parse, invalid request) return immediately;
/// transient ones are retried `max_retries` times with exponential backoff.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, label: &str, operation: F) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut operation = operation;
    let mut attempts = 0;

    loop {
        attempts += 1;

        let error = match timeout(config.attempt_timeout, operation()).await {
            Ok(Ok(value)) => {
                if attempts > 1 {
                    tracing::info!(
                        "{} succeeded on attempt {} after {} transient failures",
                        label,
                        attempts,
                        attempts - 1
                    );
                }
                return RetryResult::Success(value);
            }
            Ok(Err(error)) => error,
            Err(_) => SourceError::Timeout,
        };

        let Some(transient) = TransientError::from_source_error(&error) else {
            return RetryResult::PermanentFailure(error);
        };

        if attempts > config.max_retries {
            tracing::warn!("{} failed after {} attempts: {}", label, attempts, error);
            return RetryResult::TransientFailure(error, transient, attempts);
        }

        let delay = std::cmp::min(
            std::cmp::max(config.backoff(attempts), transient.requested_delay()),
            config.max_delay,
        );

        tracing::debug!(
            "{}: transient error on attempt {}: {:?}, retrying in {:?}",
            label,
            attempts,
            transient,
            delay
        );

        sleep(delay).await;
    }
}
