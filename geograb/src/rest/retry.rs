//! Retry with exponential backoff

use super::types::RestError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Attempt ceiling and backoff schedule for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError {
    /// Cancellation was observed between attempts
    Cancelled { attempts: u32 },
    /// Non-retryable failure, or the attempt ceiling was reached
    Failed { error: RestError, attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Cancelled { attempts } | RetryError::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Runs `op` until it succeeds, fails permanently or runs out of attempts.
///
/// Returns the value with the number of attempts it took. `on_retry` is told
/// about each failure that will be retried.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    label: &str,
    mut on_retry: impl FnMut(u32, &RestError),
    mut op: F,
) -> Result<(T, u32), RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RestError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(RetryError::Cancelled {
                attempts: attempt - 1,
            });
        }

        let error = match op().await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            warn!(
                request = label,
                attempt = attempt,
                retryable = error.is_retryable(),
                error = %error,
                "Request failed"
            );
            return Err(RetryError::Failed {
                error,
                attempts: attempt,
            });
        }

        on_retry(attempt, &error);
        let backoff = policy.delay_for(attempt);
        trace!(
            request = label,
            attempt = attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Backoff before retry"
        );
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(RetryError::Cancelled { attempts: attempt });
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
            None => tokio::time::sleep(backoff).await,
        }
    }
}
