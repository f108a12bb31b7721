//! Bounded retries shared by transport failures and reply validation.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use desk_core::AdviceError;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        let retries = self.max_attempts.max(1) - 1;
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(self.multiplier.max(1.0))
            .with_max_times(retries as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: AdviceError,
}

/// Runs `operation` until `validate` accepts its output, a non-retryable error
/// occurs, or `policy.max_attempts` is reached. The attempt number (1-based)
/// is passed to `operation`.
pub async fn retry_with_validation<Op, Fut, R, V, T>(
    policy: &RetryPolicy,
    mut operation: Op,
    validate: V,
) -> Result<Attempted<T>, RetryExhausted>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<R, AdviceError>>,
    V: Fn(R) -> Result<T, AdviceError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let attempts = AtomicU32::new(0);
    let counter = &attempts;
    let validate = &validate;

    let outcome = (|| {
        let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
        let pending = operation(attempt);
        async move { pending.await.and_then(validate) }
    })
    .retry(policy.backoff())
    .when(AdviceError::is_retryable)
    .notify(|err: &AdviceError, delay: Duration| {
        warn!(
            attempt = counter.load(Ordering::Relaxed),
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );
    })
    .await;

    let attempts = attempts.load(Ordering::Relaxed);
    match outcome {
        Ok(value) => Ok(Attempted { value, attempts }),
        Err(last_error) => Err(RetryExhausted {
            attempts,
            last_error,
        }),
    }
}
