use std::future::Future;
use std::time;

use tracing::warn;

use crate::metrics_consts::STORE_RETRIES;
use crate::store::StoreError;

#[derive(Copy, Clone, Debug)]
/// How many times a store request is attempted, and how long to wait between attempts.
pub struct RetryPolicy {
    /// Total attempts per batch, including the first one. Always at least 1.
    max_attempts: u32,
    /// Coefficient to multiply initial_interval with for every past attempt. 1 means fixed backoff.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    /// A fixed delay between attempts.
    pub fn fixed(max_attempts: u32, interval: time::Duration) -> Self {
        Self::new(max_attempts, 1, interval, None)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calculate the time to wait after the given (zero-based) failed attempt.
    pub fn time_until_next_retry(&self, attempt: u32) -> time::Duration {
        let factor = self.backoff_coefficient.saturating_pow(attempt);
        let candidate_interval = self.initial_interval.saturating_mul(factor);

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }
}

/// A store call that ran out of attempts or hit a fatal fault.
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub error: StoreError,
}

/// Run `call` until it succeeds, fails fatally, or `policy` runs out of attempts.
///
/// `stage` and `batch` only label the log lines.
pub async fn retry_store_call<T, F, Fut>(
    policy: &RetryPolicy,
    stage: &'static str,
    batch: usize,
    mut call: F,
) -> Result<T, Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.time_until_next_retry(attempt - 1);
                warn!(
                    stage,
                    batch,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable store error: {}",
                    error
                );
                metrics::counter!(STORE_RETRIES, "stage" => stage).increment(1);
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(Exhausted {
                    attempts: attempt,
                    error,
                })
            }
        }
    }
}
