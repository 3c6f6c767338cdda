use std::time::Duration;
use tracing::{error, warn};

/// Backoff never grows beyond one minute
const MAX_BACKOFF_MS: u64 = 60_000;

/// Retry settings for operations outside the sync pipeline (startup connections).
/// The pipeline itself never retries: a failed run is retried by the next tick.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            base_delay_ms,
            max_retries,
        }
    }

    /// Exponential backoff with ±20% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(MAX_BACKOFF_MS);

        let jitter = (rand::random::<f64>() * 0.4 - 0.2) * capped as f64;
        Duration::from_millis((capped as f64 + jitter).max(0.0) as u64)
    }
}

pub async fn with_retry<F, Fut, T, E>(
    operation: F,
    policy: RetryPolicy,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if attempt > policy.max_retries {
                    error!(
                        "Operation '{}' failed after {} attempts: {}",
                        operation_name, attempt, err
                    );
                    return Err(err);
                }

                let backoff = policy.backoff(attempt);
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {}ms",
                    operation_name,
                    attempt,
                    policy.max_retries,
                    err,
                    backoff.as_millis()
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}
