//! Polling a remote job until it reaches a terminal state.

use std::future::Future;
use std::time::Duration;

/// What a single status probe observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Completed(T),
    Failed(String),
}

/// Terminal result of [`poll_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Completed(T),
    Failed(String),
    TimedOut { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 1.5,
            max_delay: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given (1-based) attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.factor.max(1.0).powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Calls `probe` until it reports a terminal status or `max_attempts` is used up.
///
/// Probe errors abort polling and are returned as-is; the caller decides
/// whether a transport error is worth starting over.
pub async fn poll_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    mut probe: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        match probe(attempt).await? {
            PollStatus::Completed(value) => return Ok(PollOutcome::Completed(value)),
            PollStatus::Failed(reason) => return Ok(PollOutcome::Failed(reason)),
            PollStatus::Pending => {
                tracing::debug!("Poll attempt {}/{} still pending", attempt, policy.max_attempts);
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }
    Ok(PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    })
}
