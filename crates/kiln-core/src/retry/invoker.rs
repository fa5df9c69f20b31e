//! Retrying wrapper around a single generation call.

use std::future::Future;

use tracing::warn;

use super::policy::BackoffPolicy;
use crate::cancel::CancelFlag;
use crate::error::GenerateError;

/// Executes one remote operation, transparently retrying transient failures.
///
/// Attempts within one invocation are strictly sequential: attempt `n + 1`
/// never starts before attempt `n` has failed and its backoff delay has
/// elapsed. Terminal errors propagate on first occurrence; a transient error
/// that survives the whole budget is re-raised unmodified.
///
/// The wrapped operation is not assumed idempotent upstream: a retried call
/// may double-bill a generation if the remote completed the work despite
/// reporting a transient-looking failure. Accepted tradeoff.
#[derive(Debug, Clone)]
pub struct RetryingInvoker {
    policy: BackoffPolicy,
    cancel: CancelFlag,
}

impl RetryingInvoker {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            cancel: CancelFlag::new(),
        }
    }

    /// Tie this invoker to an externally owned cancellation flag.
    pub fn with_cancel(policy: BackoffPolicy, cancel: CancelFlag) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails terminally, or the retry
    /// budget is spent.
    pub async fn invoke<T, F, Fut>(&self, mut operation: F) -> Result<T, GenerateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerateError>>,
    {
        let mut attempt = 1u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(GenerateError::Cancelled);
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_transient() || attempt >= self.policy.max_retries {
                        return Err(error);
                    }

                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient generation failure, backing off"
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(GenerateError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryingInvoker {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
