use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tonic::Status;
use tracing::debug;

use super::{RetryProps, RetryStrategy};

/// One attempt of a logical call, handed to the operation being retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// Starts at 1
    pub number: u32,
    /// Deadline this attempt must finish by
    pub deadline: Instant,
}

impl RetryAttempt {
    /// Time left until this attempt's deadline, for the `grpc-timeout` header
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Bind a request to this attempt's deadline
    pub fn apply<T>(&self, request: &mut tonic::Request<T>) {
        request.set_timeout(self.remaining());
    }
}

/// Re-issues failed calls as long as the configured strategy asks for it
///
/// The overall deadline is taken from the caller, or `now + client_timeout`
/// when the caller has none, and stays fixed across attempts. Each attempt
/// runs until its own deadline: the overall one, or a fresh one from a
/// deadline-aware strategy on retries.
///
/// # Example
/// ```ignore
/// use grpc_client::retry::{RetryInterceptor, FixedCountRetryStrategy, PUBLISH_METHOD};
///
/// let retry = RetryInterceptor::new(Some(Arc::new(FixedCountRetryStrategy::new())), timeout);
/// let response = retry
///     .call(PUBLISH_METHOD, None, |attempt| {
///         let mut client = client.clone();
///         let mut request = tonic::Request::new(message.clone());
///         attempt.apply(&mut request);
///         async move { client.publish(request).await }
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct RetryInterceptor {
    strategy: Option<Arc<dyn RetryStrategy>>,
    client_timeout: Duration,
}

impl RetryInterceptor {
    pub fn new(strategy: Option<Arc<dyn RetryStrategy>>, client_timeout: Duration) -> Self {
        Self {
            strategy,
            client_timeout,
        }
    }

    pub fn strategy(&self) -> Option<&Arc<dyn RetryStrategy>> {
        self.strategy.as_ref()
    }

    pub fn client_timeout(&self) -> Duration {
        self.client_timeout
    }

    /// Run `operation` until it succeeds or the strategy gives up
    ///
    /// An attempt that outlives its deadline fails with `DEADLINE_EXCEEDED`
    /// and is handed to the strategy like any other failure.
    pub async fn call<T, F, Fut>(
        &self,
        method: &str,
        deadline: Option<Instant>,
        mut operation: F,
    ) -> Result<T, Status>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let overall_deadline = deadline.unwrap_or_else(|| Instant::now() + self.client_timeout);
        let mut attempt = RetryAttempt {
            number: 1,
            deadline: overall_deadline,
        };

        loop {
            let result = tokio::time::timeout_at(attempt.deadline, operation(attempt))
                .await
                .unwrap_or_else(|_| Err(Status::deadline_exceeded("Request deadline exceeded")));

            let status = match result {
                Ok(response) => return Ok(response),
                Err(status) => status,
            };

            let Some(strategy) = &self.strategy else {
                return Err(status);
            };

            let props = RetryProps {
                code: status.code(),
                method: method.to_string(),
                attempt_number: attempt.number,
                overall_deadline,
            };
            let Some(backoff) = strategy.determine_when_to_retry(&props) else {
                debug!(
                    target: "grpc_client",
                    method,
                    code = ?status.code(),
                    attempt = attempt.number,
                    "Giving up on request"
                );
                return Err(status);
            };

            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }

            attempt.number += 1;
            attempt.deadline = match strategy.as_deadline_aware() {
                Some(aware) => aware.calculate_retry_deadline(overall_deadline),
                None => overall_deadline,
            };
            debug!(
                target: "grpc_client",
                method,
                code = ?status.code(),
                attempt = attempt.number,
                backoff = ?backoff,
                "Retrying request"
            );
        }
    }
}
