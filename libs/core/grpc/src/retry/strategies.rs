use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tonic::Code;
use tracing::debug;

use super::{DeadlineAwareRetryStrategy, DefaultEligibilityStrategy, EligibilityStrategy, RetryProps, RetryStrategy};

/// Fails fast on every error
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetryStrategy;

impl RetryStrategy for NeverRetryStrategy {
    fn determine_when_to_retry(&self, _props: &RetryProps) -> Option<Duration> {
        None
    }
}

/// Retries eligible failures immediately, up to `max_attempts` times
#[derive(Debug, Clone)]
pub struct FixedCountRetryStrategy {
    eligibility: Arc<dyn EligibilityStrategy>,
    max_attempts: u32,
}

impl Default for FixedCountRetryStrategy {
    fn default() -> Self {
        Self {
            eligibility: Arc::new(DefaultEligibilityStrategy),
            max_attempts: 3,
        }
    }
}

impl FixedCountRetryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_eligibility_strategy(mut self, eligibility: Arc<dyn EligibilityStrategy>) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl RetryStrategy for FixedCountRetryStrategy {
    fn determine_when_to_retry(&self, props: &RetryProps) -> Option<Duration> {
        if !self.eligibility.is_eligible_for_retry(props) {
            debug!(target: "grpc_client", method = %props.method, code = ?props.code, "Request is not retryable");
            return None;
        }
        if props.attempt_number > self.max_attempts {
            debug!(
                target: "grpc_client",
                method = %props.method,
                code = ?props.code,
                attempt = props.attempt_number,
                max_attempts = self.max_attempts,
                "Exceeded max retry attempts; not retrying"
            );
            return None;
        }
        debug!(
            target: "grpc_client",
            method = %props.method,
            code = ?props.code,
            attempt = props.attempt_number,
            "Retrying immediately"
        );
        Some(Duration::ZERO)
    }
}

/// Exponentially growing, jittered delays between eligible retries
///
/// The base delay for attempt `n` is `initial_delay * growth_factor^(n-1)`,
/// capped at `max_backoff`. The actual delay is drawn uniformly from
/// `[base, base / growth_factor * 3)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetryStrategy {
    eligibility: Arc<dyn EligibilityStrategy>,
    initial_delay: Duration,
    growth_factor: u32,
    max_backoff: Duration,
}

impl Default for ExponentialBackoffRetryStrategy {
    fn default() -> Self {
        Self {
            eligibility: Arc::new(DefaultEligibilityStrategy),
            initial_delay: Duration::from_micros(500),
            growth_factor: 2,
            max_backoff: Duration::from_millis(8),
        }
    }
}

impl ExponentialBackoffRetryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Values below 2 are raised to 2
    pub fn with_growth_factor(mut self, growth_factor: u32) -> Self {
        self.growth_factor = growth_factor.max(2);
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_eligibility_strategy(mut self, eligibility: Arc<dyn EligibilityStrategy>) -> Self {
        self.eligibility = eligibility;
        self
    }

    fn base_delay(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1);
        let factor = self.growth_factor.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_backoff, |base| base.min(self.max_backoff))
    }

    fn jittered(&self, base: Duration) -> Duration {
        let upper = base / self.growth_factor * 3;
        if upper <= base {
            return base;
        }
        base + (upper - base).mul_f64(rand::random::<f64>())
    }
}

impl RetryStrategy for ExponentialBackoffRetryStrategy {
    fn determine_when_to_retry(&self, props: &RetryProps) -> Option<Duration> {
        if !self.eligibility.is_eligible_for_retry(props) {
            debug!(target: "grpc_client", method = %props.method, code = ?props.code, "Request is not eligible for retry");
            return None;
        }
        let base = self.base_delay(props.attempt_number);
        let delay = self.jittered(base);
        debug!(
            target: "grpc_client",
            method = %props.method,
            attempt = props.attempt_number,
            base_delay = ?base,
            delay = ?delay,
            "Backing off before retry"
        );
        Some(delay)
    }
}

/// Retries with a jittered fixed interval until the overall deadline passes,
/// giving every retry its own `retry_timeout` budget
///
/// Besides eligible failures, this also retries attempts that timed out
/// against their per-attempt deadline while the overall deadline is still
/// in the future.
#[derive(Debug, Clone)]
pub struct FixedTimeoutRetryStrategy {
    eligibility: Arc<dyn EligibilityStrategy>,
    retry_timeout: Duration,
    retry_delay_interval: Duration,
}

impl Default for FixedTimeoutRetryStrategy {
    fn default() -> Self {
        Self {
            eligibility: Arc::new(DefaultEligibilityStrategy),
            retry_timeout: Duration::from_millis(1000),
            retry_delay_interval: Duration::from_millis(100),
        }
    }
}

impl FixedTimeoutRetryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_timeout(mut self, retry_timeout: Duration) -> Self {
        self.retry_timeout = retry_timeout;
        self
    }

    pub fn with_retry_delay_interval(mut self, interval: Duration) -> Self {
        self.retry_delay_interval = interval;
        self
    }

    pub fn with_eligibility_strategy(mut self, eligibility: Arc<dyn EligibilityStrategy>) -> Self {
        self.eligibility = eligibility;
        self
    }

    fn jittered_interval(&self) -> Duration {
        self.retry_delay_interval.mul_f64(0.9 + 0.2 * rand::random::<f64>())
    }
}

impl RetryStrategy for FixedTimeoutRetryStrategy {
    fn determine_when_to_retry(&self, props: &RetryProps) -> Option<Duration> {
        if props.overall_deadline <= Instant::now() {
            debug!(target: "grpc_client", method = %props.method, "Overall deadline passed; not retrying");
            return None;
        }
        let timed_out = props.code == Code::DeadlineExceeded;
        if !timed_out && !self.eligibility.is_eligible_for_retry(props) {
            debug!(target: "grpc_client", method = %props.method, code = ?props.code, "Request is not retryable");
            return None;
        }
        let delay = self.jittered_interval();
        debug!(
            target: "grpc_client",
            method = %props.method,
            code = ?props.code,
            attempt = props.attempt_number,
            delay = ?delay,
            "Retrying after fixed interval"
        );
        Some(delay)
    }

    fn as_deadline_aware(&self) -> Option<&dyn DeadlineAwareRetryStrategy> {
        Some(self)
    }
}

impl DeadlineAwareRetryStrategy for FixedTimeoutRetryStrategy {
    fn calculate_retry_deadline(&self, overall_deadline: Instant) -> Instant {
        (Instant::now() + self.retry_timeout).min(overall_deadline)
    }
}
