//! Retry policies for outbound calls.
//!
//! A [`RetryStrategy`] looks at a failed attempt and either returns how long
//! to wait before the next one or `None` to give up. Strategies that also
//! implement [`DeadlineAwareRetryStrategy`] hand out a fresh per-attempt
//! deadline for every retry; the [`RetryInterceptor`] probes for that
//! capability through [`RetryStrategy::as_deadline_aware`].

pub mod eligibility;
pub mod interceptor;
pub mod strategies;

use std::fmt::Debug;
use std::time::Duration;

use tokio::time::Instant;
use tonic::Code;

pub use eligibility::{DefaultEligibilityStrategy, EligibilityStrategy, PUBLISH_METHOD, SUBSCRIBE_METHOD};
pub use interceptor::{RetryAttempt, RetryInterceptor};
pub use strategies::{
    ExponentialBackoffRetryStrategy, FixedCountRetryStrategy, FixedTimeoutRetryStrategy,
    NeverRetryStrategy,
};

/// What a strategy gets to see about a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryProps {
    pub code: Code,
    /// Full gRPC path, e.g. `/cache_client.pubsub.Pubsub/Subscribe`
    pub method: String,
    /// 1 for the first call, incremented on every retry
    pub attempt_number: u32,
    /// Fixed when the logical call starts; never moves
    pub overall_deadline: Instant,
}

pub trait RetryStrategy: Send + Sync + Debug {
    /// `Some(delay)` to retry after `delay` (zero means immediately),
    /// `None` to surface the error.
    fn determine_when_to_retry(&self, props: &RetryProps) -> Option<Duration>;

    fn as_deadline_aware(&self) -> Option<&dyn DeadlineAwareRetryStrategy> {
        None
    }
}

/// Strategies that bound each retry by its own deadline
pub trait DeadlineAwareRetryStrategy: Send + Sync {
    /// Deadline for the next attempt; never later than `overall_deadline`.
    fn calculate_retry_deadline(&self, overall_deadline: Instant) -> Instant;
}
