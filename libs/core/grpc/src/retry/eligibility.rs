use tonic::Code;

use super::RetryProps;

pub const SUBSCRIBE_METHOD: &str = "/cache_client.pubsub.Pubsub/Subscribe";
pub const PUBLISH_METHOD: &str = "/cache_client.pubsub.Pubsub/Publish";

/// Methods that are safe to send twice. Publish is absent: a retried publish
/// may deliver the message twice.
const IDEMPOTENT_METHODS: &[&str] = &[SUBSCRIBE_METHOD];

const RETRYABLE_CODES: &[Code] = &[Code::Internal, Code::Unavailable];

#[cfg_attr(test, mockall::automock)]
pub trait EligibilityStrategy: Send + Sync + std::fmt::Debug {
    fn is_eligible_for_retry(&self, props: &RetryProps) -> bool;
}

/// Retries transient server failures on idempotent methods only
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEligibilityStrategy;

impl EligibilityStrategy for DefaultEligibilityStrategy {
    fn is_eligible_for_retry(&self, props: &RetryProps) -> bool {
        RETRYABLE_CODES.contains(&props.code) && IDEMPOTENT_METHODS.contains(&props.method.as_str())
    }
}
