use std::fmt;
use std::sync::Arc;

use futures::Stream;
use grpc_client::retry::{RetryProps, SUBSCRIBE_METHOD};
use grpc_client::{GrpcError, StreamLease};
use protos::cache_client::pubsub::SubscriptionItem;
use tokio::time::Instant;
use tonic::transport::Channel;
use tonic::{Code, Streaming};
use tracing::{debug, warn};

use crate::client::ClientInner;
use crate::error::{TopicError, TopicResult};
use crate::models::{SubscribeRequest, TopicEvent, TopicItem};

/// A live stream together with the pool slot it occupies
pub(crate) struct ActiveStream {
    pub(crate) lease: StreamLease<Channel>,
    pub(crate) stream: Streaming<SubscriptionItem>,
}

/// An open subscription to one topic
///
/// Dropping the subscription ends the stream and returns its slot to the
/// pool. When the stream breaks with an error the retry strategy accepts, or
/// the service ends it, the subscription resumes after the last item seen.
/// Closing the client ends it with `PoolShuttingDown`.
pub struct TopicSubscription {
    client: Arc<ClientInner>,
    cache_name: String,
    topic: String,
    active: Option<ActiveStream>,
    /// Next sequence number to ask for when resuming
    resume_at: u64,
    sequence_page: u64,
    consecutive_failures: u32,
}

impl TopicSubscription {
    pub(crate) fn new(client: Arc<ClientInner>, request: SubscribeRequest, active: ActiveStream) -> Self {
        Self {
            client,
            cache_name: request.cache_name,
            topic: request.topic,
            active: Some(active),
            resume_at: request.resume_at_sequence_number,
            sequence_page: request.sequence_page,
            consecutive_failures: 0,
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sequence number a resumed stream would start at
    pub fn resume_at(&self) -> u64 {
        self.resume_at
    }

    pub fn sequence_page(&self) -> u64 {
        self.sequence_page
    }

    /// Next event from the topic, including heartbeats and discontinuities
    pub async fn event(&mut self) -> TopicResult<TopicEvent> {
        loop {
            let Some(active) = self.active.as_mut() else {
                if self.client.is_closed() {
                    return Err(TopicError::Transport(GrpcError::PoolShuttingDown));
                }
                self.reconnect().await?;
                continue;
            };

            let message = tokio::select! {
                biased;

                _ = active.lease.closed() => None,
                message = active.stream.message() => Some(message),
            };
            let Some(message) = message else {
                debug!(target: "domain_topics", topic = %self.topic, "Connection closed; ending subscription");
                self.active = None;
                return Err(TopicError::Transport(GrpcError::PoolShuttingDown));
            };

            match message {
                Ok(Some(raw)) => {
                    let event = TopicEvent::try_from(raw)?;
                    self.consecutive_failures = 0;
                    self.track(&event);
                    return Ok(event);
                }
                Ok(None) => {
                    debug!(target: "domain_topics", topic = %self.topic, "Subscription stream ended; resuming");
                    self.active = None;
                }
                Err(status) => {
                    if !self.should_retry(status.code()) {
                        self.active = None;
                        return Err(TopicError::Service(status));
                    }
                    warn!(
                        target: "domain_topics",
                        topic = %self.topic,
                        code = ?status.code(),
                        "Subscription stream disconnected; resuming"
                    );
                    self.active = None;
                }
            }
        }
    }

    /// Next published item, skipping heartbeats and discontinuities
    pub async fn item(&mut self) -> TopicResult<TopicItem> {
        loop {
            match self.event().await? {
                TopicEvent::Item(item) => return Ok(item),
                TopicEvent::Discontinuity(discontinuity) => {
                    debug!(
                        target: "domain_topics",
                        last = discontinuity.last_sequence_number,
                        new = discontinuity.new_sequence_number,
                        "Received discontinuity"
                    );
                }
                TopicEvent::Heartbeat => {
                    debug!(target: "domain_topics", "Received heartbeat");
                }
            }
        }
    }

    /// Items as a stream; ends after yielding the first error
    pub fn into_stream(self) -> impl Stream<Item = TopicResult<TopicItem>> + Send {
        let mut subscription = self;
        async_stream::stream! {
            loop {
                match subscription.item().await {
                    Ok(item) => yield Ok(item),
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    fn track(&mut self, event: &TopicEvent) {
        match event {
            TopicEvent::Item(item) => {
                self.resume_at = item.sequence_number + 1;
                self.sequence_page = item.sequence_page;
            }
            // The item at the new sequence number has not been delivered yet.
            TopicEvent::Discontinuity(discontinuity) => {
                self.resume_at = discontinuity.new_sequence_number;
                self.sequence_page = discontinuity.new_sequence_page;
            }
            TopicEvent::Heartbeat => {}
        }
    }

    fn should_retry(&mut self, code: Code) -> bool {
        self.consecutive_failures += 1;
        let Some(strategy) = self.client.retry().strategy() else {
            return false;
        };
        let props = RetryProps {
            code,
            method: SUBSCRIBE_METHOD.to_string(),
            attempt_number: self.consecutive_failures,
            overall_deadline: Instant::now() + self.client.request_timeout(),
        };
        strategy.determine_when_to_retry(&props).is_some()
    }

    async fn reconnect(&mut self) -> TopicResult<()> {
        loop {
            tokio::time::sleep(self.client.reconnect_delay()).await;

            let request = SubscribeRequest::new(self.cache_name.clone(), self.topic.clone())
                .with_resume_at(self.resume_at, self.sequence_page);
            match self.client.open_stream(&request).await {
                Ok(active) => {
                    debug!(
                        target: "domain_topics",
                        topic = %self.topic,
                        resume_at = self.resume_at,
                        "Resubscribed"
                    );
                    self.active = Some(active);
                    return Ok(());
                }
                Err(e) => {
                    if !self.should_retry(e.code()) {
                        return Err(e);
                    }
                    debug!(target: "domain_topics", topic = %self.topic, error = %e, "Resubscribe failed; will try again");
                }
            }
        }
    }
}

impl fmt::Debug for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSubscription")
            .field("cache_name", &self.cache_name)
            .field("topic", &self.topic)
            .field("connected", &self.active.is_some())
            .field("manager", &self.active.as_ref().map(|a| a.lease.id()))
            .field("resume_at", &self.resume_at)
            .field("sequence_page", &self.sequence_page)
            .finish()
    }
}
