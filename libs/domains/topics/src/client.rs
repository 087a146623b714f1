use std::sync::Arc;
use std::time::Duration;

use grpc_client::retry::{PUBLISH_METHOD, SUBSCRIBE_METHOD};
use grpc_client::{
    AuthInterceptor, ChannelConfig, ChannelFactory, RetryInterceptor, StreamPool, UnaryPool,
};
use protos::cache_client::pubsub::pubsub_client::PubsubClient;
use protos::cache_client::pubsub::{subscription_item, SubscriptionRequest};
use tokio::time::Instant;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;
use tonic::{Code, Request, Status};
use tracing::{debug, instrument, warn};

use crate::config::TopicsConfig;
use crate::conversions::publish_request;
use crate::error::{TopicError, TopicResult};
use crate::models::{SubscribeRequest, TopicValue};
use crate::subscription::{ActiveStream, TopicSubscription};

const CLIENT_TYPE: &str = "topic";

type PubsubStub = PubsubClient<InterceptedService<Channel, AuthInterceptor>>;

/// Publishes to and subscribes to topics
///
/// Publishes go over a small round-robin set of channels. Each subscription
/// holds one stream on a pooled channel for as long as it lives; the pool
/// refuses new subscriptions once every channel is at its stream limit.
///
/// Cloning is cheap; clones share the pools.
#[derive(Clone)]
pub struct TopicClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    stream_pool: StreamPool<ChannelFactory>,
    unary_pool: UnaryPool<Channel>,
    auth: AuthInterceptor,
    retry: RetryInterceptor,
    channel: ChannelConfig,
    request_timeout: Duration,
    reconnect_delay: Duration,
}

impl TopicClient {
    /// Build the connection pools. Channels connect lazily, so this does not
    /// touch the network; it must run inside a Tokio runtime.
    pub fn connect(config: TopicsConfig) -> TopicResult<Self> {
        let auth = AuthInterceptor::new(config.credentials.auth_token(), CLIENT_TYPE)
            .map_err(|status| TopicError::InvalidArgument(status.message().to_string()))?;
        let retry = RetryInterceptor::new(
            Some(config.retry_strategy.build()),
            config.request_timeout,
        );

        let factory = ChannelFactory::new(
            config.credentials.cache_endpoint.clone(),
            config.channel.clone(),
        );
        let unary_pool = UnaryPool::new(&factory, config.unary_channels)?;
        let stream_pool = match StreamPool::new(factory, config.stream_pool_config()) {
            Ok(pool) => pool,
            Err(e) => {
                unary_pool.close();
                return Err(e.into());
            }
        };

        debug!(
            target: "domain_topics",
            endpoint = %config.credentials.cache_endpoint,
            stream_channels = stream_pool.manager_count(),
            max_stream_channels = stream_pool.max_manager_count(),
            unary_channels = unary_pool.manager_count(),
            retry_strategy = %config.retry_strategy,
            "Created topic client"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                stream_pool,
                unary_pool,
                auth,
                retry,
                channel: config.channel,
                request_timeout: config.request_timeout,
                reconnect_delay: config.reconnect_delay,
            }),
        })
    }

    /// Publish a value to a topic. Delivery is best-effort to live subscribers.
    #[instrument(skip(self, value), fields(cache_name = %cache_name, topic = %topic))]
    pub async fn publish(
        &self,
        cache_name: &str,
        topic: &str,
        value: impl Into<TopicValue>,
    ) -> TopicResult<()> {
        validate_name(cache_name, "Cache name")?;
        validate_name(topic, "Topic name")?;

        let message = publish_request(cache_name, topic, value.into());
        let manager = self.inner.unary_pool.next_manager();
        let client = self.inner.stub(manager.connection()?);

        self.inner
            .retry
            .call(PUBLISH_METHOD, None, |attempt| {
                let mut client = client.clone();
                let mut request = Request::new(message.clone());
                attempt.apply(&mut request);
                async move { client.publish(request).await }
            })
            .await
            .map_err(|status| {
                debug!(target: "domain_topics", code = ?status.code(), "Failed to publish");
                service_error(status)
            })?;
        Ok(())
    }

    /// Open a subscription. Resolves once the service has acknowledged it
    /// with a heartbeat.
    #[instrument(skip(self, request), fields(cache_name = %request.cache_name, topic = %request.topic))]
    pub async fn subscribe(&self, request: SubscribeRequest) -> TopicResult<TopicSubscription> {
        validate_name(&request.cache_name, "Cache name")?;
        validate_name(&request.topic, "Topic name")?;

        let active = self.inner.open_stream(&request).await?;
        Ok(TopicSubscription::new(Arc::clone(&self.inner), request, active))
    }

    /// Close both pools. Open subscriptions end with `PoolShuttingDown`
    /// and give their slots back.
    pub async fn close(&self) {
        self.inner.stream_pool.close().await;
        self.inner.unary_pool.close();
        debug!(target: "domain_topics", "Closed topic client");
    }

    pub fn stream_pool(&self) -> &StreamPool<ChannelFactory> {
        &self.inner.stream_pool
    }

    pub fn active_subscriptions(&self) -> u64 {
        self.inner.stream_pool.active_subscriptions()
    }
}

impl ClientInner {
    fn stub(&self, channel: Channel) -> PubsubStub {
        PubsubClient::with_interceptor(channel, self.auth.clone())
            .max_decoding_message_size(self.channel.max_receive_message_size)
            .max_encoding_message_size(self.channel.max_send_message_size)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.stream_pool.is_closed()
    }

    pub(crate) fn retry(&self) -> &RetryInterceptor {
        &self.retry
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Claim a stream slot, issue `Subscribe` and wait for the heartbeat
    /// that every new subscription starts with.
    pub(crate) async fn open_stream(&self, request: &SubscribeRequest) -> TopicResult<ActiveStream> {
        let lease = self.stream_pool.next_manager().await?;
        let client = self.stub(lease.connection()?);
        let message = SubscriptionRequest::from(request);

        if request.is_resume() {
            debug!(
                target: "domain_topics",
                resume_at = request.resume_at_sequence_number,
                sequence_page = request.sequence_page,
                "Resuming subscription"
            );
        } else {
            debug!(target: "domain_topics", "Starting new subscription");
        }

        let first_message_deadline = Instant::now() + self.request_timeout;

        // No grpc-timeout on the request: the stream outlives the deadline.
        let mut stream = self
            .retry
            .call(SUBSCRIBE_METHOD, Some(first_message_deadline), |_| {
                let mut client = client.clone();
                let request = Request::new(message.clone());
                async move { client.subscribe(request).await.map(tonic::Response::into_inner) }
            })
            .await
            .map_err(|status| match status.code() {
                Code::DeadlineExceeded => TopicError::Timeout(format!(
                    "subscription was not established in time: {}",
                    status.message()
                )),
                _ => service_error(status),
            })?;

        let first = tokio::time::timeout_at(first_message_deadline, stream.message())
            .await
            .map_err(|_| {
                TopicError::Timeout(
                    "subscription did not receive first message within the expected time"
                        .to_string(),
                )
            })?
            .map_err(|status| {
                debug!(target: "domain_topics", code = ?status.code(), "Failed to receive first message");
                service_error(status)
            })?;

        match first.and_then(|item| item.kind) {
            Some(subscription_item::Kind::Heartbeat(_)) => Ok(ActiveStream { lease, stream }),
            Some(other) => Err(TopicError::UnexpectedMessage(format!(
                "expected a heartbeat message, got: {:?}",
                other
            ))),
            None => Err(TopicError::UnexpectedMessage(
                "subscription ended before the first heartbeat".to_string(),
            )),
        }
    }
}

/// Slots are counted per channel on this side, so an exhausted status from
/// the service means the account-wide subscription limit was hit.
fn service_error(status: Status) -> TopicError {
    if status.code() == Code::ResourceExhausted {
        warn!(
            target: "domain_topics",
            message = %status.message(),
            "Topic subscription limit reached for this account"
        );
    }
    TopicError::Service(status)
}

fn validate_name(name: &str, label: &str) -> TopicResult<()> {
    if name.trim().is_empty() {
        return Err(TopicError::InvalidArgument(format!(
            "{} must be a non-empty string",
            label
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::MomentoCredentials;

    fn config() -> TopicsConfig {
        TopicsConfig::new(MomentoCredentials::new(
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            "token",
        ))
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("cache", "Cache name").is_ok());
        let err = validate_name("  ", "Topic name").unwrap_err();
        assert_eq!(err.to_string(), "Invalid argument: Topic name must be a non-empty string");
    }

    #[tokio::test]
    async fn test_connect_sizes_pools() {
        let client = TopicClient::connect(config().with_stream_channels(2)).unwrap();
        assert_eq!(client.stream_pool().manager_count(), 2);
        assert_eq!(client.stream_pool().current_max_concurrent_streams(), 200);
        assert_eq!(client.inner.unary_pool.manager_count(), 4);
        client.close().await;
    }

    #[tokio::test]
    async fn test_connect_elastic_pool() {
        let client = TopicClient::connect(config().with_max_subscriptions(1_000)).unwrap();
        assert_eq!(client.stream_pool().manager_count(), 1);
        assert_eq!(client.stream_pool().max_manager_count(), 10);
        client.close().await;
    }

    #[tokio::test]
    async fn test_connect_rejects_zero_channels() {
        let result = TopicClient::connect(config().with_unary_channels(0));
        assert!(matches!(result, Err(TopicError::Transport(_))));
        let result = TopicClient::connect(config().with_stream_channels(0));
        assert!(matches!(result, Err(TopicError::Transport(_))));
    }

    #[tokio::test]
    async fn test_publish_validates_before_network() {
        let client = TopicClient::connect(config()).unwrap();
        let err = client.publish("", "topic", "hi").await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        let err = client
            .subscribe(SubscribeRequest::new("cache", " "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        client.close().await;
    }

    #[tokio::test]
    async fn test_subscribe_after_close() {
        let client = TopicClient::connect(config()).unwrap();
        client.close().await;
        let err = client
            .subscribe(SubscribeRequest::new("cache", "topic"))
            .await
            .unwrap_err();
        assert!(matches!(err, TopicError::Transport(grpc_client::GrpcError::PoolShuttingDown)));
    }
}
