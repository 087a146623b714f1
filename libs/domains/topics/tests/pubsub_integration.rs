//! Topic Client Integration Tests
//!
//! Runs the client against an in-process `Pubsub` service that keeps every
//! published item so resumed subscriptions can replay from a sequence number.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use core_config::MomentoCredentials;
use domain_topics::{
    RetryStrategyKind, SubscribeRequest, TopicClient, TopicError, TopicEvent, TopicValue,
    TopicsConfig,
};
use futures::{Stream, StreamExt};
use protos::cache_client::pubsub::pubsub_server::{Pubsub, PubsubServer};
use protos::cache_client::pubsub::{
    subscription_item, Discontinuity, Empty, Heartbeat, PublishRequest, SubscriptionItem,
    SubscriptionRequest, TopicItem,
};
use tokio::sync::{broadcast, oneshot};
use tonic::{Code, Request, Response, Status};

// =============================================================================
// TEST INFRASTRUCTURE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstMessage {
    Heartbeat,
    Item,
    Nothing,
}

struct MockState {
    feed: broadcast::Sender<SubscriptionItem>,
    history: Mutex<Vec<TopicItem>>,
    subscribes: Mutex<Vec<SubscriptionRequest>>,
    headers: Mutex<Vec<(String, String)>>,
    publishes: AtomicU32,
    first_message: Mutex<FirstMessage>,
    failing_subscribes: AtomicU32,
    failing_publishes: AtomicU32,
    reject_subscribe: Mutex<Option<Code>>,
    /// Break the next stream after this many items (0 = never)
    break_after: AtomicUsize,
    /// End the next stream cleanly after this many items (0 = never)
    end_after: AtomicUsize,
}

impl Default for MockState {
    fn default() -> Self {
        let (feed, _) = broadcast::channel(64);
        Self {
            feed,
            history: Mutex::default(),
            subscribes: Mutex::default(),
            headers: Mutex::default(),
            publishes: AtomicU32::new(0),
            first_message: Mutex::new(FirstMessage::Heartbeat),
            failing_subscribes: AtomicU32::new(0),
            failing_publishes: AtomicU32::new(0),
            reject_subscribe: Mutex::new(None),
            break_after: AtomicUsize::new(0),
            end_after: AtomicUsize::new(0),
        }
    }
}

#[derive(Clone, Default)]
struct MockPubsub {
    state: Arc<MockState>,
}

fn item_message(item: TopicItem) -> SubscriptionItem {
    SubscriptionItem {
        kind: Some(subscription_item::Kind::Item(item)),
    }
}

fn heartbeat() -> SubscriptionItem {
    SubscriptionItem {
        kind: Some(subscription_item::Kind::Heartbeat(Heartbeat {})),
    }
}

fn discontinuity(last: u64, new: u64, new_page: u64) -> SubscriptionItem {
    SubscriptionItem {
        kind: Some(subscription_item::Kind::Discontinuity(Discontinuity {
            last_topic_sequence: last,
            new_topic_sequence: new,
            new_sequence_page: new_page,
        })),
    }
}

fn record_headers<T>(state: &MockState, request: &Request<T>) {
    let get = |key: &str| {
        request
            .metadata()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    state
        .headers
        .lock()
        .unwrap()
        .push((get("authorization"), get("agent")));
}

#[tonic::async_trait]
impl Pubsub for MockPubsub {
    async fn publish(&self, request: Request<PublishRequest>) -> Result<Response<Empty>, Status> {
        record_headers(&self.state, &request);
        self.state.publishes.fetch_add(1, Ordering::SeqCst);
        if self
            .state
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Status::unavailable("publish backend down"));
        }

        let request = request.into_inner();
        let mut history = self.state.history.lock().unwrap();
        let item = TopicItem {
            topic_sequence_number: history.len() as u64 + 1,
            value: request.value,
            publisher_id: String::new(),
            sequence_page: 1,
        };
        history.push(item.clone());
        let _ = self.state.feed.send(item_message(item));
        Ok(Response::new(Empty {}))
    }

    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<SubscriptionItem, Status>> + Send>>;

    async fn subscribe(
        &self,
        request: Request<SubscriptionRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        record_headers(&self.state, &request);
        let request = request.into_inner();
        self.state.subscribes.lock().unwrap().push(request.clone());

        if let Some(code) = *self.state.reject_subscribe.lock().unwrap() {
            return Err(Status::new(code, "subscribe rejected"));
        }
        if self
            .state
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Status::unavailable("subscribe backend down"));
        }

        let (mut feed, replay) = {
            let history = self.state.history.lock().unwrap();
            let replay: Vec<TopicItem> = if request.resume_at_topic_sequence_number > 0 {
                history
                    .iter()
                    .filter(|item| item.topic_sequence_number >= request.resume_at_topic_sequence_number)
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            (self.state.feed.subscribe(), replay)
        };
        let first = *self.state.first_message.lock().unwrap();
        let break_after = self.state.break_after.swap(0, Ordering::SeqCst);
        let end_after = self.state.end_after.swap(0, Ordering::SeqCst);

        let stream = async_stream::stream! {
            match first {
                FirstMessage::Heartbeat => yield Ok(heartbeat()),
                FirstMessage::Item => {
                    yield Ok(item_message(TopicItem::default()));
                }
                FirstMessage::Nothing => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            }
            let mut sent = 0;
            for item in replay {
                yield Ok(item_message(item));
                sent += 1;
            }
            while let Ok(message) = feed.recv().await {
                if break_after > 0 && sent >= break_after {
                    yield Err(Status::unavailable("connection reset"));
                    return;
                }
                yield Ok(message);
                sent += 1;
                if break_after > 0 && sent >= break_after {
                    yield Err(Status::unavailable("connection reset"));
                    return;
                }
                if end_after > 0 && sent >= end_after {
                    return;
                }
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }
}

struct ServerHandle {
    addr: SocketAddr,
    state: Arc<MockState>,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server() -> ServerHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = MockPubsub::default();
    let state = Arc::clone(&service.state);

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(PubsubServer::new(service))
            .serve_with_incoming_shutdown(
                tokio_stream::wrappers::TcpListenerStream::new(listener),
                async move {
                    shutdown_rx.await.ok();
                },
            )
            .await
            .ok();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    ServerHandle {
        addr,
        state,
        _shutdown: shutdown_tx,
    }
}

fn config_for(handle: &ServerHandle) -> TopicsConfig {
    let endpoint = format!("http://{}", handle.addr);
    TopicsConfig::new(MomentoCredentials::new(&endpoint, &endpoint, "test-token"))
        .with_stream_channels(2)
        .with_unary_channels(2)
        .with_request_timeout(Duration::from_secs(2))
        .with_reconnect_delay(Duration::from_millis(10))
}

async fn wait_for_subscribes(state: &MockState, count: usize) {
    while state.subscribes.lock().unwrap().len() < count {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn with_timeout<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("test step timed out")
}

// =============================================================================
// PUBLISH / SUBSCRIBE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_reaches_subscriber() {
    let handle = start_server().await;
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let mut subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap();
    client.publish("cache", "events", "hello").await.unwrap();
    client.publish("cache", "events", vec![1u8, 2, 3]).await.unwrap();

    let first = with_timeout(subscription.item()).await.unwrap();
    assert_eq!(first.value, TopicValue::Text("hello".to_string()));
    assert_eq!(first.sequence_number, 1);

    let second = with_timeout(subscription.item()).await.unwrap();
    assert_eq!(second.value, TopicValue::Binary(vec![1, 2, 3]));
    assert_eq!(second.sequence_number, 2);
    assert_eq!(subscription.resume_at(), 3);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_requests_carry_auth_and_agent() {
    let handle = start_server().await;
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    client.publish("cache", "events", "hi").await.unwrap();

    let headers = handle.state.headers.lock().unwrap().clone();
    let (authorization, agent) = &headers[0];
    assert_eq!(authorization, "test-token");
    assert!(agent.starts_with("rust:topic:"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscription_releases_slot_on_drop() {
    let handle = start_server().await;
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let first = client
        .subscribe(SubscribeRequest::new("cache", "a"))
        .await
        .unwrap();
    let second = client
        .subscribe(SubscribeRequest::new("cache", "b"))
        .await
        .unwrap();
    assert_eq!(client.active_subscriptions(), 2);

    drop(first);
    assert_eq!(client.active_subscriptions(), 1);
    drop(second);
    assert_eq!(client.active_subscriptions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_into_stream_yields_items() {
    let handle = start_server().await;
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap();
    for i in 0..3 {
        client
            .publish("cache", "events", format!("msg-{}", i))
            .await
            .unwrap();
    }

    let items: Vec<_> = with_timeout(subscription.into_stream().take(3).collect()).await;
    let texts: Vec<String> = items
        .into_iter()
        .map(|item| item.unwrap().value.to_string())
        .collect();
    assert_eq!(texts, vec!["msg-0", "msg-1", "msg-2"]);
}

// =============================================================================
// FIRST MESSAGE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_requires_heartbeat_first() {
    let handle = start_server().await;
    *handle.state.first_message.lock().unwrap() = FirstMessage::Item;
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let err = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap_err();
    assert!(matches!(err, TopicError::UnexpectedMessage(_)));
    assert_eq!(client.active_subscriptions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_times_out_without_first_message() {
    let handle = start_server().await;
    *handle.state.first_message.lock().unwrap() = FirstMessage::Nothing;
    let config = config_for(&handle).with_request_timeout(Duration::from_millis(200));
    let client = TopicClient::connect(config).unwrap();

    let err = with_timeout(client.subscribe(SubscribeRequest::new("cache", "events")))
        .await
        .unwrap_err();
    assert!(matches!(err, TopicError::Timeout(_)));
    assert_eq!(client.active_subscriptions(), 0);
}

// =============================================================================
// RETRIES
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_retried_on_unavailable() {
    let handle = start_server().await;
    handle.state.failing_subscribes.store(2, Ordering::SeqCst);
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await;
    assert!(subscription.is_ok());
    assert_eq!(handle.state.subscribes.lock().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_gives_up_without_retry_strategy() {
    let handle = start_server().await;
    handle.state.failing_subscribes.store(1, Ordering::SeqCst);
    let config = config_for(&handle).with_retry_strategy(RetryStrategyKind::Never);
    let client = TopicClient::connect(config).unwrap();

    let err = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(handle.state.subscribes.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_is_not_retried() {
    let handle = start_server().await;
    handle.state.failing_publishes.store(1, Ordering::SeqCst);
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let err = client.publish("cache", "events", "hi").await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(handle.state.publishes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_subscription_limit_surfaces() {
    let handle = start_server().await;
    *handle.state.reject_subscribe.lock().unwrap() = Some(Code::ResourceExhausted);
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let err = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted);
    assert!(matches!(err, TopicError::Service(_)));
    assert_eq!(client.active_subscriptions(), 0);
}

// =============================================================================
// RESUME
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscription_resumes_after_disconnect() {
    let handle = start_server().await;
    handle.state.break_after.store(1, Ordering::SeqCst);
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let mut subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap();
    client.publish("cache", "events", "one").await.unwrap();
    let first = with_timeout(subscription.item()).await.unwrap();
    assert_eq!(first.sequence_number, 1);

    client.publish("cache", "events", "two").await.unwrap();
    let second = with_timeout(subscription.item()).await.unwrap();
    assert_eq!(second.sequence_number, 2);
    assert_eq!(second.value, TopicValue::Text("two".to_string()));

    let subscribes = handle.state.subscribes.lock().unwrap().clone();
    assert_eq!(subscribes.len(), 2);
    assert_eq!(subscribes[1].resume_at_topic_sequence_number, 2);
    assert_eq!(subscribes[1].sequence_page, 1);
    assert_eq!(client.active_subscriptions(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscription_resumes_after_stream_ends() {
    let handle = start_server().await;
    handle.state.end_after.store(1, Ordering::SeqCst);
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let mut subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap();
    client.publish("cache", "events", "one").await.unwrap();
    let first = with_timeout(subscription.item()).await.unwrap();
    assert_eq!(first.sequence_number, 1);

    client.publish("cache", "events", "two").await.unwrap();
    let second = with_timeout(subscription.item()).await.unwrap();
    assert_eq!(second.sequence_number, 2);

    let subscribes = handle.state.subscribes.lock().unwrap().clone();
    assert_eq!(subscribes.len(), 2);
    assert_eq!(subscribes[1].resume_at_topic_sequence_number, 2);
    assert_eq!(subscribes[1].sequence_page, 1);
    assert_eq!(client.active_subscriptions(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscription_resumes_at_discontinuity() {
    let handle = start_server().await;
    handle.state.break_after.store(1, Ordering::SeqCst);
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let mut subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap();
    handle.state.feed.send(discontinuity(3, 5, 7)).unwrap();

    let event = with_timeout(subscription.event()).await.unwrap();
    assert!(matches!(
        event,
        TopicEvent::Discontinuity(ref d) if d.new_sequence_number == 5 && d.new_sequence_page == 7
    ));
    assert_eq!(subscription.resume_at(), 5);
    assert_eq!(subscription.sequence_page(), 7);

    // The stream breaks right after the discontinuity; nothing else is
    // published, so the next event stays pending once resubscribed.
    tokio::select! {
        event = subscription.event() => panic!("unexpected event: {:?}", event),
        _ = with_timeout(wait_for_subscribes(&handle.state, 2)) => {}
    }

    let subscribes = handle.state.subscribes.lock().unwrap().clone();
    assert_eq!(subscribes[1].resume_at_topic_sequence_number, 5);
    assert_eq!(subscribes[1].sequence_page, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_reports_heartbeats() {
    let handle = start_server().await;
    let client = TopicClient::connect(config_for(&handle)).unwrap();

    let mut subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap();
    handle.state.feed.send(heartbeat()).unwrap();

    let event = with_timeout(subscription.event()).await.unwrap();
    assert_eq!(event, TopicEvent::Heartbeat);
}

// =============================================================================
// SHUTDOWN
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_operations_fail_after_close() {
    let handle = start_server().await;
    let client = TopicClient::connect(config_for(&handle)).unwrap();
    client.close().await;

    let err = client.publish("cache", "events", "late").await.unwrap_err();
    assert!(matches!(err, TopicError::Transport(_)));
    let err = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Cancelled);
    assert_eq!(handle.state.publishes.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_ends_open_subscriptions() {
    let handle = start_server().await;
    let client = TopicClient::connect(config_for(&handle)).unwrap();
    let publisher = TopicClient::connect(config_for(&handle)).unwrap();

    let mut subscription = client
        .subscribe(SubscribeRequest::new("cache", "events"))
        .await
        .unwrap();
    client.close().await;
    assert_eq!(client.active_subscriptions(), 1);

    publisher.publish("cache", "events", "after-close").await.unwrap();
    let err = with_timeout(subscription.item()).await.unwrap_err();
    assert!(matches!(err, TopicError::Transport(grpc_client::GrpcError::PoolShuttingDown)));
    assert_eq!(client.active_subscriptions(), 0);

    // Stays ended without resubscribing
    let err = with_timeout(subscription.event()).await.unwrap_err();
    assert_eq!(err.code(), Code::Cancelled);
    assert_eq!(handle.state.subscribes.lock().unwrap().len(), 1);

    publisher.close().await;
}
