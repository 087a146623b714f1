use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use core_config::{env_parse_or_default, ConfigError, FromEnv, MomentoCredentials};
use grpc_client::retry::{
    ExponentialBackoffRetryStrategy, FixedCountRetryStrategy, FixedTimeoutRetryStrategy,
    NeverRetryStrategy, RetryStrategy,
};
use grpc_client::{ChannelConfig, StreamPoolConfig};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_STREAM_CHANNELS: usize = 4;
pub const DEFAULT_UNARY_CHANNELS: usize = 4;

/// Which retry strategy the client installs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategyKind {
    Never,
    #[default]
    FixedCount,
    Exponential,
    FixedTimeout,
}

impl RetryStrategyKind {
    pub fn build(&self) -> Arc<dyn RetryStrategy> {
        match self {
            RetryStrategyKind::Never => Arc::new(NeverRetryStrategy),
            RetryStrategyKind::FixedCount => Arc::new(FixedCountRetryStrategy::new()),
            RetryStrategyKind::Exponential => Arc::new(ExponentialBackoffRetryStrategy::new()),
            RetryStrategyKind::FixedTimeout => Arc::new(FixedTimeoutRetryStrategy::new()),
        }
    }
}

impl FromStr for RetryStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(RetryStrategyKind::Never),
            "fixed-count" => Ok(RetryStrategyKind::FixedCount),
            "exponential" => Ok(RetryStrategyKind::Exponential),
            "fixed-timeout" => Ok(RetryStrategyKind::FixedTimeout),
            other => Err(format!(
                "unknown retry strategy '{}' (expected never, fixed-count, exponential or fixed-timeout)",
                other
            )),
        }
    }
}

impl fmt::Display for RetryStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryStrategyKind::Never => "never",
            RetryStrategyKind::FixedCount => "fixed-count",
            RetryStrategyKind::Exponential => "exponential",
            RetryStrategyKind::FixedTimeout => "fixed-timeout",
        };
        f.write_str(name)
    }
}

/// Settings for a [`TopicClient`](crate::TopicClient)
#[derive(Debug, Clone)]
pub struct TopicsConfig {
    pub credentials: MomentoCredentials,
    /// Above zero, subscriptions use an elastic pool sized for this many
    /// concurrent streams; zero keeps a fixed pool of `stream_channels`.
    pub max_subscriptions: u32,
    pub stream_channels: usize,
    pub unary_channels: usize,
    /// Overall deadline for calls without one, and for the first subscription heartbeat
    pub request_timeout: Duration,
    pub retry_strategy: RetryStrategyKind,
    /// Pause between attempts to resume a broken subscription
    pub reconnect_delay: Duration,
    pub channel: ChannelConfig,
}

impl TopicsConfig {
    pub fn new(credentials: MomentoCredentials) -> Self {
        Self {
            credentials,
            max_subscriptions: 0,
            stream_channels: DEFAULT_STREAM_CHANNELS,
            unary_channels: DEFAULT_UNARY_CHANNELS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_strategy: RetryStrategyKind::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            channel: ChannelConfig::default(),
        }
    }

    pub fn with_max_subscriptions(mut self, max_subscriptions: u32) -> Self {
        self.max_subscriptions = max_subscriptions;
        self
    }

    pub fn with_stream_channels(mut self, count: usize) -> Self {
        self.stream_channels = count;
        self
    }

    pub fn with_unary_channels(mut self, count: usize) -> Self {
        self.unary_channels = count;
        self
    }

    /// Zero falls back to the default timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = if timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            timeout
        };
        self
    }

    pub fn with_retry_strategy(mut self, kind: RetryStrategyKind) -> Self {
        self.retry_strategy = kind;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn stream_pool_config(&self) -> StreamPoolConfig {
        if self.max_subscriptions > 0 {
            StreamPoolConfig::elastic(self.max_subscriptions)
        } else {
            StreamPoolConfig::fixed(self.stream_channels)
        }
    }
}

impl FromEnv for TopicsConfig {
    /// Reads credentials via [`MomentoCredentials::from_env`], then:
    /// - TOPICS_MAX_SUBSCRIPTIONS: default 0 (fixed pool)
    /// - TOPICS_NUM_STREAM_CHANNELS: default 4
    /// - TOPICS_NUM_UNARY_CHANNELS: default 4
    /// - TOPICS_REQUEST_TIMEOUT_MS: default 5000
    /// - TOPICS_RETRY_STRATEGY: default fixed-count
    /// - TOPICS_RECONNECT_DELAY_MS: default 500
    fn from_env() -> Result<Self, ConfigError> {
        let credentials = MomentoCredentials::from_env()?;
        let max_subscriptions = env_parse_or_default("TOPICS_MAX_SUBSCRIPTIONS", 0u32)?;
        let stream_channels =
            env_parse_or_default("TOPICS_NUM_STREAM_CHANNELS", DEFAULT_STREAM_CHANNELS)?;
        let unary_channels =
            env_parse_or_default("TOPICS_NUM_UNARY_CHANNELS", DEFAULT_UNARY_CHANNELS)?;
        let timeout_ms = env_parse_or_default(
            "TOPICS_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        )?;
        let retry_strategy =
            env_parse_or_default("TOPICS_RETRY_STRATEGY", RetryStrategyKind::default())?;
        let reconnect_ms = env_parse_or_default(
            "TOPICS_RECONNECT_DELAY_MS",
            DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        )?;

        Ok(Self::new(credentials)
            .with_max_subscriptions(max_subscriptions)
            .with_stream_channels(stream_channels)
            .with_unary_channels(unary_channels)
            .with_request_timeout(Duration::from_millis(timeout_ms))
            .with_retry_strategy(retry_strategy)
            .with_reconnect_delay(Duration::from_millis(reconnect_ms)))
    }
}
