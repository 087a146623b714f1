//! Topics Domain
//!
//! Publish/subscribe client for Momento topics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   TopicClient    │  ← Validation, publish, subscribe
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │   grpc-client    │  ← Stream/unary pools, auth, retry
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │     protos       │  ← cache_client.pubsub.Pubsub
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use core_config::FromEnv;
//! use domain_topics::{SubscribeRequest, TopicClient, TopicsConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TopicClient::connect(TopicsConfig::from_env()?)?;
//!
//! let mut subscription = client
//!     .subscribe(SubscribeRequest::new("my-cache", "events"))
//!     .await?;
//! client.publish("my-cache", "events", "hello").await?;
//!
//! let item = subscription.item().await?;
//! println!("{} @ {}", item.value, item.sequence_number);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod conversions;
pub mod error;
pub mod models;
pub mod subscription;

// Re-export commonly used types
pub use client::TopicClient;
pub use config::{RetryStrategyKind, TopicsConfig};
pub use error::{TopicError, TopicResult};
pub use models::{
    SubscribeRequest, TopicDiscontinuity, TopicEvent, TopicItem, TopicValue,
};
pub use subscription::TopicSubscription;
