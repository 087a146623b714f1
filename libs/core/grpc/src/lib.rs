//! # gRPC Client Library
//!
//! Transport plumbing for topic (pub/sub) traffic: lazy channels, the auth
//! interceptor, connection pools that keep streams within the per-connection
//! concurrency limit, and a retry interceptor with pluggable strategies.
//!
//! ## Quick Start
//!
//! ### Stream pool over lazy channels
//! ```ignore
//! use grpc_client::{ChannelConfig, ChannelFactory, StreamPool, StreamPoolConfig};
//!
//! let factory = ChannelFactory::new("https://cache.example.com:443", ChannelConfig::default());
//! let pool = StreamPool::new(factory, StreamPoolConfig::elastic(1_000))?;
//!
//! let lease = pool.next_manager().await?;
//! let channel = lease.connection()?;
//! // ... open the stream; dropping the lease frees its slot
//! ```
//!
//! ### With Retry
//! ```ignore
//! use grpc_client::retry::{FixedTimeoutRetryStrategy, RetryInterceptor, SUBSCRIBE_METHOD};
//!
//! let retry = RetryInterceptor::new(
//!     Some(Arc::new(FixedTimeoutRetryStrategy::new())),
//!     Duration::from_secs(5),
//! );
//! let stream = retry
//!     .call(SUBSCRIBE_METHOD, None, |attempt| open_stream(attempt))
//!     .await?;
//! ```

pub mod channel;
pub mod error;
pub mod interceptors;
pub mod pool;
pub mod retry;

// Re-export main types and functions for convenience
pub use channel::{ChannelConfig, ChannelFactory, create_channel_lazy};
pub use error::{GrpcError, GrpcResult};
pub use interceptors::AuthInterceptor;
pub use pool::{
    Connection, ConnectionFactory, ConnectionManager, PoolSizing, StreamLease, StreamPool,
    StreamPoolConfig, UnaryPool,
};
pub use retry::{RetryAttempt, RetryInterceptor, RetryProps, RetryStrategy};
