//! Connection pools for topic traffic.
//!
//! A gRPC connection multiplexes a bounded number of concurrent streams
//! ([`MAX_CONCURRENT_STREAMS_PER_CHANNEL`]). Once a connection is saturated,
//! further streams queue silently on the client side and the caller hangs, so
//! subscriptions are admitted through a [`StreamPool`] that counts live
//! streams per connection and refuses (or grows) before that happens.
//!
//! ```text
//!  subscribe() ──► next_manager() ──oneshot──► producer task
//!                                               │ capacity check / growth
//!                                               │ round-robin claim
//!                   StreamLease ◄──────────────┘
//! ```
//!
//! - [`ConnectionManager`]: one transport plus its live-stream counter.
//! - [`StreamPool`]: fixed (`StreamPoolConfig::fixed`) or elastic
//!   (`StreamPoolConfig::elastic`) set of managers for streaming calls.
//! - [`UnaryPool`]: round-robin managers for unary calls, no bookkeeping.

mod manager;
mod stream;
mod unary;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{ConnectionManager, StreamLease};
pub use stream::{PoolSizing, StreamPool, StreamPoolConfig};
pub use unary::UnaryPool;

use crate::error::GrpcResult;

/// How many concurrent streams a single connection may carry
pub const MAX_CONCURRENT_STREAMS_PER_CHANNEL: u32 = 100;

/// Remaining stream headroom below which the pool logs a warning
pub const HEADROOM_WARNING_THRESHOLD: u64 = 10;

/// A physical transport owned by a [`ConnectionManager`]
pub trait Connection: Clone + Send + Sync + 'static {
    /// Release the transport. Called at most once per manager.
    fn close(&self) -> GrpcResult<()> {
        Ok(())
    }
}

/// Builds the transport for each new connection manager
#[cfg_attr(test, mockall::automock(type Connection = crate::pool::testing::FakeConnection;))]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(&self) -> GrpcResult<Self::Connection>;
}

impl<F: ConnectionFactory> ConnectionFactory for std::sync::Arc<F> {
    type Connection = F::Connection;

    fn connect(&self) -> GrpcResult<Self::Connection> {
        (**self).connect()
    }
}
