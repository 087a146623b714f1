use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::manager::{build_managers, close_all};
use super::{Connection, ConnectionFactory, ConnectionManager};
use crate::error::{GrpcError, GrpcResult};

/// Round-robin connections for unary calls.
///
/// Unary calls are short-lived and do not pin a stream slot, so there is no
/// admission control here.
pub struct UnaryPool<C: Connection> {
    managers: Vec<Arc<ConnectionManager<C>>>,
    next_index: AtomicU64,
}

impl<C: Connection> UnaryPool<C> {
    /// Create `channel_count` managers up front; fails without keeping any if
    /// one of them cannot be built.
    pub fn new<F>(factory: &F, channel_count: usize) -> GrpcResult<Self>
    where
        F: ConnectionFactory<Connection = C>,
    {
        if channel_count == 0 {
            return Err(GrpcError::InvalidConfig(
                "unary channel count must be greater than zero".to_string(),
            ));
        }
        let managers = build_managers(factory, channel_count)?;
        tracing::debug!(target: "grpc_client", channels = channel_count, "Created unary pool");
        Ok(Self {
            managers,
            next_index: AtomicU64::new(0),
        })
    }

    pub fn next_manager(&self) -> Arc<ConnectionManager<C>> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed) % self.managers.len() as u64;
        Arc::clone(&self.managers[index as usize])
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    pub fn close(&self) {
        close_all(&self.managers);
    }
}
