use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use super::{Connection, ConnectionFactory};
use crate::error::{GrpcError, GrpcResult};

/// Owns one transport and counts the streams multiplexed on it
pub struct ConnectionManager<C: Connection> {
    id: usize,
    connection: RwLock<Option<C>>,
    active_subscriptions: AtomicU32,
    closed: watch::Sender<bool>,
}

impl<C: Connection> ConnectionManager<C> {
    pub fn new(id: usize, connection: C) -> Self {
        Self {
            id,
            connection: RwLock::new(Some(connection)),
            active_subscriptions: AtomicU32::new(0),
            closed: watch::channel(false).0,
        }
    }

    /// Position of this manager in its pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// A handle to the transport, or `ConnectionClosed` after [`close`](Self::close)
    pub fn connection(&self) -> GrpcResult<C> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(GrpcError::ConnectionClosed)
    }

    pub fn active_subscriptions(&self) -> u32 {
        self.active_subscriptions.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called.
    ///
    /// Streams opened on this manager hold their own transport handles, so
    /// they must watch this and end themselves when it fires.
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Optimistically take one stream slot.
    ///
    /// Increment first, then compare, then roll back if over the limit. The
    /// counter can briefly exceed `limit` between the increment and the
    /// rollback; it never stays there.
    pub(crate) fn try_claim(&self, limit: u32) -> Option<u32> {
        let new_count = self.active_subscriptions.fetch_add(1, Ordering::SeqCst) + 1;
        if new_count <= limit {
            return Some(new_count);
        }
        self.active_subscriptions.fetch_sub(1, Ordering::SeqCst);
        None
    }

    /// Give back a slot taken by [`try_claim`](Self::try_claim). Saturates at zero.
    pub(crate) fn release(&self) {
        let _ = self
            .active_subscriptions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Signal open streams to end and release the transport. Repeated calls
    /// are no-ops.
    ///
    /// The stream count is left alone; each lease gives its slot back when
    /// its stream actually ends.
    pub fn close(&self) -> GrpcResult<()> {
        self.closed.send_replace(true);
        let connection = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match connection {
            Some(connection) => connection.close(),
            None => Ok(()),
        }
    }
}

impl<C: Connection> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("id", &self.id)
            .field("active_subscriptions", &self.active_subscriptions())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A claimed stream slot on a [`ConnectionManager`].
///
/// Dropping the lease gives the slot back, so a lease should live exactly as
/// long as the stream it was taken for.
pub struct StreamLease<C: Connection> {
    manager: Arc<ConnectionManager<C>>,
}

impl<C: Connection> StreamLease<C> {
    pub(crate) fn new(manager: Arc<ConnectionManager<C>>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<C>> {
        &self.manager
    }
}

impl<C: Connection> Deref for StreamLease<C> {
    type Target = ConnectionManager<C>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl<C: Connection> Drop for StreamLease<C> {
    fn drop(&mut self) {
        self.manager.release();
    }
}

impl<C: Connection> fmt::Debug for StreamLease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamLease")
            .field("manager", &self.manager.id())
            .finish()
    }
}

/// Create `count` managers, or none at all.
///
/// If any transport fails to build, the ones already built are closed and the
/// error is returned.
pub(crate) fn build_managers<F: ConnectionFactory>(
    factory: &F,
    count: usize,
) -> GrpcResult<Vec<Arc<ConnectionManager<F::Connection>>>> {
    let mut managers = Vec::with_capacity(count);
    for id in 0..count {
        match factory.connect() {
            Ok(connection) => managers.push(Arc::new(ConnectionManager::new(id, connection))),
            Err(e) => {
                tracing::error!(
                    target: "grpc_client",
                    manager = id,
                    requested = count,
                    error = %e,
                    "Failed to create connection manager, discarding partial pool"
                );
                close_all(&managers);
                return Err(e);
            }
        }
    }
    Ok(managers)
}

/// Close every manager, logging failures and carrying on
pub(crate) fn close_all<C: Connection>(managers: &[Arc<ConnectionManager<C>>]) {
    for manager in managers {
        if let Err(e) = manager.close() {
            tracing::error!(
                target: "grpc_client",
                manager = manager.id(),
                error = %e,
                "Error closing connection manager"
            );
        }
    }
}
