use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::manager::{build_managers, close_all};
use super::{
    ConnectionFactory, ConnectionManager, StreamLease, HEADROOM_WARNING_THRESHOLD,
    MAX_CONCURRENT_STREAMS_PER_CHANNEL,
};
use crate::error::{GrpcError, GrpcResult};

/// How a stream pool decides its number of connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSizing {
    /// Exactly `channel_count` connections, created up front
    Static { channel_count: usize },
    /// One connection up front, grown on demand until
    /// `ceil(max_subscriptions / streams_per_channel)` connections exist
    Dynamic { max_subscriptions: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPoolConfig {
    pub sizing: PoolSizing,
    pub streams_per_channel: u32,
}

impl StreamPoolConfig {
    /// A pool of `channel_count` connections that never grows
    pub fn fixed(channel_count: usize) -> Self {
        Self {
            sizing: PoolSizing::Static { channel_count },
            streams_per_channel: MAX_CONCURRENT_STREAMS_PER_CHANNEL,
        }
    }

    /// A pool sized on demand for up to `max_subscriptions` concurrent streams
    pub fn elastic(max_subscriptions: u32) -> Self {
        Self {
            sizing: PoolSizing::Dynamic { max_subscriptions },
            streams_per_channel: MAX_CONCURRENT_STREAMS_PER_CHANNEL,
        }
    }

    pub fn with_streams_per_channel(mut self, streams_per_channel: u32) -> Self {
        self.streams_per_channel = streams_per_channel;
        self
    }

    pub fn can_grow(&self) -> bool {
        matches!(self.sizing, PoolSizing::Dynamic { .. })
    }

    pub fn initial_manager_count(&self) -> usize {
        match self.sizing {
            PoolSizing::Static { channel_count } => channel_count,
            PoolSizing::Dynamic { .. } => 1,
        }
    }

    pub fn max_manager_count(&self) -> usize {
        match self.sizing {
            PoolSizing::Static { channel_count } => channel_count,
            PoolSizing::Dynamic { max_subscriptions } => {
                let per_channel = self.streams_per_channel.max(1);
                max_subscriptions.div_ceil(per_channel).max(1) as usize
            }
        }
    }

    fn validate(&self) -> GrpcResult<()> {
        if self.streams_per_channel == 0 {
            return Err(GrpcError::InvalidConfig(
                "streams per channel must be greater than zero".to_string(),
            ));
        }
        match self.sizing {
            PoolSizing::Static { channel_count: 0 } => Err(GrpcError::InvalidConfig(
                "stream channel count must be greater than zero".to_string(),
            )),
            PoolSizing::Dynamic { max_subscriptions: 0 } => Err(GrpcError::InvalidConfig(
                "max subscriptions must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

type Reply<C> = oneshot::Sender<GrpcResult<StreamLease<C>>>;

/// Bookkeeping shared by the pool handle and its producer task.
///
/// Only the producer task appends to `managers`; everyone else reads.
struct PoolState<F: ConnectionFactory> {
    factory: F,
    managers: RwLock<Vec<Arc<ConnectionManager<F::Connection>>>>,
    manager_index: AtomicU64,
    max_manager_count: usize,
    streams_per_channel: u32,
    can_grow: bool,
}

impl<F: ConnectionFactory> PoolState<F> {
    fn snapshot(&self) -> Vec<Arc<ConnectionManager<F::Connection>>> {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn manager_count(&self) -> usize {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn current_max_concurrent_streams(&self) -> u64 {
        self.manager_count() as u64 * u64::from(self.streams_per_channel)
    }

    fn active_subscriptions(&self) -> u64 {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|m| u64::from(m.active_subscriptions()))
            .sum()
    }

    /// Pick the next manager with a free stream slot and claim it.
    ///
    /// Runs on the producer task only.
    fn next_manager(&self) -> GrpcResult<StreamLease<F::Connection>> {
        self.ensure_capacity()?;

        let managers = self.snapshot();
        let len = managers.len() as u64;
        let current_max = len * u64::from(self.streams_per_channel);

        // Bounded by the total slot count: enough to visit every manager many
        // times under contention without spinning forever.
        for _ in 0..current_max {
            let index = self.manager_index.fetch_add(1, Ordering::SeqCst) % len;
            let manager = &managers[index as usize];
            if let Some(count) = manager.try_claim(self.streams_per_channel) {
                debug!(
                    target: "grpc_client",
                    manager = manager.id(),
                    streams = count,
                    "Starting new stream on connection manager"
                );
                return Ok(StreamLease::new(Arc::clone(manager)));
            }
        }

        Err(GrpcError::CapacityExhausted(format!(
            "all connections may be at maximum capacity; {} total streams allowed across {} connections",
            current_max, len
        )))
    }

    /// Advisory aggregate check before selection; grows the pool when allowed.
    ///
    /// The sum is racy against concurrent releases, so it only decides early
    /// exits, growth and the headroom warning. The per-manager claim is what
    /// enforces the limit.
    fn ensure_capacity(&self) -> GrpcResult<()> {
        let active = self.active_subscriptions();
        let mut manager_count = self.manager_count();
        let mut current_max = self.current_max_concurrent_streams();
        debug!(target: "grpc_client", active, current_max, "Checking stream capacity");

        if active >= current_max {
            if !self.can_grow || manager_count >= self.max_manager_count {
                return Err(GrpcError::CapacityExhausted(format!(
                    "{} active streams on {} connections with a limit of {}; already at the maximum number of concurrent streams",
                    active, manager_count, current_max
                )));
            }
            self.add_manager()?;
            manager_count = self.manager_count();
            current_max = self.current_max_concurrent_streams();
            debug!(
                target: "grpc_client",
                managers = manager_count,
                max_managers = self.max_manager_count,
                "Added connection manager"
            );
        }

        if manager_count == self.max_manager_count {
            let remaining = current_max.saturating_sub(active);
            if remaining < HEADROOM_WARNING_THRESHOLD {
                warn!(
                    target: "grpc_client",
                    remaining,
                    total = current_max,
                    "Approaching maximum concurrent stream limit"
                );
            }
        }

        Ok(())
    }

    /// Grow by one manager. On failure the pool keeps its current size.
    fn add_manager(&self) -> GrpcResult<()> {
        let connection = self.factory.connect().map_err(|e| {
            tracing::error!(
                target: "grpc_client",
                managers = self.manager_count(),
                error = %e,
                "Failed to add connection manager"
            );
            e
        })?;
        let mut managers = self.managers.write().unwrap_or_else(PoisonError::into_inner);
        let id = managers.len();
        managers.push(Arc::new(ConnectionManager::new(id, connection)));
        Ok(())
    }

    fn close_managers(&self) {
        close_all(&self.snapshot());
    }
}

/// Admission control for streaming calls across a set of connections.
///
/// Every claim goes through a single producer task. Callers send a reply slot
/// over a one-place queue and wait for the producer to compute the next
/// manager, so capacity checks and growth never run concurrently.
///
/// ## Example
/// ```ignore
/// use grpc_client::pool::{StreamPool, StreamPoolConfig};
///
/// let pool = StreamPool::new(factory, StreamPoolConfig::elastic(1_000))?;
/// let lease = pool.next_manager().await?;
/// let channel = lease.connection()?;
/// // ... open the stream; drop `lease` when it ends
/// pool.close().await;
/// ```
pub struct StreamPool<F: ConnectionFactory> {
    state: Arc<PoolState<F>>,
    requests: mpsc::Sender<Reply<F::Connection>>,
    shutdown: watch::Sender<bool>,
    producer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<F: ConnectionFactory> StreamPool<F> {
    /// Build the initial managers and start the producer task.
    ///
    /// Must be called from within a Tokio runtime. Construction is atomic: if
    /// any initial connection fails, nothing is kept.
    pub fn new(factory: F, config: StreamPoolConfig) -> GrpcResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            GrpcError::InvalidConfig("stream pool must be created inside a Tokio runtime".to_string())
        })?;

        let managers = build_managers(&factory, config.initial_manager_count())?;
        debug!(
            target: "grpc_client",
            initial = managers.len(),
            max_managers = config.max_manager_count(),
            streams_per_channel = config.streams_per_channel,
            "Created stream pool"
        );

        let state = Arc::new(PoolState {
            factory,
            managers: RwLock::new(managers),
            manager_index: AtomicU64::new(0),
            max_manager_count: config.max_manager_count(),
            streams_per_channel: config.streams_per_channel,
            can_grow: config.can_grow(),
        });

        let (requests_tx, requests_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let producer = runtime.spawn(run_producer(Arc::clone(&state), requests_rx, shutdown_rx));

        Ok(Self {
            state,
            requests: requests_tx,
            shutdown: shutdown_tx,
            producer: Mutex::new(Some(producer)),
            closed: AtomicBool::new(false),
        })
    }

    /// Claim a stream slot on the next available manager.
    ///
    /// Fails with `CapacityExhausted` when no slot is free and the pool cannot
    /// grow, or `PoolShuttingDown` once [`close`](Self::close) has started.
    pub async fn next_manager(&self) -> GrpcResult<StreamLease<F::Connection>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GrpcError::PoolShuttingDown);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .await
            .map_err(|_| GrpcError::PoolShuttingDown)?;
        reply_rx.await.map_err(|_| GrpcError::PoolShuttingDown)?
    }

    /// Stop the producer and close every manager.
    ///
    /// Waiting callers get `PoolShuttingDown`. Close failures are logged and
    /// do not stop the remaining managers from closing. Repeated calls are
    /// no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);

        let producer = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = producer {
            if let Err(e) = handle.await {
                warn!(target: "grpc_client", error = %e, "Stream pool producer ended abnormally");
            }
        }

        self.state.close_managers();
        debug!(target: "grpc_client", "Stream pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn manager_count(&self) -> usize {
        self.state.manager_count()
    }

    pub fn max_manager_count(&self) -> usize {
        self.state.max_manager_count
    }

    pub fn streams_per_channel(&self) -> u32 {
        self.state.streams_per_channel
    }

    /// Always `manager_count() * streams_per_channel()`
    pub fn current_max_concurrent_streams(&self) -> u64 {
        self.state.current_max_concurrent_streams()
    }

    pub fn active_subscriptions(&self) -> u64 {
        self.state.active_subscriptions()
    }

    /// The managers in round-robin order
    pub fn managers(&self) -> Vec<Arc<ConnectionManager<F::Connection>>> {
        self.state.snapshot()
    }
}

async fn run_producer<F: ConnectionFactory>(
    state: Arc<PoolState<F>>,
    mut requests: mpsc::Receiver<Reply<F::Connection>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            request = requests.recv() => {
                let Some(reply) = request else {
                    break;
                };
                if *shutdown.borrow() {
                    break;
                }
                // A caller that gave up drops its receiver; the unsent lease
                // is dropped here and its slot released.
                if reply.send(state.next_manager()).is_err() {
                    debug!(target: "grpc_client", "Stream pool caller went away before handoff");
                }
            }
        }
    }
    debug!(target: "grpc_client", "Stream pool producer stopped");
}
