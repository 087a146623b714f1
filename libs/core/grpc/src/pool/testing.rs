use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Connection, ConnectionFactory};
use crate::error::{GrpcError, GrpcResult};

/// In-memory transport that records how often it was closed
#[derive(Clone, Debug, Default)]
pub struct FakeConnection {
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

impl FakeConnection {
    pub fn tracked(closes: &Arc<AtomicUsize>) -> Self {
        Self {
            closes: Arc::clone(closes),
            fail_close: false,
        }
    }

    pub fn failing_close() -> Self {
        Self {
            closes: Arc::default(),
            fail_close: true,
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Connection for FakeConnection {
    fn close(&self) -> GrpcResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(GrpcError::ConnectionFailed("close failed".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeFactory {
    created: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_after: Option<usize>,
    slow_after: Option<(usize, Duration)>,
    fail_close: bool,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed `n` times, then refuse every further connection
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Block the calling thread for `delay` on every connection after the first `n`
    pub fn slow_after(mut self, n: usize, delay: Duration) -> Self {
        self.slow_after = Some((n, delay));
        self
    }

    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    fn connect(&self) -> GrpcResult<FakeConnection> {
        if let Some(limit) = self.fail_after {
            if self.created() >= limit {
                return Err(GrpcError::ConnectionFailed("connection refused".to_string()));
            }
        }
        if let Some((fast, delay)) = self.slow_after {
            if self.created() >= fast {
                std::thread::sleep(delay);
            }
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            closes: Arc::clone(&self.closes),
            fail_close: self.fail_close,
        })
    }
}
