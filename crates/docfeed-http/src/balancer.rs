//! Least-busy transport selection
//!
//! Each backend carries an atomic inflight counter. Selection scans all
//! backends starting at a rotating offset and picks the first one with the
//! fewest inflight calls. The rotating offset spreads the first look across
//! backends when they are all equally idle.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FeedError, Result};
use crate::request::FeedRequest;
use crate::transport::{Transport, TransportResponse};

/// A transport plus the number of calls currently issued through it
struct Backend {
    transport: Arc<dyn Transport>,
    inflight: AtomicI64,
}

/// Fixed pool of backends with lock-free least-busy selection
pub struct LoadBalancer {
    backends: Vec<Backend>,
    /// Rotation cursor; advances once per selection
    cursor: AtomicUsize,
}

impl LoadBalancer {
    /// Create a balancer over `transports`; fails when the pool is empty
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Result<Self> {
        if transports.is_empty() {
            return Err(FeedError::Config(
                "need at least one transport".to_string(),
            ));
        }
        let backends = transports
            .into_iter()
            .map(|transport| Backend {
                transport,
                inflight: AtomicI64::new(0),
            })
            .collect();
        Ok(Self {
            backends,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Number of backends
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; construction rejects an empty pool
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Current inflight count of every backend, in pool order
    pub fn inflight(&self) -> Vec<i64> {
        self.backends
            .iter()
            .map(|b| b.inflight.load(Ordering::Acquire))
            .collect()
    }

    /// Pick the least busy backend and count a call against it.
    ///
    /// The count is released when the returned lease is dropped or its call
    /// completes.
    pub fn acquire(&self) -> Lease<'_> {
        let n = self.backends.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;

        let mut best = start;
        let mut min = i64::MAX;
        for i in 0..n {
            let j = (start + i) % n;
            let inflight = self.backends[j].inflight.load(Ordering::Acquire);
            if inflight < min {
                best = j;
                min = inflight;
            }
        }

        let backend = &self.backends[best];
        backend.inflight.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(backend = best, inflight = min, "Selected transport");
        Lease {
            index: best,
            backend,
        }
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("backends", &self.backends.len())
            .field("inflight", &self.inflight())
            .finish()
    }
}

/// One counted use of a backend.
///
/// Holds one inflight increment and gives it back exactly once, when the
/// call returns or when the lease is dropped unused. The count covers the
/// call itself, not the reading of the response body.
pub struct Lease<'a> {
    index: usize,
    backend: &'a Backend,
}

impl Lease<'_> {
    /// Position of the selected backend in the pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Issue the call; the inflight count is released when it returns
    pub async fn call(self, request: FeedRequest, deadline: Duration) -> Result<TransportResponse> {
        self.backend.transport.call(request, deadline).await
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.backend.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
