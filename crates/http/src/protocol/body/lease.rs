use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts the body buffers the transport has handed out and not yet seen released.
#[derive(Debug, Clone, Default)]
pub struct LeaseTracker {
    outstanding: Arc<AtomicUsize>,
}

impl LeaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a new ownership token and bumps the outstanding count.
    pub fn acquire(&self) -> BodyLease {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        BodyLease { outstanding: Arc::clone(&self.outstanding) }
    }

    /// Number of leases acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

/// One logical ownership token of a transport buffer.
///
/// The token is not `Clone`: the only way to give it back is to drop it, which happens at
/// most once.
#[derive(Debug)]
pub struct BodyLease {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for BodyLease {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}
