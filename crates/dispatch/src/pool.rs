//! The bounded worker pool business logic runs on.
//!
//! A dedicated multi-thread runtime does the work; a semaphore sized to running plus queued
//! requests gates admission, so a saturated pool rejects explicitly instead of growing.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ExecutionConfig;
use crate::error::DispatchRejected;

#[derive(Debug)]
pub struct WorkerPool {
    handle: Handle,
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Starts a dedicated runtime sized by `config`.
    pub fn new(config: &ExecutionConfig) -> io::Result<Self> {
        let prefix = config.thread_name_prefix.clone();
        let sequence = AtomicUsize::new(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.core_threads)
            .max_blocking_threads(config.max_threads)
            .thread_keep_alive(config.idle_timeout())
            .thread_name_fn(move || format!("{prefix}{}", sequence.fetch_add(1, Ordering::Relaxed)))
            .enable_all()
            .build()?;

        info!(
            core_threads = config.core_threads,
            max_threads = config.max_threads,
            queue_capacity = config.queue_capacity,
            "worker pool started"
        );
        let handle = runtime.handle().clone();
        let capacity = config.capacity();
        Ok(Self { handle, runtime: Some(runtime), permits: Arc::new(Semaphore::new(capacity)), capacity })
    }

    /// Runs on an existing runtime, admitting at most `capacity` requests at once.
    pub fn with_handle(handle: Handle, capacity: usize) -> Self {
        Self { handle, runtime: None, permits: Arc::new(Semaphore::new(capacity)), capacity }
    }

    /// Reserves room for one request; the permit is held until the request completes.
    pub fn try_admit(&self) -> Result<OwnedSemaphorePermit, DispatchRejected> {
        Arc::clone(&self.permits).try_acquire_owned().ok().ok_or(DispatchRejected { capacity: self.capacity })
    }

    pub fn spawn<F>(&self, permit: OwnedSemaphorePermit, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(async move {
            let output = future.await;
            drop(permit);
            output
        })
    }

    /// Requests that can still be admitted.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn admission_is_bounded() {
        let pool = WorkerPool::with_handle(Handle::current(), 2);

        let first = pool.try_admit().unwrap();
        let second = pool.try_admit().unwrap();
        let rejected = pool.try_admit().unwrap_err();
        assert_eq!(rejected.capacity, 2);
        assert_eq!(pool.available(), 0);

        assert_eq!(pool.spawn(first, async { 7 }).await.unwrap(), 7);
        assert_eq!(pool.available(), 1);
        drop(second);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn dedicated_runtime_names_threads() {
        let config =
            ExecutionConfig { core_threads: 1, max_threads: 2, queue_capacity: 1, ..ExecutionConfig::default() };
        let pool = WorkerPool::new(&config).unwrap();
        assert_eq!(pool.capacity(), 3);

        let permit = pool.try_admit().unwrap();
        let name = pool.spawn(permit, async { std::thread::current().name().map(str::to_owned) }).await.unwrap();
        assert!(name.unwrap().starts_with("nio-"));
    }
}
