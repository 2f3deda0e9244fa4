use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::ResponseWriter;
use crate::protocol::{ResponseUnit, SendError};

/// Lock-free counters for one connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    responses: AtomicU64,
    write_failures: AtomicU64,
    bytes_written: AtomicU64,
    closed: AtomicU64,
}

impl ConnectionStats {
    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) > 0
    }
}

/// Decorates a writer, counting what passes through it.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    stats: Arc<ConnectionStats>,
}

impl<W: ResponseWriter> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, stats: Arc::new(ConnectionStats::default()) }
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl<W: ResponseWriter> ResponseWriter for CountingWriter<W> {
    async fn write(&mut self, response: ResponseUnit) -> Result<(), SendError> {
        let size = response.body().len() as u64;
        match self.inner.write(response).await {
            Ok(()) => {
                self.stats.responses.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_written.fetch_add(size, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::Relaxed);
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::connection::MockResponseWriter;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn counts_success_and_failure() {
        let mut mock = MockResponseWriter::new();
        let mut results = vec![Err(SendError::Closed), Ok(())];
        mock.expect_write().times(2).returning(move |_| results.pop().unwrap());
        mock.expect_close().times(1).return_const(());

        let mut writer = CountingWriter::new(mock);
        let stats = writer.stats();

        let mut response = ResponseUnit::new(StatusCode::OK);
        response.set_body("hello".into());
        writer.write(response.clone()).await.unwrap();
        assert!(writer.write(response).await.is_err());
        writer.close().await;

        assert_eq!(stats.responses(), 1);
        assert_eq!(stats.write_failures(), 1);
        assert_eq!(stats.bytes_written(), 5);
        assert!(stats.is_closed());
    }
}
