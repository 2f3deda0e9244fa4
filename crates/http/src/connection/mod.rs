//! Outbound side of the transport contract.
//!
//! The dispatch engine never touches sockets. Once a request is handled, it hands one
//! [`ResponseUnit`] to a [`ResponseWriter`]; the transport encodes, writes and flushes it,
//! and closes the connection when asked to.
//!
//! # Components
//!
//! - [`ResponseWriter`]: the per-connection write contract
//! - [`CountingWriter`]: a decorator keeping lock-free per-connection [`ConnectionStats`]
//! - [`RecordingWriter`]: an in-memory writer, used by tests and demos

mod counting;
mod recording;

pub use counting::ConnectionStats;
pub use counting::CountingWriter;
pub use recording::RecordingWriter;

use async_trait::async_trait;

use crate::protocol::{ResponseUnit, SendError};

/// Writes responses back to a single connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseWriter: Send {
    /// Writes and flushes one response.
    async fn write(&mut self, response: ResponseUnit) -> Result<(), SendError>;

    /// Closes the connection after everything written so far has been flushed.
    async fn close(&mut self);
}

#[async_trait]
impl<W: ResponseWriter + ?Sized> ResponseWriter for Box<W> {
    async fn write(&mut self, response: ResponseUnit) -> Result<(), SendError> {
        (**self).write(response).await
    }

    async fn close(&mut self) {
        (**self).close().await;
    }
}

/// A type-erased writer, as it crosses into the worker pool.
pub type BoxWriter = Box<dyn ResponseWriter + 'static>;
