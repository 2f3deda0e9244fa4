use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::ResponseWriter;
use crate::protocol::{ResponseUnit, SendError};

#[derive(Debug, Default)]
struct Recorded {
    responses: Vec<ResponseUnit>,
    closed: bool,
}

/// An in-memory writer that keeps every response it is given.
///
/// Clones share the same record, so a test can hand one clone to the dispatcher and inspect
/// the other after the dispatch completes. Writing after `close` fails with
/// [`SendError::Closed`].
#[derive(Debug, Clone, Default)]
pub struct RecordingWriter {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> Vec<ResponseUnit> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).responses.clone()
    }

    pub fn last_response(&self) -> Option<ResponseUnit> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).responses.last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).closed
    }
}

#[async_trait]
impl ResponseWriter for RecordingWriter {
    async fn write(&mut self, response: ResponseUnit) -> Result<(), SendError> {
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        if recorded.closed {
            return Err(SendError::Closed);
        }
        recorded.responses.push(response);
        Ok(())
    }

    async fn close(&mut self) {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
    }
}
