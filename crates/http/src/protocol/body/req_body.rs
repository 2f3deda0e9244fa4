use bytes::Bytes;
use tracing::trace;

use super::BodyLease;

/// A fully-aggregated request body.
///
/// The content is a cheaply clonable [`Bytes`]; clones handed to handlers do not extend the
/// lease. The lease itself is returned by [`ReqBody::release`], and a body dropped while
/// still holding its lease releases it on drop.
#[derive(Debug, Default)]
pub struct ReqBody {
    content: Bytes,
    lease: Option<BodyLease>,
}

impl ReqBody {
    /// Creates a body that is not tracked by any transport buffer pool.
    pub fn new(content: Bytes) -> Self {
        Self { content, lease: None }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a body whose buffer ownership is tracked by `lease`.
    pub fn leased(content: Bytes, lease: BodyLease) -> Self {
        Self { content, lease: Some(lease) }
    }

    /// Returns a shared handle to the buffered content.
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether the body still holds its transport lease.
    pub fn holds_lease(&self) -> bool {
        self.lease.is_some()
    }

    /// Returns the lease to the transport.
    ///
    /// Returns `true` only for the call that actually released it; later calls are no-ops.
    pub fn release(&mut self) -> bool {
        match self.lease.take() {
            Some(lease) => {
                drop(lease);
                trace!(size = self.content.len(), "request body released");
                true
            }
            None => false,
        }
    }
}

impl From<Bytes> for ReqBody {
    fn from(content: Bytes) -> Self {
        Self::new(content)
    }
}
