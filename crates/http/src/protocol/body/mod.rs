//! Request body buffers.
//!
//! The transport aggregates each request body into a single reference-counted buffer before
//! dispatch. Ownership of that buffer is tracked with a lease:
//!
//! - [`LeaseTracker`]: transport-side counter of leases still outstanding
//! - [`BodyLease`]: one logical ownership token, given back when dropped
//! - [`ReqBody`]: the buffered content plus the lease it carries
//!
//! A dispatch returns its lease exactly once, either explicitly through
//! [`ReqBody::release`] or implicitly when the body is dropped on an unwinding path.

mod lease;
mod req_body;

pub use lease::BodyLease;
pub use lease::LeaseTracker;
pub use req_body::ReqBody;
