//! Wire units and transport contract for the micro dispatch engine.
//!
//! This crate holds everything the dispatch engine and a network transport need to agree
//! on, and nothing that touches sockets:
//!
//! - [`protocol`]: aggregated request units, buffered responses, body leases and errors
//! - [`connection`]: the outbound [`ResponseWriter`](connection::ResponseWriter) contract
//! - [`handler`]: the inbound [`Handler`](handler::Handler) contract
//!
//! # Buffer ownership
//!
//! The transport aggregates each request body into one buffer and tracks it with a
//! [`LeaseTracker`](protocol::body::LeaseTracker). The lease travels with the
//! [`RequestUnit`](protocol::RequestUnit) and must be released exactly once by whoever ends
//! up owning the unit. Dropping the body releases a lease that is still held, so early
//! returns and panics cannot leak buffers.
//!
//! # Keep-alive
//!
//! [`RequestHeader::is_keep_alive`](protocol::RequestHeader::is_keep_alive) applies the
//! HTTP/1.x rules: HTTP/1.1 keeps the connection unless `Connection: close` is sent, HTTP/1.0
//! closes it unless `Connection: keep-alive` is sent.

pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
