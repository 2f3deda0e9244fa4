//! An async request dispatch engine.
//!
//! The transport hands each fully-aggregated request to a [`Dispatcher`], which admits it
//! into a bounded worker pool and runs it through a fixed pipeline:
//!
//! - [`router`]: glob path patterns with `{name}` variables, most specific match wins
//! - [`interceptor`]: `pre_handle`, `post_handle` and `after_completion` around the handler
//! - [`adapter`]: bridges handler shapes to a response, converting payloads on the way
//! - [`converter`]: byte, text, JSON and form payload conversion with content negotiation
//! - [`resolver`]: turns failures into error responses
//!
//! Sampled requests get detailed diagnostic logs, see [`SamplingGate`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use micro_dispatch::converter::Payload;
//! use micro_dispatch::handler::{Handler, handler_fn};
//! use micro_dispatch::{BoxError, Dispatcher, RequestContext};
//!
//! let hello = Handler::typed("hello").build(handler_fn(|req: Arc<RequestContext>, _input| async move {
//!     let name = req.path_variable("name").unwrap_or("world").to_owned();
//!     Ok::<_, BoxError>(Payload::from(format!("hello {name}")))
//! }));
//!
//! let dispatcher = Dispatcher::builder().route("/hello/{name}", hello).build().unwrap();
//! ```

pub mod adapter;
pub mod config;
pub mod converter;
pub mod handler;
pub mod interceptor;
pub mod resolver;
pub mod router;

mod date;
mod dispatcher;
mod error;
mod media;
mod pool;
mod request;
mod sampling;

pub use config::DispatcherConfig;
pub use date::DateService;
pub use dispatcher::DispatchStats;
pub use dispatcher::Dispatcher;
pub use dispatcher::DispatcherBuildError;
pub use dispatcher::DispatcherBuilder;
pub use error::ApplicationError;
pub use error::BoxError;
pub use error::ConversionStage;
pub use error::DispatchError;
pub use error::DispatchRejected;
pub use error::Phase;
pub use media::MediaType;
pub use pool::WorkerPool;
pub use request::Exchange;
pub use request::PathParams;
pub use request::RequestContext;
pub use sampling::SamplingGate;
