//! Strategies that know how to invoke each handler variant.
//!
//! The [`AdapterResolver`] asks its adapters in order whether they support a handler and
//! uses the first that does. User adapters are consulted before the defaults:
//!
//! - [`ConvertingHandlerAdapter`] for typed and rest handlers: read the body through the
//!   converter registry, invoke, render the result with content negotiation
//! - [`RawHandlerAdapter`] for raw handlers, whose response is written as is
//!
//! A handler no adapter supports fails with the fatal
//! [`DispatchError::NoAdapterForHandler`].

mod converting;
mod raw;

pub use converting::ConvertingHandlerAdapter;
pub use converting::render;
pub use raw::RawHandlerAdapter;

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use micro_dispatch_http::protocol::ResponseUnit;

use crate::converter::ConverterRegistry;
use crate::error::DispatchError;
use crate::handler::Handler;
use crate::request::RequestContext;

#[async_trait]
pub trait HandlerAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, handler: &Handler) -> bool;

    /// Invokes `handler` and produces the response, reading and writing bodies as needed.
    async fn handle(&self, req: &Arc<RequestContext>, handler: &Handler) -> Result<ResponseUnit, DispatchError>;
}

pub struct AdapterResolver {
    adapters: Vec<Arc<dyn HandlerAdapter>>,
}

impl Debug for AdapterResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.adapters.iter().map(|a| a.name())).finish()
    }
}

impl AdapterResolver {
    /// The default adapters, converting through `registry`.
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        Self::with_adapters(Vec::new(), registry)
    }

    /// `adapters` first, then the defaults.
    pub fn with_adapters(mut adapters: Vec<Arc<dyn HandlerAdapter>>, registry: Arc<ConverterRegistry>) -> Self {
        adapters.push(Arc::new(ConvertingHandlerAdapter::new(registry)));
        adapters.push(Arc::new(RawHandlerAdapter));
        Self { adapters }
    }

    pub fn resolve(&self, handler: &Handler) -> Result<&dyn HandlerAdapter, DispatchError> {
        self.adapters
            .iter()
            .find(|adapter| adapter.supports(handler))
            .map(AsRef::as_ref)
            .ok_or_else(|| DispatchError::no_adapter(handler.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerResult, handler_fn, raw_fn};

    struct Custom;

    #[async_trait]
    impl HandlerAdapter for Custom {
        fn name(&self) -> &'static str {
            "custom"
        }

        fn supports(&self, handler: &Handler) -> bool {
            matches!(handler.kind(), crate::handler::HandlerKind::Custom(_))
        }

        async fn handle(&self, _req: &Arc<RequestContext>, _handler: &Handler) -> Result<ResponseUnit, DispatchError> {
            Ok(ResponseUnit::new(http::StatusCode::ACCEPTED))
        }
    }

    #[test]
    fn resolves_by_variant() {
        let resolver = AdapterResolver::new(Arc::new(ConverterRegistry::default()));

        let noop = handler_fn(|_req, _input| async { Ok::<_, crate::BoxError>(HandlerResult::empty()) });
        let typed = Handler::typed("typed").build(noop);
        assert_eq!(resolver.resolve(&typed).unwrap().name(), "converting");

        let raw = Handler::raw(
            "raw",
            raw_fn(|_req| async { Ok::<_, crate::BoxError>(ResponseUnit::new(http::StatusCode::OK)) }),
        );
        assert_eq!(resolver.resolve(&raw).unwrap().name(), "raw");

        let custom = Handler::custom("opaque", Arc::new(7_u32));
        let err = resolver.resolve(&custom).err().unwrap();
        assert!(matches!(err, DispatchError::NoAdapterForHandler { ref handler } if handler == "opaque"));
        assert!(err.is_fatal());
    }

    #[test]
    fn user_adapters_come_first() {
        let resolver = AdapterResolver::with_adapters(vec![Arc::new(Custom)], Arc::new(ConverterRegistry::default()));
        let custom = Handler::custom("opaque", Arc::new(7_u32));
        assert_eq!(resolver.resolve(&custom).unwrap().name(), "custom");
    }
}
