//! Turning failures into responses.
//!
//! Every [`DispatchError`] raised after routing goes through the [`ResolverChain`] once.
//! User resolvers are asked in order; the first substitute wins and is rendered through the
//! converter registry with content negotiation. The terminal [`DefaultExceptionResolver`]
//! answers everything the others decline, so the chain always yields a response.

mod default;

pub use default::DefaultExceptionResolver;
pub use default::fatal_response;

use std::fmt::{Debug, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use micro_dispatch_http::protocol::ResponseUnit;
use serde_json::Value;
use tracing::{error, warn};

use crate::converter::ConverterRegistry;
use crate::error::{BoxError, DispatchError, panic_error};
use crate::handler::{Handler, HandlerResult};
use crate::media;
use crate::request::RequestContext;

pub trait ExceptionResolver: Send + Sync {
    /// Returns a substitute result for `error`, or `None` to let the next resolver try.
    ///
    /// `handler` is `None` when the failure happened before a handler was found.
    fn resolve(
        &self,
        req: &RequestContext,
        handler: Option<&Handler>,
        error: &DispatchError,
    ) -> Result<Option<HandlerResult>, BoxError>;
}

pub struct ResolverFn<F> {
    f: F,
}

impl<F> Debug for ResolverFn<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverFn").finish_non_exhaustive()
    }
}

pub fn resolver_fn<F, E>(f: F) -> ResolverFn<F>
where
    F: Fn(&RequestContext, Option<&Handler>, &DispatchError) -> Result<Option<HandlerResult>, E> + Send + Sync,
    E: Into<BoxError>,
{
    ResolverFn { f }
}

impl<F, E> ExceptionResolver for ResolverFn<F>
where
    F: Fn(&RequestContext, Option<&Handler>, &DispatchError) -> Result<Option<HandlerResult>, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn resolve(
        &self,
        req: &RequestContext,
        handler: Option<&Handler>,
        error: &DispatchError,
    ) -> Result<Option<HandlerResult>, BoxError> {
        (self.f)(req, handler, error).map_err(Into::into)
    }
}

pub struct ResolverChain {
    resolvers: Vec<Arc<dyn ExceptionResolver>>,
    fallback: DefaultExceptionResolver,
    registry: Arc<ConverterRegistry>,
}

impl Debug for ResolverChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.resolvers.len())
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl ResolverChain {
    pub fn new(
        resolvers: Vec<Arc<dyn ExceptionResolver>>,
        fallback: DefaultExceptionResolver,
        registry: Arc<ConverterRegistry>,
    ) -> Self {
        Self { resolvers, fallback, registry }
    }

    /// Produces the response for `error`. Failing or panicking resolvers are logged and
    /// skipped.
    pub fn resolve(&self, req: &RequestContext, handler: Option<&Handler>, error: &DispatchError) -> ResponseUnit {
        for resolver in &self.resolvers {
            match catch_unwind(AssertUnwindSafe(|| resolver.resolve(req, handler, error))) {
                Ok(Ok(Some(result))) => return self.render(req, result, error.status()),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => error!(request_id = req.request_id(), cause = %e, "exception resolver failed"),
                Err(panic) => {
                    let cause = panic_error(panic.as_ref());
                    error!(request_id = req.request_id(), cause = %cause, "exception resolver panicked");
                }
            }
        }
        let result = self.fallback.resolve_error(req, error);
        self.render(req, result, error.status())
    }

    fn render(&self, req: &RequestContext, result: HandlerResult, status: StatusCode) -> ResponseUnit {
        let (status, headers, body) = match result {
            HandlerResult::Raw(response) => return response,
            HandlerResult::Typed(body) => (status, HeaderMap::new(), body),
            HandlerResult::Entity(entity) => entity.into_parts(),
        };

        let mut response = ResponseUnit::new(status);
        response.headers_mut().extend(headers);
        let accepted = media::parse_accept(req.headers());
        if let Err(e) = self.registry.write(body, &accepted, None, &mut response) {
            warn!(request_id = req.request_id(), cause = %e, "error body not negotiable, answering without body");
            response.headers_mut().remove(CONTENT_TYPE);
            response.headers_mut().remove(http::header::CONTENT_LENGTH);
            response.set_body(Bytes::new());
        }
        response
    }
}

pub(crate) fn write_json(response: &mut ResponseUnit, value: Value) {
    let body = serde_json::to_vec(&value).unwrap_or_default();
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response.headers_mut().remove(http::header::CONTENT_LENGTH);
    response.set_body(body.into());
}

#[cfg(test)]
mod tests {
    use http::Request;
    use micro_dispatch_http::protocol::RequestHeader;
    use serde_json::json;

    use super::*;
    use crate::converter::Payload;
    use crate::error::ApplicationError;
    use crate::request::PathParams;

    fn context(accept: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().uri("/orders/7");
        if let Some(accept) = accept {
            builder = builder.header(http::header::ACCEPT, accept);
        }
        let header: RequestHeader = builder.body(()).unwrap().into();
        RequestContext::new(header, Bytes::new(), PathParams::empty()).with_request_id("req-1")
    }

    fn chain(resolvers: Vec<Arc<dyn ExceptionResolver>>) -> ResolverChain {
        ResolverChain::new(resolvers, DefaultExceptionResolver::new(0), Arc::new(ConverterRegistry::default()))
    }

    fn json_body(response: &ResponseUnit) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn default_resolver_renders_error_body() {
        let err = DispatchError::handler_invocation("orders", "database unavailable".into());
        let response = chain(vec![]).resolve(&context(None), None, &err);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(&response);
        assert_eq!(body["requestId"], "req-1");
        assert_eq!(body["code"], 0);
        assert_eq!(body["message"], "database unavailable");
        assert_eq!(body["exceptionKind"], "HandlerInvocationFailure");
        assert!(body["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn first_substitute_wins() {
        let declines = resolver_fn(|_req, _handler, _err| Ok::<_, BoxError>(None));
        let answers = resolver_fn(|_req, _handler, err: &DispatchError| {
            Ok::<_, BoxError>(Some(HandlerResult::from(Payload::from(format!("handled {}", err.kind())))))
        });
        let never = resolver_fn(|_req, _handler, _err| Ok::<_, BoxError>(Some(HandlerResult::empty())));

        let response = chain(vec![Arc::new(declines), Arc::new(answers), Arc::new(never)]).resolve(
            &context(Some("text/plain")),
            None,
            &DispatchError::route_not_found("/orders/7"),
        );

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"handled RouteNotFound");
    }

    #[test]
    fn failing_resolvers_are_skipped() {
        let failing = resolver_fn(|_req, _handler, _err| Err::<Option<HandlerResult>, _>("resolver broke"));
        let panicking = resolver_fn(|_req, _handler, _err| -> Result<Option<HandlerResult>, BoxError> {
            panic!("resolver panicked")
        });

        let err = DispatchError::interceptor(
            crate::error::Phase::PreHandle,
            Box::new(ApplicationError::new("Forbidden", "no access").with_status(StatusCode::FORBIDDEN)),
        );
        let response = chain(vec![Arc::new(failing), Arc::new(panicking)]).resolve(&context(None), None, &err);

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(&response)["exceptionKind"], "Forbidden");
    }

    #[test]
    fn unnegotiable_substitute_answers_without_body() {
        let answers = resolver_fn(|_req, _handler, _err| {
            Ok::<_, BoxError>(Some(HandlerResult::from(Payload::Json(json!({"oops": true})))))
        });
        let err = DispatchError::not_acceptable("text/csv");

        let response = chain(vec![Arc::new(answers)]).resolve(&context(Some("image/png")), None, &err);
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert!(response.body().is_empty());

        let response = chain(vec![]).resolve(&context(Some("image/png")), None, &err);
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert!(response.body().is_empty());
    }
}
