use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use micro_dispatch_http::protocol::ResponseUnit;

use crate::converter::{Payload, PayloadKind};
use crate::error::BoxError;
use crate::request::RequestContext;

use super::HandlerResult;

/// A handler split per HTTP method.
///
/// `GET` and `POST` must be implemented. `PUT`, `PATCH` and `DELETE` answer an empty 200
/// unless overridden; any other method answers `501 Not Implemented`. Only `POST`, `PUT`
/// and `PATCH` receive the body read as [`RestHandler::input`].
#[async_trait]
pub trait RestHandler: Send + Sync {
    /// The payload kind request bodies are read as; `None` skips reading.
    fn input(&self) -> Option<PayloadKind> {
        None
    }

    async fn get(&self, req: Arc<RequestContext>) -> Result<HandlerResult, BoxError>;

    async fn post(&self, req: Arc<RequestContext>, input: Option<Payload>) -> Result<HandlerResult, BoxError>;

    async fn put(&self, _req: Arc<RequestContext>, _input: Option<Payload>) -> Result<HandlerResult, BoxError> {
        Ok(HandlerResult::empty())
    }

    async fn patch(&self, _req: Arc<RequestContext>, _input: Option<Payload>) -> Result<HandlerResult, BoxError> {
        Ok(HandlerResult::empty())
    }

    async fn delete(&self, _req: Arc<RequestContext>) -> Result<HandlerResult, BoxError> {
        Ok(HandlerResult::empty())
    }
}

/// Whether a rest handler reads the body for this method.
pub(crate) fn takes_input(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

pub(crate) async fn dispatch_rest(
    handler: &dyn RestHandler,
    req: Arc<RequestContext>,
    input: Option<Payload>,
) -> Result<HandlerResult, BoxError> {
    let method = req.method().clone();
    match method {
        Method::GET => handler.get(req).await,
        Method::POST => handler.post(req, input).await,
        Method::PUT => handler.put(req, input).await,
        Method::PATCH => handler.patch(req, input).await,
        Method::DELETE => handler.delete(req).await,
        _ => Ok(HandlerResult::Raw(ResponseUnit::new(StatusCode::NOT_IMPLEMENTED))),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Request;
    use micro_dispatch_http::protocol::RequestHeader;

    use super::*;
    use crate::request::PathParams;

    struct Users;

    #[async_trait]
    impl RestHandler for Users {
        fn input(&self) -> Option<PayloadKind> {
            Some(PayloadKind::Text)
        }

        async fn get(&self, _req: Arc<RequestContext>) -> Result<HandlerResult, BoxError> {
            Ok(Payload::from("list").into())
        }

        async fn post(&self, _req: Arc<RequestContext>, input: Option<Payload>) -> Result<HandlerResult, BoxError> {
            Ok(input.into())
        }
    }

    fn context(method: Method) -> Arc<RequestContext> {
        let header: RequestHeader = Request::builder().method(method).uri("/users").body(()).unwrap().into();
        Arc::new(RequestContext::new(header, Bytes::new(), PathParams::empty()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn routes_by_method() {
        let result = dispatch_rest(&Users, context(Method::GET), None).await.unwrap();
        assert!(matches!(result, HandlerResult::Typed(Some(Payload::Text(ref t))) if t == "list"));

        let result = dispatch_rest(&Users, context(Method::POST), Some(Payload::from("new"))).await.unwrap();
        assert!(matches!(result, HandlerResult::Typed(Some(Payload::Text(ref t))) if t == "new"));

        let result = dispatch_rest(&Users, context(Method::DELETE), None).await.unwrap();
        assert!(matches!(result, HandlerResult::Typed(None)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn unknown_method_is_not_implemented() {
        let result = dispatch_rest(&Users, context(Method::OPTIONS), None).await.unwrap();
        let HandlerResult::Raw(unit) = result else {
            panic!("expected a raw response");
        };
        assert_eq!(unit.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn body_methods() {
        assert!(takes_input(&Method::POST));
        assert!(takes_input(&Method::PATCH));
        assert!(!takes_input(&Method::GET));
        assert!(!takes_input(&Method::DELETE));
    }
}
