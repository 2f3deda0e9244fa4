use std::time::{SystemTime, UNIX_EPOCH};

use http::StatusCode;
use micro_dispatch_http::protocol::ResponseUnit;
use serde::Serialize;
use tracing::error;

use super::{ExceptionResolver, write_json};
use crate::converter::Payload;
use crate::error::{BoxError, DispatchError};
use crate::handler::{Handler, HandlerResult};
use crate::request::RequestContext;

/// The body every unresolved failure is reported with.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    request_id: &'a str,
    code: i64,
    message: String,
    exception_kind: &'a str,
    timestamp: u64,
}

/// The terminal resolver: answers any failure with an [`ErrorBody`] and never fails.
#[derive(Debug, Clone, Copy)]
pub struct DefaultExceptionResolver {
    error_code: i64,
}

impl DefaultExceptionResolver {
    pub fn new(error_code: i64) -> Self {
        Self { error_code }
    }

    pub fn error_code(&self) -> i64 {
        self.error_code
    }

    pub(crate) fn resolve_error(&self, req: &RequestContext, error: &DispatchError) -> HandlerResult {
        error!(request_id = req.request_id(), uri = %req.uri(), cause = %error, "request failed");

        let body = ErrorBody {
            request_id: req.request_id(),
            code: self.error_code,
            message: error.client_message(),
            exception_kind: error.kind(),
            timestamp: now_millis(),
        };
        match Payload::json(&body) {
            Ok(payload) => HandlerResult::from(payload),
            Err(e) => HandlerResult::from(Payload::Text(format!("{}: {e}", body.message))),
        }
    }
}

impl ExceptionResolver for DefaultExceptionResolver {
    fn resolve(
        &self,
        req: &RequestContext,
        _handler: Option<&Handler>,
        error: &DispatchError,
    ) -> Result<Option<HandlerResult>, BoxError> {
        Ok(Some(self.resolve_error(req, error)))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// The fixed 500 written for fatal failures, bypassing negotiation.
pub fn fatal_response(error_code: i64, error: &DispatchError) -> ResponseUnit {
    let mut response = ResponseUnit::new(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "code": error_code,
        "message": error.to_string(),
        "exception": error.kind(),
    });
    write_json(&mut response, body);
    response
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Request;
    use http::header::CONTENT_TYPE;
    use micro_dispatch_http::protocol::RequestHeader;
    use serde_json::Value;

    use super::*;
    use crate::request::PathParams;

    #[test]
    fn configured_error_code() {
        let header: RequestHeader = Request::builder().uri("/").body(()).unwrap().into();
        let req = RequestContext::new(header, Bytes::new(), PathParams::empty()).with_request_id("abc");
        let resolver = DefaultExceptionResolver::new(-1);

        let result = resolver.resolve(&req, None, &DispatchError::route_not_found("/")).unwrap();
        let Some(HandlerResult::Typed(Some(Payload::Json(body)))) = result else {
            panic!("expected a json body");
        };
        assert_eq!(body["code"], -1);
        assert_eq!(body["requestId"], "abc");
        assert_eq!(body["exceptionKind"], "RouteNotFound");
    }

    #[test]
    fn fatal_body() {
        let response = fatal_response(0, &DispatchError::no_adapter("opaque"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["code"], 0);
        assert_eq!(body["exception"], "NoAdapterForHandler");
        assert_eq!(body["message"], "no adapter supports handler 'opaque'");
    }
}
