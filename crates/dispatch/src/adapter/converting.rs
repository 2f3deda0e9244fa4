use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use micro_dispatch_http::protocol::ResponseUnit;
use tracing::debug;

use super::HandlerAdapter;
use crate::converter::{ConverterRegistry, PayloadKind};
use crate::error::{DispatchError, panic_error};
use crate::handler::{Handler, HandlerKind, HandlerResult, dispatch_rest, takes_input};
use crate::media::{self, MediaType};
use crate::request::RequestContext;

/// Invokes typed and rest handlers: read, invoke, write as one step.
#[derive(Debug, Clone)]
pub struct ConvertingHandlerAdapter {
    registry: Arc<ConverterRegistry>,
}

impl ConvertingHandlerAdapter {
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        Self { registry }
    }

    fn input_kind(req: &RequestContext, handler: &Handler) -> Option<PayloadKind> {
        match handler.kind() {
            HandlerKind::Typed(typed) => typed.input(),
            HandlerKind::Rest(rest) => rest.input().filter(|_| takes_input(req.method())),
            HandlerKind::Raw(_) | HandlerKind::Custom(_) => None,
        }
    }
}

#[async_trait]
impl HandlerAdapter for ConvertingHandlerAdapter {
    fn name(&self) -> &'static str {
        "converting"
    }

    fn supports(&self, handler: &Handler) -> bool {
        matches!(handler.kind(), HandlerKind::Typed(_) | HandlerKind::Rest(_))
    }

    async fn handle(&self, req: &Arc<RequestContext>, handler: &Handler) -> Result<ResponseUnit, DispatchError> {
        let input = match Self::input_kind(req, handler) {
            Some(kind) => self.registry.read(kind, req.request_header(), req.content())?,
            None => None,
        };

        let started = Instant::now();
        let (invoked, produces) = match handler.kind() {
            HandlerKind::Typed(typed) => {
                let invoked = AssertUnwindSafe(typed.inner().handle(Arc::clone(req), input)).catch_unwind().await;
                (invoked, typed.produces())
            }
            HandlerKind::Rest(rest) => {
                let invoked =
                    AssertUnwindSafe(dispatch_rest(rest.as_ref(), Arc::clone(req), input)).catch_unwind().await;
                (invoked, &[][..])
            }
            HandlerKind::Raw(_) | HandlerKind::Custom(_) => return Err(DispatchError::no_adapter(handler.name())),
        };
        if req.is_sampled() {
            debug!(
                request_id = req.request_id(),
                handler = handler.name(),
                elapsed_us = started.elapsed().as_micros(),
                "handler executed"
            );
        }

        let result = match invoked {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(DispatchError::handler_invocation(handler.name(), e)),
            Err(panic) => return Err(DispatchError::handler_invocation(handler.name(), panic_error(panic.as_ref()))),
        };

        let accepted = media::parse_accept(req.headers());
        render(&self.registry, result, &accepted, produces)
    }
}

/// Turns a handler result into a response, negotiating the body's media type.
///
/// Raw results are returned untouched; typed results answer 200; entities keep their
/// status and headers.
pub fn render(
    registry: &ConverterRegistry,
    result: HandlerResult,
    accepted: &[MediaType],
    produces: &[MediaType],
) -> Result<ResponseUnit, DispatchError> {
    match result {
        HandlerResult::Raw(response) => Ok(response),
        HandlerResult::Typed(payload) => {
            let mut response = ResponseUnit::new(StatusCode::OK);
            registry.write(payload, accepted, Some(produces), &mut response)?;
            Ok(response)
        }
        HandlerResult::Entity(entity) => {
            let (status, headers, body) = entity.into_parts();
            let mut response = ResponseUnit::new(status);
            response.headers_mut().extend(headers);
            registry.write(body, accepted, Some(produces), &mut response)?;
            Ok(response)
        }
    }
}
