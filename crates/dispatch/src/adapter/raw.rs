use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use micro_dispatch_http::protocol::ResponseUnit;

use super::HandlerAdapter;
use crate::error::{DispatchError, panic_error};
use crate::handler::{Handler, HandlerKind};
use crate::request::RequestContext;

/// Invokes [`HandlerKind::Raw`] handlers; their response skips conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawHandlerAdapter;

#[async_trait]
impl HandlerAdapter for RawHandlerAdapter {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn supports(&self, handler: &Handler) -> bool {
        matches!(handler.kind(), HandlerKind::Raw(_))
    }

    async fn handle(&self, req: &Arc<RequestContext>, handler: &Handler) -> Result<ResponseUnit, DispatchError> {
        let HandlerKind::Raw(raw) = handler.kind() else {
            return Err(DispatchError::no_adapter(handler.name()));
        };
        match AssertUnwindSafe(raw.handle(Arc::clone(req))).catch_unwind().await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(DispatchError::handler_invocation(handler.name(), e)),
            Err(panic) => Err(DispatchError::handler_invocation(handler.name(), panic_error(panic.as_ref()))),
        }
    }
}
