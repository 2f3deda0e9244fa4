use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use micro_dispatch_http::protocol::ResponseUnit;

use crate::error::BoxError;
use crate::request::RequestContext;

/// A handler that builds the whole response itself, bypassing conversion.
#[async_trait]
pub trait RawHandler: Send + Sync {
    async fn handle(&self, req: Arc<RequestContext>) -> Result<ResponseUnit, BoxError>;
}

pub struct RawFnHandler<F> {
    f: F,
}

impl<F> Debug for RawFnHandler<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFnHandler").finish_non_exhaustive()
    }
}

pub fn raw_fn<F, Fut, E>(f: F) -> RawFnHandler<F>
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseUnit, E>> + Send,
    E: Into<BoxError>,
{
    RawFnHandler { f }
}

#[async_trait]
impl<F, Fut, E> RawHandler for RawFnHandler<F>
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseUnit, E>> + Send,
    E: Into<BoxError>,
{
    async fn handle(&self, req: Arc<RequestContext>) -> Result<ResponseUnit, BoxError> {
        (self.f)(req).await.map_err(Into::into)
    }
}
