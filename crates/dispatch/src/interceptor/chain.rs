use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use micro_dispatch_http::protocol::ResponseUnit;
use tracing::error;

use crate::error::{DispatchError, Phase, panic_error};
use crate::handler::Handler;
use crate::request::Exchange;

use super::Interceptor;

/// Where an [`ExecutionChain`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Init,
    PreHandling,
    Aborted,
    Handling,
    PostHandling,
    Completed,
}

/// A handler together with the interceptors applied to one request.
///
/// The cursor counts the interceptors whose `pre_handle` ran and returned `true`; those,
/// and only those, receive `after_completion`.
pub struct ExecutionChain {
    handler: Arc<Handler>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    cursor: usize,
    state: ChainState,
}

impl std::fmt::Debug for ExecutionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionChain")
            .field("handler", &self.handler.name())
            .field("interceptors", &self.interceptors.len())
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .finish()
    }
}

impl ExecutionChain {
    pub fn new(handler: Arc<Handler>, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { handler, interceptors, cursor: 0, state: ChainState::Init }
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Runs every `pre_handle` in order, stopping at the first that returns `false` or fails.
    ///
    /// Returns `Ok(true)` when the handler may run.
    pub async fn apply_pre_handle(&mut self, exchange: &mut Exchange) -> Result<bool, DispatchError> {
        self.state = ChainState::PreHandling;
        while let Some(interceptor) = self.interceptors.get(self.cursor) {
            let outcome = AssertUnwindSafe(interceptor.pre_handle(exchange, &self.handler)).catch_unwind().await;
            match outcome {
                Ok(Ok(true)) => self.cursor += 1,
                Ok(Ok(false)) => {
                    self.state = ChainState::Aborted;
                    return Ok(false);
                }
                Ok(Err(e)) => return Err(DispatchError::interceptor(Phase::PreHandle, e)),
                Err(panic) => return Err(DispatchError::interceptor(Phase::PreHandle, panic_error(panic.as_ref()))),
            }
        }
        self.state = ChainState::Handling;
        Ok(true)
    }

    /// Runs every `post_handle` in reverse order; a no-op unless the handler ran.
    pub async fn apply_post_handle(
        &mut self,
        exchange: &mut Exchange,
        response: &mut ResponseUnit,
    ) -> Result<(), DispatchError> {
        if self.state != ChainState::Handling {
            return Ok(());
        }
        self.state = ChainState::PostHandling;
        for interceptor in self.interceptors.iter().rev() {
            let outcome =
                AssertUnwindSafe(interceptor.post_handle(exchange, &self.handler, response)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(DispatchError::interceptor(Phase::PostHandle, e)),
                Err(panic) => return Err(DispatchError::interceptor(Phase::PostHandle, panic_error(panic.as_ref()))),
            }
        }
        Ok(())
    }

    /// Runs `after_completion` in reverse order for every interceptor that passed
    /// `pre_handle`. Failures are logged and never stop the sweep; a second call is a no-op.
    pub async fn trigger_after_completion(&mut self, exchange: &Exchange, failure: Option<&DispatchError>) {
        if self.state == ChainState::Completed {
            return;
        }
        self.state = ChainState::Completed;

        for interceptor in self.interceptors[..self.cursor].iter().rev() {
            let outcome =
                AssertUnwindSafe(interceptor.after_completion(exchange, &self.handler, failure)).catch_unwind().await;
            let cause = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => panic_error(panic.as_ref()),
            };
            let e = DispatchError::interceptor(Phase::AfterCompletion, cause);
            error!(handler = self.handler.name(), cause = %e, "interceptor after-completion failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{Request, StatusCode};
    use micro_dispatch_http::protocol::RequestHeader;

    use super::*;
    use crate::error::BoxError;
    use crate::handler::{HandlerResult, handler_fn};
    use crate::request::{PathParams, RequestContext};

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Behavior {
        Pass,
        Abort,
        FailPre,
        FailAfter,
        PanicAfter,
    }

    struct Recording {
        name: &'static str,
        behavior: Behavior,
        journal: Journal,
    }

    impl Recording {
        fn record(&self, event: &str) {
            self.journal.lock().unwrap().push(format!("{}:{event}", self.name));
        }
    }

    #[async_trait]
    impl Interceptor for Recording {
        async fn pre_handle(&self, _exchange: &mut Exchange, _handler: &Handler) -> Result<bool, BoxError> {
            self.record("pre");
            match self.behavior {
                Behavior::Abort => Ok(false),
                Behavior::FailPre => Err("denied".into()),
                _ => Ok(true),
            }
        }

        async fn post_handle(
            &self,
            _exchange: &mut Exchange,
            _handler: &Handler,
            response: &mut ResponseUnit,
        ) -> Result<(), BoxError> {
            self.record("post");
            response.headers_mut().append("x-seen-by", http::HeaderValue::from_static(self.name));
            Ok(())
        }

        async fn after_completion(
            &self,
            _exchange: &Exchange,
            _handler: &Handler,
            _error: Option<&DispatchError>,
        ) -> Result<(), BoxError> {
            self.record("after");
            match self.behavior {
                Behavior::FailAfter => Err("cleanup failed".into()),
                Behavior::PanicAfter => panic!("cleanup panicked"),
                _ => Ok(()),
            }
        }
    }

    fn chain(behaviors: &[(&'static str, Behavior)]) -> (ExecutionChain, Journal) {
        let journal = Journal::default();
        let interceptors = behaviors
            .iter()
            .map(|&(name, behavior)| {
                Arc::new(Recording { name, behavior, journal: Arc::clone(&journal) }) as Arc<dyn Interceptor>
            })
            .collect();
        let noop = handler_fn(|_req, _input| async { Ok::<_, BoxError>(HandlerResult::empty()) });
        let handler = Arc::new(Handler::typed("test").build(noop));
        (ExecutionChain::new(handler, interceptors), journal)
    }

    fn exchange() -> Exchange {
        let header: RequestHeader = Request::builder().uri("/chain").body(()).unwrap().into();
        Exchange::new(Arc::new(RequestContext::new(header, Bytes::new(), PathParams::empty())))
    }

    fn events(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn full_pass() {
        let (mut chain, journal) = chain(&[("a", Behavior::Pass), ("b", Behavior::Pass), ("c", Behavior::Pass)]);
        let mut exchange = exchange();
        let mut response = ResponseUnit::new(StatusCode::OK);

        assert!(chain.apply_pre_handle(&mut exchange).await.unwrap());
        assert_eq!(chain.state(), ChainState::Handling);
        chain.apply_post_handle(&mut exchange, &mut response).await.unwrap();
        chain.trigger_after_completion(&exchange, None).await;

        assert_eq!(
            events(&journal),
            ["a:pre", "b:pre", "c:pre", "c:post", "b:post", "a:post", "c:after", "b:after", "a:after"]
        );
        let seen = response.headers().get_all("x-seen-by").iter().collect::<Vec<_>>();
        assert_eq!(seen, ["c", "b", "a"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn abort_stops_the_chain() {
        let (mut chain, journal) = chain(&[("a", Behavior::Pass), ("b", Behavior::Abort), ("c", Behavior::Pass)]);
        let mut exchange = exchange();
        let mut response = ResponseUnit::new(StatusCode::OK);

        assert!(!chain.apply_pre_handle(&mut exchange).await.unwrap());
        assert_eq!(chain.state(), ChainState::Aborted);
        assert_eq!(chain.cursor(), 1);

        chain.apply_post_handle(&mut exchange, &mut response).await.unwrap();
        chain.trigger_after_completion(&exchange, None).await;

        assert_eq!(events(&journal), ["a:pre", "b:pre", "a:after"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn pre_handle_failure() {
        let (mut chain, journal) = chain(&[("a", Behavior::Pass), ("b", Behavior::FailPre)]);
        let mut exchange = exchange();

        let err = chain.apply_pre_handle(&mut exchange).await.unwrap_err();
        assert!(matches!(err, DispatchError::Interceptor { phase: Phase::PreHandle, .. }));

        chain.trigger_after_completion(&exchange, Some(&err)).await;
        assert_eq!(events(&journal), ["a:pre", "b:pre", "a:after"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn after_completion_failures_do_not_stop_the_sweep() {
        let (mut chain, journal) =
            chain(&[("a", Behavior::Pass), ("b", Behavior::FailAfter), ("c", Behavior::PanicAfter)]);
        let mut exchange = exchange();

        assert!(chain.apply_pre_handle(&mut exchange).await.unwrap());
        chain.trigger_after_completion(&exchange, None).await;
        chain.trigger_after_completion(&exchange, None).await;

        assert_eq!(events(&journal), ["a:pre", "b:pre", "c:pre", "c:after", "b:after", "a:after"]);
        assert_eq!(chain.state(), ChainState::Completed);
    }
}
