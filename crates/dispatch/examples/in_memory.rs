use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request};
use micro_dispatch::config::NotFoundPolicy;
use micro_dispatch::converter::{Payload, PayloadKind};
use micro_dispatch::handler::{Handler, HandlerResult, RestHandler, handler_fn};
use micro_dispatch::interceptor::{Interceptor, Interceptors};
use micro_dispatch::{BoxError, Dispatcher, DispatcherConfig, Exchange, RequestContext};
use micro_dispatch_http::connection::{CountingWriter, RecordingWriter};
use micro_dispatch_http::protocol::RequestUnit;
use serde::{Deserialize, Serialize};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Serialize, Debug)]
struct User {
    name: String,
    zip: String,
}

struct Users;

#[async_trait]
impl RestHandler for Users {
    fn input(&self) -> Option<PayloadKind> {
        Some(PayloadKind::Json)
    }

    async fn get(&self, req: Arc<RequestContext>) -> Result<HandlerResult, BoxError> {
        let name = req.parameter("name").unwrap_or("zava").to_owned();
        Ok(Payload::json(&User { name, zip: "200000".into() })?.into())
    }

    async fn post(&self, _req: Arc<RequestContext>, input: Option<Payload>) -> Result<HandlerResult, BoxError> {
        let user: User = input.ok_or("missing user")?.into_json()?;
        info!(?user, "user created");
        Ok(Payload::json(&user)?.into())
    }
}

struct Timing;

#[async_trait]
impl Interceptor for Timing {
    async fn pre_handle(&self, exchange: &mut Exchange, handler: &Handler) -> Result<bool, BoxError> {
        exchange.attributes_mut().insert(std::time::Instant::now());
        info!(handler = handler.name(), path = exchange.request().path(), "pre handle");
        Ok(true)
    }

    async fn after_completion(
        &self,
        exchange: &Exchange,
        handler: &Handler,
        error: Option<&micro_dispatch::DispatchError>,
    ) -> Result<(), BoxError> {
        let elapsed = exchange.attributes().get::<std::time::Instant>().map(std::time::Instant::elapsed);
        info!(handler = handler.name(), ?elapsed, failed = error.is_some(), "after completion");
        Ok(())
    }
}

async fn send(dispatcher: &Dispatcher, request: Request<Bytes>) {
    let line = format!("{} {}", request.method(), request.uri());
    let writer = RecordingWriter::new();
    let counting = CountingWriter::new(writer.clone());
    let connection = counting.stats();

    match dispatcher.submit(RequestUnit::from(request), Box::new(counting)).await {
        Ok(task) => {
            if let Ok(Err(e)) = task.await {
                info!(cause = %e, "dispatch failed");
            }
        }
        Err(rejected) => info!(%rejected, "request rejected"),
    }

    if let Some(response) = writer.last_response() {
        println!(
            "{line} -> {} {} ({} bytes, closed: {})",
            response.status(),
            String::from_utf8_lossy(response.body()),
            connection.bytes_written(),
            connection.is_closed()
        );
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let echo = Handler::typed("echo").input(PayloadKind::Bytes).build(handler_fn(|_req, input| async move {
        Ok::<_, BoxError>(HandlerResult::Typed(input))
    }));
    let hello = handler_fn(|req: Arc<RequestContext>, _input| async move {
        let name = req.path_variable("name").unwrap_or_default().to_owned();
        if name == "nobody" {
            return Err(BoxError::from("nobody is not welcome"));
        }
        Ok(HandlerResult::from(Payload::from(format!("hello {name}"))))
    });
    let hello = Handler::typed("hello").produces("text/plain").build(hello);

    let config = DispatcherConfig::builder().not_found(NotFoundPolicy::Raise).sampling(1, 0).build().unwrap();
    let dispatcher = Dispatcher::builder()
        .config(config)
        .route("/echo", echo)
        .route("/hello/{name}", hello)
        .route("/users", Handler::rest("users", Users))
        .interceptors(Interceptors::builder().add_last(Timing).build())
        .build_on_current(64)
        .unwrap();

    let get = |uri: &str| Request::builder().method(Method::GET).uri(uri).body(Bytes::new()).unwrap();
    let post = |uri: &str, content_type: &str, body: &'static str| {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, content_type)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    };

    send(&dispatcher, get("/hello/zava")).await;
    send(&dispatcher, get("/hello/nobody")).await;
    send(&dispatcher, get("/users?name=micro")).await;
    send(&dispatcher, post("/users", "application/json", r#"{"name":"hello","zip":"world"}"#)).await;
    send(&dispatcher, post("/echo", "application/octet-stream", "ping")).await;
    send(&dispatcher, get("/missing")).await;

    let stats = dispatcher.stats();
    info!(completed = stats.completed(), failed = stats.failed(), rejected = stats.rejected(), "done");
}
