//! Inbound side of the transport contract.
//!
//! The transport calls a [`Handler`] once per aggregated request, handing over the request
//! unit and the writer for the connection it arrived on. A handler may answer inline or
//! submit the work elsewhere and return immediately.

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;

use crate::connection::BoxWriter;
use crate::protocol::RequestUnit;

#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    async fn call(&self, unit: RequestUnit, writer: BoxWriter) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<Err, F, Fut> Handler for HandlerFn<F>
where
    F: Fn(RequestUnit, BoxWriter) -> Fut + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
    Fut: Future<Output = Result<(), Err>> + Send,
{
    type Error = Err;

    async fn call(&self, unit: RequestUnit, writer: BoxWriter) -> Result<(), Self::Error> {
        (self.f)(unit, writer).await
    }
}

pub fn make_handler<F, Err, Ret>(f: F) -> HandlerFn<F>
where
    Err: Into<Box<dyn Error + Send + Sync>>,
    Ret: Future<Output = Result<(), Err>>,
    F: Fn(RequestUnit, BoxWriter) -> Ret,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{Request, StatusCode};

    use super::*;
    use crate::connection::RecordingWriter;
    use crate::protocol::{ResponseUnit, SendError};

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn fn_handler_echoes() {
        let handler = make_handler(|unit: RequestUnit, mut writer: BoxWriter| async move {
            let mut response = ResponseUnit::new(StatusCode::OK);
            response.set_body(unit.body().content());
            writer.write(response).await?;
            Ok::<_, SendError>(())
        });

        let observer = RecordingWriter::new();
        let unit = RequestUnit::from(Request::new(Bytes::from_static(b"ping")));
        handler.call(unit, Box::new(observer.clone())).await.unwrap();

        assert_eq!(observer.last_response().unwrap().body(), &Bytes::from_static(b"ping"));
    }
}
