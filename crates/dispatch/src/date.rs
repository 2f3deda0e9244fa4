//! Cached HTTP `Date` header values.
//!
//! Formatting an IMF-fixdate on every response is wasteful; the [`DateService`] keeps the
//! current value in an [`ArcSwap`] and refreshes it from a background task.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const UPDATE_INTERVAL: Duration = Duration::from_millis(800);

#[derive(Debug)]
pub struct DateService {
    current: Arc<ArcSwap<Bytes>>,
    handle: JoinHandle<()>,
}

fn format_now() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}

impl DateService {
    /// Starts the refresh task on `runtime`.
    pub fn new(runtime: &Handle) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(format_now()));
        let current_arc = Arc::clone(&current);

        let handle = runtime.spawn(async move {
            loop {
                tokio::time::sleep(UPDATE_INTERVAL).await;
                current_arc.store(Arc::new(format_now()));
            }
        });

        Self { current, handle }
    }

    /// The current date as a header value, `None` only if the cached bytes are not a valid
    /// header value.
    pub fn http_date(&self) -> Option<HeaderValue> {
        let date = Bytes::clone(&self.current.load());
        HeaderValue::from_maybe_shared(date).ok()
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
