use std::io;
use thiserror::Error;

/// Errors raised while turning transport input into a [`RequestUnit`](crate::protocol::RequestUnit).
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("body size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeBody { current_size: usize, max_size: usize },
}

impl ParseError {
    pub fn too_large_body(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeBody { current_size, max_size }
    }
}

/// Errors reported by a [`ResponseWriter`](crate::connection::ResponseWriter).
#[derive(Error, Debug)]
pub enum SendError {
    #[error("connection already closed")]
    Closed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
