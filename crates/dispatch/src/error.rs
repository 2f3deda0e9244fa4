//! Error types of the dispatch engine.
//!
//! Every failure between routing and post-handle is a [`DispatchError`], which is routed
//! through the exception resolver chain exactly once. Handler and interceptor code reports
//! failures as [`BoxError`]; business code that wants a specific kind or status in the
//! rendered error body returns an [`ApplicationError`].

use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};

use http::StatusCode;
use micro_dispatch_http::protocol::SendError;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// The interceptor callback that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreHandle,
    PostHandle,
    AfterCompletion,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::PreHandle => "pre-handle",
            Phase::PostHandle => "post-handle",
            Phase::AfterCompletion => "after-completion",
        })
    }
}

/// Direction of a failed payload conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Read,
    Write,
}

impl Display for ConversionStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConversionStage::Read => "reading",
            ConversionStage::Write => "writing",
        })
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no route matches path '{path}'")]
    RouteNotFound { path: String },

    #[error("no adapter supports handler '{handler}'")]
    NoAdapterForHandler { handler: String },

    #[error("content type '{content_type}' is not supported")]
    UnsupportedMediaType { content_type: String },

    #[error("no acceptable representation, producible types: {producible}")]
    NotAcceptable { producible: String },

    #[error("handler '{handler}' failed: {source}")]
    HandlerInvocation { handler: String, source: BoxError },

    #[error("interceptor failed during {phase}: {source}")]
    Interceptor { phase: Phase, source: BoxError },

    #[error("conversion failed while {stage}: {reason}")]
    Conversion { stage: ConversionStage, reason: String },

    #[error("failed to write response: {source}")]
    Transport {
        #[from]
        source: SendError,
    },
}

impl DispatchError {
    pub fn route_not_found<S: ToString>(path: S) -> Self {
        Self::RouteNotFound { path: path.to_string() }
    }

    pub fn no_adapter<S: ToString>(handler: S) -> Self {
        Self::NoAdapterForHandler { handler: handler.to_string() }
    }

    pub fn unsupported_media_type<S: ToString>(content_type: S) -> Self {
        Self::UnsupportedMediaType { content_type: content_type.to_string() }
    }

    pub fn not_acceptable<S: ToString>(producible: S) -> Self {
        Self::NotAcceptable { producible: producible.to_string() }
    }

    pub fn handler_invocation<S: ToString>(handler: S, source: BoxError) -> Self {
        Self::HandlerInvocation { handler: handler.to_string(), source }
    }

    pub fn interceptor(phase: Phase, source: BoxError) -> Self {
        Self::Interceptor { phase, source }
    }

    pub fn conversion<S: ToString>(stage: ConversionStage, reason: S) -> Self {
        Self::Conversion { stage, reason: reason.to_string() }
    }

    /// The kind name reported to clients.
    ///
    /// Handler and interceptor failures caused by an [`ApplicationError`] report the kind
    /// the application chose.
    pub fn kind(&self) -> &str {
        match self {
            Self::RouteNotFound { .. } => "RouteNotFound",
            Self::NoAdapterForHandler { .. } => "NoAdapterForHandler",
            Self::UnsupportedMediaType { .. } => "UnsupportedMediaType",
            Self::NotAcceptable { .. } => "NotAcceptable",
            Self::HandlerInvocation { source, .. } => {
                application_error(source).map_or("HandlerInvocationFailure", ApplicationError::kind)
            }
            Self::Interceptor { source, .. } => {
                application_error(source).map_or("InterceptorFailure", ApplicationError::kind)
            }
            Self::Conversion { .. } => "ConversionFailure",
            Self::Transport { .. } => "TransportFailure",
        }
    }

    /// The response status this failure maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Self::Conversion { stage: ConversionStage::Read, .. } => StatusCode::BAD_REQUEST,
            Self::HandlerInvocation { source, .. } | Self::Interceptor { source, .. } => {
                application_error(source).map_or(StatusCode::INTERNAL_SERVER_ERROR, ApplicationError::status)
            }
            Self::NoAdapterForHandler { .. } | Self::Conversion { .. } | Self::Transport { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Fatal errors bypass the resolver chain and are surfaced to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoAdapterForHandler { .. } | Self::Transport { .. })
    }

    /// The message reported to clients: the root cause for wrapped failures.
    pub fn client_message(&self) -> String {
        match self {
            Self::HandlerInvocation { source, .. } | Self::Interceptor { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }
}

fn application_error(source: &BoxError) -> Option<&ApplicationError> {
    source.downcast_ref::<ApplicationError>()
}

/// A business failure carrying the kind and status it should be reported with.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ApplicationError {
    kind: String,
    message: String,
    status: StatusCode,
}

impl ApplicationError {
    pub fn new<K: ToString, M: ToString>(kind: K, message: M) -> Self {
        Self { kind: kind.to_string(), message: message.to_string(), status: StatusCode::INTERNAL_SERVER_ERROR }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Turns a caught panic payload into an error.
pub(crate) fn panic_error(payload: &(dyn Any + Send)) -> BoxError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("panicked: {message}").into()
}

/// Returned when the worker pool has no room for another request.
#[derive(Error, Debug)]
#[error("dispatch rejected, worker pool saturated at {capacity} requests")]
pub struct DispatchRejected {
    pub capacity: usize,
}
