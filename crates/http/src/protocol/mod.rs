//! Protocol units exchanged between the transport and the dispatch engine.
//!
//! - **Requests**: [`RequestHeader`] and the aggregated [`RequestUnit`]
//! - **Responses**: the fully-buffered [`ResponseUnit`]
//! - **Bodies** ([`body`]): [`ReqBody`](body::ReqBody) and its buffer lease
//! - **Errors**: [`ParseError`] on the way in, [`SendError`] on the way out

mod request;
pub use request::RequestHeader;
pub use request::RequestUnit;

mod response;
pub use response::ResponseUnit;

mod error;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
